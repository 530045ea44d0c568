//! Triangle-triangle intersection producing start points.
//!
//! For one couple, each edge of either triangle is probed against the
//! other triangle: six probes in total, yielding 0, 1 (tangential touch),
//! or 2 distinct start points describing the crossing segment. More than
//! two distinct points can only come from a coplanar overlap; such couples
//! are flagged rather than chained. Every start point records which mesh
//! edge of each surface it lies on (or that it sits on a mesh vertex, or
//! strictly inside a triangle), which is the adjacency key the chaining
//! engine walks.

use polysect_math::{Point3, Tolerance, Vec3};

use crate::mesh::{MeshPoint, SurfaceMesh};

/// Where a start point sits on the mesh of one surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeLocation {
    /// On the interior of the given mesh edge.
    Edge(usize),
    /// On a mesh vertex.
    Vertex,
    /// Strictly inside a triangle.
    Interior,
}

/// One intersection sample between the two meshed surfaces.
#[derive(Debug, Clone, Copy)]
pub struct StartPoint {
    /// 3D position.
    pub pos: Point3,
    /// u parameter on surface 1.
    pub u1: f64,
    /// v parameter on surface 1.
    pub v1: f64,
    /// u parameter on surface 2.
    pub u2: f64,
    /// v parameter on surface 2.
    pub v2: f64,
    /// Incidence angle between the two surface normals, in radians.
    pub angle: f64,
    /// Location on the mesh of surface 1.
    pub edge1: EdgeLocation,
    /// Location on the mesh of surface 2.
    pub edge2: EdgeLocation,
    /// Owning triangle in mesh 1.
    pub t1: usize,
    /// Owning triangle in mesh 2.
    pub t2: usize,
}

impl StartPoint {
    /// True when both parameter pairs are confused with `other`'s.
    pub fn coincides(&self, other: &StartPoint, tol: &Tolerance) -> bool {
        tol.confused(self.u1, other.u1)
            && tol.confused(self.v1, other.v1)
            && tol.confused(self.u2, other.u2)
            && tol.confused(self.v2, other.v2)
    }
}

/// Result of intersecting one couple.
#[derive(Debug, Clone, Default)]
pub struct TriTriOutput {
    /// Up to two distinct start points.
    pub points: Vec<StartPoint>,
    /// More than two distinct points were found: the triangles overlap
    /// coplanarly and the couple is tangential evidence, not a crossing.
    pub overflow: bool,
}

/// Snapshot of one triangle's geometry for probing.
struct TriRef {
    pts: [MeshPoint; 3],
    edges: [usize; 3],
    normal: Vec3,
}

fn tri_ref(mesh: &SurfaceMesh, t: usize) -> TriRef {
    let tri = &mesh.triangles[t];
    TriRef {
        pts: [
            mesh.points[tri.points[0]],
            mesh.points[tri.points[1]],
            mesh.points[tri.points[2]],
        ],
        edges: tri.edges,
        normal: tri.normal,
    }
}

/// Compute the start points of one couple.
pub fn starting_points(
    m1: &SurfaceMesh,
    m2: &SurfaceMesh,
    t1: usize,
    t2: usize,
    tol: &Tolerance,
) -> TriTriOutput {
    probe_couple(m1, m2, t1, t2, None, tol)
}

/// Compute the start points of one couple, excluding the probes that
/// produced `prev` (its mesh edges) and `prev` itself. Used to walk a
/// chain from a known point into a neighboring couple.
pub fn next_starting_points(
    m1: &SurfaceMesh,
    m2: &SurfaceMesh,
    t1: usize,
    t2: usize,
    prev: &StartPoint,
    tol: &Tolerance,
) -> TriTriOutput {
    probe_couple(m1, m2, t1, t2, Some(prev), tol)
}

fn probe_couple(
    m1: &SurfaceMesh,
    m2: &SurfaceMesh,
    t1: usize,
    t2: usize,
    prev: Option<&StartPoint>,
    tol: &Tolerance,
) -> TriTriOutput {
    let mut out = TriTriOutput::default();
    let tri1 = tri_ref(m1, t1);
    let tri2 = tri_ref(m2, t2);
    if tri1.normal.norm_squared() == 0.0 || tri2.normal.norm_squared() == 0.0 {
        return out; // degenerate facet: contributes nothing
    }

    let mut distinct: Vec<StartPoint> = Vec::new();
    let mut candidates = Vec::new();

    // Edges of triangle 2 against triangle 1, then the other way round.
    for k in 0..3 {
        if distinct.len() >= 3 {
            break;
        }
        if let Some(p) = prev {
            if p.edge2 == EdgeLocation::Edge(tri2.edges[k]) {
                continue;
            }
        }
        candidates.clear();
        triangle_edge_contact(
            &tri1,
            true,
            &tri2.pts[k],
            &tri2.pts[(k + 1) % 3],
            tri2.edges[k],
            t1,
            t2,
            tol,
            &mut candidates,
        );
        merge(&mut distinct, &candidates, tol);
    }
    for k in 0..3 {
        if distinct.len() >= 3 {
            break;
        }
        if let Some(p) = prev {
            if p.edge1 == EdgeLocation::Edge(tri1.edges[k]) {
                continue;
            }
        }
        candidates.clear();
        triangle_edge_contact(
            &tri2,
            false,
            &tri1.pts[k],
            &tri1.pts[(k + 1) % 3],
            tri1.edges[k],
            t1,
            t2,
            tol,
            &mut candidates,
        );
        merge(&mut distinct, &candidates, tol);
    }

    if let Some(p) = prev {
        distinct.retain(|sp| !sp.coincides(p, tol));
    }

    out.overflow = distinct.len() > 2;
    distinct.truncate(2);
    out.points = distinct;
    out
}

fn merge(distinct: &mut Vec<StartPoint>, candidates: &[StartPoint], tol: &Tolerance) {
    for c in candidates {
        if !distinct.iter().any(|d| d.coincides(c, tol)) {
            distinct.push(*c);
        }
    }
}

/// Assemble a start point from its triangle-side and edge-side data.
#[allow(clippy::too_many_arguments)]
fn make_point(
    pos: Point3,
    tri_uv: (f64, f64),
    tri_loc: EdgeLocation,
    edge_uv: (f64, f64),
    edge_loc: EdgeLocation,
    tri_owner_first: bool,
    t1: usize,
    t2: usize,
) -> StartPoint {
    let (u1, v1, edge1, u2, v2, edge2) = if tri_owner_first {
        (tri_uv.0, tri_uv.1, tri_loc, edge_uv.0, edge_uv.1, edge_loc)
    } else {
        (edge_uv.0, edge_uv.1, edge_loc, tri_uv.0, tri_uv.1, tri_loc)
    };
    StartPoint {
        pos,
        u1,
        v1,
        u2,
        v2,
        angle: 0.0,
        edge1,
        edge2,
        t1,
        t2,
    }
}

/// Solve `r = alpha * c12 + beta * c23` using the best-conditioned pair
/// of coordinate equations.
fn solve_barycentric(c12: &Vec3, c23: &Vec3, r: &Vec3) -> Option<(f64, f64)> {
    let dets = [
        (0, 1, c12.x * c23.y - c12.y * c23.x),
        (0, 2, c12.x * c23.z - c12.z * c23.x),
        (1, 2, c12.y * c23.z - c12.z * c23.y),
    ];
    let &(i, j, det) = dets
        .iter()
        .max_by(|a, b| a.2.abs().partial_cmp(&b.2.abs()).unwrap())
        .unwrap();
    if det.abs() < 1e-20 {
        return None;
    }
    let alpha = (r[i] * c23[j] - r[j] * c23[i]) / det;
    let beta = (c12[i] * r[j] - c12[j] * r[i]) / det;
    Some((alpha, beta))
}

/// Classify a point of the triangle's plane given its `(alpha, beta)`
/// coordinates (`X = P1 + alpha * (P2 - P1) + beta * (P3 - P2)`), snapping
/// onto vertices and edges within confusion precision. Returns the
/// interpolated parameters, the (possibly snapped) position, and the
/// location record.
fn classify_in_triangle(
    tri: &TriRef,
    alpha: f64,
    beta: f64,
    pos: Point3,
    tol: &Tolerance,
) -> ((f64, f64), Point3, EdgeLocation) {
    let c = tol.confusion;
    let [a, b, p3] = &tri.pts;

    if alpha.abs() < c {
        // beta is confined to [0, alpha]: this is the first vertex.
        return ((a.u, a.v), a.pos, EdgeLocation::Vertex);
    }
    if (alpha - 1.0).abs() < c && beta.abs() < c {
        return ((b.u, b.v), b.pos, EdgeLocation::Vertex);
    }
    if (alpha - 1.0).abs() < c && (beta - 1.0).abs() < c {
        return ((p3.u, p3.v), p3.pos, EdgeLocation::Vertex);
    }

    let u = a.u + alpha * (b.u - a.u) + beta * (p3.u - b.u);
    let v = a.v + alpha * (b.v - a.v) + beta * (p3.v - b.v);

    let loc = if beta.abs() < c {
        EdgeLocation::Edge(tri.edges[0])
    } else if (beta - alpha).abs() < c {
        EdgeLocation::Edge(tri.edges[2])
    } else if (alpha - 1.0).abs() < c {
        EdgeLocation::Edge(tri.edges[1])
    } else {
        EdgeLocation::Interior
    };
    ((u, v), pos, loc)
}

/// Probe one mesh edge against one triangle.
///
/// `tri_owner_first` tells which surface owns the triangle; the edge
/// belongs to the other one. Appends 0, 1 (transversal or touching), or
/// 2 (coplanar overlap segment) candidate points.
#[allow(clippy::too_many_arguments)]
fn triangle_edge_contact(
    tri: &TriRef,
    tri_owner_first: bool,
    e0: &MeshPoint,
    e1: &MeshPoint,
    edge_id: usize,
    t1: usize,
    t2: usize,
    tol: &Tolerance,
    out: &mut Vec<StartPoint>,
) {
    let edge_vec = e1.pos - e0.pos;
    if edge_vec.norm_squared() == 0.0 {
        return;
    }
    let n = tri.normal;
    let he0 = (e0.pos - tri.pts[0].pos).dot(&n);
    let he1 = (e1.pos - tri.pts[0].pos).dot(&n);
    let c = tol.confusion;

    if he0.abs() < c && he1.abs() < c {
        // Edge lies in the triangle plane: clip it against the triangle
        // and emit the overlap segment's ends.
        let Some((tmin, tmax)) = clip_segment_to_triangle(tri, &e0.pos, &e1.pos, tol) else {
            return;
        };
        let mut emit = |t: f64| {
            let pos = e0.pos + t * edge_vec;
            let r = pos - tri.pts[0].pos;
            let c12 = tri.pts[1].pos - tri.pts[0].pos;
            let c23 = tri.pts[2].pos - tri.pts[1].pos;
            let Some((alpha, beta)) = solve_barycentric(&c12, &c23, &r) else {
                return;
            };
            let (tri_uv, pos, tri_loc) = classify_in_triangle(tri, alpha, beta, pos, tol);
            let edge_uv = (e0.u + t * (e1.u - e0.u), e0.v + t * (e1.v - e0.v));
            let edge_loc = if t.abs() < c || (t - 1.0).abs() < c {
                EdgeLocation::Vertex
            } else {
                EdgeLocation::Edge(edge_id)
            };
            out.push(make_point(
                pos,
                tri_uv,
                tri_loc,
                edge_uv,
                edge_loc,
                tri_owner_first,
                t1,
                t2,
            ));
        };
        emit(tmin);
        if tmax - tmin > c {
            emit(tmax);
        }
        return;
    }

    // Transversal case: the edge pierces the triangle plane at most once.
    if !((he0 >= 0.0 && he1 <= 0.0) || (he0 <= 0.0 && he1 >= 0.0)) {
        return;
    }
    let lambda = he0 / (he0 - he1);

    let (pi, edge_loc) = if lambda.abs() < c {
        (e0.pos, EdgeLocation::Vertex)
    } else if (lambda - 1.0).abs() < c {
        (e1.pos, EdgeLocation::Vertex)
    } else {
        (e0.pos + lambda * edge_vec, EdgeLocation::Edge(edge_id))
    };

    let c12 = tri.pts[1].pos - tri.pts[0].pos;
    let c23 = tri.pts[2].pos - tri.pts[1].pos;
    let r = pi - tri.pts[0].pos;
    let Some((alpha, beta)) = solve_barycentric(&c12, &c23, &r) else {
        return;
    };
    // Inside-triangle constraints: alpha in [0, 1], beta in [0, alpha].
    if alpha < -c || alpha > 1.0 + c || beta < -c || beta > alpha + c {
        return;
    }

    let (tri_uv, pos, tri_loc) = classify_in_triangle(tri, alpha, beta, pi, tol);
    let edge_uv = (
        e0.u + lambda * (e1.u - e0.u),
        e0.v + lambda * (e1.v - e0.v),
    );
    out.push(make_point(
        pos,
        tri_uv,
        tri_loc,
        edge_uv,
        edge_loc,
        tri_owner_first,
        t1,
        t2,
    ));
}

/// Clip the parametric segment `[p0, p1]` against the triangle's three
/// in-plane halfplanes. Returns the surviving `t` range.
fn clip_segment_to_triangle(
    tri: &TriRef,
    p0: &Point3,
    p1: &Point3,
    tol: &Tolerance,
) -> Option<(f64, f64)> {
    let mut tmin = 0.0f64;
    let mut tmax = 1.0f64;
    for k in 0..3 {
        let a = tri.pts[k].pos;
        let b = tri.pts[(k + 1) % 3].pos;
        let inward = tri.normal.cross(&(b - a));
        let d0 = (p0 - a).dot(&inward);
        let d1 = (p1 - a).dot(&inward);
        let small = tol.confusion * inward.norm().max(1.0);
        if (d1 - d0).abs() < small {
            if d0 < -small {
                return None; // parallel to this side, fully outside
            }
            continue;
        }
        let t = d0 / (d0 - d1);
        if d1 < d0 {
            tmax = tmax.min(t);
        } else {
            tmin = tmin.max(t);
        }
    }
    if tmin > tmax + tol.confusion {
        None
    } else {
        Some((tmin, tmax.max(tmin)))
    }
}
