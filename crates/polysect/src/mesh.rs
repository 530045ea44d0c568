//! Adaptive triangular meshing of one parametric surface.
//!
//! A [`SurfaceMesh`] samples the surface on a regular parametric grid,
//! splits every cell into two triangles, and records point/edge/triangle
//! adjacency. Triangles carry their chordal deflection (distance from the
//! surface at the triangle's UV centroid to the triangle plane); the mesh
//! refines itself by centroid subdivision until the deflection target is
//! met or the sweep budget runs out.
//!
//! Point and triangle arrays are append-only: subdivision marks the parent
//! dead and appends children, so indices handed out earlier stay valid for
//! the lifetime of the pass that owns the mesh.

use std::collections::HashMap;
use std::time::Instant;

use log::debug;
use polysect_geom::Surface;
use polysect_math::{Point3, Tolerance, Vec3};

use crate::bbox::Aabb3;
use crate::error::{Error, Result};

/// Squared-length threshold below which a triangle normal is degenerate.
const NORMAL_EPS2: f64 = 1e-23;

/// Baseline per-axis sample count for a surface with no bending.
const BASE_SAMPLES: usize = 11;

/// Upper bound on auto-computed per-axis sample counts.
const MAX_SAMPLES: usize = 49;

/// One extra sample per this much accumulated turning angle (radians).
const TURN_STEP: f64 = 0.35;

/// One sampled point of a surface mesh: 3D position plus the parameters
/// it was evaluated at, and its outcode relative to the common zone.
#[derive(Debug, Clone, Copy)]
pub struct MeshPoint {
    /// Position in 3D space.
    pub pos: Point3,
    /// u parameter on the owning surface.
    pub u: f64,
    /// v parameter on the owning surface.
    pub v: f64,
    /// 6-bit outcode locating the point against the common box
    /// (bit pairs per axis: below-min / above-max). Zero means inside.
    pub outcode: u8,
}

/// An undirected mesh edge with its incident triangles.
#[derive(Debug, Clone, Copy)]
pub struct MeshEdge {
    /// The two point indices.
    pub points: [usize; 2],
    /// Incident triangles (border edges have one).
    pub triangles: [Option<usize>; 2],
}

impl MeshEdge {
    /// The incident triangle that is not `t`, if any.
    pub fn other_triangle(&self, t: usize) -> Option<usize> {
        match self.triangles {
            [Some(a), b] if a == t => b,
            [a, Some(b)] if b == t => a,
            _ => None,
        }
    }

    fn link_triangle(&mut self, t: usize) {
        if self.triangles[0].is_none() {
            self.triangles[0] = Some(t);
        } else if self.triangles[1].is_none() {
            self.triangles[1] = Some(t);
        }
    }

    fn replace_triangle(&mut self, old: usize, new: usize) {
        for slot in &mut self.triangles {
            if *slot == Some(old) {
                *slot = Some(new);
                return;
            }
        }
    }
}

/// One mesh triangle with its adjacency and refinement state.
#[derive(Debug, Clone, Copy)]
pub struct MeshTriangle {
    /// Point indices, counter-clockwise in parameter space.
    pub points: [usize; 3],
    /// Edge indices; `edges[k]` joins `points[k]` and `points[(k + 1) % 3]`.
    pub edges: [usize; 3],
    /// Unit plane normal (zero vector when the triangle is degenerate).
    pub normal: Vec3,
    /// Bounding box, enlarged by the deflection and the linear tolerance.
    pub aabb: Aabb3,
    /// Chordal deflection at the UV centroid.
    pub deflection: f64,
    /// False once the triangle has been subdivided away.
    pub alive: bool,
    /// True if the triangle may take part in the intersection (common zone).
    pub candidate: bool,
    /// True if the triangle has no usable plane (collapsed cell, pole row).
    pub degenerate: bool,
}

impl MeshTriangle {
    /// True for triangles the candidate filter should consider.
    pub fn is_usable(&self) -> bool {
        self.alive && self.candidate && !self.degenerate
    }
}

/// A triangulated sampling of one surface.
#[derive(Debug, Clone)]
pub struct SurfaceMesh {
    /// Sampled points (append-only).
    pub points: Vec<MeshPoint>,
    /// Edges with triangle adjacency (append-only).
    pub edges: Vec<MeshEdge>,
    /// Triangles (append-only; subdivided parents stay, marked dead).
    pub triangles: Vec<MeshTriangle>,
    /// Whole-mesh bounding box, enlarged by the deflection overestimate.
    pub aabb: Aabb3,
    /// Largest per-triangle deflection seen on the initial grid.
    pub max_deflection: f64,
    common_box: Option<Aabb3>,
}

impl SurfaceMesh {
    /// Sample `surface` on an `nb_u x nb_v` grid and triangulate it.
    ///
    /// With `reversed` set, the u axis is swept in the opposite sense;
    /// the sampled positions are the same but every cell's triangulation
    /// diagonal runs the other way, which is what the advanced fallback
    /// pass exploits. (Flipping both axes would leave the diagonals
    /// geometrically unchanged.) A degenerate domain (or a sample count
    /// below 2) yields an empty mesh.
    pub fn build(
        surface: &dyn Surface,
        nb_u: usize,
        nb_v: usize,
        reversed: bool,
        tol: &Tolerance,
    ) -> SurfaceMesh {
        let mut mesh = SurfaceMesh {
            points: Vec::new(),
            edges: Vec::new(),
            triangles: Vec::new(),
            aabb: Aabb3::empty(),
            max_deflection: 0.0,
            common_box: None,
        };

        let domain = surface.domain();
        if domain.is_degenerate() || nb_u < 2 || nb_v < 2 {
            return mesh;
        }

        mesh.points.reserve(nb_u * nb_v);
        let mut box_points = Aabb3::empty();
        for iu in 0..nb_u {
            let mut fu = iu as f64 / (nb_u - 1) as f64;
            if reversed {
                fu = 1.0 - fu;
            }
            // Hit the bounds exactly rather than through accumulated steps.
            let u = if fu == 0.0 {
                domain.u_min
            } else if fu == 1.0 {
                domain.u_max
            } else {
                domain.u_min + fu * domain.span_u()
            };
            for iv in 0..nb_v {
                let fv = iv as f64 / (nb_v - 1) as f64;
                let v = if fv == 0.0 {
                    domain.v_min
                } else if fv == 1.0 {
                    domain.v_max
                } else {
                    domain.v_min + fv * domain.span_v()
                };
                let pos = surface.value(u, v);
                box_points.include_point(&pos);
                mesh.points.push(MeshPoint {
                    pos,
                    u,
                    v,
                    outcode: 0,
                });
            }
        }

        let mut edge_map: HashMap<(usize, usize), usize> = HashMap::new();
        for iu in 0..nb_u - 1 {
            for iv in 0..nb_v - 1 {
                let p = iu * nb_v + iv;
                mesh.add_triangle([p, p + 1, p + nb_v + 1], &mut edge_map);
                mesh.add_triangle([p, p + nb_v + 1, p + nb_v], &mut edge_map);
            }
        }

        mesh.update_metrics(surface, tol, 0);
        mesh.max_deflection = mesh
            .triangles
            .iter()
            .map(|t| t.deflection)
            .fold(0.0, f64::max);

        // Over-estimate the mesh box so that chord-versus-surface gaps
        // cannot push a genuine intersection outside of it.
        box_points.expand(mesh.max_deflection * 1.2 + tol.linear);
        mesh.aabb = box_points;
        mesh
    }

    /// True when the mesh holds no triangles (degenerate input domain).
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Number of triangles still alive.
    pub fn nb_alive(&self) -> usize {
        self.triangles.iter().filter(|t| t.alive).count()
    }

    fn add_triangle(&mut self, pts: [usize; 3], edge_map: &mut HashMap<(usize, usize), usize>) {
        let t = self.triangles.len();
        let mut edges = [0usize; 3];
        for k in 0..3 {
            let a = pts[k];
            let b = pts[(k + 1) % 3];
            let key = (a.min(b), a.max(b));
            let e = *edge_map.entry(key).or_insert_with(|| {
                self.edges.push(MeshEdge {
                    points: [key.0, key.1],
                    triangles: [None, None],
                });
                self.edges.len() - 1
            });
            self.edges[e].link_triangle(t);
            edges[k] = e;
        }
        self.triangles.push(MeshTriangle {
            points: pts,
            edges,
            normal: Vec3::zeros(),
            aabb: Aabb3::empty(),
            deflection: 0.0,
            alive: true,
            candidate: true,
            degenerate: false,
        });
    }

    /// Recompute normal, deflection, and bounding box for every alive
    /// triangle starting at index `from`.
    fn update_metrics(&mut self, surface: &dyn Surface, tol: &Tolerance, from: usize) {
        for t in from..self.triangles.len() {
            if !self.triangles[t].alive {
                continue;
            }
            let [ia, ib, ic] = self.triangles[t].points;
            let (a, b, c) = (self.points[ia], self.points[ib], self.points[ic]);

            let n = (b.pos - a.pos).cross(&(c.pos - a.pos));
            let tri = &mut self.triangles[t];
            if n.norm_squared() < NORMAL_EPS2 {
                tri.normal = Vec3::zeros();
                tri.degenerate = true;
                tri.deflection = 0.0;
            } else {
                tri.normal = n.normalize();
                tri.degenerate = false;
            }

            let mut aabb = Aabb3::empty();
            aabb.include_point(&a.pos);
            aabb.include_point(&b.pos);
            aabb.include_point(&c.pos);

            if !self.triangles[t].degenerate {
                let uc = (a.u + b.u + c.u) / 3.0;
                let vc = (a.v + b.v + c.v) / 3.0;
                let sp = surface.value(uc, vc);
                let d = (sp - a.pos).dot(&self.triangles[t].normal).abs();
                self.triangles[t].deflection = d;
            }

            aabb.expand(self.triangles[t].deflection + tol.linear);
            self.triangles[t].aabb = aabb;
        }
    }

    /// Run one refinement sweep: subdivide every alive candidate triangle
    /// whose deflection exceeds both the sweep threshold
    /// (`min + 0.8 * (max - min)` over the current mesh) and the caller's
    /// `max_deflection` target. Returns whether anything was subdivided.
    pub fn refine_sweep(
        &mut self,
        surface: &dyn Surface,
        max_deflection: f64,
        deadline: Option<Instant>,
        tol: &Tolerance,
    ) -> Result<bool> {
        if let Some(limit) = deadline {
            if Instant::now() > limit {
                return Err(Error::Cancelled);
            }
        }

        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for tri in self.triangles.iter().filter(|t| t.is_usable()) {
            min = min.min(tri.deflection);
            max = max.max(tri.deflection);
        }
        if min > max {
            return Ok(false); // nothing usable to refine
        }
        let threshold = min + 0.8 * (max - min);

        let targets: Vec<usize> = (0..self.triangles.len())
            .filter(|&t| {
                let tri = &self.triangles[t];
                tri.is_usable() && tri.deflection > threshold && tri.deflection > max_deflection
            })
            .collect();
        if targets.is_empty() {
            return Ok(false);
        }
        debug!(
            "refine sweep: {} triangles over deflection {:.3e}",
            targets.len(),
            threshold
        );

        for t in targets {
            self.subdivide(t, surface, tol);
        }
        Ok(true)
    }

    /// Refine until the deflection target is met or the sweep budget runs
    /// out.
    pub fn refine(
        &mut self,
        surface: &dyn Surface,
        max_deflection: f64,
        max_sweeps: usize,
        deadline: Option<Instant>,
        tol: &Tolerance,
    ) -> Result<()> {
        for _ in 0..max_sweeps {
            if !self.refine_sweep(surface, max_deflection, deadline, tol)? {
                break;
            }
        }
        Ok(())
    }

    /// Split triangle `t` at the surface point of its UV centroid into
    /// three children; the parent stays in the array, marked dead.
    fn subdivide(&mut self, t: usize, surface: &dyn Surface, tol: &Tolerance) {
        let parent = self.triangles[t];
        let [ia, ib, ic] = parent.points;
        let (a, b, c) = (self.points[ia], self.points[ib], self.points[ic]);

        let uc = (a.u + b.u + c.u) / 3.0;
        let vc = (a.v + b.v + c.v) / 3.0;
        let pos = surface.value(uc, vc);
        let outcode = self
            .common_box
            .map_or(0, |cb| outcode_for(&pos, &cb));
        let pc = self.points.len();
        self.points.push(MeshPoint {
            pos,
            u: uc,
            v: vc,
            outcode,
        });

        let first_child = self.triangles.len();
        let (child0, child1, child2) = (first_child, first_child + 1, first_child + 2);

        let ea = self.push_edge([ia, pc], [child0, child2]);
        let eb = self.push_edge([ib, pc], [child0, child1]);
        let ec = self.push_edge([ic, pc], [child1, child2]);

        self.push_child([ia, ib, pc], [parent.edges[0], eb, ea], parent.candidate);
        self.push_child([ib, ic, pc], [parent.edges[1], ec, eb], parent.candidate);
        self.push_child([ic, ia, pc], [parent.edges[2], ea, ec], parent.candidate);

        self.edges[parent.edges[0]].replace_triangle(t, child0);
        self.edges[parent.edges[1]].replace_triangle(t, child1);
        self.edges[parent.edges[2]].replace_triangle(t, child2);

        self.triangles[t].alive = false;
        self.update_metrics(surface, tol, first_child);
    }

    fn push_edge(&mut self, points: [usize; 2], triangles: [usize; 2]) -> usize {
        self.edges.push(MeshEdge {
            points,
            triangles: [Some(triangles[0]), Some(triangles[1])],
        });
        self.edges.len() - 1
    }

    fn push_child(&mut self, points: [usize; 3], edges: [usize; 3], candidate: bool) {
        self.triangles.push(MeshTriangle {
            points,
            edges,
            normal: Vec3::zeros(),
            aabb: Aabb3::empty(),
            deflection: 0.0,
            alive: true,
            candidate,
            degenerate: false,
        });
    }
}

fn outcode_for(p: &Point3, cb: &Aabb3) -> u8 {
    let mut code = 0u8;
    if p.x < cb.min.x {
        code |= 1;
    } else if p.x > cb.max.x {
        code |= 2;
    }
    if p.y < cb.min.y {
        code |= 4;
    } else if p.y > cb.max.y {
        code |= 8;
    }
    if p.z < cb.min.z {
        code |= 16;
    } else if p.z > cb.max.z {
        code |= 32;
    }
    code
}

/// Intersect the two mesh boxes into the common zone, mark every point
/// with its outcode, and clear the candidate flag of triangles that lie
/// entirely on one outside of it. Returns false when the boxes do not
/// overlap at all (no triangle of either mesh can intersect the other).
pub fn mark_common_zone(m1: &mut SurfaceMesh, m2: &mut SurfaceMesh) -> bool {
    let common = match m1.aabb.intersection(&m2.aabb) {
        Some(c) => c,
        None => {
            for tri in m1.triangles.iter_mut().chain(m2.triangles.iter_mut()) {
                tri.candidate = false;
            }
            return false;
        }
    };

    // Pad the common zone by 10% per axis so near-boundary geometry is
    // not rejected; collapsed axes borrow their padding from the others.
    let spans = [
        common.max.x - common.min.x,
        common.max.y - common.min.y,
        common.max.z - common.min.z,
    ];
    let fallback = spans.iter().cloned().fold(0.0, f64::max) * 0.1;
    let pad = |s: f64| if s > 0.0 { s * 0.1 } else { fallback };
    let mut zone = common;
    zone.min.x -= pad(spans[0]);
    zone.max.x += pad(spans[0]);
    zone.min.y -= pad(spans[1]);
    zone.max.y += pad(spans[1]);
    zone.min.z -= pad(spans[2]);
    zone.max.z += pad(spans[2]);

    for mesh in [&mut *m1, &mut *m2] {
        mesh.common_box = Some(zone);
        for p in &mut mesh.points {
            p.outcode = outcode_for(&p.pos, &zone);
        }
        for tri in &mut mesh.triangles {
            let [a, b, c] = tri.points;
            let (oa, ob, oc) = (
                mesh.points[a].outcode,
                mesh.points[b].outcode,
                mesh.points[c].outcode,
            );
            // Every pair of corners shares an outside half-space: the
            // triangle cannot reach the common zone.
            tri.candidate = !((oa & ob) != 0 && (ob & oc) != 0 && (oc & oa) != 0);
        }
    }
    true
}

/// Derive per-axis sample counts from the bending of probe polylines
/// across the surface. A flat surface gets the baseline count; each
/// accumulated `TURN_STEP` radians of turning adds one sample, up to
/// `MAX_SAMPLES`.
pub fn auto_sample_counts(surface: &dyn Surface) -> (usize, usize) {
    let domain = surface.domain();
    if domain.is_degenerate() {
        return (BASE_SAMPLES, BASE_SAMPLES);
    }

    const PROBES: usize = 17;
    let turn = |along_u: bool| -> f64 {
        let probes: Vec<Point3> = (0..PROBES)
            .map(|i| {
                let f = i as f64 / (PROBES - 1) as f64;
                let (u, v) = if along_u {
                    (
                        domain.u_min + f * domain.span_u(),
                        domain.v_min + 0.5 * domain.span_v(),
                    )
                } else {
                    (
                        domain.u_min + 0.5 * domain.span_u(),
                        domain.v_min + f * domain.span_v(),
                    )
                };
                surface.value(u, v)
            })
            .collect();

        let mut total = 0.0;
        let mut prev_dir: Option<Vec3> = None;
        for w in probes.windows(2) {
            let chord = w[1] - w[0];
            let len = chord.norm();
            if len <= 1e-12 {
                continue;
            }
            let dir = chord / len;
            if let Some(pd) = prev_dir {
                total += pd.dot(&dir).clamp(-1.0, 1.0).acos();
            }
            prev_dir = Some(dir);
        }
        total
    };

    // Odd counts keep the domain midlines on the sample grid, where
    // tangency configurations concentrate.
    let count = |t: f64| {
        let c = (BASE_SAMPLES + (t / TURN_STEP).round() as usize).min(MAX_SAMPLES);
        if c % 2 == 0 {
            c + 1
        } else {
            c
        }
    };
    (count(turn(true)), count(turn(false)))
}
