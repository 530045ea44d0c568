//! Chaining of start points into section lines and tangent zones.
//!
//! Start points of one pass are linked through the mesh-edge records they
//! carry: a point sitting on a mesh edge continues into the couple formed
//! with that edge's other incident triangle. Walking those links from a
//! seed couple grows one maximal section line forward and backward;
//! couples consumed by the walk are marked so each branch is emitted once.
//!
//! Points that sit on a mesh vertex, and points whose incidence angle
//! marks them tangential, never enter a section line: they are collected
//! into tangent zones, grouped by 3D proximity and deduplicated in
//! parameter space.

use std::collections::HashMap;
use std::f64::consts::PI;
use std::time::Instant;

use log::debug;
use polysect_geom::Surface;
use polysect_math::Tolerance;

use crate::couple::Couple;
use crate::error::{Error, Result};
use crate::intersect::{next_starting_points, starting_points, EdgeLocation, StartPoint};
use crate::mesh::SurfaceMesh;

/// One continuous branch of the intersection curve.
#[derive(Debug, Clone)]
pub struct SectionLine {
    /// Ordered intersection samples; consecutive points are mesh-adjacent.
    pub points: Vec<StartPoint>,
    /// True when the branch closes onto itself.
    pub closed: bool,
    /// Set when a branching ambiguity was resolved by nearest-neighbor
    /// choice; the line may then be one of several possible walks.
    pub possibly_branching: bool,
}

impl SectionLine {
    fn new() -> Self {
        Self {
            points: Vec::new(),
            closed: false,
            possibly_branching: false,
        }
    }

    /// Number of points in the line.
    pub fn nb_points(&self) -> usize {
        self.points.len()
    }
}

/// A group of tangential intersection samples.
#[derive(Debug, Clone)]
pub struct TangentZone {
    /// The zone's points, in discovery order.
    pub points: Vec<StartPoint>,
}

impl TangentZone {
    /// Number of points in the zone.
    pub fn nb_points(&self) -> usize {
        self.points.len()
    }
}

/// Everything the chaining walk needs to see from the owning pass.
pub struct ChainContext<'a> {
    /// Mesh of surface 1.
    pub m1: &'a SurfaceMesh,
    /// Mesh of surface 2.
    pub m2: &'a SurfaceMesh,
    /// Surface 1 evaluator (for incidence normals).
    pub s1: &'a dyn Surface,
    /// Surface 2 evaluator.
    pub s2: &'a dyn Surface,
    /// Tolerance model.
    pub tol: Tolerance,
    /// Incidence angles within this band of 0 or π are tangential.
    pub tangent_angle: f64,
    /// 3D distance bound for chain links and zone grouping.
    pub proximity: f64,
    /// Optional cooperative cancellation deadline.
    pub deadline: Option<Instant>,
}

impl ChainContext<'_> {
    fn check_deadline(&self) -> Result<()> {
        if let Some(limit) = self.deadline {
            if Instant::now() > limit {
                return Err(Error::Cancelled);
            }
        }
        Ok(())
    }

    fn tangential_cos(&self, cos: f64) -> bool {
        cos.abs() >= self.tangent_angle.cos()
    }

    fn tangential_angle(&self, angle: f64) -> bool {
        angle < self.tangent_angle || angle > PI - self.tangent_angle
    }

    /// Incidence angle from the surface normals at the point, falling
    /// back to the couple's facet-plane cosine at parameterization
    /// singularities.
    fn incidence_angle(&self, sp: &StartPoint, fallback_cos: f64) -> f64 {
        match (self.s1.normal(sp.u1, sp.v1), self.s2.normal(sp.u2, sp.v2)) {
            (Some(n1), Some(n2)) => n1.dot(&n2).clamp(-1.0, 1.0).acos(),
            _ => fallback_cos.clamp(-1.0, 1.0).acos(),
        }
    }

    fn live(&self, c: &Couple) -> bool {
        self.m1.triangles[c.t1].is_usable() && self.m2.triangles[c.t2].is_usable()
    }
}

/// Append a tangential or vertex point to the zones, deduplicated in
/// parameter space and grouped by 3D proximity.
fn push_zone(ctx: &ChainContext<'_>, zones: &mut Vec<TangentZone>, sp: StartPoint) {
    if zones
        .iter()
        .any(|z| z.points.iter().any(|p| p.coincides(&sp, &ctx.tol)))
    {
        return;
    }
    for zone in zones.iter_mut() {
        if (zone.points[0].pos - sp.pos).norm() <= ctx.proximity {
            zone.points.push(sp);
            return;
        }
    }
    zones.push(TangentZone { points: vec![sp] });
}

/// Place one point: tangential and vertex points go to the zones, the
/// rest extends the line. Returns true when the line grew.
fn emit(
    ctx: &ChainContext<'_>,
    line: &mut SectionLine,
    zones: &mut Vec<TangentZone>,
    sp: StartPoint,
    prepend: bool,
) -> bool {
    if sp.edge1 == EdgeLocation::Vertex
        || sp.edge2 == EdgeLocation::Vertex
        || ctx.tangential_angle(sp.angle)
    {
        push_zone(ctx, zones, sp);
        return false;
    }
    if prepend {
        line.points.insert(0, sp);
    } else {
        line.points.push(sp);
    }
    true
}

/// The couple to continue into from `sp`, derived from its mesh-edge
/// records, plus the side couples to retire when the step is taken.
fn step_pair(
    ctx: &ChainContext<'_>,
    sp: &StartPoint,
) -> Option<((usize, usize), Vec<(usize, usize)>)> {
    match (sp.edge1, sp.edge2) {
        (EdgeLocation::Edge(e1), EdgeLocation::Interior) => {
            let nt1 = ctx.m1.edges[e1].other_triangle(sp.t1)?;
            Some(((nt1, sp.t2), Vec::new()))
        }
        (EdgeLocation::Interior, EdgeLocation::Edge(e2)) => {
            let nt2 = ctx.m2.edges[e2].other_triangle(sp.t2)?;
            Some(((sp.t1, nt2), Vec::new()))
        }
        (EdgeLocation::Edge(e1), EdgeLocation::Edge(e2)) => {
            // The point crosses edges of both meshes at once: the walk
            // continues diagonally, and the two side couples around the
            // crossing are part of the same link.
            let nt1 = ctx.m1.edges[e1].other_triangle(sp.t1)?;
            let nt2 = ctx.m2.edges[e2].other_triangle(sp.t2)?;
            Some(((nt1, nt2), vec![(nt1, sp.t2), (sp.t1, nt2)]))
        }
        _ => None,
    }
}

/// Look the pair up in the couple table; `None` when it does not exist or
/// was already consumed. Marks it analyzed.
fn take_couple(
    couples: &mut [Couple],
    index: &HashMap<(usize, usize), usize>,
    pair: (usize, usize),
) -> Option<f64> {
    let &i = index.get(&pair)?;
    if couples[i].analyzed {
        return None;
    }
    couples[i].analyzed = true;
    Some(couples[i].cos_angle)
}

fn mark_analyzed(
    couples: &mut [Couple],
    index: &HashMap<(usize, usize), usize>,
    pairs: &[(usize, usize)],
) {
    for pair in pairs {
        if let Some(&i) = index.get(pair) {
            couples[i].analyzed = true;
        }
    }
}

/// Grow `line` from `start` in one direction until no link remains.
///
/// `first_pair` overrides the first step's couple (used when seeding from
/// a single tangential-touch point, which continues per-surface rather
/// than diagonally).
#[allow(clippy::too_many_arguments)]
fn walk(
    ctx: &ChainContext<'_>,
    couples: &mut [Couple],
    index: &HashMap<(usize, usize), usize>,
    line: &mut SectionLine,
    zones: &mut Vec<TangentZone>,
    start: StartPoint,
    first_pair: Option<(usize, usize)>,
    prepend: bool,
) -> Result<()> {
    let mut sp = start;
    let mut pending = first_pair;
    loop {
        ctx.check_deadline()?;

        let (pair, sides) = match pending.take() {
            Some(p) => (p, Vec::new()),
            None => match step_pair(ctx, &sp) {
                Some(x) => x,
                None => break,
            },
        };
        let Some(cos) = take_couple(couples, index, pair) else {
            break;
        };

        let out = next_starting_points(ctx.m1, ctx.m2, pair.0, pair.1, &sp, &ctx.tol);
        if out.overflow {
            // Coplanar patch reached: its evidence is tangential.
            for mut p in out.points {
                p.angle = ctx.incidence_angle(&p, cos);
                push_zone(ctx, zones, p);
            }
            break;
        }
        let mut cands = out.points;
        let mut next = match cands.len() {
            0 => break,
            1 => cands.pop().unwrap(),
            _ => {
                // Mesh branching artifact: keep the nearest candidate and
                // tell the caller the line may fork here.
                line.possibly_branching = true;
                cands
                    .into_iter()
                    .min_by(|a, b| {
                        let da = (a.pos - sp.pos).norm_squared();
                        let db = (b.pos - sp.pos).norm_squared();
                        da.partial_cmp(&db).unwrap()
                    })
                    .unwrap()
            }
        };
        next.angle = ctx.incidence_angle(&next, cos);

        if (next.pos - sp.pos).norm() > ctx.proximity {
            break; // link would violate the chain proximity invariant
        }

        mark_analyzed(couples, index, &sides);
        if !emit(ctx, line, zones, next, prepend) {
            break;
        }
        sp = next;
    }
    Ok(())
}

fn finalize(ctx: &ChainContext<'_>, mut line: SectionLine, lines: &mut Vec<SectionLine>) {
    if line.points.is_empty() {
        return;
    }
    if line.points.len() >= 3 {
        let first = line.points.first().unwrap().pos;
        let last = line.points.last().unwrap().pos;
        line.closed = (first - last).norm() <= ctx.proximity;
    }
    lines.push(line);
}

/// Consume the couple table into section lines and tangent zones.
pub fn chain_start_points(
    ctx: &ChainContext<'_>,
    couples: &mut [Couple],
    lines: &mut Vec<SectionLine>,
    zones: &mut Vec<TangentZone>,
) -> Result<()> {
    let index: HashMap<(usize, usize), usize> = couples
        .iter()
        .enumerate()
        .map(|(i, c)| ((c.t1, c.t2), i))
        .collect();

    for i in 0..couples.len() {
        ctx.check_deadline()?;
        if couples[i].analyzed || !ctx.live(&couples[i]) {
            couples[i].analyzed = true;
            continue;
        }
        couples[i].analyzed = true;
        let (t1, t2, cos) = (couples[i].t1, couples[i].t2, couples[i].cos_angle);

        let mut out = starting_points(ctx.m1, ctx.m2, t1, t2, &ctx.tol);
        for p in &mut out.points {
            p.angle = ctx.incidence_angle(p, cos);
        }

        if ctx.tangential_cos(cos) || out.overflow {
            // Tangential or coplanar couple: its points are tangency
            // evidence, never part of a crossing line.
            for p in out.points {
                push_zone(ctx, zones, p);
            }
            continue;
        }

        match out.points.len() {
            0 => {}
            1 => {
                // Tangential touch or edge-on-edge contact: chain each
                // surface's side separately.
                let sp = out.points[0];
                let mut line = SectionLine::new();
                if emit(ctx, &mut line, zones, sp, false) {
                    if let EdgeLocation::Edge(e1) = sp.edge1 {
                        if let Some(nt1) = ctx.m1.edges[e1].other_triangle(sp.t1) {
                            walk(
                                ctx,
                                couples,
                                &index,
                                &mut line,
                                zones,
                                sp,
                                Some((nt1, sp.t2)),
                                false,
                            )?;
                        }
                    }
                    if let EdgeLocation::Edge(e2) = sp.edge2 {
                        if let Some(nt2) = ctx.m2.edges[e2].other_triangle(sp.t2) {
                            walk(
                                ctx,
                                couples,
                                &index,
                                &mut line,
                                zones,
                                sp,
                                Some((sp.t1, nt2)),
                                true,
                            )?;
                        }
                    }
                    // Retire the diagonal partner of an edge-edge touch:
                    // of the four couples around the junction it is the
                    // other touching-only one, and leaving it would
                    // re-seed this same point as a degenerate line.
                    if let (EdgeLocation::Edge(e1), EdgeLocation::Edge(e2)) = (sp.edge1, sp.edge2)
                    {
                        if let (Some(nt1), Some(nt2)) = (
                            ctx.m1.edges[e1].other_triangle(sp.t1),
                            ctx.m2.edges[e2].other_triangle(sp.t2),
                        ) {
                            mark_analyzed(couples, &index, &[(nt1, nt2)]);
                        }
                    }
                }
                finalize(ctx, line, lines);
            }
            _ => {
                let (sp1, sp2) = (out.points[0], out.points[1]);
                let mut line = SectionLine::new();
                if emit(ctx, &mut line, zones, sp1, false) {
                    walk(ctx, couples, &index, &mut line, zones, sp1, None, false)?;
                }
                if emit(ctx, &mut line, zones, sp2, true) {
                    walk(ctx, couples, &index, &mut line, zones, sp2, None, true)?;
                }
                finalize(ctx, line, lines);
            }
        }
    }

    debug!(
        "chained {} couples into {} lines, {} zones",
        couples.len(),
        lines.len(),
        zones.len()
    );
    Ok(())
}
