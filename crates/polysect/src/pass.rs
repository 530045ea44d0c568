//! One intersection pass: mesh both surfaces, filter couples across the
//! refinement iterations, intersect, and chain.

use std::collections::HashSet;
use std::time::Instant;

use log::debug;
use polysect_geom::Surface;

use crate::chain::{chain_start_points, ChainContext, SectionLine, TangentZone};
use crate::couple::{find_couples, live_couples, Couple};
use crate::error::{Error, Result};
use crate::mesh::{auto_sample_counts, mark_common_zone, SurfaceMesh};
use crate::IntersectionParams;

/// Which parametrization senses a pass meshes the surfaces with.
///
/// `Standard` is the natural forward/forward attempt; the four advanced
/// variants cover every forward/reversed combination to defeat
/// orientation-dependent sampling bias that can hide thin intersection
/// regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    /// Natural parametrization of both surfaces.
    Standard,
    /// Both surfaces forward (advanced re-run).
    ForwardForward,
    /// Surface 1 forward, surface 2 reversed.
    ForwardReversed,
    /// Surface 1 reversed, surface 2 forward.
    ReversedForward,
    /// Both surfaces reversed.
    ReversedReversed,
}

impl PassKind {
    /// The four advanced-pass variants, in merge order.
    pub const ADVANCED: [PassKind; 4] = [
        PassKind::ForwardForward,
        PassKind::ForwardReversed,
        PassKind::ReversedForward,
        PassKind::ReversedReversed,
    ];

    /// Parametrization senses `(surface 1 reversed, surface 2 reversed)`.
    pub fn senses(self) -> (bool, bool) {
        match self {
            PassKind::Standard | PassKind::ForwardForward => (false, false),
            PassKind::ForwardReversed => (false, true),
            PassKind::ReversedForward => (true, false),
            PassKind::ReversedReversed => (true, true),
        }
    }
}

/// What one pass produced.
#[derive(Debug, Clone)]
pub struct PassOutput {
    /// The variant that ran.
    pub kind: PassKind,
    /// True when both meshes were built successfully (the pass executed);
    /// false means a degenerate domain defeated it.
    pub executed: bool,
    /// Number of live couples after refinement.
    pub nb_couples: usize,
    /// Chained section lines.
    pub lines: Vec<SectionLine>,
    /// Tangent zones.
    pub zones: Vec<TangentZone>,
}

impl PassOutput {
    fn not_executed(kind: PassKind) -> Self {
        Self {
            kind,
            executed: false,
            nb_couples: 0,
            lines: Vec::new(),
            zones: Vec::new(),
        }
    }
}

fn check_deadline(deadline: Option<Instant>) -> Result<()> {
    if let Some(limit) = deadline {
        if Instant::now() > limit {
            return Err(Error::Cancelled);
        }
    }
    Ok(())
}

/// Largest bounding-box diagonal over the usable triangles of a mesh.
fn max_triangle_diagonal(mesh: &SurfaceMesh) -> f64 {
    mesh.triangles
        .iter()
        .filter(|t| t.alive && !t.degenerate)
        .map(|t| (t.aabb.max - t.aabb.min).norm())
        .fold(0.0, f64::max)
}

/// Run one pass over the two surfaces. The only error is cancellation;
/// every geometric dead end is reported through the output instead.
pub fn run_pass(
    kind: PassKind,
    s1: &dyn Surface,
    s2: &dyn Surface,
    params: &IntersectionParams,
) -> Result<PassOutput> {
    check_deadline(params.deadline)?;
    let (rev1, rev2) = kind.senses();

    let (auto_u1, auto_v1) = auto_sample_counts(s1);
    let (auto_u2, auto_v2) = auto_sample_counts(s2);
    let pick = |requested: usize, auto: usize| if requested == 0 { auto } else { requested };
    let nu1 = pick(params.nb_samples_u1, auto_u1);
    let nv1 = pick(params.nb_samples_v1, auto_v1);
    let nu2 = pick(params.nb_samples_u2, auto_u2);
    let nv2 = pick(params.nb_samples_v2, auto_v2);

    let mut m1 = SurfaceMesh::build(s1, nu1, nv1, rev1, &params.tolerance);
    let mut m2 = SurfaceMesh::build(s2, nu2, nv2, rev2, &params.tolerance);
    if m1.is_empty() || m2.is_empty() {
        debug!("{:?}: degenerate mesh, pass not executed", kind);
        return Ok(PassOutput::not_executed(kind));
    }

    let mut output = PassOutput {
        kind,
        executed: true,
        nb_couples: 0,
        lines: Vec::new(),
        zones: Vec::new(),
    };
    if !mark_common_zone(&mut m1, &mut m2) {
        debug!("{:?}: mesh boxes disjoint, no candidates", kind);
        return Ok(output);
    }

    // Filter candidates on the initial grids, then interleave filtering
    // with the refinement sweeps; the seen-set keeps every triangle pair
    // tested at most once per pass.
    let target1 = if params.deflection > 0.0 {
        params.deflection
    } else {
        m1.max_deflection * 0.5
    };
    let target2 = if params.deflection > 0.0 {
        params.deflection
    } else {
        m2.max_deflection * 0.5
    };

    let mut seen: HashSet<(usize, usize)> = HashSet::new();
    let mut couples: Vec<Couple> = Vec::new();
    for sweep in 0..=params.max_refine_sweeps {
        find_couples(&m1, &m2, &mut seen, &mut couples);
        if sweep == params.max_refine_sweeps {
            break;
        }
        let r1 = m1.refine_sweep(s1, target1, params.deadline, &params.tolerance)?;
        let r2 = m2.refine_sweep(s2, target2, params.deadline, &params.tolerance)?;
        if !r1 && !r2 {
            break;
        }
    }
    output.nb_couples = live_couples(&couples, &m1, &m2);
    debug!("{:?}: {} live couples", kind, output.nb_couples);
    if output.nb_couples == 0 {
        return Ok(output);
    }

    let proximity = 2.0 * max_triangle_diagonal(&m1).max(max_triangle_diagonal(&m2));
    let ctx = ChainContext {
        m1: &m1,
        m2: &m2,
        s1,
        s2,
        tol: params.tolerance,
        tangent_angle: params.tangent_angle,
        proximity,
        deadline: params.deadline,
    };
    chain_start_points(&ctx, &mut couples, &mut output.lines, &mut output.zones)?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use polysect_geom::{Plane, UvDomain};
    use polysect_math::{Point3, Vec3};

    #[test]
    fn test_standard_pass_two_planes() {
        let p1 = Plane::new(
            Point3::origin(),
            Vec3::x(),
            Vec3::y(),
            UvDomain::new(-10.0, 10.0, -10.0, 10.0),
        );
        let p2 = Plane::new(
            Point3::origin(),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::y(),
            UvDomain::new(-10.0, 10.0, -10.0, 10.0),
        );
        let params = IntersectionParams {
            nb_samples_u1: 12,
            nb_samples_v1: 12,
            nb_samples_u2: 12,
            nb_samples_v2: 12,
            ..IntersectionParams::default()
        };
        let out = run_pass(PassKind::Standard, &p1, &p2, &params).unwrap();
        assert!(out.executed);
        assert!(out.nb_couples > 10);
        assert_eq!(out.lines.len(), 1);
    }

    #[test]
    fn test_pass_degenerate_domain_not_executed() {
        let p1 = Plane::new(
            Point3::origin(),
            Vec3::x(),
            Vec3::y(),
            UvDomain::new(0.0, 0.0, 0.0, 1.0),
        );
        let p2 = Plane::new(
            Point3::origin(),
            Vec3::x(),
            Vec3::y(),
            UvDomain::new(0.0, 1.0, 0.0, 1.0),
        );
        let out = run_pass(PassKind::Standard, &p1, &p2, &IntersectionParams::default()).unwrap();
        assert!(!out.executed);
        assert_eq!(out.nb_couples, 0);
    }

    #[test]
    fn test_reversed_senses() {
        assert_eq!(PassKind::Standard.senses(), (false, false));
        assert_eq!(PassKind::ForwardReversed.senses(), (false, true));
        assert_eq!(PassKind::ReversedForward.senses(), (true, false));
        assert_eq!(PassKind::ReversedReversed.senses(), (true, true));
    }

    #[test]
    fn test_pass_cancelled() {
        let p1 = Plane::new(
            Point3::origin(),
            Vec3::x(),
            Vec3::y(),
            UvDomain::new(-1.0, 1.0, -1.0, 1.0),
        );
        let params = IntersectionParams {
            deadline: Some(Instant::now() - std::time::Duration::from_millis(1)),
            ..IntersectionParams::default()
        };
        let err = run_pass(PassKind::Standard, &p1, &p1, &params);
        assert!(matches!(err, Err(Error::Cancelled)));
    }
}
