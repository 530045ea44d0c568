#![warn(missing_docs)]

//! Polyhedral surface/surface intersection.
//!
//! Given two parametric surfaces (anything implementing
//! [`polysect_geom::Surface`]), the engine approximates each with an
//! adaptively refined triangular mesh, intersects the two meshes
//! triangle-by-triangle, and reassembles the scattered intersection
//! samples into continuous section lines plus tangent zones. This is the
//! robust fallback CAD kernels reach for when direct analytic or
//! NURBS-NURBS intersection is numerically fragile.
//!
//! ```
//! use polysect::SurfaceIntersection;
//! use polysect_geom::{Plane, UvDomain};
//! use polysect_math::{Point3, Vec3};
//!
//! let bounds = UvDomain::new(-10.0, 10.0, -10.0, 10.0);
//! let floor = Plane::new(Point3::origin(), Vec3::x(), Vec3::y(), bounds);
//! let tilted = Plane::new(Point3::origin(), Vec3::new(1.0, 0.0, 1.0), Vec3::y(), bounds);
//!
//! let mut ix = SurfaceIntersection::with_defaults(&floor, &tilted).unwrap();
//! ix.perform();
//! assert!(ix.is_done());
//! ```
//!
//! The orchestrator first runs a *standard* pass with the natural
//! parametrization of both surfaces. When that yields too few candidate
//! triangle pairs, it falls back to an *advanced* pass meshing with all
//! four forward/reversed parametrization-sense combinations; every
//! variant that yields couples contributes to the final result.

pub mod bbox;
pub mod chain;
pub mod couple;
pub mod error;
pub mod intersect;
pub mod mesh;
pub mod pass;

use std::time::Instant;

use log::debug;
use polysect_geom::Surface;
use polysect_math::Tolerance;
use rayon::prelude::*;

pub use chain::{SectionLine, TangentZone};
pub use error::{Error, Result};
pub use intersect::{EdgeLocation, StartPoint};
pub use pass::{PassKind, PassOutput};

use pass::run_pass;

/// Tunable parameters of one intersection.
///
/// The defaults are right for well-scaled models; a zero sample count or
/// deflection means "derive it from the surface".
#[derive(Debug, Clone, Copy)]
pub struct IntersectionParams {
    /// Tolerance model shared by every stage.
    pub tolerance: Tolerance,
    /// Chordal deflection target for mesh refinement; 0 derives the
    /// target from the initial grid.
    pub deflection: f64,
    /// Requested u samples on surface 1; 0 auto-computes from bending.
    pub nb_samples_u1: usize,
    /// Requested v samples on surface 1; 0 auto-computes.
    pub nb_samples_v1: usize,
    /// Requested u samples on surface 2; 0 auto-computes.
    pub nb_samples_u2: usize,
    /// Requested v samples on surface 2; 0 auto-computes.
    pub nb_samples_v2: usize,
    /// Couple count above which the standard pass is accepted without
    /// running the advanced fallback.
    pub min_couples: usize,
    /// Bound on mesh refinement sweeps per pass.
    pub max_refine_sweeps: usize,
    /// Incidence angles within this band of 0 or π (radians) classify a
    /// point as tangential.
    pub tangent_angle: f64,
    /// Cooperative cancellation deadline; expiry aborts `perform` with
    /// `is_done() == false`.
    pub deadline: Option<Instant>,
}

impl Default for IntersectionParams {
    fn default() -> Self {
        Self {
            tolerance: Tolerance::DEFAULT,
            deflection: 0.0,
            nb_samples_u1: 0,
            nb_samples_v1: 0,
            nb_samples_u2: 0,
            nb_samples_v2: 0,
            min_couples: 10,
            max_refine_sweeps: 5,
            tangent_angle: 0.01,
            deadline: None,
        }
    }
}

/// The outcome of one intersection: section lines, tangent zones, and
/// whether any pass executed successfully.
///
/// `done == true` with zero section lines is a valid outcome (the
/// surfaces simply do not intersect within tolerance); `done == false`
/// means no pass could run at all and the caller should fall back to a
/// different intersection method.
#[derive(Debug, Clone, Default)]
pub struct IntersectionResult {
    /// The chained intersection branches.
    pub section_lines: Vec<SectionLine>,
    /// Regions of pure tangency.
    pub tangent_zones: Vec<TangentZone>,
    /// True when at least one pass executed successfully.
    pub done: bool,
}

/// Orchestrates the standard pass, the advanced fallback, and the result
/// accumulation for one pair of surfaces.
///
/// Built empty, populated exactly once by [`perform`](Self::perform),
/// read-only afterwards. The query accessors use the traditional 1-based
/// indices and are range-checked: out-of-range access is an explicit
/// error, never a clamp.
pub struct SurfaceIntersection<'a> {
    surface1: &'a dyn Surface,
    surface2: &'a dyn Surface,
    params: IntersectionParams,
    result: IntersectionResult,
    performed: bool,
}

impl<'a> SurfaceIntersection<'a> {
    /// Set up an intersection between two surfaces.
    ///
    /// Fails with [`Error::DegenerateSurface`] when either surface's
    /// parametric domain has no area; such input can never be meshed.
    pub fn new(
        surface1: &'a dyn Surface,
        surface2: &'a dyn Surface,
        params: IntersectionParams,
    ) -> Result<Self> {
        if surface1.domain().is_degenerate() {
            return Err(Error::DegenerateSurface(1));
        }
        if surface2.domain().is_degenerate() {
            return Err(Error::DegenerateSurface(2));
        }
        Ok(Self {
            surface1,
            surface2,
            params,
            result: IntersectionResult::default(),
            performed: false,
        })
    }

    /// [`new`](Self::new) with default parameters.
    pub fn with_defaults(surface1: &'a dyn Surface, surface2: &'a dyn Surface) -> Result<Self> {
        Self::new(surface1, surface2, IntersectionParams::default())
    }

    /// Run the intersection.
    ///
    /// Failure (no pass executed, or the deadline expired) is reported
    /// solely through [`is_done`](Self::is_done); "no intersection found"
    /// is a successful outcome with zero section lines.
    pub fn perform(&mut self) {
        self.performed = true;
        self.result = IntersectionResult::default();

        let std_out = match run_pass(PassKind::Standard, self.surface1, self.surface2, &self.params)
        {
            Ok(out) => out,
            Err(_) => return, // cancelled: done stays false
        };

        if std_out.executed && std_out.nb_couples > self.params.min_couples {
            debug!(
                "standard pass accepted with {} couples, {} lines",
                std_out.nb_couples,
                std_out.lines.len()
            );
            self.result.section_lines = std_out.lines;
            self.result.tangent_zones = std_out.zones;
            self.result.done = true;
            return;
        }

        debug!(
            "standard pass yielded {} couples, running advanced variants",
            std_out.nb_couples
        );
        // The four variants are mutually independent; the merge below is
        // single-writer, after the join, in fixed variant order.
        let advanced: Vec<Result<PassOutput>> = PassKind::ADVANCED
            .par_iter()
            .map(|kind| run_pass(*kind, self.surface1, self.surface2, &self.params))
            .collect();
        if advanced.iter().any(|r| r.is_err()) {
            return; // cancelled mid-fallback
        }

        let mut executed = std_out.executed;
        let mut contributed = false;
        let mut lines = Vec::new();
        let mut zones = Vec::new();
        for out in advanced.into_iter().map(|r| r.expect("checked above")) {
            executed |= out.executed;
            if out.nb_couples > 0 {
                contributed = true;
                lines.extend(out.lines);
                zones.extend(out.zones);
            }
        }

        if contributed {
            self.result.section_lines = lines;
            self.result.tangent_zones = zones;
        } else if std_out.nb_couples > 0 {
            // Fall back to the sparse standard result.
            self.result.section_lines = std_out.lines;
            self.result.tangent_zones = std_out.zones;
        }
        self.result.done = executed;
    }

    /// True when at least one pass executed successfully.
    pub fn is_done(&self) -> bool {
        self.performed && self.result.done
    }

    /// The accumulated result. Empty (with `done == false`) until
    /// [`perform`](Self::perform) has run.
    pub fn result(&self) -> &IntersectionResult {
        &self.result
    }

    /// The section lines found.
    pub fn section_lines(&self) -> &[SectionLine] {
        &self.result.section_lines
    }

    /// The tangent zones found.
    pub fn tangent_zones(&self) -> &[TangentZone] {
        &self.result.tangent_zones
    }

    /// Number of section lines.
    pub fn nb_section_lines(&self) -> usize {
        self.result.section_lines.len()
    }

    /// Number of tangent zones.
    pub fn nb_tangent_zones(&self) -> usize {
        self.result.tangent_zones.len()
    }

    fn ensure_done(&self) -> Result<&IntersectionResult> {
        if self.is_done() {
            Ok(&self.result)
        } else {
            Err(Error::NotPerformed)
        }
    }

    /// Number of points in the 1-based `line`.
    pub fn nb_points_in_line(&self, line: usize) -> Result<usize> {
        Ok(self.line(line)?.nb_points())
    }

    /// The 1-based `point` of the 1-based `line`.
    pub fn line_point(&self, line: usize, point: usize) -> Result<&StartPoint> {
        let l = self.line(line)?;
        let count = l.nb_points();
        if point == 0 || point > count {
            return Err(Error::PointIndexOutOfRange {
                index: point,
                count,
            });
        }
        Ok(&l.points[point - 1])
    }

    /// Number of points in the 1-based tangent `zone`.
    pub fn nb_points_in_zone(&self, zone: usize) -> Result<usize> {
        Ok(self.zone(zone)?.nb_points())
    }

    /// The 1-based `point` of the 1-based tangent `zone`.
    pub fn tangent_zone_point(&self, zone: usize, point: usize) -> Result<&StartPoint> {
        let z = self.zone(zone)?;
        let count = z.nb_points();
        if point == 0 || point > count {
            return Err(Error::PointIndexOutOfRange {
                index: point,
                count,
            });
        }
        Ok(&z.points[point - 1])
    }

    fn line(&self, line: usize) -> Result<&SectionLine> {
        let result = self.ensure_done()?;
        let count = result.section_lines.len();
        if line == 0 || line > count {
            return Err(Error::LineIndexOutOfRange { index: line, count });
        }
        Ok(&result.section_lines[line - 1])
    }

    fn zone(&self, zone: usize) -> Result<&TangentZone> {
        let result = self.ensure_done()?;
        let count = result.tangent_zones.len();
        if zone == 0 || zone > count {
            return Err(Error::ZoneIndexOutOfRange { index: zone, count });
        }
        Ok(&result.tangent_zones[zone - 1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polysect_geom::{Plane, SphereSurface, UvDomain};
    use polysect_math::{Point3, Vec3};

    fn plane_z0() -> Plane {
        Plane::new(
            Point3::origin(),
            Vec3::x(),
            Vec3::y(),
            UvDomain::new(-10.0, 10.0, -10.0, 10.0),
        )
    }

    fn plane_zx() -> Plane {
        Plane::new(
            Point3::origin(),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::y(),
            UvDomain::new(-10.0, 10.0, -10.0, 10.0),
        )
    }

    fn params_12() -> IntersectionParams {
        IntersectionParams {
            nb_samples_u1: 12,
            nb_samples_v1: 12,
            nb_samples_u2: 12,
            nb_samples_v2: 12,
            ..IntersectionParams::default()
        }
    }

    #[test]
    fn test_two_planes_single_line() {
        let p1 = plane_z0();
        let p2 = plane_zx();
        let mut ix = SurfaceIntersection::new(&p1, &p2, params_12()).unwrap();
        ix.perform();

        assert!(ix.is_done());
        assert_eq!(ix.nb_section_lines(), 1);
        let n = ix.nb_points_in_line(1).unwrap();
        assert!(n >= 2);

        // Every reported point lies on the line x = 0, z = 0.
        for k in 1..=n {
            let sp = ix.line_point(1, k).unwrap();
            assert!(sp.pos.x.abs() < 1e-6, "x off-line: {}", sp.pos.x);
            assert!(sp.pos.z.abs() < 1e-6, "z off-line: {}", sp.pos.z);
        }
        // The extreme points reach (0, ±10, 0).
        let first = ix.line_point(1, 1).unwrap().pos;
        let last = ix.line_point(1, n).unwrap().pos;
        let lo = first.y.min(last.y);
        let hi = first.y.max(last.y);
        assert!((lo + 10.0).abs() < 1e-6);
        assert!((hi - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_self_identity_only_tangent_zones() {
        let s1 = SphereSurface::new(7.0);
        let s2 = SphereSurface::new(7.0);
        let params = IntersectionParams {
            nb_samples_u1: 13,
            nb_samples_v1: 9,
            nb_samples_u2: 13,
            nb_samples_v2: 9,
            ..IntersectionParams::default()
        };
        let mut ix = SurfaceIntersection::new(&s1, &s2, params).unwrap();
        ix.perform();

        assert!(ix.is_done());
        assert_eq!(ix.nb_section_lines(), 0);
        assert!(ix.nb_tangent_zones() > 0);
    }

    #[test]
    fn test_disjoint_spheres_empty_result() {
        let s1 = SphereSurface::new(5.0);
        let s2 = SphereSurface::with_center(Point3::new(100.0, 0.0, 0.0), 5.0);
        let mut ix = SurfaceIntersection::with_defaults(&s1, &s2).unwrap();
        ix.perform();

        assert!(ix.is_done());
        assert_eq!(ix.nb_section_lines(), 0);
        assert_eq!(ix.nb_tangent_zones(), 0);
    }

    #[test]
    fn test_internally_tangent_spheres() {
        // |centers| = R1 - R2: internal tangency at (10, 0, 0), which both
        // parameterizations sample exactly (u = 0, v = 0).
        let s1 = SphereSurface::new(10.0);
        let s2 = SphereSurface::with_center(Point3::new(5.0, 0.0, 0.0), 5.0);
        let params = IntersectionParams {
            nb_samples_u1: 17,
            nb_samples_v1: 15,
            nb_samples_u2: 17,
            nb_samples_v2: 15,
            ..IntersectionParams::default()
        };
        let mut ix = SurfaceIntersection::new(&s1, &s2, params).unwrap();
        ix.perform();

        assert!(ix.is_done());
        let tangency = Point3::new(10.0, 0.0, 0.0);

        // Everything reported concentrates at the tangency.
        let mut features = 0;
        for line in ix.section_lines() {
            for sp in &line.points {
                assert!((sp.pos - tangency).norm() < 3.0);
                features += 1;
            }
        }
        for zone in ix.tangent_zones() {
            for sp in &zone.points {
                assert!((sp.pos - tangency).norm() < 3.0);
                features += 1;
            }
        }
        assert!(features > 0);

        // The tangency point itself is reported exactly: it is a shared
        // mesh vertex of both grids.
        let exact = ix
            .tangent_zones()
            .iter()
            .flat_map(|z| z.points.iter())
            .any(|sp| (sp.pos - tangency).norm() < 1e-9);
        assert!(exact);
    }

    #[test]
    fn test_plane_sphere_circle_round_trip() {
        use polysect_geom::Surface;

        let plane = Plane::new(
            Point3::origin(),
            Vec3::x(),
            Vec3::y(),
            UvDomain::new(-15.0, 15.0, -15.0, 15.0),
        );
        // Slightly lifted so the intersection circle stays clear of the
        // sphere's equator grid line.
        let sphere = SphereSurface::with_center(Point3::new(0.0, 0.0, 0.5), 10.0);
        let mut ix = SurfaceIntersection::with_defaults(&plane, &sphere).unwrap();
        ix.perform();

        assert!(ix.is_done());
        assert!(ix.nb_section_lines() >= 1);

        let longest = ix
            .section_lines()
            .iter()
            .max_by_key(|l| l.nb_points())
            .unwrap();
        assert!(longest.nb_points() > 20);
        assert!(longest.closed);

        let radius = (100.0f64 - 0.25).sqrt();
        for line in ix.section_lines() {
            for sp in &line.points {
                // On the intersection circle, within mesh-chord tolerance.
                assert!(sp.pos.z.abs() < 0.6);
                assert!((sp.pos.x.hypot(sp.pos.y) - radius).abs() < 0.6);
                // Round-trip through both parameterizations.
                assert!((plane.value(sp.u1, sp.v1) - sp.pos).norm() < 0.6);
                assert!((sphere.value(sp.u2, sp.v2) - sp.pos).norm() < 0.6);
            }
        }
    }

    #[test]
    fn test_determinism() {
        let run = || {
            let plane = Plane::new(
                Point3::origin(),
                Vec3::x(),
                Vec3::y(),
                UvDomain::new(-15.0, 15.0, -15.0, 15.0),
            );
            let sphere = SphereSurface::with_center(Point3::new(0.0, 0.0, 0.5), 10.0);
            let mut ix = SurfaceIntersection::with_defaults(&plane, &sphere).unwrap();
            ix.perform();
            let mut coords = Vec::new();
            for line in ix.section_lines() {
                for sp in &line.points {
                    coords.push((sp.pos, sp.u1, sp.v1, sp.u2, sp.v2));
                }
            }
            (ix.nb_section_lines(), ix.nb_tangent_zones(), coords)
        };
        let (l1, z1, c1) = run();
        let (l2, z2, c2) = run();
        assert_eq!(l1, l2);
        assert_eq!(z1, z2);
        assert_eq!(c1.len(), c2.len());
        for (a, b) in c1.iter().zip(c2.iter()) {
            assert_eq!(a.0, b.0);
            assert_eq!(a.1, b.1);
        }
    }

    #[test]
    fn test_advanced_pass_on_sparse_sampling() {
        // Single-cell grids keep the standard pass under the couple
        // threshold, forcing the four-variant fallback.
        let p1 = plane_z0();
        let p2 = plane_zx();
        let params = IntersectionParams {
            nb_samples_u1: 2,
            nb_samples_v1: 2,
            nb_samples_u2: 2,
            nb_samples_v2: 2,
            ..IntersectionParams::default()
        };
        let mut ix = SurfaceIntersection::new(&p1, &p2, params).unwrap();
        ix.perform();

        assert!(ix.is_done());
        assert!(ix.nb_section_lines() >= 1);
        for line in ix.section_lines() {
            for sp in &line.points {
                assert!(sp.pos.x.abs() < 1e-6);
                assert!(sp.pos.z.abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_degenerate_surface_rejected_at_construction() {
        let p1 = plane_z0();
        let degenerate = Plane::new(
            Point3::origin(),
            Vec3::x(),
            Vec3::y(),
            UvDomain::new(0.0, 0.0, 0.0, 1.0),
        );
        let err = SurfaceIntersection::with_defaults(&p1, &degenerate);
        assert!(matches!(err, Err(Error::DegenerateSurface(2))));
    }

    #[test]
    fn test_algorithmic_failure_with_unusable_sampling() {
        // A one-sample grid cannot be meshed: every pass fails and the
        // whole perform reports not-done.
        let p1 = plane_z0();
        let p2 = plane_zx();
        let params = IntersectionParams {
            nb_samples_u1: 1,
            nb_samples_v1: 1,
            ..IntersectionParams::default()
        };
        let mut ix = SurfaceIntersection::new(&p1, &p2, params).unwrap();
        ix.perform();
        assert!(!ix.is_done());
    }

    #[test]
    fn test_bounds_checking() {
        let p1 = plane_z0();
        let p2 = plane_zx();
        let mut ix = SurfaceIntersection::new(&p1, &p2, params_12()).unwrap();

        // Queries before perform are explicit errors.
        assert_eq!(ix.nb_points_in_line(1), Err(Error::NotPerformed));

        ix.perform();
        assert!(ix.is_done());
        assert_eq!(ix.nb_section_lines(), 1);
        let n = ix.nb_points_in_line(1).unwrap();

        assert!(matches!(
            ix.nb_points_in_line(0),
            Err(Error::LineIndexOutOfRange { index: 0, .. })
        ));
        assert!(matches!(
            ix.nb_points_in_line(2),
            Err(Error::LineIndexOutOfRange { index: 2, .. })
        ));
        assert!(matches!(
            ix.line_point(1, 0),
            Err(Error::PointIndexOutOfRange { index: 0, .. })
        ));
        assert!(matches!(
            ix.line_point(1, n + 1),
            Err(Error::PointIndexOutOfRange { .. })
        ));
        assert!(matches!(
            ix.tangent_zone_point(1, 1),
            Err(Error::ZoneIndexOutOfRange { index: 1, .. })
        ));
    }

    #[test]
    fn test_cancellation_reports_not_done() {
        let p1 = plane_z0();
        let p2 = plane_zx();
        let params = IntersectionParams {
            deadline: Some(Instant::now() - std::time::Duration::from_millis(1)),
            ..params_12()
        };
        let mut ix = SurfaceIntersection::new(&p1, &p2, params).unwrap();
        ix.perform();
        assert!(!ix.is_done());
    }
}
