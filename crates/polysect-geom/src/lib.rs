#![warn(missing_docs)]

//! Parametric surface contract for the polysect intersection engine.
//!
//! The engine consumes surfaces only through the [`Surface`] capability
//! trait: parametric bounds plus point evaluation, with first derivatives
//! for normal estimation. Concrete analytic implementations for the common
//! CAD surface families (plane, sphere, cylinder, torus, bilinear patch)
//! are provided for tests and for consumers that do not bring their own
//! surface representation.

use std::f64::consts::PI;
use std::fmt;

use polysect_math::{Dir3, Point3, Vec3};

// =============================================================================
// Parametric domain
// =============================================================================

/// The rectangular parametric domain of a surface.
///
/// Immutable once constructed. A domain with (numerically) zero area is
/// *degenerate*: meshing it produces an empty mesh, which the intersection
/// orchestrator treats as pass failure rather than a crash.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UvDomain {
    /// Lower bound of the u parameter.
    pub u_min: f64,
    /// Upper bound of the u parameter.
    pub u_max: f64,
    /// Lower bound of the v parameter.
    pub v_min: f64,
    /// Upper bound of the v parameter.
    pub v_max: f64,
}

impl UvDomain {
    /// Create a domain from its bounds.
    pub fn new(u_min: f64, u_max: f64, v_min: f64, v_max: f64) -> Self {
        Self {
            u_min,
            u_max,
            v_min,
            v_max,
        }
    }

    /// Extent along u.
    pub fn span_u(&self) -> f64 {
        self.u_max - self.u_min
    }

    /// Extent along v.
    pub fn span_v(&self) -> f64 {
        self.v_max - self.v_min
    }

    /// True if the domain has no usable area (collapsed or inverted in
    /// either direction, or non-finite bounds).
    pub fn is_degenerate(&self) -> bool {
        const EPS: f64 = 1e-12;
        !(self.u_min.is_finite()
            && self.u_max.is_finite()
            && self.v_min.is_finite()
            && self.v_max.is_finite())
            || self.span_u() < EPS
            || self.span_v() < EPS
    }
}

// =============================================================================
// Surface trait
// =============================================================================

/// A parametric surface in 3D space.
///
/// This is the full contract the intersection engine needs: bounds, point
/// evaluation, and first derivatives. The default [`Surface::normal`]
/// derives the normal from the cross product of the partials and reports
/// `None` where the parameterization is singular (poles, collapsed edges).
pub trait Surface: Send + Sync + fmt::Debug {
    /// Evaluate the surface at `(u, v)` to get a 3D point.
    fn value(&self, u: f64, v: f64) -> Point3;

    /// Partial derivative with respect to u at `(u, v)`.
    fn d_du(&self, u: f64, v: f64) -> Vec3;

    /// Partial derivative with respect to v at `(u, v)`.
    fn d_dv(&self, u: f64, v: f64) -> Vec3;

    /// Parameter domain of the surface.
    fn domain(&self) -> UvDomain;

    /// Unit surface normal at `(u, v)`, or `None` at parameterization
    /// singularities.
    fn normal(&self, u: f64, v: f64) -> Option<Dir3> {
        let n = self.d_du(u, v).cross(&self.d_dv(u, v));
        if n.norm_squared() < 1e-24 {
            None
        } else {
            Some(Dir3::new_normalize(n))
        }
    }
}

// =============================================================================
// Plane
// =============================================================================

/// A bounded planar patch defined by an origin point and a coordinate frame.
///
/// Parameterization: `P(u, v) = origin + u * x_dir + v * y_dir`
#[derive(Debug, Clone)]
pub struct Plane {
    /// Origin point on the plane.
    pub origin: Point3,
    /// Unit vector along the u direction.
    pub x_dir: Dir3,
    /// Unit vector along the v direction.
    pub y_dir: Dir3,
    /// Unit normal (x_dir × y_dir).
    pub normal_dir: Dir3,
    /// Parametric bounds of the patch.
    pub bounds: UvDomain,
}

impl Plane {
    /// Create a plane patch from origin, two spanning directions, and
    /// parametric bounds. The directions do not need to be normalized.
    pub fn new(origin: Point3, x_dir: Vec3, y_dir: Vec3, bounds: UvDomain) -> Self {
        let x = Dir3::new_normalize(x_dir);
        let y = Dir3::new_normalize(y_dir);
        let n = Dir3::new_normalize(x_dir.cross(&y_dir));
        Self {
            origin,
            x_dir: x,
            y_dir: y,
            normal_dir: n,
            bounds,
        }
    }

    /// XY plane at the origin over the given square half-extent.
    pub fn xy(half_extent: f64) -> Self {
        Self::new(
            Point3::origin(),
            Vec3::x(),
            Vec3::y(),
            UvDomain::new(-half_extent, half_extent, -half_extent, half_extent),
        )
    }

    /// Signed distance from a point to this plane.
    pub fn signed_distance(&self, p: &Point3) -> f64 {
        (p - self.origin).dot(self.normal_dir.as_ref())
    }
}

impl Surface for Plane {
    fn value(&self, u: f64, v: f64) -> Point3 {
        self.origin + u * self.x_dir.as_ref() + v * self.y_dir.as_ref()
    }

    fn d_du(&self, _u: f64, _v: f64) -> Vec3 {
        *self.x_dir.as_ref()
    }

    fn d_dv(&self, _u: f64, _v: f64) -> Vec3 {
        *self.y_dir.as_ref()
    }

    fn domain(&self) -> UvDomain {
        self.bounds
    }

    fn normal(&self, _u: f64, _v: f64) -> Option<Dir3> {
        Some(self.normal_dir)
    }
}

// =============================================================================
// Sphere
// =============================================================================

/// A spherical surface defined by center and radius.
///
/// Parameterization: `P(u, v) = center + radius * (cos(v) * (cos(u) * x + sin(u) * y) + sin(v) * z)`
///
/// Where `u ∈ [0, 2π]` is longitude and `v ∈ [-π/2, π/2]` is latitude.
/// The parameterization is singular at the poles `v = ±π/2`.
#[derive(Debug, Clone)]
pub struct SphereSurface {
    /// Center of the sphere.
    pub center: Point3,
    /// Radius of the sphere.
    pub radius: f64,
    /// Reference direction for u=0 (perpendicular to axis).
    pub ref_dir: Dir3,
    /// Axis direction (north pole).
    pub axis: Dir3,
}

impl SphereSurface {
    /// Create a sphere centered at origin with the given radius.
    pub fn new(radius: f64) -> Self {
        Self {
            center: Point3::origin(),
            radius,
            ref_dir: Dir3::new_normalize(Vec3::x()),
            axis: Dir3::new_normalize(Vec3::z()),
        }
    }

    /// Create a sphere with a custom center.
    pub fn with_center(center: Point3, radius: f64) -> Self {
        Self {
            center,
            radius,
            ref_dir: Dir3::new_normalize(Vec3::x()),
            axis: Dir3::new_normalize(Vec3::z()),
        }
    }

    fn y_dir(&self) -> Vec3 {
        self.axis.as_ref().cross(self.ref_dir.as_ref())
    }
}

impl Surface for SphereSurface {
    fn value(&self, u: f64, v: f64) -> Point3 {
        let (sin_u, cos_u) = u.sin_cos();
        let (sin_v, cos_v) = v.sin_cos();
        self.center
            + self.radius
                * (cos_v * (cos_u * self.ref_dir.as_ref() + sin_u * self.y_dir())
                    + sin_v * self.axis.as_ref())
    }

    fn d_du(&self, u: f64, v: f64) -> Vec3 {
        let (sin_u, cos_u) = u.sin_cos();
        let cos_v = v.cos();
        self.radius * cos_v * (-sin_u * self.ref_dir.as_ref() + cos_u * self.y_dir())
    }

    fn d_dv(&self, u: f64, v: f64) -> Vec3 {
        let (sin_u, cos_u) = u.sin_cos();
        let (sin_v, cos_v) = v.sin_cos();
        self.radius
            * (-sin_v * (cos_u * self.ref_dir.as_ref() + sin_u * self.y_dir())
                + cos_v * self.axis.as_ref())
    }

    fn domain(&self) -> UvDomain {
        UvDomain::new(0.0, 2.0 * PI, -PI / 2.0, PI / 2.0)
    }

    fn normal(&self, u: f64, v: f64) -> Option<Dir3> {
        let (sin_u, cos_u) = u.sin_cos();
        let (sin_v, cos_v) = v.sin_cos();
        Some(Dir3::new_normalize(
            cos_v * (cos_u * self.ref_dir.as_ref() + sin_u * self.y_dir())
                + sin_v * self.axis.as_ref(),
        ))
    }
}

// =============================================================================
// Cylinder
// =============================================================================

/// A bounded cylindrical surface defined by an axis line, radius, and
/// a height range along the axis.
///
/// Parameterization: `P(u, v) = center + radius * (cos(u) * x_dir + sin(u) * y_dir) + v * axis`
///
/// Where `u ∈ [0, 2π]` is the angular parameter and `v ∈ [v_min, v_max]`
/// is the height along the axis.
#[derive(Debug, Clone)]
pub struct CylinderSurface {
    /// Center point at the base of the cylinder axis.
    pub center: Point3,
    /// Unit direction along the cylinder axis.
    pub axis: Dir3,
    /// Reference direction for u=0 (perpendicular to axis).
    pub ref_dir: Dir3,
    /// Radius of the cylinder.
    pub radius: f64,
    /// Lower height bound along the axis.
    pub v_min: f64,
    /// Upper height bound along the axis.
    pub v_max: f64,
}

impl CylinderSurface {
    /// Create a cylinder with axis along Z, centered at origin, spanning
    /// the given height range.
    pub fn new(radius: f64, v_min: f64, v_max: f64) -> Self {
        Self {
            center: Point3::origin(),
            axis: Dir3::new_normalize(Vec3::z()),
            ref_dir: Dir3::new_normalize(Vec3::x()),
            radius,
            v_min,
            v_max,
        }
    }

    fn y_dir(&self) -> Vec3 {
        self.axis.as_ref().cross(self.ref_dir.as_ref())
    }
}

impl Surface for CylinderSurface {
    fn value(&self, u: f64, v: f64) -> Point3 {
        let (sin_u, cos_u) = u.sin_cos();
        self.center
            + self.radius * (cos_u * self.ref_dir.as_ref() + sin_u * self.y_dir())
            + v * self.axis.as_ref()
    }

    fn d_du(&self, u: f64, _v: f64) -> Vec3 {
        let (sin_u, cos_u) = u.sin_cos();
        self.radius * (-sin_u * self.ref_dir.as_ref() + cos_u * self.y_dir())
    }

    fn d_dv(&self, _u: f64, _v: f64) -> Vec3 {
        *self.axis.as_ref()
    }

    fn domain(&self) -> UvDomain {
        UvDomain::new(0.0, 2.0 * PI, self.v_min, self.v_max)
    }

    fn normal(&self, u: f64, _v: f64) -> Option<Dir3> {
        let (sin_u, cos_u) = u.sin_cos();
        Some(Dir3::new_normalize(
            cos_u * self.ref_dir.as_ref() + sin_u * self.y_dir(),
        ))
    }
}

// =============================================================================
// Torus
// =============================================================================

/// A toroidal surface defined by center, axis, and two radii.
///
/// Parameterization:
/// ```text
/// P(u, v) = center + (R + r·cos(v))·(cos(u)·ref_dir + sin(u)·y_dir) + r·sin(v)·axis
/// ```
///
/// Where `R` is the major radius, `r` the minor radius, `u ∈ [0, 2π]` the
/// toroidal angle and `v ∈ [0, 2π]` the poloidal angle.
#[derive(Debug, Clone)]
pub struct TorusSurface {
    /// Center of the torus.
    pub center: Point3,
    /// Unit direction of the torus axis.
    pub axis: Dir3,
    /// Reference direction for u=0 (perpendicular to axis).
    pub ref_dir: Dir3,
    /// Major radius: distance from center to tube center.
    pub major_radius: f64,
    /// Minor radius: radius of the tube.
    pub minor_radius: f64,
}

impl TorusSurface {
    /// Create a torus centered at origin with axis along Z.
    pub fn new(major_radius: f64, minor_radius: f64) -> Self {
        Self {
            center: Point3::origin(),
            axis: Dir3::new_normalize(Vec3::z()),
            ref_dir: Dir3::new_normalize(Vec3::x()),
            major_radius,
            minor_radius,
        }
    }

    fn y_dir(&self) -> Vec3 {
        self.axis.as_ref().cross(self.ref_dir.as_ref())
    }
}

impl Surface for TorusSurface {
    fn value(&self, u: f64, v: f64) -> Point3 {
        let (sin_u, cos_u) = u.sin_cos();
        let (sin_v, cos_v) = v.sin_cos();
        let tube_center_dir = cos_u * self.ref_dir.as_ref() + sin_u * self.y_dir();
        self.center
            + (self.major_radius + self.minor_radius * cos_v) * tube_center_dir
            + self.minor_radius * sin_v * self.axis.as_ref()
    }

    fn d_du(&self, u: f64, v: f64) -> Vec3 {
        let (sin_u, cos_u) = u.sin_cos();
        let cos_v = v.cos();
        let d_tube_center_dir = -sin_u * self.ref_dir.as_ref() + cos_u * self.y_dir();
        (self.major_radius + self.minor_radius * cos_v) * d_tube_center_dir
    }

    fn d_dv(&self, u: f64, v: f64) -> Vec3 {
        let (sin_u, cos_u) = u.sin_cos();
        let (sin_v, cos_v) = v.sin_cos();
        let tube_center_dir = cos_u * self.ref_dir.as_ref() + sin_u * self.y_dir();
        -self.minor_radius * sin_v * tube_center_dir
            + self.minor_radius * cos_v * self.axis.as_ref()
    }

    fn domain(&self) -> UvDomain {
        UvDomain::new(0.0, 2.0 * PI, 0.0, 2.0 * PI)
    }

    fn normal(&self, u: f64, v: f64) -> Option<Dir3> {
        let (sin_u, cos_u) = u.sin_cos();
        let (sin_v, cos_v) = v.sin_cos();
        let tube_center_dir = cos_u * self.ref_dir.as_ref() + sin_u * self.y_dir();
        Some(Dir3::new_normalize(
            cos_v * tube_center_dir + sin_v * self.axis.as_ref(),
        ))
    }
}

// =============================================================================
// BilinearSurface
// =============================================================================

/// A bilinear patch defined by four corner points.
///
/// Parameterization:
/// ```text
/// P(u, v) = (1-u)(1-v)*p00 + u*(1-v)*p10 + (1-u)*v*p01 + u*v*p11
/// ```
#[derive(Debug, Clone)]
pub struct BilinearSurface {
    /// Corner at (u=0, v=0).
    pub p00: Point3,
    /// Corner at (u=1, v=0).
    pub p10: Point3,
    /// Corner at (u=0, v=1).
    pub p01: Point3,
    /// Corner at (u=1, v=1).
    pub p11: Point3,
}

impl BilinearSurface {
    /// Create a bilinear surface from four corner points.
    pub fn new(p00: Point3, p10: Point3, p01: Point3, p11: Point3) -> Self {
        Self { p00, p10, p01, p11 }
    }
}

impl Surface for BilinearSurface {
    fn value(&self, u: f64, v: f64) -> Point3 {
        let u1 = 1.0 - u;
        let v1 = 1.0 - v;
        Point3::new(
            u1 * v1 * self.p00.x + u * v1 * self.p10.x + u1 * v * self.p01.x + u * v * self.p11.x,
            u1 * v1 * self.p00.y + u * v1 * self.p10.y + u1 * v * self.p01.y + u * v * self.p11.y,
            u1 * v1 * self.p00.z + u * v1 * self.p10.z + u1 * v * self.p01.z + u * v * self.p11.z,
        )
    }

    fn d_du(&self, _u: f64, v: f64) -> Vec3 {
        let v1 = 1.0 - v;
        Vec3::new(
            -v1 * self.p00.x + v1 * self.p10.x - v * self.p01.x + v * self.p11.x,
            -v1 * self.p00.y + v1 * self.p10.y - v * self.p01.y + v * self.p11.y,
            -v1 * self.p00.z + v1 * self.p10.z - v * self.p01.z + v * self.p11.z,
        )
    }

    fn d_dv(&self, u: f64, _v: f64) -> Vec3 {
        let u1 = 1.0 - u;
        Vec3::new(
            -u1 * self.p00.x - u * self.p10.x + u1 * self.p01.x + u * self.p11.x,
            -u1 * self.p00.y - u * self.p10.y + u1 * self.p01.y + u * self.p11.y,
            -u1 * self.p00.z - u * self.p10.z + u1 * self.p01.z + u * self.p11.z,
        )
    }

    fn domain(&self) -> UvDomain {
        UvDomain::new(0.0, 1.0, 0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_degenerate() {
        assert!(UvDomain::new(0.0, 0.0, 0.0, 1.0).is_degenerate());
        assert!(UvDomain::new(1.0, 0.0, 0.0, 1.0).is_degenerate());
        assert!(UvDomain::new(0.0, f64::INFINITY, 0.0, 1.0).is_degenerate());
        assert!(!UvDomain::new(0.0, 1.0, 0.0, 1.0).is_degenerate());
    }

    #[test]
    fn test_plane_value() {
        let p = Plane::xy(10.0);
        let pt = p.value(3.0, 4.0);
        assert!((pt.x - 3.0).abs() < 1e-12);
        assert!((pt.y - 4.0).abs() < 1e-12);
        assert!(pt.z.abs() < 1e-12);
    }

    #[test]
    fn test_plane_normal() {
        let p = Plane::xy(10.0);
        let n = p.normal(0.0, 0.0).unwrap();
        assert!((n.as_ref().z - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_sphere_value() {
        let s = SphereSurface::new(10.0);
        // u=0, v=0 (equator, at x-axis) -> (10, 0, 0)
        let pt = s.value(0.0, 0.0);
        assert!((pt.x - 10.0).abs() < 1e-12);
        assert!(pt.y.abs() < 1e-12);
        assert!(pt.z.abs() < 1e-12);
        // North pole: v=PI/2
        let north = s.value(0.0, PI / 2.0);
        assert!(north.x.abs() < 1e-10);
        assert!(north.y.abs() < 1e-10);
        assert!((north.z - 10.0).abs() < 1e-10);
    }

    #[test]
    fn test_sphere_pole_singular() {
        let s = SphereSurface::new(10.0);
        // The default derivative-based normal would vanish at the pole;
        // the explicit override keeps it defined, but d_du itself is zero.
        assert!(s.d_du(0.0, PI / 2.0).norm() < 1e-10);
        assert!(s.normal(0.0, 0.0).is_some());
    }

    #[test]
    fn test_cylinder_value() {
        let c = CylinderSurface::new(5.0, 0.0, 10.0);
        let pt = c.value(0.0, 0.0);
        assert!((pt.x - 5.0).abs() < 1e-12);
        let pt2 = c.value(PI / 2.0, 3.0);
        assert!(pt2.x.abs() < 1e-12);
        assert!((pt2.y - 5.0).abs() < 1e-12);
        assert!((pt2.z - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_torus_value() {
        let torus = TorusSurface::new(10.0, 3.0);
        // u=0, v=0: outer equator, at (R+r, 0, 0) = (13, 0, 0)
        let pt = torus.value(0.0, 0.0);
        assert!((pt.x - 13.0).abs() < 1e-10);
        // u=0, v=π: inner equator, at (R-r, 0, 0) = (7, 0, 0)
        let pt_inner = torus.value(0.0, PI);
        assert!((pt_inner.x - 7.0).abs() < 1e-10);
    }

    #[test]
    fn test_partials_by_finite_difference() {
        let torus = TorusSurface::new(10.0, 3.0);
        let (u, v) = (0.5, 0.3);
        let eps = 1e-7;

        let p0 = torus.value(u, v);
        let d_du_fd = (torus.value(u + eps, v) - p0) / eps;
        let d_dv_fd = (torus.value(u, v + eps) - p0) / eps;

        assert!((torus.d_du(u, v) - d_du_fd).norm() < 1e-4);
        assert!((torus.d_dv(u, v) - d_dv_fd).norm() < 1e-4);

        let sphere = SphereSurface::new(4.0);
        let p0 = sphere.value(u, v);
        let d_du_fd = (sphere.value(u + eps, v) - p0) / eps;
        let d_dv_fd = (sphere.value(u, v + eps) - p0) / eps;
        assert!((sphere.d_du(u, v) - d_du_fd).norm() < 1e-4);
        assert!((sphere.d_dv(u, v) - d_dv_fd).norm() < 1e-4);
    }

    #[test]
    fn test_bilinear_corners() {
        let b = BilinearSurface::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(1.0, 1.0, 1.0),
        );
        assert!((b.value(0.0, 0.0) - Point3::new(0.0, 0.0, 0.0)).norm() < 1e-12);
        assert!((b.value(1.0, 1.0) - Point3::new(1.0, 1.0, 1.0)).norm() < 1e-12);
        let mid = b.value(0.5, 0.5);
        assert!((mid.z - 0.25).abs() < 1e-12);
    }
}
