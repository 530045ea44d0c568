#![warn(missing_docs)]

//! Math types for the polysect surface intersection engine.
//!
//! Thin wrappers around nalgebra providing domain-specific types for
//! 3D intersection geometry: points, vectors, directions, and the
//! tolerance model shared by every stage of the engine.

use nalgebra::{Unit, Vector3};

/// A point in 3D space.
pub type Point3 = nalgebra::Point3<f64>;

/// A vector in 3D space.
pub type Vec3 = Vector3<f64>;

/// A unit (normalized) direction vector in 3D space.
pub type Dir3 = Unit<Vector3<f64>>;

/// Tolerance constants for geometric comparisons.
///
/// `linear` bounds 3D distances (point coincidence, box enlargement),
/// `angular` bounds angle comparisons in radians, and `confusion` is the
/// much tighter precision below which two parameter values are treated
/// as the same value (used to deduplicate intersection samples and to
/// snap barycentric coordinates onto triangle edges and vertices).
#[derive(Debug, Clone, Copy)]
pub struct Tolerance {
    /// Linear distance tolerance.
    pub linear: f64,
    /// Angular tolerance in radians.
    pub angular: f64,
    /// Parametric confusion precision.
    pub confusion: f64,
}

impl Tolerance {
    /// Default intersection tolerances (1e-6 linear, 1e-9 rad angular,
    /// 1e-11 parametric confusion).
    pub const DEFAULT: Self = Self {
        linear: 1e-6,
        angular: 1e-9,
        confusion: 1e-11,
    };

    /// Check if two points are coincident within tolerance.
    pub fn points_equal(&self, a: &Point3, b: &Point3) -> bool {
        (a - b).norm() < self.linear
    }

    /// Check if a scalar distance is effectively zero.
    pub fn is_zero(&self, d: f64) -> bool {
        d.abs() < self.linear
    }

    /// Check if two parameter values are confused (indistinguishable).
    pub fn confused(&self, a: f64, b: f64) -> bool {
        (a - b).abs() < self.confusion
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::DEFAULT
    }
}
