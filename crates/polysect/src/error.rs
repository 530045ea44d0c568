//! Error types for the intersection engine.

use thiserror::Error;

/// Errors that can occur while constructing or querying an intersection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A supplied surface has a degenerate (zero-area) parametric domain.
    #[error("surface {0} has a degenerate parametric domain")]
    DegenerateSurface(usize),

    /// A query was made before `perform()` completed successfully.
    #[error("intersection has not been performed")]
    NotPerformed,

    /// A 1-based section line index was out of range.
    #[error("section line index {index} is out of range (1..={count})")]
    LineIndexOutOfRange {
        /// The offending index.
        index: usize,
        /// Number of section lines available.
        count: usize,
    },

    /// A 1-based point index was out of range within a section line or zone.
    #[error("point index {index} is out of range (1..={count})")]
    PointIndexOutOfRange {
        /// The offending index.
        index: usize,
        /// Number of points available.
        count: usize,
    },

    /// A 1-based tangent zone index was out of range.
    #[error("tangent zone index {index} is out of range (1..={count})")]
    ZoneIndexOutOfRange {
        /// The offending index.
        index: usize,
        /// Number of tangent zones available.
        count: usize,
    },

    /// The caller-supplied deadline expired before the intersection
    /// completed.
    #[error("deadline expired before the intersection completed")]
    Cancelled,
}

/// Result type for intersection operations.
pub type Result<T> = std::result::Result<T, Error>;
