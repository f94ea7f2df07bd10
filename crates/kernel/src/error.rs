//! Error types shared by the mesh engine.

use thiserror::Error;

/// Result type alias used throughout the engine.
pub type MeshResult<T> = Result<T, MeshError>;

/// Engine error type.
///
/// Configuration errors are raised before any worker is spawned; communication
/// and numerical errors abort the whole run, since a partially-exchanged
/// distributed field has undefined content.
#[derive(Error, Debug)]
pub enum MeshError {
    /// Invalid run configuration (bad processor grid, non-positive sizes, ...).
    #[error("configuration error: {0}")]
    Config(String),

    /// A grid axis does not divide evenly over the processor grid.
    #[error("grid axis {axis} of length {extent} is not divisible by {parts} workers")]
    NotDivisible {
        /// Name of the offending logical axis.
        axis: &'static str,
        /// Global extent of the axis.
        extent: usize,
        /// Number of workers the axis would be split over.
        parts: usize,
    },

    /// Two fields were combined that do not share shape, batch, or layout.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A worker failed to complete its side of a collective exchange.
    /// Fatal to the run; there is no partial-result recovery.
    #[error("communication failure: {0}")]
    Communication(String),

    /// A value left its numerical domain (division by zero mode, NaN input).
    #[error("numerical domain error: {0}")]
    Numerical(String),
}
