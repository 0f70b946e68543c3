//! Error types for mesh decimation operations.

use road_types::MeshError;
use thiserror::Error;

/// Errors that can occur during decimation operations.
#[derive(Debug, Error)]
pub enum DecimateError {
    /// The input mesh breaks an index or attribute invariant.
    #[error(transparent)]
    InvalidMesh(#[from] MeshError),

    /// Invalid target ratio.
    #[error("Invalid target ratio: {0} (must be between 0.0 and 1.0)")]
    InvalidRatio(f64),
}

/// Result type for decimation operations.
pub type DecimateResult<T> = std::result::Result<T, DecimateError>;
