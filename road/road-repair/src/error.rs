//! Error types for mesh repair operations.

use road_types::MeshError;
use thiserror::Error;

/// Result type for repair operations.
pub type RepairResult<T> = Result<T, RepairError>;

/// Errors that can occur during mesh repair.
#[derive(Debug, Error)]
pub enum RepairError {
    /// Mesh indices or attribute arrays are inconsistent.
    #[error(transparent)]
    InvalidMesh(#[from] MeshError),
}
