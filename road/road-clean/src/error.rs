//! Error and warning types for chunk cleaning.

use road_decimate::DecimateError;
use road_repair::RepairError;
use road_types::MeshError;
use thiserror::Error;

/// Result type for cleaning operations.
pub type CleanResult<T> = Result<T, CleanError>;

/// Errors that end cleaning of a chunk.
#[derive(Debug, Error)]
pub enum CleanError {
    /// Input geometry violates the mesh invariants.
    #[error(transparent)]
    InvalidMesh(#[from] MeshError),

    /// A stage left nothing to work with.
    ///
    /// An empty mesh is not downgraded to a [`CleanWarning`]: nothing after
    /// it (registration, fusion) can use it, so the chunk fails here and
    /// the job carries on without it.
    #[error("mesh is empty after {stage}")]
    EmptyMesh {
        /// Stage that produced the empty mesh.
        stage: &'static str,
    },

    /// Topology repair or hole closing failed.
    #[error("surface repair failed: {0}")]
    Repair(#[from] RepairError),

    /// Decimation failed.
    #[error("decimation failed: {0}")]
    Decimate(#[from] DecimateError),

    /// Implicit surface reconstruction failed.
    #[error("surface reconstruction failed: {reason}")]
    Reconstruction {
        /// Description of why reconstruction failed.
        reason: String,
    },

    /// Color transfer could not run.
    #[error("color transfer failed: {reason}")]
    AttributeTransfer {
        /// Description of why the transfer failed.
        reason: String,
    },
}

/// Conditions a stage absorbed and worked around.
///
/// Warnings never stop a chunk; they are collected into the
/// [`CleanReport`](crate::CleanReport).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CleanWarning {
    /// A stage received an empty mesh and left it unchanged.
    #[error("{stage}: mesh is empty")]
    EmptyInput {
        /// Stage that was skipped.
        stage: &'static str,
    },

    /// Floor search used up its attempts without finding a level plane.
    #[error("no floor found after {attempts} attempts (best flatness {best_flatness:.3})")]
    FloorNotFound {
        /// Attempts made.
        attempts: usize,
        /// Flatness of the most horizontal plane seen.
        best_flatness: f64,
    },

    /// The truth mask had no points, so the crop was skipped.
    #[error("truth mask is empty, crop skipped")]
    EmptyMask,

    /// Too few ground vertices to fit a road plane.
    #[error("flattening skipped: {found} ground vertices, need {required}")]
    TooFewGroundSamples {
        /// Ground vertices found.
        found: usize,
        /// Minimum required.
        required: usize,
    },

    /// The road plane fit failed.
    #[error("flattening skipped: {reason}")]
    PlaneFitFailed {
        /// Description of the failure.
        reason: String,
    },

    /// Colors could not be carried onto the rebuilt surface.
    #[error("color transfer failed: {reason}")]
    ColorTransferFailed {
        /// Description of the failure.
        reason: String,
    },
}

impl CleanWarning {
    /// Whether the warning concerns vertex attributes rather than geometry.
    #[must_use]
    pub const fn is_attribute_transfer(&self) -> bool {
        matches!(self, Self::ColorTransferFailed { .. })
    }
}
