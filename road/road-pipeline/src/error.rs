//! Error and warning types for pipeline jobs.
//!
//! Failures are sorted by how far they reach:
//!
//! - [`PipelineWarning`]: absorbed, the chunk or stitch goes on
//! - [`ChunkFailure`]: the chunk is dropped, the job goes on
//! - [`PipelineError`]: the job stops

use std::fmt;
use std::path::PathBuf;

use road_clean::{CleanError, CleanWarning};
use road_io::IoError;
use thiserror::Error;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Which input file of a chunk a failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputRole {
    /// The dense chunk mesh.
    Mesh,
    /// The sparse truth-mask cloud.
    TruthMask,
}

impl fmt::Display for InputRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mesh => write!(f, "mesh"),
            Self::TruthMask => write!(f, "truth mask"),
        }
    }
}

/// Errors that drop one chunk from a job.
#[derive(Debug, Error)]
pub enum ChunkFailure {
    /// An input file does not exist.
    #[error("chunk {chunk}: {role} not found at {path}")]
    MissingInput {
        /// Chunk id.
        chunk: String,
        /// Which input is missing.
        role: InputRole,
        /// Path that was looked up.
        path: PathBuf,
    },

    /// Reading or writing the chunk failed.
    #[error("chunk {chunk}: {source}")]
    Io {
        /// Chunk id.
        chunk: String,
        /// Underlying error.
        #[source]
        source: IoError,
    },

    /// The chunk geometry could not be cleaned.
    #[error("chunk {chunk}: {source}")]
    InvalidGeometry {
        /// Chunk id.
        chunk: String,
        /// Underlying error.
        #[source]
        source: CleanError,
    },

    /// Surface reconstruction failed.
    #[error("chunk {chunk}: surface reconstruction failed: {reason}")]
    Reconstruction {
        /// Chunk id.
        chunk: String,
        /// Description of the failure.
        reason: String,
    },
}

impl ChunkFailure {
    /// Creates a missing-input failure.
    #[must_use]
    pub fn missing(chunk: impl Into<String>, role: InputRole, path: impl Into<PathBuf>) -> Self {
        Self::MissingInput {
            chunk: chunk.into(),
            role,
            path: path.into(),
        }
    }

    /// Classifies a cleaning error.
    #[must_use]
    pub fn from_clean(chunk: impl Into<String>, error: CleanError) -> Self {
        match error {
            CleanError::Reconstruction { reason } => Self::Reconstruction {
                chunk: chunk.into(),
                reason,
            },
            source => Self::InvalidGeometry {
                chunk: chunk.into(),
                source,
            },
        }
    }

    /// Classifies an I/O error. A file that vanished after the existence
    /// check still counts as missing.
    #[must_use]
    pub fn from_io(chunk: impl Into<String>, role: InputRole, error: IoError) -> Self {
        match error {
            IoError::FileNotFound { path } => Self::missing(chunk, role, path),
            source => Self::Io {
                chunk: chunk.into(),
                source,
            },
        }
    }

    /// Id of the failed chunk.
    #[must_use]
    pub fn chunk(&self) -> &str {
        match self {
            Self::MissingInput { chunk, .. }
            | Self::Io { chunk, .. }
            | Self::InvalidGeometry { chunk, .. }
            | Self::Reconstruction { chunk, .. } => chunk,
        }
    }
}

/// Conditions absorbed while a job ran.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineWarning {
    /// A cleaning stage left the chunk unmodified or best-effort.
    #[error("chunk {chunk}: {detail}")]
    DegenerateGeometry {
        /// Chunk id.
        chunk: String,
        /// What the stage reported.
        detail: String,
    },

    /// Registration failed and the identity transform was used.
    #[error("stitch {step}: registration failed, merged unaligned: {reason}")]
    Registration {
        /// One-based fold step.
        step: usize,
        /// Why registration failed.
        reason: String,
    },

    /// Colors could not be recovered.
    #[error("chunk {chunk}: {reason}")]
    AttributeTransfer {
        /// Chunk id.
        chunk: String,
        /// Why the transfer failed.
        reason: String,
    },
}

impl PipelineWarning {
    /// Lifts a cleaning warning to the job level.
    #[must_use]
    pub fn from_clean(chunk: &str, warning: &CleanWarning) -> Self {
        if warning.is_attribute_transfer() {
            Self::AttributeTransfer {
                chunk: chunk.to_string(),
                reason: warning.to_string(),
            }
        } else {
            Self::DegenerateGeometry {
                chunk: chunk.to_string(),
                detail: warning.to_string(),
            }
        }
    }
}

/// Errors that stop a job or a file-level operation.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid configuration or manifest.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Configuration or manifest JSON could not be parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading or writing a mesh failed.
    #[error(transparent)]
    Io(#[from] IoError),

    /// A single chunk failed.
    #[error(transparent)]
    Chunk(#[from] ChunkFailure),

    /// No chunk survived cleaning.
    #[error("no chunk survived cleaning ({chunks} submitted)")]
    Exhausted {
        /// Chunks the job started with.
        chunks: usize,
    },

    /// The job directory could not be prepared.
    #[error("job workspace {path}: {source}")]
    Workspace {
        /// Directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Another running job owns the same job directory.
    #[error("job {job} cannot start: {path} is in use by a running job")]
    JobActive {
        /// Job id.
        job: String,
        /// Contested job directory.
        path: PathBuf,
    },

    /// A background worker could not be started.
    #[error("cannot start worker for job {job}: {source}")]
    Spawn {
        /// Job id.
        job: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A background worker panicked.
    #[error("worker for job {job} panicked")]
    WorkerPanicked {
        /// Job id.
        job: String,
    },
}

impl PipelineError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config(reason.into())
    }

    /// Creates a workspace error.
    #[must_use]
    pub fn workspace(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Workspace {
            path: path.into(),
            source,
        }
    }
}
