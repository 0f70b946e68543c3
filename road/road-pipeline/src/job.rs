//! Jobs, their lifecycle and their reports.

use std::fmt;
use std::path::{Path, PathBuf};

use road_registration::RegistrationReport;
use road_types::RigidTransform;

use crate::error::{ChunkFailure, PipelineWarning};
use crate::manifest::{ChunkManifest, ChunkSpec};
use crate::pairing::PairingStrategy;

/// Where a job is in its lifecycle.
///
/// `Pending → Cleaning(1..=n) → Stitching(1..=n-1) → Done | Failed`.
/// Indices are one-based.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum JobState {
    /// Accepted, not started.
    #[default]
    Pending,
    /// Cleaning chunk `index` of `total`.
    Cleaning {
        /// Current chunk.
        index: usize,
        /// Chunks in the job.
        total: usize,
    },
    /// Running fold `index` of `total`.
    Stitching {
        /// Current fold.
        index: usize,
        /// Folds needed.
        total: usize,
    },
    /// Finished; the final artifact exists.
    Done {
        /// Final artifact.
        output: PathBuf,
    },
    /// Stopped without a final artifact.
    Failed {
        /// Why the job stopped.
        reason: String,
    },
}

impl JobState {
    /// Whether the job has stopped.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Failed { .. })
    }

    /// The final artifact, once done.
    #[must_use]
    pub fn output(&self) -> Option<&Path> {
        match self {
            Self::Done { output } => Some(output),
            _ => None,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Cleaning { index, total } => write!(f, "cleaning {index}/{total}"),
            Self::Stitching { index, total } => write!(f, "stitching {index}/{total}"),
            Self::Done { output } => write!(f, "done: {}", output.display()),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// An ordered set of chunks to fuse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineJob {
    /// Job id, also the name of the job's output directory.
    pub id: String,
    /// Chunks in stitching order.
    pub chunks: Vec<ChunkSpec>,
}

impl PipelineJob {
    /// Create a job.
    #[must_use]
    pub fn new(id: impl Into<String>, chunks: Vec<ChunkSpec>) -> Self {
        Self { id: id.into(), chunks }
    }

    /// A job over every chunk of a manifest.
    #[must_use]
    pub fn from_manifest(id: impl Into<String>, manifest: ChunkManifest) -> Self {
        Self::new(id, manifest.chunks)
    }

    /// A job over uploaded files paired by `strategy`.
    #[must_use]
    pub fn paired(
        id: impl Into<String>,
        strategy: &dyn PairingStrategy,
        meshes: &[PathBuf],
        masks: &[PathBuf],
    ) -> Self {
        Self::new(id, strategy.pair(meshes, masks))
    }
}

/// Size of a chunk after cleaning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanedSummary {
    /// Chunk id.
    pub chunk: String,
    /// Vertices after cleaning.
    pub vertices: usize,
    /// Faces after cleaning.
    pub faces: usize,
}

/// How one fold of the stitching chain went.
#[derive(Debug, Clone, PartialEq)]
pub struct StitchDiagnostics {
    /// One-based fold step.
    pub step: usize,
    /// Chunk merged in this step.
    pub chunk: String,
    /// Transform applied to the chunk.
    pub transform: RigidTransform,
    /// Registration fitness, zero after a fallback.
    pub fitness: f64,
    /// Registration inlier RMSE, zero after a fallback.
    pub inlier_rmse: f64,
    /// Fitness of the applied transform where the chunks actually overlap.
    pub overlap_fitness: f64,
    /// RMSE of the applied transform where the chunks actually overlap.
    pub overlap_rmse: f64,
    /// Whether the identity fallback was used.
    pub used_fallback: bool,
    /// Why registration failed, when it did.
    pub fallback_reason: Option<String>,
    /// Vertices in the merged mesh.
    pub vertices: usize,
    /// Faces in the merged mesh.
    pub faces: usize,
}

impl StitchDiagnostics {
    pub(crate) fn new(step: usize, chunk: &str, report: &RegistrationReport, vertices: usize, faces: usize) -> Self {
        Self {
            step,
            chunk: chunk.to_string(),
            transform: report.transform,
            fitness: report.fitness,
            inlier_rmse: report.inlier_rmse,
            overlap_fitness: report.overlap_fitness,
            overlap_rmse: report.overlap_rmse,
            used_fallback: report.used_fallback,
            fallback_reason: report.fallback_reason.as_ref().map(ToString::to_string),
            vertices,
            faces,
        }
    }
}

/// Everything a finished job has to say.
#[derive(Debug)]
pub struct JobReport {
    /// Job id.
    pub job_id: String,
    /// Terminal state.
    pub state: JobState,
    /// Chunks that survived cleaning, in order.
    pub cleaned: Vec<CleanedSummary>,
    /// Chunks dropped, in order.
    pub failures: Vec<ChunkFailure>,
    /// One entry per fold.
    pub stitches: Vec<StitchDiagnostics>,
    /// Absorbed conditions, in the order they happened.
    pub warnings: Vec<PipelineWarning>,
}

impl JobReport {
    pub(crate) fn new(job_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            state: JobState::Pending,
            cleaned: Vec::new(),
            failures: Vec::new(),
            stitches: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Whether the job produced its final artifact.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(self.state, JobState::Done { .. })
    }

    /// The final artifact, if the job is done.
    #[must_use]
    pub fn output(&self) -> Option<&Path> {
        self.state.output()
    }

    /// Whether any fold merged without alignment.
    #[must_use]
    pub fn any_fallback(&self) -> bool {
        self.stitches.iter().any(|s| s.used_fallback)
    }
}
