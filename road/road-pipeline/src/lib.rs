//! Job orchestration for road-scan fusion.
//!
//! A job takes an ordered list of chunks, each a dense mesh with an
//! optional truth mask, and produces one fused mesh:
//!
//! 1. every chunk is cleaned on its own ([`road_clean::ChunkCleaner`]);
//!    a chunk that fails is dropped and the job goes on
//! 2. the survivors are folded left to right, each merged into the
//!    accumulated mesh ([`road_registration::stitch`])
//! 3. the result is written to `<output_dir>/<job-id>/final_environment.<ext>`
//!
//! Jobs run synchronously through [`Orchestrator::run`], or in the
//! background through [`JobDispatcher::submit`]. Each job owns a
//! [`JobContext`] with its own work directory, so concurrent jobs never
//! share intermediate files or final paths.
//!
//! # Quick Start
//!
//! ```no_run
//! use road_pipeline::{ChunkManifest, Orchestrator, PipelineConfig, PipelineJob};
//!
//! let config = PipelineConfig::from_json_file("roadtwin.json")?;
//! let manifest = ChunkManifest::from_json_file("data/uploads/chunks.json")?;
//!
//! let report = Orchestrator::new(config).run(PipelineJob::from_manifest("job_001", manifest));
//! for stitch in &report.stitches {
//!     println!("step {}: fitness {:.3}", stitch.step, stitch.fitness);
//! }
//! println!("{}", report.state);
//! # Ok::<(), road_pipeline::PipelineError>(())
//! ```
//!
//! # Failure Policy
//!
//! | Condition | Outcome |
//! |-----------|---------|
//! | Missing input, unreadable file, uncleanable geometry | [`ChunkFailure`], chunk dropped |
//! | Stage worked around a problem, registration fell back, colors lost | [`PipelineWarning`] in the report |
//! | No chunk survived, workspace unusable, intermediate unreadable | [`JobState::Failed`], no final file |

// Safety: Deny unwrap/expect in library code. Tests may use them (workspace warns).
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod config;
mod context;
mod dispatch;
mod error;
mod job;
mod manifest;
mod orchestrator;
mod pairing;
mod stage;

pub use config::PipelineConfig;
pub use context::{JobContext, FINAL_STEM};
pub use dispatch::{JobDispatcher, JobHandle};
pub use error::{ChunkFailure, InputRole, PipelineError, PipelineResult, PipelineWarning};
pub use job::{CleanedSummary, JobReport, JobState, PipelineJob, StitchDiagnostics};
pub use manifest::{ChunkManifest, ChunkSpec};
pub use orchestrator::Orchestrator;
pub use pairing::{ManifestPairing, PairingStrategy, PrefixPairing};
pub use stage::{clean_file, stitch_file};
