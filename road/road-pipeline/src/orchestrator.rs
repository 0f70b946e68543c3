//! Runs a job from raw chunks to the final artifact.

use std::path::PathBuf;

use tracing::{error, info, info_span, warn};

use crate::config::PipelineConfig;
use crate::context::JobContext;
use crate::error::{PipelineError, PipelineResult, PipelineWarning};
use crate::job::{CleanedSummary, JobReport, JobState, PipelineJob, StitchDiagnostics};
use crate::stage::{clean_chunk, convert, stitch_paths};

/// Drives jobs through cleaning and stitching.
///
/// Each call to [`Orchestrator::run`] works in its own [`JobContext`],
/// so one orchestrator can serve several jobs at once from different
/// threads.
#[derive(Debug, Clone, Default)]
pub struct Orchestrator {
    config: PipelineConfig,
}

impl Orchestrator {
    /// Create an orchestrator.
    #[must_use]
    pub const fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// The orchestrator's settings.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run `job` to completion.
    ///
    /// Never panics on bad input: chunk failures are collected in the
    /// report and job failures end in [`JobState::Failed`] with no final
    /// artifact on disk.
    #[must_use]
    pub fn run(&self, job: PipelineJob) -> JobReport {
        self.run_with_observer(job, |_| {})
    }

    /// Run `job`, calling `observe` on every state change.
    pub fn run_with_observer<F>(&self, job: PipelineJob, mut observe: F) -> JobReport
    where
        F: FnMut(&JobState),
    {
        let span = info_span!("job", id = %job.id);
        let _guard = span.enter();

        let mut report = JobReport::new(&job.id);
        observe(&report.state);
        info!(chunks = job.chunks.len(), "Starting job");

        report.state = match self.execute(&job, &mut report, &mut observe) {
            Ok(output) => {
                info!(
                    output = %output.display(),
                    cleaned = report.cleaned.len(),
                    dropped = report.failures.len(),
                    warnings = report.warnings.len(),
                    "Job finished"
                );
                JobState::Done { output }
            }
            Err(e) => {
                error!(error = %e, "Job failed");
                JobState::Failed { reason: e.to_string() }
            }
        };
        observe(&report.state);
        report
    }

    fn execute(
        &self,
        job: &PipelineJob,
        report: &mut JobReport,
        observe: &mut dyn FnMut(&JobState),
    ) -> PipelineResult<PathBuf> {
        let config = &self.config;
        let context = JobContext::create(&config.output_dir, &job.id, config.keep_intermediates)?;
        context.remove_stale_final(config.output_format)?;

        let total = job.chunks.len();
        let mut cleaned: Vec<(String, PathBuf)> = Vec::with_capacity(total);

        for (i, spec) in job.chunks.iter().enumerate() {
            observe(&JobState::Cleaning { index: i + 1, total });
            let span = info_span!("chunk", id = %spec.id);
            let _guard = span.enter();

            // Keyed by position: ids from file stems need not be unique
            let output = context.work_path(&format!("clean_{:03}_{}.ply", i + 1, spec.id));
            match clean_chunk(spec, &output, &config.clean) {
                Ok(outcome) => {
                    info!(vertices = outcome.vertices, faces = outcome.faces, "Chunk cleaned");
                    report.cleaned.push(CleanedSummary {
                        chunk: spec.id.clone(),
                        vertices: outcome.vertices,
                        faces: outcome.faces,
                    });
                    report.warnings.extend(outcome.warnings);
                    cleaned.push((spec.id.clone(), outcome.output));
                }
                Err(failure) => {
                    warn!(error = %failure, "Dropping chunk");
                    report.failures.push(failure);
                }
            }
        }

        let Some((_, first)) = cleaned.first() else {
            return Err(PipelineError::Exhausted { chunks: total });
        };

        let folds = cleaned.len() - 1;
        let mut current = first.clone();
        for (step, (chunk, moving)) in cleaned.iter().enumerate().skip(1) {
            observe(&JobState::Stitching { index: step, total: folds });
            let output = context.work_path(&format!("stitch_{step}.ply"));
            let outcome = stitch_paths(&current, moving, &output, &config.stitch)?;

            if let Some(reason) = &outcome.report.fallback_reason {
                report.warnings.push(PipelineWarning::Registration {
                    step,
                    reason: reason.to_string(),
                });
            }
            info!(
                step,
                chunk = %chunk,
                fitness = outcome.report.fitness,
                rmse = outcome.report.inlier_rmse,
                overlap_rmse = outcome.report.overlap_rmse,
                fallback = outcome.report.used_fallback,
                "Fold finished"
            );
            report.stitches.push(StitchDiagnostics::new(
                step,
                chunk,
                &outcome.report,
                outcome.vertices,
                outcome.faces,
            ));
            current = output;
        }

        let final_path = context.final_path(config.output_format);
        convert(&current, &final_path)?;
        Ok(final_path)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::ChunkFailure;
    use crate::manifest::ChunkSpec;
    use road_clean::{CleanParams, SurfaceParams};
    use road_io::{save_mesh, MeshFormat};
    use road_types::grid_patch;

    fn config(dir: &std::path::Path) -> PipelineConfig {
        let clean = CleanParams::fast().with_surface(SurfaceParams::close_holes().with_smoothing(None).with_decimation(None));
        PipelineConfig::new(dir).with_clean(clean)
    }

    #[test]
    fn single_chunk_is_converted() {
        let dir = tempfile::tempdir().unwrap();
        let mesh = dir.path().join("only.ply");
        save_mesh(&grid_patch(8, 8, 0.5), &mesh).unwrap();

        let orchestrator = Orchestrator::new(config(dir.path()).with_output_format(MeshFormat::Ply));
        let report = orchestrator.run(PipelineJob::new("solo", vec![ChunkSpec::new("only", &mesh)]));

        assert!(report.is_done(), "{:?}", report.state);
        assert!(report.stitches.is_empty());
        let output = report.output().unwrap();
        assert_eq!(output, dir.path().join("solo").join("final_environment.ply"));
        assert!(output.exists());
    }

    #[test]
    fn states_are_observed_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.ply");
        let b = dir.path().join("b.ply");
        save_mesh(&grid_patch(8, 8, 0.5), &a).unwrap();
        save_mesh(&grid_patch(8, 8, 0.5), &b).unwrap();

        let mut seen = Vec::new();
        let job = PipelineJob::new("obs", vec![ChunkSpec::new("a", &a), ChunkSpec::new("b", &b)]);
        let report = Orchestrator::new(config(dir.path())).run_with_observer(job, |s| seen.push(s.clone()));

        assert!(report.is_done());
        assert_eq!(seen[0], JobState::Pending);
        assert_eq!(seen[1], JobState::Cleaning { index: 1, total: 2 });
        assert_eq!(seen[2], JobState::Cleaning { index: 2, total: 2 });
        assert_eq!(seen[3], JobState::Stitching { index: 1, total: 1 });
        assert!(matches!(seen[4], JobState::Done { .. }));
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn empty_job_is_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let report = Orchestrator::new(config(dir.path())).run(PipelineJob::new("empty", Vec::new()));
        assert!(matches!(report.state, JobState::Failed { .. }));
        assert!(report.output().is_none());
    }

    #[test]
    fn chunks_sharing_an_id_are_both_fused() {
        let dir = tempfile::tempdir().unwrap();
        let (a, b) = (dir.path().join("a.ply"), dir.path().join("b.ply"));
        save_mesh(&grid_patch(8, 8, 0.5), &a).unwrap();
        save_mesh(&grid_patch(4, 4, 0.5), &b).unwrap();

        let job = PipelineJob::new("twins", vec![ChunkSpec::new("mesh", &a), ChunkSpec::new("mesh", &b)]);
        let report = Orchestrator::new(config(dir.path())).run(job);

        assert!(report.is_done(), "{}", report.state);
        let expected = report.cleaned[0].vertices + report.cleaned[1].vertices;
        assert_ne!(report.cleaned[0].vertices, report.cleaned[1].vertices);
        assert_eq!(report.stitches[0].vertices, expected);
    }

    #[test]
    fn busy_job_dir_fails_without_touching_it() {
        let dir = tempfile::tempdir().unwrap();
        let mesh = dir.path().join("only.ply");
        save_mesh(&grid_patch(8, 8, 0.5), &mesh).unwrap();

        let config = config(dir.path()).with_output_format(MeshFormat::Ply);
        let holder = JobContext::create(&config.output_dir, "busy", false).unwrap();
        let existing = holder.final_path(MeshFormat::Ply);
        std::fs::write(&existing, b"other job's result").unwrap();

        let report = Orchestrator::new(config).run(PipelineJob::new("busy", vec![ChunkSpec::new("only", &mesh)]));
        let JobState::Failed { reason } = &report.state else {
            panic!("expected Failed, got {}", report.state);
        };
        assert!(reason.contains("in use"), "{reason}");
        assert_eq!(std::fs::read(&existing).unwrap(), b"other job's result");
    }

    #[test]
    fn failures_are_collected_per_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.ply");
        save_mesh(&grid_patch(8, 8, 0.5), &good).unwrap();

        let job = PipelineJob::new(
            "partial",
            vec![
                ChunkSpec::new("gone", dir.path().join("gone.ply")),
                ChunkSpec::new("good", &good),
            ],
        );
        let report = Orchestrator::new(config(dir.path())).run(job);

        assert!(report.is_done());
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(report.failures[0], ChunkFailure::MissingInput { .. }));
        assert_eq!(report.cleaned.len(), 1);
        assert_eq!(report.cleaned[0].chunk, "good");
    }
}
