//! `run`, `clean` and `stitch`.

use std::path::Path;

use anyhow::{bail, Context, Result};
use road_clean::CleanParams;
use road_pipeline::{
    clean_file, stitch_file, ChunkManifest, JobReport, Orchestrator, PipelineConfig, PipelineJob, PrefixPairing,
};
use road_registration::StitchParams;
use tracing::{info, warn};

use crate::RunArgs;

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => {
            info!(path = %path.display(), "Loading configuration");
            PipelineConfig::from_json_file(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))
        }
        None => Ok(PipelineConfig::default()),
    }
}

pub fn run(args: RunArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }
    if let Some(format) = args.format {
        config.output_format = format.into();
    }
    if args.full {
        config.stitch = StitchParams::full().with_up(config.stitch.up);
    }
    config.keep_intermediates |= args.keep_intermediates;

    let job = match &args.manifest {
        Some(path) => {
            let manifest = ChunkManifest::from_json_file(path)
                .with_context(|| format!("Failed to load manifest {}", path.display()))?;
            PipelineJob::from_manifest(args.job_id, manifest)
        }
        None => PipelineJob::paired(args.job_id, &PrefixPairing, &args.meshes, &args.masks),
    };
    if job.chunks.is_empty() {
        bail!("Job {} has no chunks", job.id);
    }

    let report = Orchestrator::new(config).run(job);
    print_report(&report);

    match report.output() {
        Some(output) => {
            println!("{}", output.display());
            Ok(())
        }
        None => bail!("Job {} failed: {}", report.job_id, report.state),
    }
}

fn print_report(report: &JobReport) {
    for chunk in &report.cleaned {
        info!(chunk = %chunk.chunk, vertices = chunk.vertices, faces = chunk.faces, "Cleaned");
    }
    for failure in &report.failures {
        warn!(chunk = failure.chunk(), error = %failure, "Dropped");
    }
    for stitch in &report.stitches {
        info!(
            step = stitch.step,
            chunk = %stitch.chunk,
            fitness = stitch.fitness,
            rmse = stitch.inlier_rmse,
            overlap_rmse = stitch.overlap_rmse,
            fallback = stitch.used_fallback,
            "Stitched"
        );
    }
    for warning in &report.warnings {
        warn!(%warning, "Absorbed");
    }
}

pub fn clean(mesh: &Path, output: &Path, mask: Option<&Path>, config: Option<&Path>, fast: bool) -> Result<()> {
    let config = load_config(config)?;
    let params = if fast {
        CleanParams {
            prune: None,
            flatten: None,
            ..config.clean
        }
    } else {
        config.clean
    };

    let written = clean_file(mesh, output, mask, &params)
        .with_context(|| format!("Failed to clean {}", mesh.display()))?;
    println!("{}", written.display());
    Ok(())
}

pub fn stitch(fixed: &Path, moving: &Path, output: &Path, config: Option<&Path>, full: bool) -> Result<()> {
    let config = load_config(config)?;
    let params = if full {
        StitchParams::full().with_up(config.stitch.up)
    } else {
        config.stitch
    };

    let written = stitch_file(fixed, moving, output, &params)
        .with_context(|| format!("Failed to stitch {} onto {}", moving.display(), fixed.display()))?;
    println!("{}", written.display());
    Ok(())
}
