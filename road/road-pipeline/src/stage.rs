//! File-level stages: clean one chunk file, stitch two files.
//!
//! [`clean_file`] and [`stitch_file`] read their named inputs and write
//! exactly one output. The orchestrator uses the richer crate-internal
//! variants, which return outcomes with warnings and diagnostics.

use std::path::{Path, PathBuf};

use road_clean::{ChunkCleaner, CleanParams};
use road_io::{load_mesh, load_point_cloud, save_mesh};
use road_registration::{stitch, RegistrationReport, StitchParams};
use road_types::PointCloud;
use tracing::{info, warn};

use crate::error::{ChunkFailure, InputRole, PipelineResult, PipelineWarning};
use crate::manifest::ChunkSpec;

/// A chunk that survived cleaning.
#[derive(Debug, Clone)]
pub(crate) struct CleanOutcome {
    pub output: PathBuf,
    pub vertices: usize,
    pub faces: usize,
    pub warnings: Vec<PipelineWarning>,
}

/// A finished fold.
#[derive(Debug, Clone)]
pub(crate) struct StitchOutcome {
    pub report: RegistrationReport,
    pub vertices: usize,
    pub faces: usize,
}

fn require(chunk: &str, role: InputRole, path: &Path) -> Result<(), ChunkFailure> {
    if path.is_file() {
        Ok(())
    } else {
        warn!(chunk, role = %role, path = %path.display(), "Input file missing");
        Err(ChunkFailure::missing(chunk, role, path))
    }
}

/// Clean the chunk described by `spec` and write it to `output`.
pub(crate) fn clean_chunk(spec: &ChunkSpec, output: &Path, params: &CleanParams) -> Result<CleanOutcome, ChunkFailure> {
    let chunk = spec.id.as_str();
    require(chunk, InputRole::Mesh, &spec.mesh)?;
    if let Some(mask) = &spec.truth_mask {
        require(chunk, InputRole::TruthMask, mask)?;
    }

    let mesh = load_mesh(&spec.mesh).map_err(|e| ChunkFailure::from_io(chunk, InputRole::Mesh, e))?;
    let mask: Option<PointCloud> = spec
        .truth_mask
        .as_ref()
        .map(|path| load_point_cloud(path))
        .transpose()
        .map_err(|e| ChunkFailure::from_io(chunk, InputRole::TruthMask, e))?;
    info!(
        vertices = mesh.positions.len(),
        faces = mesh.faces.len(),
        mask_points = mask.as_ref().map_or(0, PointCloud::len),
        "Loaded chunk"
    );

    let cleaned = ChunkCleaner::new(params.clone())
        .clean(mesh, mask.as_ref())
        .map_err(|e| ChunkFailure::from_clean(chunk, e))?;

    save_mesh(&cleaned.mesh, output).map_err(|source| ChunkFailure::Io {
        chunk: chunk.to_string(),
        source,
    })?;

    Ok(CleanOutcome {
        output: output.to_path_buf(),
        vertices: cleaned.mesh.positions.len(),
        faces: cleaned.mesh.faces.len(),
        warnings: cleaned
            .report
            .warnings
            .iter()
            .map(|w| PipelineWarning::from_clean(chunk, w))
            .collect(),
    })
}

/// Register `moving` onto `fixed`, merge, and write the result to `output`.
pub(crate) fn stitch_paths(fixed: &Path, moving: &Path, output: &Path, params: &StitchParams) -> PipelineResult<StitchOutcome> {
    let fixed_mesh = load_mesh(fixed)?;
    let moving_mesh = load_mesh(moving)?;
    let result = stitch(&fixed_mesh, &moving_mesh, params);
    save_mesh(&result.mesh, output)?;
    Ok(StitchOutcome {
        report: result.report,
        vertices: result.mesh.positions.len(),
        faces: result.mesh.faces.len(),
    })
}

/// Clean one chunk file.
///
/// The chunk is optionally cropped to the region around `mask`. The
/// output format follows the extension of `output`.
///
/// # Errors
///
/// Returns [`PipelineError::Chunk`](crate::PipelineError::Chunk) if an
/// input is missing, a file cannot be read or written, or the geometry
/// cannot be cleaned.
///
/// # Example
///
/// ```no_run
/// use road_clean::CleanParams;
/// use road_pipeline::clean_file;
///
/// let out = clean_file(
///     "uploads/chunk01_mesh.ply",
///     "processed/clean_chunk01.ply",
///     Some("uploads/chunk1_points3D.ply"),
///     &CleanParams::default(),
/// )?;
/// # Ok::<(), road_pipeline::PipelineError>(())
/// ```
pub fn clean_file<M, O, K>(mesh: M, output: O, mask: Option<K>, params: &CleanParams) -> PipelineResult<PathBuf>
where
    M: AsRef<Path>,
    O: AsRef<Path>,
    K: AsRef<Path>,
{
    let mut spec = ChunkSpec::from_mesh_path(mesh.as_ref());
    if let Some(mask) = mask {
        spec = spec.with_truth_mask(mask.as_ref());
    }
    let outcome = clean_chunk(&spec, output.as_ref(), params)?;
    for warning in &outcome.warnings {
        warn!(%warning, "Cleaning warning");
    }
    Ok(outcome.output)
}

/// Align the mesh in `moving` onto the mesh in `fixed`, merge both and
/// write the result to `output`.
///
/// A failed registration is not an error: the meshes are merged
/// unaligned and a warning is logged.
///
/// # Errors
///
/// Returns [`PipelineError::Io`](crate::PipelineError::Io) if a file
/// cannot be read or written.
pub fn stitch_file<F, M, O>(fixed: F, moving: M, output: O, params: &StitchParams) -> PipelineResult<PathBuf>
where
    F: AsRef<Path>,
    M: AsRef<Path>,
    O: AsRef<Path>,
{
    let output = output.as_ref();
    let outcome = stitch_paths(fixed.as_ref(), moving.as_ref(), output, params)?;
    info!(
        fitness = outcome.report.fitness,
        rmse = outcome.report.inlier_rmse,
        fallback = outcome.report.used_fallback,
        vertices = outcome.vertices,
        faces = outcome.faces,
        "Stitched files"
    );
    Ok(output.to_path_buf())
}

/// Rewrite a mesh file in the format implied by `output`'s extension.
pub(crate) fn convert(input: &Path, output: &Path) -> PipelineResult<()> {
    let mesh = load_mesh(input)?;
    save_mesh(&mesh, output)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use road_clean::SurfaceParams;
    use road_types::{grid_patch, Point3, RigidTransform, Vector3};

    fn quick_params() -> CleanParams {
        CleanParams::fast().with_surface(SurfaceParams::close_holes().with_smoothing(None).with_decimation(None))
    }

    #[test]
    fn missing_mesh_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let result = clean_file(
            dir.path().join("absent.ply"),
            dir.path().join("out.ply"),
            None::<&Path>,
            &quick_params(),
        );
        let Err(PipelineError::Chunk(ChunkFailure::MissingInput { role, chunk, .. })) = result else {
            panic!("expected MissingInput");
        };
        assert_eq!(role, InputRole::Mesh);
        assert_eq!(chunk, "absent");
        assert!(!dir.path().join("out.ply").exists());
    }

    #[test]
    fn missing_mask_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mesh = dir.path().join("c1.ply");
        save_mesh(&grid_patch(4, 4, 1.0), &mesh).unwrap();

        let result = clean_file(&mesh, dir.path().join("out.ply"), Some(dir.path().join("nope.ply")), &quick_params());
        assert!(matches!(
            result,
            Err(PipelineError::Chunk(ChunkFailure::MissingInput {
                role: InputRole::TruthMask,
                ..
            }))
        ));
    }

    #[test]
    fn clean_file_writes_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut raw = grid_patch(12, 12, 0.5);
        raw.positions.push(Point3::new(3.0, 30.0, 3.0));
        let input = dir.path().join("c1.ply");
        save_mesh(&raw, &input).unwrap();

        let out = dir.path().join("clean_c1.ply");
        let written = clean_file(&input, &out, None::<&Path>, &quick_params()).unwrap();
        assert_eq!(written, out);

        let cleaned = load_mesh(&out).unwrap();
        assert_eq!(cleaned.faces.len(), 12 * 12 * 2);
        assert!(cleaned.positions.iter().all(|p| p.y < 0.5));
    }

    #[test]
    fn mask_far_away_fails_the_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("c1.ply");
        save_mesh(&grid_patch(6, 6, 1.0), &input).unwrap();
        let mask = dir.path().join("c1_points.ply");
        let far = RigidTransform::from_translation(Vector3::new(500.0, 0.0, 0.0));
        save_mesh(&grid_patch(2, 2, 1.0).transformed(&far), &mask).unwrap();

        let result = clean_file(&input, dir.path().join("out.ply"), Some(&mask), &quick_params());
        assert!(matches!(
            result,
            Err(PipelineError::Chunk(ChunkFailure::InvalidGeometry { .. }))
        ));
    }

    #[test]
    fn stitch_file_merges_both_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let fixed = dir.path().join("a.ply");
        let moving = dir.path().join("b.ply");
        let a = grid_patch(6, 6, 1.0);
        let b = grid_patch(6, 6, 1.0).transformed(&RigidTransform::from_translation(Vector3::new(5.0, 0.0, 0.0)));
        save_mesh(&a, &fixed).unwrap();
        save_mesh(&b, &moving).unwrap();

        let out = dir.path().join("stitched.ply");
        stitch_file(&fixed, &moving, &out, &StitchParams::trust_pose()).unwrap();
        let merged = load_mesh(&out).unwrap();
        assert_eq!(merged.positions.len(), a.positions.len() + b.positions.len());
        assert_eq!(merged.faces.len(), a.faces.len() + b.faces.len());
    }

    #[test]
    fn stitch_file_missing_input_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = stitch_file(
            dir.path().join("a.ply"),
            dir.path().join("b.ply"),
            dir.path().join("out.ply"),
            &StitchParams::default(),
        );
        assert!(matches!(result, Err(PipelineError::Io(_))));
    }

    #[test]
    fn convert_changes_format() {
        let dir = tempfile::tempdir().unwrap();
        let ply = dir.path().join("m.ply");
        let obj = dir.path().join("m.obj");
        save_mesh(&grid_patch(3, 3, 1.0), &ply).unwrap();
        convert(&ply, &obj).unwrap();
        assert_eq!(load_mesh(&obj).unwrap().faces.len(), 18);
    }
}
