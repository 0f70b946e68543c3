//! End-to-end tests: files in, fused mesh out.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::{Path, PathBuf};

use approx::assert_relative_eq;
use road_io::{load_mesh, save_mesh, MeshFormat};
use road_pipeline::{
    ChunkFailure, ChunkManifest, ChunkSpec, InputRole, JobDispatcher, JobState, ManifestPairing, Orchestrator,
    PairingStrategy, PipelineConfig, PipelineJob, PrefixPairing,
};
use road_types::{grid_patch, Mesh, Point3, RigidTransform, Vector3};

const SPACING: f64 = 0.25;
const DEPTH_CELLS: usize = 16;

/// A flat road strip at y = 0 spanning `x0..x1`, with three debris
/// triangles floating 12 m above it.
fn noisy_strip(x0: f64, x1: f64) -> Mesh {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let nx = ((x1 - x0) / SPACING).round() as usize;
    let shift = RigidTransform::from_translation(Vector3::new(x0, 0.0, 0.0));
    let mut mesh = grid_patch(nx, DEPTH_CELLS, SPACING).transformed(&shift);

    for (dx, dz) in [(2.0, 1.0), (5.0, 2.0), (8.0, 3.0)] {
        let base = mesh.positions.len() as u32;
        mesh.positions.push(Point3::new(x0 + dx, 12.0, dz));
        mesh.positions.push(Point3::new(x0 + dx + 0.3, 12.0, dz));
        mesh.positions.push(Point3::new(x0 + dx, 12.0, dz + 0.3));
        mesh.faces.push([base, base + 2, base + 1]);
    }
    mesh.normals = None;
    mesh
}

/// A sparse cloud covering the strip's footprint.
fn footprint_mask(x0: f64, x1: f64) -> Mesh {
    let mut mask = Mesh::new();
    let mut x = x0;
    while x <= x1 + 1e-9 {
        for z in [0.0, 2.0, 4.0] {
            mask.positions.push(Point3::new(x, 0.0, z));
        }
        x += 1.0;
    }
    mask
}

fn strip_vertices(x0: f64, x1: f64) -> usize {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let nx = ((x1 - x0) / SPACING).round() as usize;
    (nx + 1) * (DEPTH_CELLS + 1)
}

struct Uploads {
    dir: tempfile::TempDir,
}

impl Uploads {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn chunk(&self, id: &str, x0: f64, x1: f64) -> ChunkSpec {
        let mesh = self.path(&format!("{id}_mesh.ply"));
        let mask = self.path(&format!("{id}_points3D.ply"));
        save_mesh(&noisy_strip(x0, x1), &mesh).unwrap();
        save_mesh(&footprint_mask(x0, x1), &mask).unwrap();
        ChunkSpec::new(id, mesh).with_truth_mask(mask)
    }

    fn output_dir(&self) -> PathBuf {
        self.path("processed")
    }
}

fn two_strip_job(uploads: &Uploads, id: &str) -> PipelineJob {
    PipelineJob::new(
        id,
        vec![uploads.chunk("chunk1", 0.0, 10.0), uploads.chunk("chunk2", 9.0, 20.0)],
    )
}

#[test]
fn two_overlapping_strips_fuse_into_one_road() {
    let uploads = Uploads::new();
    let orchestrator = Orchestrator::new(PipelineConfig::new(uploads.output_dir()));
    let report = orchestrator.run(two_strip_job(&uploads, "job_001"));

    assert!(report.is_done(), "{}", report.state);
    assert!(report.failures.is_empty());

    // Debris is gone and no road vertex was lost
    assert_eq!(report.cleaned.len(), 2);
    assert_eq!(report.cleaned[0].vertices, strip_vertices(0.0, 10.0));
    assert_eq!(report.cleaned[1].vertices, strip_vertices(9.0, 20.0));

    // Coplanar strips register without moving
    assert_eq!(report.stitches.len(), 1);
    let stitch = &report.stitches[0];
    assert!(!stitch.used_fallback);
    assert!(stitch.fitness > 0.0);
    assert!(stitch.transform.translation().norm() < 1e-3);
    assert!(stitch.transform.rotation_angle() < 1e-3);
    assert!(stitch.overlap_fitness > 0.0);
    assert!(stitch.overlap_rmse < 0.05, "overlap rmse {}", stitch.overlap_rmse);

    // Merged without welding
    let v = report.cleaned[0].vertices + report.cleaned[1].vertices;
    let f = report.cleaned[0].faces + report.cleaned[1].faces;
    assert_eq!(stitch.vertices, v);
    assert_eq!(stitch.faces, f);

    let output = report.output().unwrap();
    assert_eq!(output, uploads.output_dir().join("job_001").join("final_environment.obj"));
    let fused = load_mesh(output).unwrap();
    assert_eq!(fused.positions.len(), v);
    assert_eq!(fused.faces.len(), f);

    let min_x = fused.positions.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
    let max_x = fused.positions.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
    let max_y = fused.positions.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);
    assert_relative_eq!(min_x, 0.0, epsilon = 1e-3);
    assert_relative_eq!(max_x, 20.0, epsilon = 1e-3);
    assert!(max_y < 0.5);
}

#[test]
fn missing_chunk_is_skipped() {
    let uploads = Uploads::new();
    let job = PipelineJob::new(
        "partial",
        vec![
            uploads.chunk("chunk1", 0.0, 10.0),
            ChunkSpec::new("chunk2", uploads.path("chunk2_mesh.ply")),
        ],
    );
    let report = Orchestrator::new(PipelineConfig::new(uploads.output_dir())).run(job);

    assert!(report.is_done(), "{}", report.state);
    assert_eq!(report.failures.len(), 1);
    let ChunkFailure::MissingInput { chunk, role, .. } = &report.failures[0] else {
        panic!("expected MissingInput, got {:?}", report.failures[0]);
    };
    assert_eq!(chunk, "chunk2");
    assert_eq!(*role, InputRole::Mesh);
    assert!(report.stitches.is_empty());
    assert!(report.output().unwrap().exists());
}

#[test]
fn missing_truth_mask_drops_only_that_chunk() {
    let uploads = Uploads::new();
    let mut second = uploads.chunk("chunk2", 9.0, 20.0);
    second.truth_mask = Some(uploads.path("nowhere.ply"));
    let job = PipelineJob::new("mask", vec![uploads.chunk("chunk1", 0.0, 10.0), second]);

    let report = Orchestrator::new(PipelineConfig::new(uploads.output_dir())).run(job);
    assert!(report.is_done());
    assert!(matches!(
        report.failures[0],
        ChunkFailure::MissingInput {
            role: InputRole::TruthMask,
            ..
        }
    ));
}

#[test]
fn nothing_survives_means_no_final_file() {
    let uploads = Uploads::new();
    let job = PipelineJob::new(
        "doomed",
        vec![
            ChunkSpec::new("a", uploads.path("a.ply")),
            ChunkSpec::new("b", uploads.path("b.ply")),
        ],
    );
    let config = PipelineConfig::new(uploads.output_dir());
    let report = Orchestrator::new(config).run(job);

    let JobState::Failed { reason } = &report.state else {
        panic!("expected Failed, got {}", report.state);
    };
    assert!(reason.contains("no chunk survived"));
    assert_eq!(report.failures.len(), 2);
    assert!(report.output().is_none());

    let job_dir = uploads.output_dir().join("doomed");
    assert!(!job_dir.join("final_environment.obj").exists());
    assert_eq!(std::fs::read_dir(&job_dir).unwrap().count(), 0);
}

#[test]
fn intermediates_are_kept_on_request() {
    let uploads = Uploads::new();
    let config = PipelineConfig::new(uploads.output_dir())
        .with_output_format(MeshFormat::Ply)
        .keeping_intermediates();
    let report = Orchestrator::new(config).run(two_strip_job(&uploads, "kept"));
    assert!(report.is_done());

    let job_dir = uploads.output_dir().join("kept");
    let work: Vec<PathBuf> = std::fs::read_dir(&job_dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.is_dir())
        .collect();
    assert_eq!(work.len(), 1);
    for name in ["clean_001_chunk1.ply", "clean_002_chunk2.ply", "stitch_1.ply"] {
        assert!(work[0].join(name).exists(), "{name} missing");
    }
    assert!(job_dir.join("final_environment.ply").exists());
}

#[test]
fn same_named_meshes_from_different_folders_both_fuse() {
    let uploads = Uploads::new();
    let mut meshes = Vec::new();
    for (day, x0, x1) in [("day1", 0.0, 10.0), ("day2", 9.0, 20.0)] {
        let dir = uploads.path(day);
        std::fs::create_dir_all(&dir).unwrap();
        let mesh = dir.join("mesh.ply");
        save_mesh(&noisy_strip(x0, x1), &mesh).unwrap();
        meshes.push(mesh);
    }
    let job = PipelineJob::paired("days", &PrefixPairing, &meshes, &[]);
    assert_eq!(job.chunks[0].id, job.chunks[1].id);

    let config = PipelineConfig::new(uploads.output_dir()).with_output_format(MeshFormat::Ply);
    let report = Orchestrator::new(config).run(job);
    assert!(report.is_done(), "{}", report.state);
    assert_eq!(report.cleaned.len(), 2);
    assert_eq!(report.stitches.len(), 1);

    let fused = load_mesh(report.output().unwrap()).unwrap();
    assert_eq!(fused.positions.len(), report.cleaned[0].vertices + report.cleaned[1].vertices);
    let min_x = fused.positions.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
    let max_x = fused.positions.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
    assert_relative_eq!(min_x, 0.0, epsilon = 1e-3);
    assert_relative_eq!(max_x, 20.0, epsilon = 1e-3);
}

#[test]
fn concurrent_jobs_write_distinct_outputs() {
    let uploads = Uploads::new();
    let dispatcher = JobDispatcher::new(PipelineConfig::new(uploads.output_dir()));

    let job = two_strip_job(&uploads, "job_a");
    let twin = PipelineJob::new("job_b", job.chunks.clone());
    let first = dispatcher.submit(job).unwrap();
    let second = dispatcher.submit(twin).unwrap();

    let a = first.wait().unwrap();
    let b = second.wait().unwrap();
    assert!(a.is_done(), "{}", a.state);
    assert!(b.is_done(), "{}", b.state);

    let (out_a, out_b) = (a.output().unwrap(), b.output().unwrap());
    assert_ne!(out_a, out_b);
    assert!(out_a.exists() && out_b.exists());
    assert_eq!(
        load_mesh(out_a).unwrap().faces.len(),
        load_mesh(out_b).unwrap().faces.len()
    );
}

#[test]
fn dispatched_job_reaches_done() {
    let uploads = Uploads::new();
    let dispatcher = JobDispatcher::new(PipelineConfig::new(uploads.output_dir()));
    let handle = dispatcher.submit(two_strip_job(&uploads, "bg")).unwrap();

    while !handle.is_finished() {
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    let status = handle.status();
    assert!(matches!(status, JobState::Done { .. }), "{status}");
    let report = handle.wait().unwrap();
    assert_eq!(report.state, status);
}

#[test]
fn manifest_and_config_files_drive_a_job() {
    let uploads = Uploads::new();
    let first = uploads.chunk("chunk1", 0.0, 10.0);
    let second = uploads.chunk("chunk2", 9.0, 20.0);

    let manifest_path = uploads.path("chunks.json");
    std::fs::write(
        &manifest_path,
        r#"{ "chunks": [
            { "id": "chunk1", "mesh": "chunk1_mesh.ply", "truth_mask": "chunk1_points3D.ply" },
            { "id": "chunk2", "mesh": "chunk2_mesh.ply", "truth_mask": "chunk2_points3D.ply" }
        ] }"#,
    )
    .unwrap();
    let config_path = uploads.path("roadtwin.json");
    let output_dir = uploads.output_dir();
    std::fs::write(
        &config_path,
        format!(
            r#"{{ "output_dir": {:?}, "output_format": "ply", "clean": {{ "flatten": null }} }}"#,
            output_dir.display().to_string()
        ),
    )
    .unwrap();

    let manifest = ChunkManifest::from_json_file(&manifest_path).unwrap();
    let config = PipelineConfig::from_json_file(&config_path).unwrap();
    assert!(config.clean.flatten.is_none());

    // Uploaded in the wrong order; the manifest decides
    let meshes = vec![second.mesh.clone(), first.mesh.clone()];
    let masks = vec![first.truth_mask.clone().unwrap(), second.truth_mask.clone().unwrap()];
    let chunks = ManifestPairing::new(manifest).pair(&meshes, &masks);
    assert_eq!(chunks, vec![first, second]);

    let report = Orchestrator::new(config).run(PipelineJob::new("from_files", chunks));
    assert!(report.is_done(), "{}", report.state);
    assert_eq!(
        report.output().unwrap(),
        output_dir.join("from_files").join("final_environment.ply")
    );
}

#[test]
fn rerun_replaces_previous_result() {
    let uploads = Uploads::new();
    let orchestrator = Orchestrator::new(PipelineConfig::new(uploads.output_dir()));
    assert!(orchestrator.run(two_strip_job(&uploads, "again")).is_done());

    let report = orchestrator.run(PipelineJob::new(
        "again",
        vec![ChunkSpec::new("gone", Path::new("/nonexistent/gone.ply"))],
    ));
    assert!(!report.is_done());
    assert!(!uploads.output_dir().join("again").join("final_environment.obj").exists());
}
