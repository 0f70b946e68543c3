//! The per-chunk cleaning chain.

use road_repair::{HoleFillSummary, RepairSummary};
use road_types::{Mesh, PointCloud, UpAxis};
use tracing::{info, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::density::{density_filter, DensityFilterParams};
use crate::error::{CleanError, CleanResult, CleanWarning};
use crate::flatten::{flatten_road, FlattenOutcome, FlattenParams};
use crate::floor::{level_floor, FloorSearch, FloorSearchParams};
use crate::orient::{normalize_orientation, OrientationReport};
use crate::prune::{prune_artifacts, PruneStrategy};
use crate::surface::{reconstruct_surface, SurfaceParams};

/// Settings for every stage of [`ChunkCleaner`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CleanParams {
    /// Up axis used by orientation. [`CleanParams::with_up`] propagates
    /// it to the other stages.
    pub up: UpAxis,
    /// Run the floor search before orientation (default: false).
    pub level_floor: bool,
    /// Floor search settings.
    pub floor: FloorSearchParams,
    /// Density filter settings.
    pub density: DensityFilterParams,
    /// Artifact pruning, `None` to skip.
    pub prune: Option<PruneStrategy>,
    /// Road flattening, `None` to skip.
    pub flatten: Option<FlattenParams>,
    /// Surface stages.
    pub surface: SurfaceParams,
}

impl Default for CleanParams {
    fn default() -> Self {
        Self {
            up: UpAxis::Y,
            level_floor: false,
            floor: FloorSearchParams::default(),
            density: DensityFilterParams::default(),
            prune: Some(PruneStrategy::default()),
            flatten: Some(FlattenParams::default()),
            surface: SurfaceParams::close_holes(),
        }
    }
}

impl CleanParams {
    /// Orientation, density filter, hole closing, smoothing and
    /// decimation only. No pruning or flattening.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            prune: None,
            flatten: None,
            ..Self::default()
        }
    }

    /// Use `up` in every stage.
    #[must_use]
    pub fn with_up(mut self, up: UpAxis) -> Self {
        self.up = up;
        self.floor.up = up;
        self.density.up = up;
        if let Some(PruneStrategy::Severance(severance)) = &mut self.prune {
            severance.up = up;
        }
        if let Some(flatten) = &mut self.flatten {
            flatten.up = up;
        }
        self
    }

    /// Enables or disables the floor search.
    #[must_use]
    pub const fn with_level_floor(mut self, level: bool) -> Self {
        self.level_floor = level;
        self
    }

    /// Sets the pruning strategy.
    #[must_use]
    pub const fn with_prune(mut self, prune: Option<PruneStrategy>) -> Self {
        self.prune = prune;
        self
    }

    /// Sets the surface stages.
    #[must_use]
    pub fn with_surface(mut self, surface: SurfaceParams) -> Self {
        self.surface = surface;
        self
    }
}

/// What each stage did to a chunk.
#[derive(Debug, Clone)]
pub struct CleanReport {
    /// Vertices in the raw chunk.
    pub input_vertices: usize,
    /// Faces in the raw chunk.
    pub input_faces: usize,
    /// Floor search outcome, when it ran.
    pub floor: Option<FloorSearch>,
    /// Orientation outcome.
    pub orientation: OrientationReport,
    /// Vertices outside the truth-mask region.
    pub cropped_vertices: usize,
    /// Vertices removed as statistical outliers.
    pub outliers_removed: usize,
    /// Outliers kept because they lie in the ground band.
    pub ground_protected: usize,
    /// Faces removed by pruning.
    pub pruned_faces: usize,
    /// Flattening outcome, when it ran.
    pub flatten: Option<FlattenOutcome>,
    /// Topology repair summary.
    pub repair: RepairSummary,
    /// Hole closing summary, when hole closing ran.
    pub holes: Option<HoleFillSummary>,
    /// Vertices in the cleaned chunk.
    pub output_vertices: usize,
    /// Faces in the cleaned chunk.
    pub output_faces: usize,
    /// Every condition absorbed along the way, in stage order.
    pub warnings: Vec<CleanWarning>,
}

/// A cleaned chunk and its report.
#[derive(Debug, Clone)]
pub struct CleanedChunk {
    /// The cleaned surface.
    pub mesh: Mesh,
    /// What was done to it.
    pub report: CleanReport,
}

/// Runs the cleaning stages on one chunk at a time.
///
/// Stage order: floor search (optional), orientation, density filter,
/// pruning, flattening, surface stages.
///
/// # Example
///
/// ```
/// use road_clean::{ChunkCleaner, CleanParams};
/// use road_types::{grid_patch, Point3};
///
/// let mut mesh = grid_patch(20, 20, 0.25);
/// mesh.positions.push(Point3::new(2.0, 25.0, 2.0)); // a stray point in the sky
///
/// let cleaned = ChunkCleaner::new(CleanParams::default()).clean(mesh, None).unwrap();
/// assert!(cleaned.mesh.positions.iter().all(|p| p.y < 0.5));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ChunkCleaner {
    params: CleanParams,
}

impl ChunkCleaner {
    /// Create a cleaner.
    #[must_use]
    pub const fn new(params: CleanParams) -> Self {
        Self { params }
    }

    /// The cleaner's settings.
    #[must_use]
    pub const fn params(&self) -> &CleanParams {
        &self.params
    }

    /// Clean one chunk, optionally cropped to a truth mask.
    ///
    /// # Errors
    ///
    /// - [`CleanError::InvalidMesh`] if the chunk breaks the mesh invariants
    /// - [`CleanError::EmptyMesh`] if the chunk or a stage output has no faces
    /// - any error of [`reconstruct_surface`]
    ///
    /// Every other problem is recorded in [`CleanReport::warnings`].
    pub fn clean(&self, mut mesh: Mesh, mask: Option<&PointCloud>) -> CleanResult<CleanedChunk> {
        let params = &self.params;
        mesh.validate()?;
        ensure_faces(&mesh, "input")?;

        let input_vertices = mesh.positions.len();
        let input_faces = mesh.faces.len();
        info!(vertices = input_vertices, faces = input_faces, masked = mask.is_some(), "Cleaning chunk");

        let mut warnings = Vec::new();

        let floor = params.level_floor.then(|| level_floor(&mut mesh, &params.floor));
        if let Some(warning) = floor.as_ref().and_then(FloorSearch::warning) {
            warnings.push(warning);
        }

        let orientation = normalize_orientation(&mut mesh, params.up);
        info!(flipped = orientation.flipped, lift = orientation.lift, "Normalized orientation");

        let density = density_filter(&mesh, mask, &params.density)?;
        warnings.extend(density.warnings);
        let mut mesh = density.mesh;
        ensure_faces(&mesh, "density filter")?;

        let mut pruned_faces = 0;
        if let Some(strategy) = &params.prune {
            let pruned = prune_artifacts(&mesh, strategy);
            pruned_faces = pruned.faces_removed();
            info!(
                faces_removed = pruned_faces,
                components = pruned.components_found,
                "Pruned artifacts"
            );
            mesh = pruned.mesh;
            ensure_faces(&mesh, "pruning")?;
        }

        let flatten = params.flatten.as_ref().map(|flatten| flatten_road(&mut mesh, flatten));
        if let Some(warning) = flatten.as_ref().and_then(FlattenOutcome::warning) {
            warnings.push(warning);
        }

        let surface = reconstruct_surface(&mesh, &params.surface)?;
        warnings.extend(surface.warnings);

        for warning in &warnings {
            warn!(%warning, "Cleaning continued past a problem");
        }

        let report = CleanReport {
            input_vertices,
            input_faces,
            floor,
            orientation,
            cropped_vertices: density.cropped,
            outliers_removed: density.outliers_removed,
            ground_protected: density.ground_protected,
            pruned_faces,
            flatten,
            repair: surface.repair,
            holes: surface.holes,
            output_vertices: surface.mesh.positions.len(),
            output_faces: surface.mesh.faces.len(),
            warnings,
        };
        info!(
            vertices = report.output_vertices,
            faces = report.output_faces,
            warnings = report.warnings.len(),
            "Chunk cleaned"
        );

        Ok(CleanedChunk {
            mesh: surface.mesh,
            report,
        })
    }
}

fn ensure_faces(mesh: &Mesh, stage: &'static str) -> CleanResult<()> {
    if mesh.faces.is_empty() {
        Err(CleanError::EmptyMesh { stage })
    } else {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use road_types::{grid_patch, MeshBounds, Point3, RigidTransform, Vector3};

    /// A 10 m by 5 m road patch with debris floating above it.
    fn noisy_chunk() -> Mesh {
        let mut mesh = grid_patch(40, 20, 0.25);
        for (i, p) in [(2.0, 12.0, 1.0), (7.5, 20.0, 3.0), (5.0, 9.0, 4.0)].iter().enumerate() {
            let base = mesh.positions.len() as u32;
            let (x, y, z) = *p;
            mesh.positions.push(Point3::new(x, y, z));
            mesh.positions.push(Point3::new(x + 0.3, y, z));
            mesh.positions.push(Point3::new(x, y + 0.2 * (i as f64 + 1.0), z + 0.3));
            mesh.faces.push([base, base + 2, base + 1]);
        }
        mesh
    }

    fn footprint_mask() -> PointCloud {
        PointCloud::from_positions(vec![Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 0.3, 5.0)])
    }

    #[test]
    fn debris_is_removed_and_road_is_kept() {
        let cleaned = ChunkCleaner::default().clean(noisy_chunk(), Some(&footprint_mask())).unwrap();

        let bounds = cleaned.mesh.bounds_opt().unwrap();
        assert!(bounds.max.y < 0.5);
        assert_relative_eq!(bounds.min.x, 0.0, epsilon = 0.3);
        assert_relative_eq!(bounds.max.x, 10.0, epsilon = 0.3);
        assert!(cleaned.mesh.validate().is_ok());
        assert!(cleaned.report.warnings.is_empty());
        assert!(cleaned.mesh.has_normals());
    }

    #[test]
    fn fast_preset_skips_pruning_and_flattening() {
        let cleaned = ChunkCleaner::new(CleanParams::fast()).clean(noisy_chunk(), None).unwrap();
        assert!(cleaned.report.flatten.is_none());
        assert_eq!(cleaned.report.pruned_faces, 0);
        assert!(cleaned.report.floor.is_none());
    }

    #[test]
    fn flattening_reports_its_plane() {
        let cleaned = ChunkCleaner::default().clean(noisy_chunk(), None).unwrap();
        assert!(matches!(cleaned.report.flatten, Some(FlattenOutcome::Flattened { .. })));
    }

    #[test]
    fn sideways_scan_is_levelled() {
        let quarter = RigidTransform::from_axis_angle(&Vector3::x_axis(), std::f64::consts::FRAC_PI_2);
        let wall = grid_patch(40, 20, 0.25).transformed(&quarter);

        let params = CleanParams::default().with_level_floor(true);
        let cleaned = ChunkCleaner::new(params).clean(wall, None).unwrap();

        assert!(cleaned.report.floor.as_ref().unwrap().found());
        for p in &cleaned.mesh.positions {
            assert!(p.y.abs() < 1e-6);
        }
    }

    #[test]
    fn floor_search_failure_is_a_warning() {
        // No plane can pass this flatness bar
        let mut params = CleanParams::default().with_level_floor(true);
        params.floor.min_flatness = 1.1;

        let cleaned = ChunkCleaner::new(params).clean(grid_patch(10, 10, 0.5), None).unwrap();
        assert!(matches!(
            cleaned.report.warnings.first(),
            Some(CleanWarning::FloorNotFound { attempts: 5, .. })
        ));
    }

    #[test]
    fn sparse_ground_warns_but_succeeds() {
        let cleaned = ChunkCleaner::default().clean(grid_patch(4, 4, 1.0), None).unwrap();
        assert!(cleaned
            .report
            .warnings
            .iter()
            .any(|w| matches!(w, CleanWarning::TooFewGroundSamples { found: 25, required: 100 })));
    }

    #[test]
    fn distant_mask_empties_the_chunk() {
        let mask = PointCloud::from_positions(vec![Point3::new(1000.0, 0.0, 1000.0)]);
        let result = ChunkCleaner::default().clean(noisy_chunk(), Some(&mask));
        assert!(matches!(result, Err(CleanError::EmptyMesh { stage: "density filter" })));
    }

    #[test]
    fn empty_chunk_is_an_error() {
        let result = ChunkCleaner::default().clean(Mesh::new(), None);
        assert!(matches!(result, Err(CleanError::EmptyMesh { stage: "input" })));
    }

    #[test]
    fn with_up_reaches_every_stage() {
        let params = CleanParams::default()
            .with_prune(Some(PruneStrategy::Severance(crate::prune::SeveranceParams::default())))
            .with_up(UpAxis::Z);
        assert_eq!(params.floor.up, UpAxis::Z);
        assert_eq!(params.density.up, UpAxis::Z);
        assert_eq!(params.flatten.unwrap().up, UpAxis::Z);
        assert!(matches!(params.prune, Some(PruneStrategy::Severance(s)) if s.up == UpAxis::Z));
    }
}
