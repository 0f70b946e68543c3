//! Surface repair, reconstruction, smoothing and decimation.
//!
//! The stages run in a fixed order, each on the output of the previous:
//!
//! 1. topology repair (non-manifold edges and vertices, degenerates)
//! 2. either hole closing or implicit reconstruction
//! 3. color transfer from the repaired mesh, after reconstruction only
//! 4. smoothing
//! 5. decimation to a triangle budget
//!
//! Which of hole closing and reconstruction runs is a configuration
//! choice. Hole closing never invents geometry beyond the patches it
//! stitches into small loops; reconstruction bridges large gaps left by
//! chunk truncation.

use road_decimate::{decimate_mesh, DecimateParams};
use road_repair::{fill_holes, repair_mesh, HoleFillSummary, RepairParams, RepairSummary};
use road_types::{Mesh, PointCloud};
use tracing::{debug, info, warn};

use crate::error::{CleanError, CleanResult, CleanWarning};
use crate::reconstruct::{reconstruct_implicit, ImplicitParams};
use crate::smooth::{smooth_mesh, SmoothParams, SmoothSummary};
use crate::transfer::transfer_colors;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How gaps in the surface are dealt with.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "mode", rename_all = "snake_case"))]
pub enum SurfaceMode {
    /// Patch holes whose boundary loop has at most `max_hole_edges` edges.
    CloseHoles {
        /// Largest loop to patch.
        max_hole_edges: usize,
    },
    /// Rebuild the whole surface from its oriented vertices.
    Implicit(ImplicitParams),
}

impl Default for SurfaceMode {
    fn default() -> Self {
        Self::CloseHoles { max_hole_edges: 2500 }
    }
}

/// Parameters for [`reconstruct_surface`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SurfaceParams {
    /// Topology repair settings.
    pub repair: RepairParams,
    /// Hole closing or reconstruction.
    pub mode: SurfaceMode,
    /// Smoothing, `None` to skip.
    pub smoothing: Option<SmoothParams>,
    /// Decimation, `None` to skip.
    pub decimation: Option<DecimateParams>,
}

impl Default for SurfaceParams {
    fn default() -> Self {
        Self::close_holes()
    }
}

impl SurfaceParams {
    /// Repair, close holes up to 2 500 edges, smooth, decimate to the
    /// surface budget.
    #[must_use]
    pub fn close_holes() -> Self {
        Self {
            repair: RepairParams::default(),
            mode: SurfaceMode::default(),
            smoothing: Some(SmoothParams::default()),
            decimation: Some(DecimateParams::surface_budget()),
        }
    }

    /// Repair, rebuild implicitly, recover colors, smooth, decimate to the
    /// surface budget.
    #[must_use]
    pub fn implicit() -> Self {
        Self {
            mode: SurfaceMode::Implicit(ImplicitParams::default()),
            ..Self::close_holes()
        }
    }

    /// Sets the gap handling mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: SurfaceMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets or clears smoothing.
    #[must_use]
    pub const fn with_smoothing(mut self, smoothing: Option<SmoothParams>) -> Self {
        self.smoothing = smoothing;
        self
    }

    /// Sets or clears decimation.
    #[must_use]
    pub fn with_decimation(mut self, decimation: Option<DecimateParams>) -> Self {
        self.decimation = decimation;
        self
    }
}

/// Output of [`reconstruct_surface`].
#[derive(Debug, Clone)]
pub struct SurfaceResult {
    /// The finished surface, with vertex normals.
    pub mesh: Mesh,
    /// What topology repair changed.
    pub repair: RepairSummary,
    /// Hole closing statistics, when hole closing ran.
    pub holes: Option<HoleFillSummary>,
    /// Vertices trimmed for low density, when reconstruction ran.
    pub trimmed_vertices: Option<usize>,
    /// Smoothing statistics, when smoothing ran.
    pub smoothing: Option<SmoothSummary>,
    /// Face count before decimation.
    pub faces_before_decimation: usize,
    /// Conditions absorbed along the way.
    pub warnings: Vec<CleanWarning>,
}

/// Run the surface stages on a copy of `mesh`.
///
/// # Errors
///
/// - [`CleanError::InvalidMesh`] if `mesh` breaks the mesh invariants
/// - [`CleanError::EmptyMesh`] if there are no faces before or after repair
/// - [`CleanError::Repair`] if hole closing fails
/// - [`CleanError::Reconstruction`] if implicit reconstruction fails
/// - [`CleanError::Decimate`] if decimation fails
///
/// Color transfer failures are returned as warnings.
///
/// # Example
///
/// ```
/// use road_clean::{reconstruct_surface, SurfaceParams};
/// use road_types::grid_patch;
///
/// let mut mesh = grid_patch(6, 6, 1.0);
/// // Knock out one interior cell
/// mesh.faces.retain(|f| !(f.contains(&17) && f.contains(&23)));
///
/// let result = reconstruct_surface(&mesh, &SurfaceParams::close_holes()).unwrap();
/// assert_eq!(result.holes.unwrap().holes_filled, 1);
/// assert_eq!(result.mesh.faces.len(), 72);
/// ```
pub fn reconstruct_surface(mesh: &Mesh, params: &SurfaceParams) -> CleanResult<SurfaceResult> {
    mesh.validate()?;
    if mesh.faces.is_empty() {
        return Err(CleanError::EmptyMesh { stage: "surface input" });
    }

    let mut working = mesh.clone();
    let repair = repair_mesh(&mut working, &params.repair);
    if repair.had_changes() {
        info!(
            non_manifold_faces = repair.non_manifold_faces_removed,
            vertices_split = repair.vertices_split,
            degenerates = repair.degenerates_removed,
            "Repaired surface topology"
        );
    }
    if working.faces.is_empty() {
        return Err(CleanError::EmptyMesh { stage: "topology repair" });
    }

    let mut warnings = Vec::new();
    let mut holes = None;
    let mut trimmed_vertices = None;

    match params.mode {
        SurfaceMode::CloseHoles { max_hole_edges } => {
            let summary = fill_holes(&mut working, max_hole_edges)?;
            info!(
                filled = summary.holes_filled,
                skipped = summary.holes_skipped,
                triangles = summary.triangles_added,
                "Closed holes"
            );
            holes = Some(summary);
        }
        SurfaceMode::Implicit(implicit) => {
            let mut source = working;
            source.compute_vertex_normals();
            let surface = reconstruct_implicit(&PointCloud::from_mesh(&source), &implicit)?;
            trimmed_vertices = Some(surface.trimmed_vertices);
            working = surface.mesh;

            match transfer_colors(&source, &mut working) {
                Ok(summary) => debug!(max_distance = summary.max_distance, "Recovered vertex colors"),
                Err(err) => {
                    warn!(error = %err, "Continuing without vertex colors");
                    warnings.push(CleanWarning::ColorTransferFailed { reason: err.to_string() });
                }
            }
        }
    }

    let smoothing = params.smoothing.map(|smooth| smooth_mesh(&mut working, &smooth));

    let faces_before_decimation = working.faces.len();
    if let Some(decimation) = &params.decimation {
        working = decimate_mesh(&working, decimation)?.mesh;
    }

    working.compute_vertex_normals();
    info!(
        vertices = working.positions.len(),
        faces = working.faces.len(),
        "Surface finished"
    );

    Ok(SurfaceResult {
        mesh: working,
        repair,
        holes,
        trimmed_vertices,
        smoothing,
        faces_before_decimation,
        warnings,
    })
}
