//! Artifact pruning.
//!
//! Two strategies remove what survives the density filter:
//!
//! - **Largest component**: keep the single biggest edge-connected piece.
//! - **Severance**: cut away everything outside a height band (sky domes,
//!   overhangs), drop near-vertical faces (walls, poles), then keep the
//!   largest component. Cutting the walls first is what separates a
//!   building that touches the road from the road itself.

use road_repair::{keep_largest_component, ComponentMetric};
use road_types::{Mesh, UpAxis};
use tracing::info;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Parameters for the severance strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SeveranceParams {
    /// Vertices lower than this are removed (default: -0.5).
    pub min_height: f64,
    /// Vertices higher than this are removed (default: 4.0).
    pub max_height: f64,
    /// Faces whose `|normal · up|` is below this are removed (default: 0.3).
    pub min_up_alignment: f64,
    /// How the surviving component is chosen.
    pub metric: ComponentMetric,
    /// Up axis.
    pub up: UpAxis,
}

impl Default for SeveranceParams {
    fn default() -> Self {
        Self {
            min_height: -0.5,
            max_height: 4.0,
            min_up_alignment: 0.3,
            metric: ComponentMetric::TriangleCount,
            up: UpAxis::Y,
        }
    }
}

/// How [`prune_artifacts`] decides what to keep.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "strategy", rename_all = "snake_case"))]
pub enum PruneStrategy {
    /// Keep the largest edge-connected component.
    LargestComponent {
        /// Size measure.
        metric: ComponentMetric,
    },
    /// Height band, wall removal, then largest component.
    Severance(SeveranceParams),
}

impl Default for PruneStrategy {
    fn default() -> Self {
        Self::LargestComponent {
            metric: ComponentMetric::TriangleCount,
        }
    }
}

/// Output of [`prune_artifacts`].
#[derive(Debug, Clone)]
pub struct PruneResult {
    /// The pruned mesh.
    pub mesh: Mesh,
    /// Faces removed by the height band.
    pub band_faces_removed: usize,
    /// Faces removed as near-vertical.
    pub wall_faces_removed: usize,
    /// Components seen before the final selection.
    pub components_found: usize,
    /// Faces dropped with the smaller components.
    pub component_faces_removed: usize,
}

impl PruneResult {
    /// Total faces removed.
    #[must_use]
    pub const fn faces_removed(&self) -> usize {
        self.band_faces_removed + self.wall_faces_removed + self.component_faces_removed
    }
}

/// Remove disconnected debris and non-ground structure.
///
/// Unreferenced vertices are always removed from the output.
///
/// # Example
///
/// ```
/// use road_clean::{prune_artifacts, PruneStrategy};
/// use road_types::{grid_patch, MeshTopology, RigidTransform, Vector3};
///
/// let mut mesh = grid_patch(8, 8, 0.5);
/// mesh.append(&grid_patch(1, 1, 0.5).transformed(&RigidTransform::from_translation(Vector3::new(20.0, 0.0, 0.0))));
///
/// let result = prune_artifacts(&mesh, &PruneStrategy::default());
/// assert_eq!(result.components_found, 2);
/// assert_eq!(result.mesh.face_count(), 128);
/// ```
#[must_use]
pub fn prune_artifacts(mesh: &Mesh, strategy: &PruneStrategy) -> PruneResult {
    let result = match strategy {
        PruneStrategy::LargestComponent { metric } => {
            let selection = keep_largest_component(mesh, *metric);
            PruneResult {
                mesh: selection.mesh,
                band_faces_removed: 0,
                wall_faces_removed: 0,
                components_found: selection.components_found,
                component_faces_removed: selection.faces_removed,
            }
        }
        PruneStrategy::Severance(params) => sever(mesh, params),
    };

    info!(
        faces_in = mesh.faces.len(),
        faces_out = result.mesh.faces.len(),
        components = result.components_found,
        "Pruned artifacts"
    );
    result
}

fn sever(mesh: &Mesh, params: &SeveranceParams) -> PruneResult {
    let in_band: Vec<bool> = mesh
        .positions
        .iter()
        .map(|p| {
            let h = params.up.height(p);
            h >= params.min_height && h <= params.max_height
        })
        .collect();
    let banded = mesh.select_vertices(&in_band);
    let band_faces_removed = mesh.faces.len() - banded.faces.len();

    let not_wall: Vec<bool> = banded
        .faces
        .iter()
        .map(|&f| {
            banded
                .face_normal(f)
                .is_some_and(|n| params.up.component(&n).abs() >= params.min_up_alignment)
        })
        .collect();
    let floors = banded.retain_faces(&not_wall);
    let wall_faces_removed = banded.faces.len() - floors.faces.len();

    let selection = keep_largest_component(&floors, params.metric);
    PruneResult {
        mesh: selection.mesh,
        band_faces_removed,
        wall_faces_removed,
        components_found: selection.components_found,
        component_faces_removed: selection.faces_removed,
    }
}
