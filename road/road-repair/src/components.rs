//! Connected component analysis.
//!
//! Two faces belong to the same component when they share an edge.
//! Faces that only touch at a vertex are separate components, which is
//! what lets a pole standing on the road be cut away at its foot.

use std::collections::VecDeque;

use road_types::Mesh;
use tracing::debug;

use crate::adjacency::MeshAdjacency;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How the size of a component is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ComponentMetric {
    /// Number of triangles.
    #[default]
    TriangleCount,
    /// Total surface area.
    Area,
}

/// Edge-connected components of a mesh.
#[derive(Debug, Clone, Default)]
pub struct ComponentAnalysis {
    /// Component label of every face. Labels follow first-face order.
    pub face_labels: Vec<usize>,
    /// Triangle count per component.
    pub face_counts: Vec<usize>,
    /// Surface area per component.
    pub areas: Vec<f64>,
}

impl ComponentAnalysis {
    /// Number of components.
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.face_counts.len()
    }

    /// Label of the largest component under `metric`.
    ///
    /// Ties go to the lowest label. `None` for a mesh without faces.
    #[must_use]
    pub fn largest(&self, metric: ComponentMetric) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for label in 0..self.component_count() {
            #[allow(clippy::cast_precision_loss)]
            let size = match metric {
                ComponentMetric::TriangleCount => self.face_counts[label] as f64,
                ComponentMetric::Area => self.areas[label],
            };
            if best.map_or(true, |(_, s)| size > s) {
                best = Some((label, size));
            }
        }
        best.map(|(label, _)| label)
    }
}

/// Label the edge-connected components of a mesh.
///
/// # Example
///
/// ```
/// use road_repair::find_connected_components;
/// use road_types::{grid_patch, RigidTransform, Vector3};
///
/// let mut mesh = grid_patch(2, 2, 1.0);
/// let far = grid_patch(1, 1, 1.0).transformed(&RigidTransform::from_translation(Vector3::new(10.0, 0.0, 0.0)));
/// mesh.append(&far);
///
/// let analysis = find_connected_components(&mesh);
/// assert_eq!(analysis.component_count(), 2);
/// assert_eq!(analysis.face_counts, vec![8, 2]);
/// ```
#[must_use]
pub fn find_connected_components(mesh: &Mesh) -> ComponentAnalysis {
    let adjacency = MeshAdjacency::build(&mesh.faces);
    let face_count = mesh.faces.len();

    let mut face_labels = vec![usize::MAX; face_count];
    let mut face_counts = Vec::new();
    let mut areas = Vec::new();
    let mut queue = VecDeque::new();

    for seed in 0..face_count {
        if face_labels[seed] != usize::MAX {
            continue;
        }
        let label = face_counts.len();
        face_labels[seed] = label;
        queue.push_back(seed);

        let mut count = 0;
        let mut area = 0.0;
        while let Some(face) = queue.pop_front() {
            count += 1;
            area += mesh.face_area(mesh.faces[face]);
            for neighbor in adjacency.face_neighbors(&mesh.faces, face) {
                if face_labels[neighbor] == usize::MAX {
                    face_labels[neighbor] = label;
                    queue.push_back(neighbor);
                }
            }
        }
        face_counts.push(count);
        areas.push(area);
    }

    debug!(components = face_counts.len(), faces = face_count, "Labelled connected components");

    ComponentAnalysis {
        face_labels,
        face_counts,
        areas,
    }
}

/// Result of keeping a single component.
#[derive(Debug, Clone)]
pub struct ComponentSelection {
    /// The mesh holding only the kept component.
    pub mesh: Mesh,
    /// Components present in the input.
    pub components_found: usize,
    /// Faces dropped with the other components.
    pub faces_removed: usize,
}

/// Keep only the largest edge-connected component.
///
/// Vertices no longer referenced by a face are removed. A mesh without
/// faces comes back empty.
#[must_use]
pub fn keep_largest_component(mesh: &Mesh, metric: ComponentMetric) -> ComponentSelection {
    let analysis = find_connected_components(mesh);
    let Some(largest) = analysis.largest(metric) else {
        return ComponentSelection {
            mesh: Mesh::new(),
            components_found: 0,
            faces_removed: 0,
        };
    };

    let keep: Vec<bool> = analysis.face_labels.iter().map(|&l| l == largest).collect();
    let kept = mesh.retain_faces(&keep);

    ComponentSelection {
        faces_removed: mesh.faces.len() - kept.faces.len(),
        components_found: analysis.component_count(),
        mesh: kept,
    }
}
