//! Core mesh repair operations.
//!
//! Provides functions for fixing common topology issues in scan meshes:
//! degenerate and duplicate triangles, edges shared by more than two faces,
//! and vertices whose faces form separate fans.

use hashbrown::{HashMap, HashSet};
use road_types::Mesh;
use tracing::debug;

use crate::adjacency::{face_edges, normalize_edge, MeshAdjacency};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration parameters for mesh repair operations.
///
/// # Example
///
/// ```
/// use road_repair::RepairParams;
///
/// let params = RepairParams::default().with_degenerate_area_threshold(1e-8);
/// assert!(params.split_non_manifold_vertices);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RepairParams {
    /// Minimum triangle area; smaller triangles are removed.
    /// Default: `1e-12`
    pub degenerate_area_threshold: f64,

    /// Whether to drop faces until every edge has at most two.
    /// Default: `true`
    pub remove_non_manifold_edges: bool,

    /// Whether to duplicate vertices shared by separate face fans.
    /// Default: `true`
    pub split_non_manifold_vertices: bool,

    /// Whether to remove unreferenced vertices after repair.
    /// Default: `true`
    pub remove_unreferenced: bool,
}

impl Default for RepairParams {
    fn default() -> Self {
        Self {
            degenerate_area_threshold: 1e-12,
            remove_non_manifold_edges: true,
            split_non_manifold_vertices: true,
            remove_unreferenced: true,
        }
    }
}

impl RepairParams {
    /// Set the degenerate triangle area threshold.
    #[must_use]
    pub const fn with_degenerate_area_threshold(mut self, threshold: f64) -> Self {
        self.degenerate_area_threshold = threshold;
        self
    }

    /// Enable or disable unreferenced vertex removal.
    #[must_use]
    pub const fn with_remove_unreferenced(mut self, remove: bool) -> Self {
        self.remove_unreferenced = remove;
        self
    }
}

/// Remove triangles with area below the threshold or a repeated index.
///
/// Returns the number of triangles removed.
///
/// # Example
///
/// ```
/// use road_repair::remove_degenerate_triangles;
/// use road_types::{Mesh, Point3};
///
/// let mut mesh = Mesh::from_parts(
///     vec![Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 0.0, 0.0), Point3::new(5.0, 0.0, 0.0)],
///     vec![[0, 1, 2]], // Collinear
/// );
/// assert_eq!(remove_degenerate_triangles(&mut mesh, 1e-9), 1);
/// ```
pub fn remove_degenerate_triangles(mesh: &mut Mesh, area_threshold: f64) -> usize {
    let original_count = mesh.faces.len();
    let positions = &mesh.positions;

    mesh.faces.retain(|&[a, b, c]| {
        if a == b || b == c || a == c {
            return false;
        }
        let (p0, p1, p2) = (positions[a as usize], positions[b as usize], positions[c as usize]);
        (p1 - p0).cross(&(p2 - p0)).norm() * 0.5 >= area_threshold
    });

    original_count - mesh.faces.len()
}

/// Remove duplicate faces.
///
/// Faces are duplicates if they use the same three vertices, regardless of
/// winding or starting vertex. The first occurrence is kept.
///
/// # Example
///
/// ```
/// use road_repair::remove_duplicate_faces;
/// use road_types::{Mesh, Point3};
///
/// let mut mesh = Mesh::from_parts(
///     vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 0.0, 1.0)],
///     vec![[0, 2, 1], [2, 1, 0]],
/// );
/// assert_eq!(remove_duplicate_faces(&mut mesh), 1);
/// ```
pub fn remove_duplicate_faces(mesh: &mut Mesh) -> usize {
    let original_count = mesh.faces.len();
    let mut seen: HashSet<[u32; 3]> = HashSet::with_capacity(original_count);

    mesh.faces.retain(|face| {
        let mut key = *face;
        key.sort_unstable();
        seen.insert(key)
    });

    original_count - mesh.faces.len()
}

/// Drop faces until no edge is shared by more than two.
///
/// On each over-shared edge the two largest faces stay. Removing a face
/// can only lower the count on its other edges, so a single pass is enough.
/// Returns the number of faces removed.
///
/// # Example
///
/// ```
/// use road_repair::remove_non_manifold_edges;
/// use road_types::{Mesh, Point3};
///
/// // Three fins on edge (0, 1)
/// let mut mesh = Mesh::from_parts(
///     vec![
///         Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0),
///         Point3::new(0.5, 1.0, 0.0), Point3::new(0.5, 0.0, 1.0), Point3::new(0.5, -0.2, -0.2),
///     ],
///     vec![[0, 1, 2], [1, 0, 3], [0, 1, 4]],
/// );
/// assert_eq!(remove_non_manifold_edges(&mut mesh), 1);
/// assert_eq!(mesh.faces.len(), 2);
/// ```
pub fn remove_non_manifold_edges(mesh: &mut Mesh) -> usize {
    let adjacency = MeshAdjacency::build(&mesh.faces);
    let mut removed: HashSet<usize> = HashSet::new();

    let mut edges: Vec<((u32, u32), &[usize])> = adjacency.edges().filter(|(_, f)| f.len() > 2).collect();
    // Deterministic order regardless of hash iteration
    edges.sort_unstable_by_key(|(edge, _)| *edge);

    for (_, faces) in edges {
        let mut alive: Vec<usize> = faces.iter().copied().filter(|f| !removed.contains(f)).collect();
        if alive.len() <= 2 {
            continue;
        }
        alive.sort_by(|&x, &y| {
            mesh.face_area(mesh.faces[y])
                .total_cmp(&mesh.face_area(mesh.faces[x]))
                .then(x.cmp(&y))
        });
        removed.extend(alive.into_iter().skip(2));
    }

    if removed.is_empty() {
        return 0;
    }
    let mut idx = 0;
    mesh.faces.retain(|_| {
        let keep = !removed.contains(&idx);
        idx += 1;
        keep
    });
    debug!(faces = removed.len(), "Removed faces on non-manifold edges");
    removed.len()
}

/// Duplicate each vertex whose faces form more than one edge-connected fan.
///
/// The first fan keeps the original vertex; every other fan gets a copy
/// with the same position, normal and color. Returns the number of
/// vertices added.
///
/// # Example
///
/// ```
/// use road_repair::split_non_manifold_vertices;
/// use road_types::{Mesh, Point3};
///
/// // Two triangles touching only at vertex 0 (a bow tie)
/// let mut mesh = Mesh::from_parts(
///     vec![
///         Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0), Point3::new(1.0, 0.0, 1.0),
///         Point3::new(-1.0, 0.0, 0.0), Point3::new(-1.0, 0.0, -1.0),
///     ],
///     vec![[0, 2, 1], [0, 4, 3]],
/// );
/// assert_eq!(split_non_manifold_vertices(&mut mesh), 1);
/// assert_eq!(mesh.positions.len(), 6);
/// ```
#[allow(clippy::cast_possible_truncation)]
pub fn split_non_manifold_vertices(mesh: &mut Mesh) -> usize {
    let adjacency = MeshAdjacency::build(&mesh.faces);
    let original = mesh.faces.clone();
    let vertex_count = mesh.positions.len();
    let mut added = 0;

    for v in 0..vertex_count as u32 {
        let incident = adjacency.faces_for_vertex(v);
        if incident.len() < 2 {
            continue;
        }

        // Group incident faces into fans connected through edges at v
        let mut fan_of: HashMap<usize, usize> = HashMap::with_capacity(incident.len());
        let mut fans = 0;
        for &seed in incident {
            if fan_of.contains_key(&seed) {
                continue;
            }
            let mut stack = vec![seed];
            fan_of.insert(seed, fans);
            while let Some(face) = stack.pop() {
                for (a, b) in face_edges(original[face]) {
                    if a != v && b != v {
                        continue;
                    }
                    let (lo, hi) = normalize_edge(a, b);
                    for &other in adjacency.faces_for_edge(lo, hi).unwrap_or(&[]) {
                        if let hashbrown::hash_map::Entry::Vacant(slot) = fan_of.entry(other) {
                            slot.insert(fans);
                            stack.push(other);
                        }
                    }
                }
            }
            fans += 1;
        }

        if fans < 2 {
            continue;
        }

        let mut copies: Vec<u32> = vec![v];
        for _ in 1..fans {
            copies.push(mesh.positions.len() as u32);
            mesh.positions.push(mesh.positions[v as usize]);
            if let Some(normals) = &mut mesh.normals {
                normals.push(normals[v as usize]);
            }
            if let Some(colors) = &mut mesh.colors {
                colors.push(colors[v as usize]);
            }
            added += 1;
        }
        for (&face, &fan) in &fan_of {
            if fan > 0 {
                for index in &mut mesh.faces[face] {
                    if *index == v {
                        *index = copies[fan];
                    }
                }
            }
        }
    }

    if added > 0 {
        debug!(vertices = added, "Split non-manifold vertices");
    }
    added
}

/// Run the repair pipeline on a mesh.
///
/// This performs:
/// 1. Remove degenerate triangles
/// 2. Remove duplicate faces
/// 3. Remove faces on non-manifold edges
/// 4. Split non-manifold vertices
/// 5. Remove unreferenced vertices
///
/// # Example
///
/// ```
/// use road_repair::{repair_mesh, RepairParams};
/// use road_types::grid_patch;
///
/// let mut mesh = grid_patch(3, 3, 1.0);
/// mesh.faces.push(mesh.faces[0]);
///
/// let summary = repair_mesh(&mut mesh, &RepairParams::default());
/// assert_eq!(summary.duplicates_removed, 1);
/// assert!(summary.had_changes());
/// ```
pub fn repair_mesh(mesh: &mut Mesh, params: &RepairParams) -> RepairSummary {
    let initial_vertices = mesh.positions.len();
    let initial_faces = mesh.faces.len();

    let degenerates_removed = remove_degenerate_triangles(mesh, params.degenerate_area_threshold);
    let duplicates_removed = remove_duplicate_faces(mesh);
    let non_manifold_faces_removed = if params.remove_non_manifold_edges {
        remove_non_manifold_edges(mesh)
    } else {
        0
    };
    let vertices_split = if params.split_non_manifold_vertices {
        split_non_manifold_vertices(mesh)
    } else {
        0
    };
    let unreferenced_removed = if params.remove_unreferenced {
        mesh.remove_unreferenced_vertices()
    } else {
        0
    };

    RepairSummary {
        initial_vertices,
        initial_faces,
        final_vertices: mesh.positions.len(),
        final_faces: mesh.faces.len(),
        degenerates_removed,
        duplicates_removed,
        non_manifold_faces_removed,
        vertices_split,
        unreferenced_removed,
    }
}

/// Result of a repair operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairSummary {
    /// Number of vertices before repair.
    pub initial_vertices: usize,
    /// Number of faces before repair.
    pub initial_faces: usize,
    /// Number of vertices after repair.
    pub final_vertices: usize,
    /// Number of faces after repair.
    pub final_faces: usize,
    /// Number of degenerate triangles removed.
    pub degenerates_removed: usize,
    /// Number of duplicate faces removed.
    pub duplicates_removed: usize,
    /// Number of faces removed from non-manifold edges.
    pub non_manifold_faces_removed: usize,
    /// Number of vertices added by splitting non-manifold vertices.
    pub vertices_split: usize,
    /// Number of unreferenced vertices removed.
    pub unreferenced_removed: usize,
}

impl RepairSummary {
    /// Check if any repairs were performed.
    #[must_use]
    pub fn had_changes(&self) -> bool {
        self.degenerates_removed > 0
            || self.duplicates_removed > 0
            || self.non_manifold_faces_removed > 0
            || self.vertices_split > 0
            || self.unreferenced_removed > 0
    }
}

impl std::fmt::Display for RepairSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Repair: {} verts ({} split, {} unreferenced), {} faces ({} degenerate, {} duplicate, {} non-manifold)",
            self.final_vertices,
            self.vertices_split,
            self.unreferenced_removed,
            self.final_faces,
            self.degenerates_removed,
            self.duplicates_removed,
            self.non_manifold_faces_removed
        )
    }
}
