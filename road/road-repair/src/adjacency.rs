//! Mesh adjacency data structures.
//!
//! Provides efficient lookups for edge-to-face and vertex-to-face relationships.

use hashbrown::HashMap;

/// Adjacency information for a face list.
///
/// Provides efficient lookups for:
/// - Faces adjacent to an edge
/// - Faces adjacent to a vertex
/// - Boundary edges (edges with only one adjacent face)
/// - Non-manifold edges (edges with more than two adjacent faces)
#[derive(Debug, Clone)]
pub struct MeshAdjacency {
    /// Maps edge (v0, v1) to list of face indices. v0 < v1.
    edge_to_faces: HashMap<(u32, u32), Vec<usize>>,
    /// Maps vertex index to list of face indices.
    vertex_to_faces: HashMap<u32, Vec<usize>>,
}

impl MeshAdjacency {
    /// Build adjacency information from a list of faces.
    ///
    /// # Example
    ///
    /// ```
    /// use road_repair::MeshAdjacency;
    ///
    /// let faces = vec![[0, 1, 2], [1, 3, 2]];
    /// let adj = MeshAdjacency::build(&faces);
    ///
    /// assert_eq!(adj.boundary_edge_count(), 4);
    /// assert_eq!(adj.face_neighbors(&faces, 0), vec![1]);
    /// ```
    #[must_use]
    pub fn build(faces: &[[u32; 3]]) -> Self {
        let mut edge_to_faces: HashMap<(u32, u32), Vec<usize>> = HashMap::with_capacity(faces.len() * 3 / 2);
        let mut vertex_to_faces: HashMap<u32, Vec<usize>> = HashMap::with_capacity(faces.len() / 2);

        for (face_idx, face) in faces.iter().enumerate() {
            for &v in face {
                vertex_to_faces.entry(v).or_default().push(face_idx);
            }
            for edge in face_edges(*face) {
                edge_to_faces.entry(normalize_edge(edge.0, edge.1)).or_default().push(face_idx);
            }
        }

        Self {
            edge_to_faces,
            vertex_to_faces,
        }
    }

    /// Get faces adjacent to an edge.
    ///
    /// Returns `None` if the edge doesn't exist in the mesh.
    #[must_use]
    pub fn faces_for_edge(&self, v0: u32, v1: u32) -> Option<&[usize]> {
        self.edge_to_faces.get(&normalize_edge(v0, v1)).map(Vec::as_slice)
    }

    /// Get faces adjacent to a vertex.
    ///
    /// Returns an empty slice if the vertex has no adjacent faces.
    #[must_use]
    pub fn faces_for_vertex(&self, v: u32) -> &[usize] {
        self.vertex_to_faces.get(&v).map_or(&[], Vec::as_slice)
    }

    /// Faces sharing at least one edge with `face_idx`, sorted and deduplicated.
    #[must_use]
    pub fn face_neighbors(&self, faces: &[[u32; 3]], face_idx: usize) -> Vec<usize> {
        let mut neighbors: Vec<usize> = face_edges(faces[face_idx])
            .into_iter()
            .filter_map(|(a, b)| self.faces_for_edge(a, b))
            .flatten()
            .copied()
            .filter(|&f| f != face_idx)
            .collect();
        neighbors.sort_unstable();
        neighbors.dedup();
        neighbors
    }

    /// Iterate over every edge with its adjacent faces.
    pub fn edges(&self) -> impl Iterator<Item = ((u32, u32), &[usize])> + '_ {
        self.edge_to_faces.iter().map(|(&edge, faces)| (edge, faces.as_slice()))
    }

    /// Iterate over all boundary edges (edges with exactly one adjacent face).
    ///
    /// Boundary edges indicate holes in the mesh surface.
    pub fn boundary_edges(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.edge_to_faces
            .iter()
            .filter(|(_, faces)| faces.len() == 1)
            .map(|(&edge, _)| edge)
    }

    /// Count the number of boundary edges.
    #[must_use]
    pub fn boundary_edge_count(&self) -> usize {
        self.edge_to_faces.values().filter(|faces| faces.len() == 1).count()
    }

    /// Iterate over all non-manifold edges (edges with more than two adjacent faces).
    pub fn non_manifold_edges(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.edge_to_faces
            .iter()
            .filter(|(_, faces)| faces.len() > 2)
            .map(|(&edge, _)| edge)
    }

    /// Count the number of non-manifold edges.
    #[must_use]
    pub fn non_manifold_edge_count(&self) -> usize {
        self.edge_to_faces.values().filter(|faces| faces.len() > 2).count()
    }

    /// Check if the mesh is manifold (all edges have at most 2 adjacent faces).
    #[must_use]
    pub fn is_manifold(&self) -> bool {
        self.edge_to_faces.values().all(|faces| faces.len() <= 2)
    }

    /// Check if the mesh is watertight (no boundary edges).
    #[must_use]
    pub fn is_watertight(&self) -> bool {
        self.edge_to_faces.values().all(|faces| faces.len() >= 2)
    }

    /// Get the total number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edge_to_faces.len()
    }

    /// Get the number of vertices referenced by at least one face.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertex_to_faces.len()
    }
}

/// The three directed edges of a face, in winding order.
#[inline]
pub(crate) const fn face_edges(face: [u32; 3]) -> [(u32, u32); 3] {
    [(face[0], face[1]), (face[1], face[2]), (face[2], face[0])]
}

/// Normalize edge direction so v0 < v1.
#[inline]
pub(crate) const fn normalize_edge(v0: u32, v1: u32) -> (u32, u32) {
    if v0 < v1 { (v0, v1) } else { (v1, v0) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_triangles_sharing_edge() -> Vec<[u32; 3]> {
        vec![[0, 1, 2], [1, 3, 2]]
    }

    fn non_manifold_fan() -> Vec<[u32; 3]> {
        // Three triangles sharing the same edge (0, 1)
        vec![[0, 1, 2], [0, 1, 3], [0, 1, 4]]
    }

    #[test]
    fn build_single_triangle() {
        let adj = MeshAdjacency::build(&[[0, 1, 2]]);

        assert_eq!(adj.edge_count(), 3);
        assert_eq!(adj.vertex_count(), 3);
        assert_eq!(adj.boundary_edge_count(), 3);
        assert!(!adj.is_watertight());
    }

    #[test]
    fn faces_for_edge_and_vertex() {
        let adj = MeshAdjacency::build(&two_triangles_sharing_edge());

        assert_eq!(adj.faces_for_edge(1, 2).map(<[usize]>::len), Some(2));
        assert_eq!(adj.faces_for_edge(2, 1), adj.faces_for_edge(1, 2));
        assert_eq!(adj.faces_for_edge(0, 1).map(<[usize]>::len), Some(1));
        assert!(adj.faces_for_edge(0, 5).is_none());

        assert_eq!(adj.faces_for_vertex(2).len(), 2);
        assert_eq!(adj.faces_for_vertex(0).len(), 1);
        assert!(adj.faces_for_vertex(99).is_empty());
    }

    #[test]
    fn neighbors_ignore_vertex_only_contact() {
        // Faces 0 and 1 share edge (1, 2); face 2 touches face 0 only at vertex 0
        let faces = vec![[0, 1, 2], [1, 3, 2], [0, 5, 4]];
        let adj = MeshAdjacency::build(&faces);

        assert_eq!(adj.face_neighbors(&faces, 0), vec![1]);
        assert!(adj.face_neighbors(&faces, 2).is_empty());
    }

    #[test]
    fn non_manifold_detection() {
        let faces = non_manifold_fan();
        let adj = MeshAdjacency::build(&faces);

        assert_eq!(adj.non_manifold_edge_count(), 1);
        assert_eq!(adj.non_manifold_edges().collect::<Vec<_>>(), vec![(0, 1)]);
        assert!(!adj.is_manifold());
        assert_eq!(adj.face_neighbors(&faces, 0), vec![1, 2]);
    }

    #[test]
    fn manifold_mesh() {
        let adj = MeshAdjacency::build(&two_triangles_sharing_edge());
        assert!(adj.is_manifold());
        assert_eq!(adj.boundary_edge_count(), 4);
    }
}
