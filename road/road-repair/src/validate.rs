//! Mesh validation and health reporting.
//!
//! Checks meshes for issues that affect the cleaning stages and the
//! final hand-off: open borders, non-manifold edges, floaters, and
//! missing vertex color.

use road_types::{Aabb, Mesh, MeshBounds};

use crate::adjacency::MeshAdjacency;
use crate::components::find_connected_components;

/// Report of mesh validation results.
#[derive(Debug, Clone, Default)]
pub struct MeshReport {
    /// Total number of vertices.
    pub vertex_count: usize,
    /// Total number of faces.
    pub face_count: usize,
    /// Total number of edges.
    pub edge_count: usize,
    /// Edge-connected components.
    pub component_count: usize,
    /// Total surface area.
    pub surface_area: f64,
    /// Bounding box, `None` for a mesh without vertices.
    pub bounds: Option<Aabb>,

    /// Number of boundary edges (edges with only one adjacent face).
    pub boundary_edge_count: usize,
    /// Number of non-manifold edges (edges with more than two adjacent faces).
    pub non_manifold_edge_count: usize,
    /// Number of degenerate faces (zero or near-zero area).
    pub degenerate_face_count: usize,
    /// Number of vertices no face refers to.
    pub unreferenced_vertex_count: usize,

    /// Whether the mesh is manifold (no non-manifold edges).
    pub is_manifold: bool,
    /// Whether per-vertex colors are present.
    pub has_colors: bool,
    /// Whether per-vertex normals are present.
    pub has_normals: bool,
}

impl MeshReport {
    /// Check if the mesh has any issues.
    ///
    /// Boundary edges are expected on an open road surface and do not
    /// count as issues.
    #[must_use]
    pub fn has_issues(&self) -> bool {
        self.non_manifold_edge_count > 0 || self.degenerate_face_count > 0 || self.unreferenced_vertex_count > 0
    }
}

impl std::fmt::Display for MeshReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Mesh Report:")?;
        writeln!(f, "  Vertices: {}", self.vertex_count)?;
        writeln!(f, "  Faces: {}", self.face_count)?;
        writeln!(f, "  Edges: {}", self.edge_count)?;
        writeln!(f, "  Components: {}", self.component_count)?;
        writeln!(f, "  Surface area: {:.3}", self.surface_area)?;
        if let Some(bounds) = &self.bounds {
            writeln!(
                f,
                "  Bounds: [{:.3}, {:.3}, {:.3}] .. [{:.3}, {:.3}, {:.3}]",
                bounds.min.x, bounds.min.y, bounds.min.z, bounds.max.x, bounds.max.y, bounds.max.z
            )?;
        }
        writeln!(f)?;
        writeln!(f, "  Attributes:")?;
        writeln!(f, "    Colors: {}", if self.has_colors { "Yes" } else { "No" })?;
        writeln!(f, "    Normals: {}", if self.has_normals { "Yes" } else { "No" })?;
        writeln!(f, "    Manifold: {}", if self.is_manifold { "Yes" } else { "No" })?;
        writeln!(f, "    Boundary edges: {}", self.boundary_edge_count)?;

        if self.has_issues() {
            writeln!(f)?;
            writeln!(f, "  Issues:")?;
            if self.non_manifold_edge_count > 0 {
                writeln!(f, "    Non-manifold edges: {}", self.non_manifold_edge_count)?;
            }
            if self.degenerate_face_count > 0 {
                writeln!(f, "    Degenerate faces: {}", self.degenerate_face_count)?;
            }
            if self.unreferenced_vertex_count > 0 {
                writeln!(f, "    Unreferenced vertices: {}", self.unreferenced_vertex_count)?;
            }
        }

        Ok(())
    }
}

/// Validate a mesh and return a report of any issues.
///
/// Faces must reference valid vertices; run [`Mesh::validate`] first on
/// untrusted input.
///
/// # Example
///
/// ```
/// use road_repair::validate_mesh;
/// use road_types::grid_patch;
///
/// let report = validate_mesh(&grid_patch(2, 1, 1.0));
/// assert_eq!(report.face_count, 4);
/// assert_eq!(report.boundary_edge_count, 6);
/// assert!(report.is_manifold);
/// ```
#[must_use]
pub fn validate_mesh(mesh: &Mesh) -> MeshReport {
    let adjacency = MeshAdjacency::build(&mesh.faces);
    let components = find_connected_components(mesh);

    MeshReport {
        vertex_count: mesh.positions.len(),
        face_count: mesh.faces.len(),
        edge_count: adjacency.edge_count(),
        component_count: components.component_count(),
        surface_area: mesh.surface_area(),
        bounds: mesh.bounds_opt(),
        boundary_edge_count: adjacency.boundary_edge_count(),
        non_manifold_edge_count: adjacency.non_manifold_edge_count(),
        degenerate_face_count: mesh.faces.iter().filter(|f| mesh.face_area(**f) < 1e-12).count(),
        unreferenced_vertex_count: mesh.positions.len() - adjacency.vertex_count(),
        is_manifold: adjacency.is_manifold(),
        has_colors: mesh.has_colors(),
        has_normals: mesh.has_normals(),
    }
}
