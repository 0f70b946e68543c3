//! Traits shared by meshes and point clouds.

use crate::Aabb;
use nalgebra::Point3;

/// Topology queries over an indexed geometry container.
pub trait MeshTopology {
    /// Number of vertices (or points).
    fn vertex_count(&self) -> usize;

    /// Number of triangles. Point clouds report zero.
    fn face_count(&self) -> usize;

    /// Check if there is nothing to process.
    fn is_empty(&self) -> bool {
        self.vertex_count() == 0
    }

    /// Iterate over all vertex positions.
    fn positions(&self) -> impl Iterator<Item = &Point3<f64>>;
}

/// Trait for types that can compute a bounding box.
pub trait MeshBounds {
    /// Compute the axis-aligned bounding box.
    ///
    /// Returns an empty AABB if there are no vertices.
    fn bounds(&self) -> Aabb;

    /// Compute the bounding box, returning `None` if empty.
    fn bounds_opt(&self) -> Option<Aabb> {
        let b = self.bounds();
        if b.is_empty() { None } else { Some(b) }
    }

    /// Get the center of the bounding box.
    fn center(&self) -> Point3<f64> {
        self.bounds().center()
    }
}
