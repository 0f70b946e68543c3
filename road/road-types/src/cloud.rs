//! Point clouds with optional normals and colors.

use std::collections::BTreeMap;

use crate::{Aabb, Mesh, MeshBounds, MeshTopology, RigidTransform, VertexColor};
use nalgebra::{Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A set of points with optional parallel normals and colors.
///
/// Used as the working representation for filtering and registration,
/// and for truth masks loaded from disk.
///
/// # Example
///
/// ```
/// use road_types::{PointCloud, Point3};
///
/// let cloud = PointCloud::from_positions(vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(2.0, 0.0, 0.0),
/// ]);
/// assert_eq!(cloud.len(), 2);
/// assert_eq!(cloud.centroid(), Some(Point3::new(1.0, 0.0, 0.0)));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PointCloud {
    /// Point positions.
    pub points: Vec<Point3<f64>>,
    /// Optional per-point unit normals.
    pub normals: Option<Vec<Vector3<f64>>>,
    /// Optional per-point colors.
    pub colors: Option<Vec<VertexColor>>,
}

impl PointCloud {
    /// Create an empty point cloud.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            points: Vec::new(),
            normals: None,
            colors: None,
        }
    }

    /// Create a point cloud from bare positions.
    #[must_use]
    pub const fn from_positions(points: Vec<Point3<f64>>) -> Self {
        Self {
            points,
            normals: None,
            colors: None,
        }
    }

    /// Take a mesh's vertices, normals and colors.
    #[must_use]
    pub fn from_mesh(mesh: &Mesh) -> Self {
        Self {
            points: mesh.positions.clone(),
            normals: mesh.normals.clone(),
            colors: mesh.colors.clone(),
        }
    }

    /// Number of points.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the cloud has no points.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Whether normals are present.
    #[inline]
    #[must_use]
    pub const fn has_normals(&self) -> bool {
        self.normals.is_some()
    }

    /// Mean position, or `None` for an empty cloud.
    #[must_use]
    pub fn centroid(&self) -> Option<Point3<f64>> {
        if self.points.is_empty() {
            return None;
        }
        let sum: Vector3<f64> = self.points.iter().map(|p| p.coords).sum();
        #[allow(clippy::cast_precision_loss)]
        Some(Point3::from(sum / self.points.len() as f64))
    }

    /// Apply a rigid transform in place.
    pub fn transform(&mut self, transform: &RigidTransform) {
        for p in &mut self.points {
            *p = transform.apply_point(p);
        }
        if let Some(normals) = &mut self.normals {
            for n in normals {
                *n = transform.apply_vector(n);
            }
        }
    }

    /// Subset of the cloud at the given indices, in that order.
    ///
    /// Indices past the end are ignored.
    #[must_use]
    pub fn select(&self, indices: &[usize]) -> Self {
        let valid: Vec<usize> = indices.iter().copied().filter(|&i| i < self.points.len()).collect();
        Self {
            points: valid.iter().map(|&i| self.points[i]).collect(),
            normals: self.normals.as_ref().map(|n| valid.iter().map(|&i| n[i]).collect()),
            colors: self.colors.as_ref().map(|c| valid.iter().map(|&i| c[i]).collect()),
        }
    }

    /// Average the points that fall into each cubic voxel.
    ///
    /// Normals are averaged and renormalized; colors are averaged. Output
    /// order follows voxel coordinates, so the result is deterministic.
    /// A non-positive voxel size returns a copy.
    ///
    /// # Example
    ///
    /// ```
    /// use road_types::{PointCloud, Point3};
    ///
    /// let cloud = PointCloud::from_positions(vec![
    ///     Point3::new(0.1, 0.1, 0.1),
    ///     Point3::new(0.3, 0.3, 0.3),
    ///     Point3::new(5.0, 5.0, 5.0),
    /// ]);
    /// let down = cloud.voxel_downsample(1.0);
    /// assert_eq!(down.len(), 2);
    /// ```
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn voxel_downsample(&self, voxel_size: f64) -> Self {
        if self.points.is_empty() || voxel_size <= 0.0 || !voxel_size.is_finite() {
            return self.clone();
        }

        #[derive(Default)]
        struct Cell {
            position: Vector3<f64>,
            normal: Vector3<f64>,
            color: [u64; 3],
            count: usize,
        }

        let mut voxels: BTreeMap<(i64, i64, i64), Cell> = BTreeMap::new();
        for (i, p) in self.points.iter().enumerate() {
            let key = (
                (p.x / voxel_size).floor() as i64,
                (p.y / voxel_size).floor() as i64,
                (p.z / voxel_size).floor() as i64,
            );
            let cell = voxels.entry(key).or_default();
            cell.position += p.coords;
            if let Some(normals) = &self.normals {
                cell.normal += normals[i];
            }
            if let Some(colors) = &self.colors {
                let c = colors[i];
                cell.color[0] += u64::from(c.r);
                cell.color[1] += u64::from(c.g);
                cell.color[2] += u64::from(c.b);
            }
            cell.count += 1;
        }

        let mut out = Self {
            points: Vec::with_capacity(voxels.len()),
            normals: self.normals.as_ref().map(|_| Vec::with_capacity(voxels.len())),
            colors: self.colors.as_ref().map(|_| Vec::with_capacity(voxels.len())),
        };
        for cell in voxels.into_values() {
            #[allow(clippy::cast_precision_loss)]
            let n = cell.count as f64;
            out.points.push(Point3::from(cell.position / n));
            if let Some(normals) = &mut out.normals {
                normals.push(cell.normal.try_normalize(f64::EPSILON).unwrap_or_else(Vector3::zeros));
            }
            if let Some(colors) = &mut out.colors {
                let count = cell.count as u64;
                colors.push(VertexColor::new(
                    (cell.color[0] / count) as u8,
                    (cell.color[1] / count) as u8,
                    (cell.color[2] / count) as u8,
                ));
            }
        }
        out
    }
}

impl MeshTopology for PointCloud {
    fn vertex_count(&self) -> usize {
        self.points.len()
    }

    fn face_count(&self) -> usize {
        0
    }

    fn positions(&self) -> impl Iterator<Item = &Point3<f64>> {
        self.points.iter()
    }
}

impl MeshBounds for PointCloud {
    fn bounds(&self) -> Aabb {
        Aabb::from_points(self.points.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn downsample_averages_attributes() {
        let cloud = PointCloud {
            points: vec![Point3::new(0.1, 0.0, 0.0), Point3::new(0.3, 0.0, 0.0)],
            normals: Some(vec![Vector3::y(), Vector3::y()]),
            colors: Some(vec![VertexColor::new(0, 0, 0), VertexColor::new(100, 200, 50)]),
        };
        let down = cloud.voxel_downsample(1.0);

        assert_eq!(down.len(), 1);
        assert_relative_eq!(down.points[0].x, 0.2, epsilon = 1e-12);
        assert_relative_eq!(down.normals.as_ref().expect("normals")[0].y, 1.0);
        assert_eq!(down.colors.as_ref().expect("colors")[0], VertexColor::new(50, 100, 25));
    }

    #[test]
    fn select_skips_bad_indices() {
        let cloud = PointCloud::from_positions(vec![Point3::origin(), Point3::new(1.0, 1.0, 1.0)]);
        let subset = cloud.select(&[1, 9]);
        assert_eq!(subset.len(), 1);
        assert_eq!(subset.points[0], Point3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn empty_cloud_has_no_centroid() {
        assert!(PointCloud::new().centroid().is_none());
        assert!(PointCloud::new().bounds_opt().is_none());
    }
}
