//! Indexed triangle mesh with parallel per-vertex attributes.

use crate::{Aabb, MeshBounds, MeshError, MeshTopology, RigidTransform, VertexColor};
use nalgebra::{Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An indexed triangle mesh.
///
/// Positions, normals and colors are stored as parallel arrays. Faces
/// reference vertices by `u32` index.
///
/// # Invariants
///
/// - Every face index is `< positions.len()`.
/// - `normals` and `colors`, when present, have exactly `positions.len()`
///   entries.
///
/// The fields are public for cheap construction; call [`Mesh::validate`]
/// after building a mesh by hand.
///
/// # Example
///
/// ```
/// use road_types::{Mesh, MeshTopology, Point3};
///
/// let mesh = Mesh::from_parts(
///     vec![
///         Point3::new(0.0, 0.0, 0.0),
///         Point3::new(1.0, 0.0, 0.0),
///         Point3::new(0.0, 0.0, 1.0),
///     ],
///     vec![[0, 1, 2]],
/// );
///
/// assert_eq!(mesh.vertex_count(), 3);
/// assert_eq!(mesh.face_count(), 1);
/// assert!(mesh.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Mesh {
    /// Vertex positions.
    pub positions: Vec<Point3<f64>>,

    /// Optional per-vertex unit normals.
    pub normals: Option<Vec<Vector3<f64>>>,

    /// Optional per-vertex colors.
    pub colors: Option<Vec<VertexColor>>,

    /// Triangle faces as indices into the vertex arrays.
    pub faces: Vec<[u32; 3]>,
}

impl Mesh {
    /// Create a new empty mesh.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            positions: Vec::new(),
            normals: None,
            colors: None,
            faces: Vec::new(),
        }
    }

    /// Create a mesh with pre-allocated capacity.
    #[inline]
    #[must_use]
    pub fn with_capacity(vertex_count: usize, face_count: usize) -> Self {
        Self {
            positions: Vec::with_capacity(vertex_count),
            normals: None,
            colors: None,
            faces: Vec::with_capacity(face_count),
        }
    }

    /// Create an uncolored mesh from positions and faces.
    #[inline]
    #[must_use]
    pub const fn from_parts(positions: Vec<Point3<f64>>, faces: Vec<[u32; 3]>) -> Self {
        Self {
            positions,
            normals: None,
            colors: None,
            faces,
        }
    }

    /// Attach per-vertex colors.
    #[must_use]
    pub fn with_colors(mut self, colors: Vec<VertexColor>) -> Self {
        self.colors = Some(colors);
        self
    }

    /// Whether per-vertex colors are present.
    #[inline]
    #[must_use]
    pub const fn has_colors(&self) -> bool {
        self.colors.is_some()
    }

    /// Whether per-vertex normals are present.
    #[inline]
    #[must_use]
    pub const fn has_normals(&self) -> bool {
        self.normals.is_some()
    }

    /// Check the mesh invariants.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError`] for the first face index that is out of range,
    /// the first position with a NaN or infinite coordinate, or an
    /// attribute array whose length differs from the vertex count.
    pub fn validate(&self) -> Result<(), MeshError> {
        let vertex_count = self.positions.len();
        if u32::try_from(vertex_count).is_err() {
            return Err(MeshError::TooManyVertices { count: vertex_count });
        }
        if let Some(vertex) = self.positions.iter().position(|p| !p.coords.iter().all(|c| c.is_finite())) {
            return Err(MeshError::NonFinitePosition { vertex });
        }
        if let Some(normals) = &self.normals {
            if normals.len() != vertex_count {
                return Err(MeshError::AttributeLength {
                    attribute: "normals",
                    expected: vertex_count,
                    actual: normals.len(),
                });
            }
        }
        if let Some(colors) = &self.colors {
            if colors.len() != vertex_count {
                return Err(MeshError::AttributeLength {
                    attribute: "colors",
                    expected: vertex_count,
                    actual: colors.len(),
                });
            }
        }
        for (face, indices) in self.faces.iter().enumerate() {
            if let Some(&index) = indices.iter().find(|&&i| i as usize >= vertex_count) {
                return Err(MeshError::IndexOutOfRange {
                    face,
                    index,
                    vertex_count,
                });
            }
        }
        Ok(())
    }

    /// Positions of the three corners of a face.
    #[inline]
    #[must_use]
    pub fn face_positions(&self, face: [u32; 3]) -> [Point3<f64>; 3] {
        [
            self.positions[face[0] as usize],
            self.positions[face[1] as usize],
            self.positions[face[2] as usize],
        ]
    }

    /// Unnormalized face normal; its length is twice the face area.
    #[must_use]
    pub fn face_area_vector(&self, face: [u32; 3]) -> Vector3<f64> {
        let [a, b, c] = self.face_positions(face);
        (b - a).cross(&(c - a))
    }

    /// Unit normal of a face, or `None` for a degenerate face.
    #[must_use]
    pub fn face_normal(&self, face: [u32; 3]) -> Option<Vector3<f64>> {
        self.face_area_vector(face).try_normalize(f64::EPSILON)
    }

    /// Area of a face.
    #[must_use]
    pub fn face_area(&self, face: [u32; 3]) -> f64 {
        self.face_area_vector(face).norm() * 0.5
    }

    /// Total surface area.
    #[must_use]
    pub fn surface_area(&self) -> f64 {
        self.faces.iter().map(|&f| self.face_area(f)).sum()
    }

    /// Recompute per-vertex normals as area-weighted face normal sums.
    ///
    /// Vertices not referenced by any non-degenerate face get a zero normal.
    pub fn compute_vertex_normals(&mut self) {
        let mut normals = vec![Vector3::zeros(); self.positions.len()];
        for &face in &self.faces {
            let n = self.face_area_vector(face);
            for &i in &face {
                normals[i as usize] += n;
            }
        }
        for n in &mut normals {
            *n = n.try_normalize(f64::EPSILON).unwrap_or_else(Vector3::zeros);
        }
        self.normals = Some(normals);
    }

    /// Translate all vertices.
    pub fn translate(&mut self, offset: Vector3<f64>) {
        for p in &mut self.positions {
            *p += offset;
        }
    }

    /// Apply a rigid transform to positions and normals.
    pub fn transform(&mut self, transform: &RigidTransform) {
        for p in &mut self.positions {
            *p = transform.apply_point(p);
        }
        if let Some(normals) = &mut self.normals {
            for n in normals {
                *n = transform.apply_vector(n);
            }
        }
    }

    /// Return a transformed copy.
    #[must_use]
    pub fn transformed(&self, transform: &RigidTransform) -> Self {
        let mut out = self.clone();
        out.transform(transform);
        out
    }

    /// Keep exactly the flagged vertices.
    ///
    /// Faces that reference any dropped vertex are removed. Kept vertices
    /// survive even when no face references them any more.
    ///
    /// `keep` must have one entry per vertex; missing entries count as
    /// dropped.
    #[must_use]
    pub fn select_vertices(&self, keep: &[bool]) -> Self {
        let remap = build_remap(self.positions.len(), |i| keep.get(i).copied().unwrap_or(false));
        self.reindexed(&remap, |face| {
            let mut mapped = [0u32; 3];
            for (slot, &i) in mapped.iter_mut().zip(face.iter()) {
                *slot = remap[i as usize]?;
            }
            Some(mapped)
        })
    }

    /// Keep the flagged faces, then drop vertices no kept face references.
    #[must_use]
    pub fn retain_faces(&self, keep_face: &[bool]) -> Self {
        let faces: Vec<[u32; 3]> = self
            .faces
            .iter()
            .zip(keep_face.iter().chain(std::iter::repeat(&false)))
            .filter_map(|(&f, &keep)| keep.then_some(f))
            .collect();
        let mut out = Self {
            positions: self.positions.clone(),
            normals: self.normals.clone(),
            colors: self.colors.clone(),
            faces,
        };
        out.remove_unreferenced_vertices();
        out
    }

    /// Remove vertices no face references. Returns how many were removed.
    pub fn remove_unreferenced_vertices(&mut self) -> usize {
        let mut used = vec![false; self.positions.len()];
        for face in &self.faces {
            for &i in face {
                used[i as usize] = true;
            }
        }
        let removed = used.iter().filter(|&&u| !u).count();
        if removed > 0 {
            *self = self.select_vertices(&used);
        }
        removed
    }

    /// Crop to the vertices inside an axis-aligned box.
    ///
    /// Faces with any corner outside the box are removed along with
    /// their outside vertices.
    #[must_use]
    pub fn crop(&self, region: &Aabb) -> Self {
        let keep: Vec<bool> = self.positions.iter().map(|p| region.contains(p)).collect();
        self.select_vertices(&keep)
    }

    /// Append another mesh, offsetting its face indices by this mesh's
    /// vertex count.
    ///
    /// No vertices are welded. Colors survive if either side is colored;
    /// the uncolored side is filled with [`VertexColor::GREY`]. Normals
    /// survive only if both sides carry them.
    #[allow(clippy::cast_possible_truncation)]
    // Truncation: indices are u32; validate() rejects meshes beyond that range
    pub fn append(&mut self, other: &Self) {
        let offset = self.positions.len() as u32;
        let own_count = self.positions.len();

        self.colors = match (self.colors.take(), &other.colors) {
            (None, None) => None,
            (mine, theirs) => {
                let mut colors = mine.unwrap_or_else(|| vec![VertexColor::GREY; own_count]);
                match theirs {
                    Some(c) => colors.extend_from_slice(c),
                    None => colors.extend(std::iter::repeat(VertexColor::GREY).take(other.positions.len())),
                }
                Some(colors)
            }
        };
        self.normals = match (self.normals.take(), &other.normals) {
            (Some(mut mine), Some(theirs)) => {
                mine.extend_from_slice(theirs);
                Some(mine)
            }
            _ => None,
        };

        self.positions.extend_from_slice(&other.positions);
        self.faces.extend(
            other
                .faces
                .iter()
                .map(|f| [f[0] + offset, f[1] + offset, f[2] + offset]),
        );
    }

    /// Build a new mesh from a vertex remap table and a face mapper.
    fn reindexed(
        &self,
        remap: &[Option<u32>],
        map_face: impl Fn(&[u32; 3]) -> Option<[u32; 3]>,
    ) -> Self {
        let keep = |i: &usize| remap[*i].is_some();
        let positions = (0..self.positions.len())
            .filter(keep)
            .map(|i| self.positions[i])
            .collect();
        let normals = self
            .normals
            .as_ref()
            .map(|n| (0..n.len()).filter(keep).map(|i| n[i]).collect());
        let colors = self
            .colors
            .as_ref()
            .map(|c| (0..c.len()).filter(keep).map(|i| c[i]).collect());
        let faces = self.faces.iter().filter_map(map_face).collect();
        Self {
            positions,
            normals,
            colors,
            faces,
        }
    }
}

/// Map kept vertices to their new compacted index.
#[allow(clippy::cast_possible_truncation)]
fn build_remap(len: usize, keep: impl Fn(usize) -> bool) -> Vec<Option<u32>> {
    let mut next = 0u32;
    (0..len)
        .map(|i| {
            keep(i).then(|| {
                let idx = next;
                next += 1;
                idx
            })
        })
        .collect()
}

impl MeshTopology for Mesh {
    #[inline]
    fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    fn face_count(&self) -> usize {
        self.faces.len()
    }

    fn positions(&self) -> impl Iterator<Item = &Point3<f64>> {
        self.positions.iter()
    }
}

impl MeshBounds for Mesh {
    fn bounds(&self) -> Aabb {
        Aabb::from_points(self.positions.iter())
    }
}

/// A flat `nx` by `nz` grid of unit quads in the `y = 0` plane.
///
/// Handy as a synthetic road patch. Vertices are laid out row by row.
///
/// # Example
///
/// ```
/// use road_types::{grid_patch, MeshTopology};
///
/// let patch = grid_patch(4, 3, 1.0);
/// assert_eq!(patch.vertex_count(), 5 * 4);
/// assert_eq!(patch.face_count(), 4 * 3 * 2);
/// ```
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn grid_patch(nx: usize, nz: usize, spacing: f64) -> Mesh {
    let mut mesh = Mesh::with_capacity((nx + 1) * (nz + 1), nx * nz * 2);
    for k in 0..=nz {
        for i in 0..=nx {
            mesh.positions
                .push(Point3::new(i as f64 * spacing, 0.0, k as f64 * spacing));
        }
    }
    let row = (nx + 1) as u32;
    for k in 0..nz as u32 {
        for i in 0..nx as u32 {
            let a = k * row + i;
            let b = a + 1;
            let c = a + row;
            let d = c + 1;
            // Wound so face normals point along +Y
            mesh.faces.push([a, c, b]);
            mesh.faces.push([b, c, d]);
        }
    }
    mesh
}
