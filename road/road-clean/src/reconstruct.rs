//! Implicit surface reconstruction from oriented points.
//!
//! The surface is the zero level set of a signed distance field sampled
//! on a regular grid. Each grid corner takes the signed distance to the
//! tangent plane of its nearest input point (Hoppe et al. 1992); corners
//! farther than the support radius from every input point stay undefined,
//! so the surface does not balloon across empty space. The level set is
//! meshed with surface nets, one vertex per sign-changing cell and one
//! quad per sign-changing grid edge.
//!
//! Every output vertex carries a density: the number of input points
//! within the support radius. Vertices below the configured density
//! quantile are trimmed, which removes the low-confidence fringe that
//! the field extrapolates past the scan borders.
//!
//! # Reference
//!
//! Hoppe, H., DeRose, T., Duchamp, T., McDonald, J., Stuetzle, W. (1992).
//! "Surface reconstruction from unorganized points". SIGGRAPH 1992.

use hashbrown::HashMap;
use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use road_transform::PointIndex;
use road_types::{Aabb, Mesh, PointCloud};
use tracing::{debug, info};

use crate::error::{CleanError, CleanResult};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Parameters for [`reconstruct_implicit`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ImplicitParams {
    /// Grid cell edge length (default: 0.25).
    pub cell_size: f64,
    /// Support radius in cells (default: 2.0).
    pub support_cells: f64,
    /// Vertices with density below this quantile are trimmed
    /// (default: 0.05). Zero disables trimming.
    pub density_quantile: f64,
    /// Upper bound on sampled grid corners (default: 2^24).
    pub max_grid_points: usize,
}

impl Default for ImplicitParams {
    fn default() -> Self {
        Self {
            cell_size: 0.25,
            support_cells: 2.0,
            density_quantile: 0.05,
            max_grid_points: 1 << 24,
        }
    }
}

impl ImplicitParams {
    /// Sets the grid cell size.
    #[must_use]
    pub const fn with_cell_size(mut self, cell_size: f64) -> Self {
        self.cell_size = cell_size;
        self
    }

    /// Sets the density trim quantile.
    #[must_use]
    pub const fn with_density_quantile(mut self, quantile: f64) -> Self {
        self.density_quantile = quantile;
        self
    }

    /// Sets the grid size limit.
    #[must_use]
    pub const fn with_max_grid_points(mut self, max: usize) -> Self {
        self.max_grid_points = max;
        self
    }

    fn support_radius(&self) -> f64 {
        self.cell_size * self.support_cells
    }
}

/// A reconstructed surface with its per-vertex density.
#[derive(Debug, Clone)]
pub struct ImplicitSurface {
    /// The uncolored surface, with vertex normals.
    pub mesh: Mesh,
    /// Input points near each vertex of `mesh`.
    pub densities: Vec<usize>,
    /// Vertices removed by density trimming.
    pub trimmed_vertices: usize,
}

impl std::fmt::Display for ImplicitSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Implicit surface: {} vertices, {} faces ({} trimmed)",
            self.mesh.positions.len(),
            self.mesh.faces.len(),
            self.trimmed_vertices
        )
    }
}

/// Sample grid of the signed distance field.
struct DistanceGrid {
    origin: Point3<f64>,
    cell: f64,
    dims: [usize; 3],
    values: Vec<f64>,
}

impl DistanceGrid {
    #[allow(clippy::cast_precision_loss)]
    fn corner(&self, i: usize, j: usize, k: usize) -> Point3<f64> {
        self.origin + Vector3::new(i as f64, j as f64, k as f64) * self.cell
    }

    const fn index(&self, i: usize, j: usize, k: usize) -> usize {
        i + self.dims[0] * (j + self.dims[1] * k)
    }

    fn value(&self, i: usize, j: usize, k: usize) -> f64 {
        self.values[self.index(i, j, k)]
    }
}

/// Padding around the data, in cells.
const PAD_CELLS: usize = 2;

/// Corner offsets of a cell, as (di, dj, dk).
const CELL_CORNERS: [[usize; 3]; 8] = [
    [0, 0, 0],
    [1, 0, 0],
    [0, 1, 0],
    [1, 1, 0],
    [0, 0, 1],
    [1, 0, 1],
    [0, 1, 1],
    [1, 1, 1],
];

/// Cell edges as pairs of corner slots in [`CELL_CORNERS`].
const CELL_EDGES: [(usize, usize); 12] = [
    (0, 1),
    (2, 3),
    (4, 5),
    (6, 7),
    (0, 2),
    (1, 3),
    (4, 6),
    (5, 7),
    (0, 4),
    (1, 5),
    (2, 6),
    (3, 7),
];

/// Reconstruct a surface from points with outward normals.
///
/// # Errors
///
/// Returns [`CleanError::Reconstruction`] if the cloud is empty, lacks
/// normals, would need more than `max_grid_points` grid corners, or
/// yields no surface.
///
/// # Example
///
/// ```
/// use road_clean::{reconstruct_implicit, ImplicitParams};
/// use road_types::{grid_patch, PointCloud};
///
/// let mut patch = grid_patch(8, 8, 0.5);
/// patch.compute_vertex_normals();
///
/// let surface = reconstruct_implicit(&PointCloud::from_mesh(&patch), &ImplicitParams::default()).unwrap();
/// assert!(!surface.mesh.faces.is_empty());
/// ```
pub fn reconstruct_implicit(cloud: &PointCloud, params: &ImplicitParams) -> CleanResult<ImplicitSurface> {
    let normals = cloud
        .normals
        .as_deref()
        .ok_or_else(|| reconstruction_error("input points have no normals"))?;
    if cloud.points.is_empty() {
        return Err(reconstruction_error("no input points"));
    }
    if normals.len() != cloud.points.len() {
        return Err(reconstruction_error("normal count does not match point count"));
    }
    if params.cell_size.is_nan() || params.cell_size <= 0.0 {
        return Err(reconstruction_error("cell size must be positive"));
    }

    let index = PointIndex::new(&cloud.points);
    let grid = sample_distance_field(&cloud.points, normals, &index, params)?;

    let mut mesh = surface_nets(&grid);
    if mesh.faces.is_empty() {
        return Err(reconstruction_error("no zero crossing in the distance field"));
    }

    let support = params.support_radius();
    let mut densities: Vec<usize> = mesh
        .positions
        .par_iter()
        .map(|p| index.within(p, support).len())
        .collect();

    let trimmed_vertices = trim_low_density(&mut mesh, &mut densities, params.density_quantile);
    if mesh.faces.is_empty() {
        return Err(reconstruction_error("density trimming removed the whole surface"));
    }
    mesh.compute_vertex_normals();

    info!(
        vertices = mesh.positions.len(),
        faces = mesh.faces.len(),
        trimmed = trimmed_vertices,
        "Reconstructed implicit surface"
    );

    Ok(ImplicitSurface {
        mesh,
        densities,
        trimmed_vertices,
    })
}

fn reconstruction_error(reason: &str) -> CleanError {
    CleanError::Reconstruction {
        reason: reason.to_string(),
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn sample_distance_field(
    points: &[Point3<f64>],
    normals: &[Vector3<f64>],
    index: &PointIndex,
    params: &ImplicitParams,
) -> CleanResult<DistanceGrid> {
    let bounds = Aabb::from_points(points.iter());
    let cell = params.cell_size;
    let origin = bounds.min - Vector3::repeat(cell * PAD_CELLS as f64);
    let size = bounds.size();

    let mut dims = [0usize; 3];
    for (axis, dim) in dims.iter_mut().enumerate() {
        *dim = (size[axis] / cell).ceil() as usize + 2 * PAD_CELLS + 1;
    }
    let total = dims
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .filter(|&t| t <= params.max_grid_points)
        .ok_or_else(|| {
            CleanError::Reconstruction {
                reason: format!(
                    "grid of {}x{}x{} corners exceeds the limit of {}",
                    dims[0], dims[1], dims[2], params.max_grid_points
                ),
            }
        })?;

    debug!(dims = ?dims, corners = total, "Sampling distance field");

    let support_sq = params.support_radius().powi(2);
    let mut grid = DistanceGrid {
        origin,
        cell,
        dims,
        values: Vec::new(),
    };
    let values = (0..total)
        .into_par_iter()
        .map(|flat| {
            let i = flat % dims[0];
            let j = (flat / dims[0]) % dims[1];
            let k = flat / (dims[0] * dims[1]);
            let corner = grid.corner(i, j, k);
            match index.nearest(&corner) {
                Some(hit) if hit.distance_sq <= support_sq => normals[hit.index].dot(&(corner - points[hit.index])),
                _ => f64::NAN,
            }
        })
        .collect();
    grid.values = values;
    Ok(grid)
}

/// Mesh the zero level set.
#[allow(clippy::cast_possible_truncation)]
fn surface_nets(grid: &DistanceGrid) -> Mesh {
    let [nx, ny, nz] = grid.dims;
    let mut mesh = Mesh::new();
    let mut cell_vertex: HashMap<[usize; 3], u32> = HashMap::new();

    for k in 0..nz - 1 {
        for j in 0..ny - 1 {
            for i in 0..nx - 1 {
                if let Some(p) = cell_vertex_position(grid, i, j, k) {
                    cell_vertex.insert([i, j, k], mesh.positions.len() as u32);
                    mesh.positions.push(p);
                }
            }
        }
    }

    let lookup = |c: [Option<usize>; 3]| -> Option<u32> {
        let key = [c[0]?, c[1]?, c[2]?];
        cell_vertex.get(&key).copied()
    };
    let below = |v: usize| v.checked_sub(1);

    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let s0 = grid.value(i, j, k);
                if s0.is_nan() {
                    continue;
                }
                // One quad per sign-changing edge along +x, +y and +z
                for axis in 0..3 {
                    let (ni, nj, nk) = match axis {
                        0 => (i + 1, j, k),
                        1 => (i, j + 1, k),
                        _ => (i, j, k + 1),
                    };
                    if ni >= nx || nj >= ny || nk >= nz {
                        continue;
                    }
                    let s1 = grid.value(ni, nj, nk);
                    if s1.is_nan() || (s0 < 0.0) == (s1 < 0.0) {
                        continue;
                    }
                    let ring = match axis {
                        0 => [
                            [Some(i), below(j), below(k)],
                            [Some(i), Some(j), below(k)],
                            [Some(i), Some(j), Some(k)],
                            [Some(i), below(j), Some(k)],
                        ],
                        1 => [
                            [below(i), Some(j), below(k)],
                            [below(i), Some(j), Some(k)],
                            [Some(i), Some(j), Some(k)],
                            [Some(i), Some(j), below(k)],
                        ],
                        _ => [
                            [below(i), below(j), Some(k)],
                            [Some(i), below(j), Some(k)],
                            [Some(i), Some(j), Some(k)],
                            [below(i), Some(j), Some(k)],
                        ],
                    };
                    let (Some(a), Some(b), Some(c), Some(d)) =
                        (lookup(ring[0]), lookup(ring[1]), lookup(ring[2]), lookup(ring[3]))
                    else {
                        continue;
                    };
                    // Ring order faces +axis; flip when the field falls along it
                    if s0 < 0.0 {
                        mesh.faces.push([a, b, c]);
                        mesh.faces.push([a, c, d]);
                    } else {
                        mesh.faces.push([a, c, b]);
                        mesh.faces.push([a, d, c]);
                    }
                }
            }
        }
    }

    mesh
}

/// Mean of the zero crossings on the edges of a cell, if any.
fn cell_vertex_position(grid: &DistanceGrid, i: usize, j: usize, k: usize) -> Option<Point3<f64>> {
    let mut values = [0.0; 8];
    for (slot, offset) in values.iter_mut().zip(&CELL_CORNERS) {
        let v = grid.value(i + offset[0], j + offset[1], k + offset[2]);
        if v.is_nan() {
            return None;
        }
        *slot = v;
    }

    let mut sum = Vector3::zeros();
    let mut crossings = 0u32;
    for &(a, b) in &CELL_EDGES {
        let (sa, sb) = (values[a], values[b]);
        if (sa < 0.0) == (sb < 0.0) {
            continue;
        }
        let t = sa / (sa - sb);
        let pa = grid.corner(i + CELL_CORNERS[a][0], j + CELL_CORNERS[a][1], k + CELL_CORNERS[a][2]);
        let pb = grid.corner(i + CELL_CORNERS[b][0], j + CELL_CORNERS[b][1], k + CELL_CORNERS[b][2]);
        sum += pa.coords + (pb - pa) * t;
        crossings += 1;
    }

    (crossings > 0).then(|| Point3::from(sum / f64::from(crossings)))
}

/// Drop vertices whose density falls below the `quantile` of all densities.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn trim_low_density(mesh: &mut Mesh, densities: &mut Vec<usize>, quantile: f64) -> usize {
    if quantile <= 0.0 || densities.is_empty() {
        return 0;
    }
    let mut sorted = densities.clone();
    sorted.sort_unstable();
    let rank = ((sorted.len() - 1) as f64 * quantile.min(1.0)).floor() as usize;
    let threshold = sorted[rank];

    let keep: Vec<bool> = densities.iter().map(|&d| d >= threshold).collect();
    let before = mesh.positions.len();

    // Track densities through the reindexing by selecting in the same order
    let mut kept_densities: Vec<usize> = densities
        .iter()
        .zip(&keep)
        .filter_map(|(&d, &k)| k.then_some(d))
        .collect();
    let mut trimmed = mesh.select_vertices(&keep);

    let mut referenced = vec![false; trimmed.positions.len()];
    for face in &trimmed.faces {
        for &v in face {
            referenced[v as usize] = true;
        }
    }
    if referenced.iter().any(|&r| !r) {
        kept_densities = kept_densities
            .iter()
            .zip(&referenced)
            .filter_map(|(&d, &r)| r.then_some(d))
            .collect();
        trimmed = trimmed.select_vertices(&referenced);
    }

    *mesh = trimmed;
    *densities = kept_densities;
    before - mesh.positions.len()
}
