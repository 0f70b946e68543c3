//! Laplacian and Taubin mesh smoothing.
//!
//! Laplacian smoothing moves each vertex toward the centroid of its
//! neighbors:
//!
//! ```text
//! v_new = v + lambda * (centroid(N(v)) - v)
//! ```
//!
//! It is simple and fast but shrinks the mesh over many iterations.
//! Taubin smoothing follows every such step with an inflating step of
//! factor `mu < 0`, which cancels most of the shrinkage.
//!
//! Border vertices of an open surface are smoothed along the border only,
//! using their border neighbors, so a road edge is straightened rather
//! than pulled inward.
//!
//! # Reference
//!
//! Taubin, G. (1995). "A signal processing approach to fair surface design"
//! Proceedings of SIGGRAPH 1995.

use nalgebra::Vector3;
use road_repair::MeshAdjacency;
use road_types::Mesh;
use tracing::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Smoothing kernel.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "method", rename_all = "snake_case"))]
pub enum SmoothingMethod {
    /// Plain Laplacian steps.
    Laplacian,
    /// Alternating shrink and inflate steps.
    Taubin {
        /// Inflation factor, negative with slightly larger magnitude than
        /// lambda (typically -0.53).
        mu: f64,
    },
}

/// Parameters for [`smooth_mesh`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SmoothParams {
    /// Kernel (default: Laplacian).
    pub method: SmoothingMethod,
    /// Iterations (default: 5).
    pub iterations: u32,
    /// Step factor in (0, 1] (default: 0.5).
    pub lambda: f64,
    /// Pin border vertices instead of smoothing them along the border
    /// (default: false).
    pub pin_boundary: bool,
}

impl Default for SmoothParams {
    fn default() -> Self {
        Self {
            method: SmoothingMethod::Laplacian,
            iterations: 5,
            lambda: 0.5,
            pin_boundary: false,
        }
    }
}

impl SmoothParams {
    /// Taubin smoothing with `lambda = 0.5`, `mu = -0.53`.
    #[must_use]
    pub fn taubin() -> Self {
        Self {
            method: SmoothingMethod::Taubin { mu: -0.53 },
            ..Self::default()
        }
    }

    /// Sets the number of iterations.
    #[must_use]
    pub const fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    /// Pins border vertices.
    #[must_use]
    pub const fn with_pin_boundary(mut self, pin: bool) -> Self {
        self.pin_boundary = pin;
        self
    }
}

/// Statistics of a smoothing run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SmoothSummary {
    /// Iterations performed.
    pub iterations: u32,
    /// Largest displacement of any vertex in any single step.
    pub max_displacement: f64,
}

/// Neighbor lists for smoothing. Border vertices see only border neighbors.
struct SmoothingStencil {
    neighbors: Vec<Vec<u32>>,
    pinned: Vec<bool>,
}

impl SmoothingStencil {
    fn build(mesh: &Mesh, pin_boundary: bool) -> Self {
        let n = mesh.positions.len();
        let adjacency = MeshAdjacency::build(&mesh.faces);

        let mut border_neighbors: Vec<Vec<u32>> = vec![Vec::new(); n];
        for (a, b) in adjacency.boundary_edges() {
            border_neighbors[a as usize].push(b);
            border_neighbors[b as usize].push(a);
        }

        let mut neighbors: Vec<Vec<u32>> = vec![Vec::new(); n];
        for face in &mesh.faces {
            for k in 0..3 {
                let (a, b) = (face[k], face[(k + 1) % 3]);
                neighbors[a as usize].push(b);
                neighbors[b as usize].push(a);
            }
        }

        let mut pinned = vec![false; n];
        for (i, list) in neighbors.iter_mut().enumerate() {
            if !border_neighbors[i].is_empty() {
                if pin_boundary {
                    pinned[i] = true;
                }
                *list = std::mem::take(&mut border_neighbors[i]);
            }
            list.sort_unstable();
            list.dedup();
        }

        Self { neighbors, pinned }
    }

    /// One step with factor `lambda`. Returns the largest displacement.
    fn step(&self, positions: &mut [nalgebra::Point3<f64>], lambda: f64) -> f64 {
        let displacements: Vec<Vector3<f64>> = positions
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let list = &self.neighbors[i];
                if self.pinned[i] || list.is_empty() {
                    return Vector3::zeros();
                }
                let sum: Vector3<f64> = list.iter().map(|&j| positions[j as usize].coords).sum();
                #[allow(clippy::cast_precision_loss)]
                let centroid = sum / list.len() as f64;
                (centroid - p.coords) * lambda
            })
            .collect();

        let mut max_displacement = 0.0_f64;
        for (p, d) in positions.iter_mut().zip(&displacements) {
            max_displacement = max_displacement.max(d.norm());
            p.coords += d;
        }
        max_displacement
    }
}

/// Smooth a mesh in place.
///
/// Vertex normals are recomputed if the mesh carried them.
///
/// # Example
///
/// ```
/// use road_clean::{smooth_mesh, SmoothParams};
/// use road_types::grid_patch;
///
/// let mut mesh = grid_patch(6, 6, 1.0);
/// mesh.positions[24].y = 1.0; // a spike in the middle
///
/// let summary = smooth_mesh(&mut mesh, &SmoothParams::default());
/// assert_eq!(summary.iterations, 5);
/// assert!(mesh.positions[24].y < 0.2);
/// ```
pub fn smooth_mesh(mesh: &mut Mesh, params: &SmoothParams) -> SmoothSummary {
    if mesh.positions.is_empty() || mesh.faces.is_empty() || params.iterations == 0 {
        return SmoothSummary::default();
    }

    let stencil = SmoothingStencil::build(mesh, params.pin_boundary);
    let mut summary = SmoothSummary::default();

    for _ in 0..params.iterations {
        let mut moved = stencil.step(&mut mesh.positions, params.lambda);
        if let SmoothingMethod::Taubin { mu } = params.method {
            moved = moved.max(stencil.step(&mut mesh.positions, mu));
        }
        summary.iterations += 1;
        summary.max_displacement = summary.max_displacement.max(moved);
    }

    if mesh.has_normals() {
        mesh.compute_vertex_normals();
    }

    debug!(
        iterations = summary.iterations,
        max_displacement = summary.max_displacement,
        "Smoothed mesh"
    );
    summary
}
