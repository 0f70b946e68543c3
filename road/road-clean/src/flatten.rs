//! Road flattening.
//!
//! Residual ripple on the drivable surface is projected away: a plane is
//! fit to the ground band and every ground vertex is moved onto it along
//! the plane normal. Structure above the band is left alone.

use road_transform::{ransac_plane, Plane, RansacConfig};
use road_types::{Mesh, Point3, UpAxis};
use tracing::{info, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::CleanWarning;

/// Parameters for [`flatten_road`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FlattenParams {
    /// Vertices lower than this are ground (default: 0.5).
    pub ground_height: f64,
    /// Minimum ground vertices needed to fit a plane (default: 100).
    pub min_samples: usize,
    /// RANSAC inlier distance (default: 0.05).
    pub distance_threshold: f64,
    /// RANSAC iterations (default: 1000).
    pub iterations: usize,
    /// Up axis.
    pub up: UpAxis,
    /// RANSAC seed.
    pub seed: u64,
}

impl Default for FlattenParams {
    fn default() -> Self {
        Self {
            ground_height: 0.5,
            min_samples: 100,
            distance_threshold: 0.05,
            iterations: 1000,
            up: UpAxis::Y,
            seed: 42,
        }
    }
}

/// What [`flatten_road`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum FlattenOutcome {
    /// Ground vertices were projected onto the fitted plane.
    Flattened {
        /// The road plane.
        plane: Plane,
        /// Vertices moved.
        projected: usize,
    },
    /// Not enough ground to fit a plane safely.
    TooFewSamples {
        /// Ground vertices found.
        found: usize,
        /// Minimum required.
        required: usize,
    },
    /// Plane fitting failed.
    FitFailed {
        /// Description of the failure.
        reason: String,
    },
}

impl FlattenOutcome {
    /// The warning to record when flattening was skipped.
    #[must_use]
    pub fn warning(&self) -> Option<CleanWarning> {
        match self {
            Self::Flattened { .. } => None,
            Self::TooFewSamples { found, required } => Some(CleanWarning::TooFewGroundSamples {
                found: *found,
                required: *required,
            }),
            Self::FitFailed { reason } => Some(CleanWarning::PlaneFitFailed { reason: reason.clone() }),
        }
    }
}

/// Project the ground band onto its best-fit plane.
///
/// Normals are recomputed when any vertex moved.
///
/// # Example
///
/// ```
/// use road_clean::{flatten_road, FlattenOutcome, FlattenParams};
/// use road_types::grid_patch;
///
/// let mut mesh = grid_patch(20, 20, 0.25);
/// for (i, p) in mesh.positions.iter_mut().enumerate() {
///     p.y = 0.2 + if i % 2 == 0 { 0.01 } else { -0.01 };
/// }
///
/// let outcome = flatten_road(&mut mesh, &FlattenParams::default());
/// assert!(matches!(outcome, FlattenOutcome::Flattened { projected: 441, .. }));
/// assert!(mesh.positions.iter().all(|p| (p.y - 0.2).abs() < 0.011));
/// ```
pub fn flatten_road(mesh: &mut Mesh, params: &FlattenParams) -> FlattenOutcome {
    let ground: Vec<usize> = (0..mesh.positions.len())
        .filter(|&i| params.up.height(&mesh.positions[i]) < params.ground_height)
        .collect();

    if ground.len() < params.min_samples {
        warn!(found = ground.len(), required = params.min_samples, "Too few ground vertices to flatten");
        return FlattenOutcome::TooFewSamples {
            found: ground.len(),
            required: params.min_samples,
        };
    }

    let samples: Vec<Point3<f64>> = ground.iter().map(|&i| mesh.positions[i]).collect();
    let config = RansacConfig::new()
        .with_inlier_threshold(params.distance_threshold)
        .with_max_iterations(params.iterations)
        .with_seed(params.seed);
    let plane = match ransac_plane(&samples, &config) {
        Ok(fit) => fit.plane.facing_up(params.up),
        Err(e) => {
            warn!(error = %e, "Road plane fit failed");
            return FlattenOutcome::FitFailed { reason: e.to_string() };
        }
    };

    for &i in &ground {
        mesh.positions[i] = plane.project(&mesh.positions[i]);
    }
    if !mesh.faces.is_empty() {
        mesh.compute_vertex_normals();
    }

    info!(projected = ground.len(), flatness = plane.flatness(params.up), "Flattened road");
    FlattenOutcome::Flattened {
        plane,
        projected: ground.len(),
    }
}
