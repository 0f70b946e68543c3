//! Density-guided filtering with ground protection.
//!
//! Capture noise (flying debris, ghosting around moving objects) is sparse
//! compared to the scanned surface, so a statistical outlier test removes
//! most of it. The same test would also punch holes wherever the road
//! itself was sampled thinly, so vertices in the ground band are always
//! kept.

use nalgebra::Vector3;
use road_types::{Mesh, MeshBounds, PointCloud, UpAxis};
use tracing::{info, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{CleanError, CleanResult, CleanWarning};
use crate::outlier::{statistical_outliers, OutlierParams};

/// Parameters for [`density_filter`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DensityFilterParams {
    /// Growth of the truth-mask box below its minimum corner.
    pub margin_below: Vector3<f64>,
    /// Growth of the truth-mask box above its maximum corner.
    pub margin_above: Vector3<f64>,
    /// Outlier test settings.
    pub outliers: OutlierParams,
    /// Vertices lower than this are never removed.
    pub ground_height: f64,
    /// Up axis.
    pub up: UpAxis,
}

impl Default for DensityFilterParams {
    fn default() -> Self {
        Self {
            margin_below: Vector3::new(10.0, 2.0, 10.0),
            margin_above: Vector3::new(10.0, 15.0, 10.0),
            outliers: OutlierParams::default(),
            ground_height: 0.5,
            up: UpAxis::Y,
        }
    }
}

impl DensityFilterParams {
    /// Crop tightly to the truth-mask box.
    #[must_use]
    pub fn without_mask_margin() -> Self {
        Self {
            margin_below: Vector3::zeros(),
            margin_above: Vector3::zeros(),
            ..Self::default()
        }
    }

    /// Sets the ground band height.
    #[must_use]
    pub const fn with_ground_height(mut self, height: f64) -> Self {
        self.ground_height = height;
        self
    }
}

/// Output of [`density_filter`].
#[derive(Debug, Clone)]
pub struct DensityFilterResult {
    /// The filtered mesh.
    pub mesh: Mesh,
    /// Vertices dropped by the truth-mask crop.
    pub cropped: usize,
    /// Vertices dropped as outliers.
    pub outliers_removed: usize,
    /// Outlier-flagged vertices kept because they lie in the ground band.
    pub ground_protected: usize,
    /// Kept vertices above the ground band dropped after losing every face.
    pub orphans_removed: usize,
    /// Conditions worked around.
    pub warnings: Vec<CleanWarning>,
}

/// Crop to the truth mask, then remove statistical outliers above the
/// ground band.
///
/// Without a mask only the outlier test runs. Faces touching a removed
/// vertex are dropped. Vertices left without a face are dropped too,
/// except in the ground band, which always survives. A mesh that had no
/// faces to begin with is treated as a point cloud and keeps its
/// unreferenced vertices.
///
/// # Errors
///
/// Returns [`CleanError::InvalidMesh`] if the mesh fails validation.
///
/// # Example
///
/// ```
/// use road_clean::{density_filter, DensityFilterParams};
/// use road_types::{grid_patch, Point3};
///
/// let mut mesh = grid_patch(10, 10, 0.5);
/// mesh.positions.push(Point3::new(2.0, 30.0, 2.0));
///
/// let result = density_filter(&mesh, None, &DensityFilterParams::default()).unwrap();
/// assert_eq!(result.outliers_removed, 1);
/// assert_eq!(result.mesh.positions.len(), 121);
/// ```
pub fn density_filter(
    mesh: &Mesh,
    mask: Option<&PointCloud>,
    params: &DensityFilterParams,
) -> CleanResult<DensityFilterResult> {
    mesh.validate()?;
    let mut warnings = Vec::new();

    let working = match mask {
        Some(mask) => match mask.bounds_opt() {
            Some(bounds) => mesh.crop(&bounds.expanded_by(params.margin_below, params.margin_above)),
            None => {
                warn!("Truth mask is empty, skipping crop");
                warnings.push(CleanWarning::EmptyMask);
                mesh.clone()
            }
        },
        None => mesh.clone(),
    };
    let cropped = mesh.positions.len() - working.positions.len();

    let verdict = statistical_outliers(&working.positions, &params.outliers);
    let mut outliers_removed = 0;
    let mut ground_protected = 0;
    let keep: Vec<bool> = working
        .positions
        .iter()
        .zip(&verdict.inliers)
        .map(|(p, &inlier)| {
            let ground = params.up.height(p) < params.ground_height;
            match (inlier, ground) {
                (true, _) => true,
                (false, true) => {
                    ground_protected += 1;
                    true
                }
                (false, false) => {
                    outliers_removed += 1;
                    false
                }
            }
        })
        .collect();

    let mut filtered = working.select_vertices(&keep);
    let orphans_removed = if working.faces.is_empty() {
        0
    } else {
        drop_orphans(&mut filtered, params)
    };
    info!(
        input = mesh.positions.len(),
        cropped,
        outliers_removed,
        ground_protected,
        orphans_removed,
        threshold = verdict.threshold,
        "Density filter"
    );

    Ok(DensityFilterResult {
        mesh: filtered,
        cropped,
        outliers_removed,
        ground_protected,
        orphans_removed,
        warnings,
    })
}

/// Drop unreferenced vertices above the ground band.
fn drop_orphans(mesh: &mut Mesh, params: &DensityFilterParams) -> usize {
    let mut keep: Vec<bool> = mesh
        .positions
        .iter()
        .map(|p| params.up.height(p) < params.ground_height)
        .collect();
    for face in &mesh.faces {
        for &i in face {
            keep[i as usize] = true;
        }
    }
    let removed = keep.iter().filter(|&&k| !k).count();
    if removed > 0 {
        *mesh = mesh.select_vertices(&keep);
    }
    removed
}
