//! Statistical outlier detection.
//!
//! # Algorithm
//!
//! For each point:
//! 1. Find the k nearest neighbors (the point itself included)
//! 2. Compute the mean distance to those neighbors
//! 3. Compute the global mean and standard deviation of mean distances
//! 4. Flag points where mean distance > `global_mean + std_ratio * std_dev`

use rayon::prelude::*;
use road_transform::PointIndex;
use road_types::Point3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Parameters for statistical outlier detection.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct OutlierParams {
    /// Number of neighbors to consider. Default: 20.
    pub k_neighbors: usize,

    /// Standard deviation multiplier for outlier threshold. Default: 2.0.
    pub std_ratio: f64,
}

impl Default for OutlierParams {
    fn default() -> Self {
        Self {
            k_neighbors: 20,
            std_ratio: 2.0,
        }
    }
}

impl OutlierParams {
    /// Sets the number of neighbors to consider.
    #[must_use]
    pub const fn with_k_neighbors(mut self, k: usize) -> Self {
        self.k_neighbors = k;
        self
    }

    /// Sets the standard deviation multiplier.
    #[must_use]
    pub const fn with_std_ratio(mut self, ratio: f64) -> Self {
        self.std_ratio = ratio;
        self
    }
}

/// Per-point verdict of the outlier test.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlierMask {
    /// `true` for points that pass.
    pub inliers: Vec<bool>,
    /// Mean-distance threshold used.
    pub threshold: f64,
}

impl OutlierMask {
    /// Number of flagged points.
    #[must_use]
    pub fn outlier_count(&self) -> usize {
        self.inliers.iter().filter(|keep| !**keep).count()
    }
}

/// Flag statistical outliers.
///
/// Clouds with fewer than two points pass unchanged.
///
/// # Example
///
/// ```
/// use road_clean::{statistical_outliers, OutlierParams};
/// use road_types::{grid_patch, Point3};
///
/// let mut points = grid_patch(10, 10, 0.5).positions;
/// points.push(Point3::new(2.5, 40.0, 2.5));
///
/// let mask = statistical_outliers(&points, &OutlierParams::default());
/// assert!(!mask.inliers[points.len() - 1]);
/// assert_eq!(mask.outlier_count(), 1);
/// ```
#[must_use]
pub fn statistical_outliers(points: &[Point3<f64>], params: &OutlierParams) -> OutlierMask {
    if points.len() < 2 || params.k_neighbors == 0 {
        return OutlierMask {
            inliers: vec![true; points.len()],
            threshold: f64::INFINITY,
        };
    }

    let index = PointIndex::new(points);
    let mean_distances: Vec<f64> = points
        .par_iter()
        .map(|p| {
            let neighbors = index.nearest_n(p, params.k_neighbors);
            #[allow(clippy::cast_precision_loss)]
            let count = neighbors.len().max(1) as f64;
            neighbors.iter().map(road_transform::Neighbor::distance).sum::<f64>() / count
        })
        .collect();

    #[allow(clippy::cast_precision_loss)]
    let n = mean_distances.len() as f64;
    let mean = mean_distances.iter().sum::<f64>() / n;
    let variance = mean_distances.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let threshold = mean + params.std_ratio * variance.sqrt();

    OutlierMask {
        inliers: mean_distances.iter().map(|&d| d <= threshold).collect(),
        threshold,
    }
}
