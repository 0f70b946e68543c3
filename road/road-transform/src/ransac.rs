//! RANSAC plane fitting algorithm.
//!
//! Robustly fits a plane to noisy point data by iteratively
//! sampling minimal sets and finding the best consensus.

use nalgebra::Point3;
use rand::prelude::*;
use rand::rngs::StdRng;

use crate::error::{TransformError, TransformResult};
use crate::pca::pca_from_iter;
use crate::plane::Plane;

/// Configuration for RANSAC plane fitting.
#[derive(Debug, Clone, PartialEq)]
pub struct RansacConfig {
    /// Maximum number of iterations.
    pub max_iterations: usize,
    /// Distance threshold for classifying inliers.
    pub inlier_threshold: f64,
    /// Minimum fraction of points that must be inliers for success.
    pub min_inlier_ratio: f64,
    /// Seed for the sampling RNG. Runs with equal seeds are identical.
    pub seed: u64,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            inlier_threshold: 0.05,
            min_inlier_ratio: 0.0,
            seed: 0,
        }
    }
}

impl RansacConfig {
    /// Create a new RANSAC configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of iterations.
    #[must_use]
    pub const fn with_max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = iterations;
        self
    }

    /// Set the inlier distance threshold.
    #[must_use]
    pub const fn with_inlier_threshold(mut self, threshold: f64) -> Self {
        self.inlier_threshold = threshold;
        self
    }

    /// Set the minimum inlier ratio for success.
    #[must_use]
    pub const fn with_min_inlier_ratio(mut self, ratio: f64) -> Self {
        self.min_inlier_ratio = ratio;
        self
    }

    /// Set the random seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Result of RANSAC plane fitting.
#[derive(Debug, Clone)]
pub struct RansacResult {
    /// The fitted plane.
    pub plane: Plane,
    /// Indices of inlier points.
    pub inliers: Vec<usize>,
    /// Number of iterations performed.
    pub iterations: usize,
}

impl RansacResult {
    /// Get the inlier ratio.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    // Precision loss: point counts beyond 2^52 are unsupported
    pub fn inlier_ratio(&self, total_points: usize) -> f64 {
        if total_points == 0 {
            return 0.0;
        }
        self.inliers.len() as f64 / total_points as f64
    }
}

/// Fit a plane to a slice of points using RANSAC.
///
/// After consensus, the plane is refined by least squares (PCA) over the
/// inliers. Inliers are recounted against the refined plane.
///
/// # Errors
///
/// Returns an error if:
/// - There are fewer than 3 points
/// - No non-degenerate sample was found, or consensus stays below
///   `min_inlier_ratio`
///
/// # Example
///
/// ```
/// use road_transform::{ransac_plane, RansacConfig};
/// use nalgebra::Point3;
///
/// let mut points = Vec::new();
/// for i in 0..10 {
///     for j in 0..10 {
///         points.push(Point3::new(f64::from(i), 0.0, f64::from(j)));
///     }
/// }
///
/// let config = RansacConfig::new().with_inlier_threshold(0.1).with_seed(42);
/// let fitted = ransac_plane(&points, &config).unwrap();
/// assert!(fitted.plane.normal.y.abs() > 0.99);
/// ```
#[allow(clippy::cast_precision_loss)]
// Precision loss: point counts beyond 2^52 are unsupported
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
// Truncation/sign loss: min_inliers is bounded by point count which fits in usize
pub fn ransac_plane(points: &[Point3<f64>], config: &RansacConfig) -> TransformResult<RansacResult> {
    let n = points.len();

    if n < 3 {
        return Err(TransformError::InsufficientPoints {
            required: 3,
            actual: n,
        });
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let min_inliers = (n as f64 * config.min_inlier_ratio).ceil() as usize;
    let mut best_plane: Option<Plane> = None;
    let mut best_count = 0usize;
    let mut iterations_used = 0;

    for iteration in 0..config.max_iterations {
        iterations_used = iteration + 1;

        // Sample 3 distinct points
        let sample = rand::seq::index::sample(&mut rng, n, 3);
        let (i0, i1, i2) = (sample.index(0), sample.index(1), sample.index(2));

        let Some(candidate) = Plane::from_points(&points[i0], &points[i1], &points[i2]) else {
            continue; // Collinear points, try again
        };

        let count = points
            .iter()
            .filter(|p| candidate.is_inlier(p, config.inlier_threshold))
            .count();

        if count > best_count {
            best_plane = Some(candidate);
            best_count = count;

            if best_count >= min_inliers && best_count >= n * 9 / 10 {
                break;
            }
        }
    }

    let Some(plane) = best_plane else {
        return Err(TransformError::RansacFailed {
            iterations: iterations_used,
        });
    };
    if best_count < min_inliers.max(3) {
        return Err(TransformError::RansacFailed {
            iterations: iterations_used,
        });
    }

    let consensus = inliers_of(points, &plane, config.inlier_threshold);
    let refined = refine_plane(points, &consensus).unwrap_or(plane);
    let inliers = inliers_of(points, &refined, config.inlier_threshold);

    // Refinement must not lose support
    let (plane, inliers) = if inliers.len() >= consensus.len() {
        (refined, inliers)
    } else {
        (plane, consensus)
    };

    Ok(RansacResult {
        plane,
        inliers,
        iterations: iterations_used,
    })
}

fn inliers_of(points: &[Point3<f64>], plane: &Plane, threshold: f64) -> Vec<usize> {
    points
        .iter()
        .enumerate()
        .filter(|(_, p)| plane.is_inlier(p, threshold))
        .map(|(i, _)| i)
        .collect()
}

/// Refine a plane fit using least-squares on the inliers.
fn refine_plane(points: &[Point3<f64>], inliers: &[usize]) -> Option<Plane> {
    let pca = pca_from_iter(inliers.iter().map(|&i| &points[i]))?;
    Plane::new(pca.centroid, pca.normal())
}

/// Create a default `RansacResult` for testing fallback scenarios.
#[cfg(test)]
fn default_ransac_result() -> RansacResult {
    RansacResult {
        plane: Plane {
            point: Point3::origin(),
            normal: nalgebra::Vector3::y(),
        },
        inliers: vec![],
        iterations: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn planar_points() -> Vec<Point3<f64>> {
        let mut points = Vec::new();
        for i in 0u32..5 {
            for j in 0u32..5 {
                points.push(Point3::new(f64::from(i), 0.0, f64::from(j)));
            }
        }
        points
    }

    fn planar_points_with_outlier() -> Vec<Point3<f64>> {
        let noise = [0.001, -0.002, 0.001, 0.0, -0.001];
        let mut points = Vec::new();
        for i in 0u32..5 {
            for j in 0u32..5 {
                points.push(Point3::new(f64::from(i), noise[(i + j) as usize % 5], f64::from(j)));
            }
        }
        points.push(Point3::new(2.0, 5.0, 2.0));
        points
    }

    #[test]
    fn ransac_perfect_plane() {
        let config = RansacConfig::new().with_inlier_threshold(0.01).with_seed(42);
        let fitted = ransac_plane(&planar_points(), &config).unwrap_or_else(|_| default_ransac_result());

        assert!(fitted.plane.normal.y.abs() > 0.99, "Expected Y-normal, got {:?}", fitted.plane.normal);
        assert_eq!(fitted.inliers.len(), 25);
    }

    #[test]
    fn ransac_with_outlier() {
        let config = RansacConfig::new().with_inlier_threshold(0.01).with_seed(42);
        let fitted = ransac_plane(&planar_points_with_outlier(), &config)
            .unwrap_or_else(|_| default_ransac_result());

        assert_eq!(fitted.inliers.len(), 25);
        assert!(!fitted.inliers.contains(&25));
    }

    #[test]
    fn ransac_insufficient_points() {
        let points = [Point3::origin(), Point3::new(1.0, 0.0, 0.0)];
        let result = ransac_plane(&points, &RansacConfig::default());
        assert!(matches!(result, Err(TransformError::InsufficientPoints { .. })));
    }

    #[test]
    fn ransac_collinear_points_fail() {
        let points: Vec<_> = (0..10).map(|i| Point3::new(f64::from(i), 0.0, 0.0)).collect();
        let result = ransac_plane(&points, &RansacConfig::new().with_max_iterations(50));
        assert!(matches!(result, Err(TransformError::RansacFailed { .. })));
    }

    #[test]
    fn ransac_config_builder() {
        let config = RansacConfig::new()
            .with_max_iterations(500)
            .with_inlier_threshold(0.05)
            .with_min_inlier_ratio(0.6)
            .with_seed(123);

        assert_eq!(config.max_iterations, 500);
        assert_relative_eq!(config.inlier_threshold, 0.05);
        assert_relative_eq!(config.min_inlier_ratio, 0.6);
        assert_eq!(config.seed, 123);
    }

    #[test]
    fn ransac_reproducible_with_seed() {
        let points = planar_points_with_outlier();
        let config = RansacConfig::new().with_seed(12345);

        let r1 = ransac_plane(&points, &config).unwrap_or_else(|_| default_ransac_result());
        let r2 = ransac_plane(&points, &config).unwrap_or_else(|_| default_ransac_result());

        assert_eq!(r1.inliers, r2.inliers);
        assert_eq!(r1.plane, r2.plane);
    }

    #[test]
    fn inlier_ratio() {
        let result = RansacResult {
            inliers: vec![0, 1, 2, 3, 4],
            iterations: 10,
            ..default_ransac_result()
        };

        assert_relative_eq!(result.inlier_ratio(10), 0.5, epsilon = 1e-10);
        assert_relative_eq!(result.inlier_ratio(0), 0.0, epsilon = 1e-10);
    }
}
