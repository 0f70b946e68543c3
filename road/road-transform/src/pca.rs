//! Principal Component Analysis for point neighborhoods.
//!
//! Used for least-squares plane refinement and for surface normal
//! estimation: the axis of least variance is the surface normal.

use nalgebra::{Matrix3, Point3, SymmetricEigen, Vector3};

/// Result of PCA computation on a point cloud.
///
/// Contains the principal axes sorted by variance (largest first).
#[derive(Debug, Clone)]
pub struct PcaResult {
    /// The centroid of the point cloud.
    pub centroid: Point3<f64>,
    /// Principal axes (eigenvectors), sorted by eigenvalue descending.
    /// `axes[0]` is the direction of maximum variance.
    pub axes: [Vector3<f64>; 3],
    /// Eigenvalues (variances) along each axis, sorted descending.
    pub eigenvalues: [f64; 3],
}

impl PcaResult {
    /// Get the primary axis (direction of maximum variance).
    #[must_use]
    pub const fn primary_axis(&self) -> Vector3<f64> {
        self.axes[0]
    }

    /// Get the axis of minimum variance, the normal of a best-fit plane.
    #[must_use]
    pub const fn normal(&self) -> Vector3<f64> {
        self.axes[2]
    }

    /// Check if the point cloud is approximately flat (one eigenvalue near zero).
    ///
    /// # Arguments
    ///
    /// * `threshold` - Ratio of smallest to largest eigenvalue below which is flat
    #[must_use]
    pub fn is_flat(&self, threshold: f64) -> bool {
        if self.eigenvalues[0] < f64::EPSILON {
            return true;
        }
        self.eigenvalues[2] / self.eigenvalues[0] < threshold
    }
}

/// Compute PCA on any collection of borrowed points.
///
/// Lets callers run PCA on an index subset without copying. Returns
/// `None` for fewer than 3 points.
///
/// # Example
///
/// ```
/// use road_transform::pca_from_iter;
/// use nalgebra::Point3;
///
/// let points = [
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(10.0, 0.0, 0.0),
///     Point3::new(0.0, 0.0, 1.0),
///     Point3::new(10.0, 0.0, 1.0),
/// ];
/// let pca = pca_from_iter(&points).unwrap();
/// assert!(pca.primary_axis().x.abs() > 0.9);
/// assert!(pca.normal().y.abs() > 0.99);
/// ```
#[must_use]
#[allow(clippy::cast_precision_loss)]
// Precision loss: point counts beyond 2^52 are unsupported
pub fn pca_from_iter<'a, I>(points: I) -> Option<PcaResult>
where
    I: IntoIterator<Item = &'a Point3<f64>>,
    I::IntoIter: Clone,
{
    let iter = points.into_iter();

    let mut sum = Vector3::zeros();
    let mut count = 0usize;
    for p in iter.clone() {
        sum += p.coords;
        count += 1;
    }
    if count < 3 {
        return None;
    }
    let centroid = Point3::from(sum / count as f64);

    let mut covariance = Matrix3::zeros();
    for p in iter {
        let centered = p - centroid;
        covariance += centered * centered.transpose();
    }
    covariance /= count as f64;

    let eigen = SymmetricEigen::new(covariance);
    let eigenvalues = eigen.eigenvalues;
    let eigenvectors = eigen.eigenvectors;

    // Sort by eigenvalue (descending)
    let mut indices = [0usize, 1, 2];
    indices.sort_by(|&a, &b| {
        eigenvalues[b]
            .partial_cmp(&eigenvalues[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    Some(PcaResult {
        centroid,
        axes: [
            eigenvectors.column(indices[0]).into_owned(),
            eigenvectors.column(indices[1]).into_owned(),
            eigenvectors.column(indices[2]).into_owned(),
        ],
        eigenvalues: [
            eigenvalues[indices[0]],
            eigenvalues[indices[1]],
            eigenvalues[indices[2]],
        ],
    })
}
