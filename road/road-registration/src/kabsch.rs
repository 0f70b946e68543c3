//! Kabsch algorithm for computing optimal rigid transformations.
//!
//! The Kabsch algorithm finds the optimal rotation matrix that minimizes
//! the RMSD (root mean square deviation) between two paired sets of points.

use nalgebra::{Matrix3, Point3, Rotation3, UnitQuaternion, Vector3};
use road_types::RigidTransform;

use crate::{RegistrationError, RegistrationResult};

/// Computes the rigid transform that best maps `source_points` onto the
/// paired `target_points`.
///
/// # Errors
///
/// Returns an error if either set is empty, the sets differ in length,
/// or the SVD fails.
///
/// # Example
///
/// ```
/// use road_registration::compute_rigid_transform;
/// use road_types::Point3;
///
/// let source = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.0, 1.0, 0.0),
/// ];
///
/// // Target is source translated by (1, 2, 3)
/// let target = vec![
///     Point3::new(1.0, 2.0, 3.0),
///     Point3::new(2.0, 2.0, 3.0),
///     Point3::new(1.0, 3.0, 3.0),
/// ];
///
/// let transform = compute_rigid_transform(&source, &target).unwrap();
/// let aligned = transform.apply_point(&source[0]);
/// assert!((aligned - target[0]).norm() < 1e-6);
/// ```
pub fn compute_rigid_transform(
    source_points: &[Point3<f64>],
    target_points: &[Point3<f64>],
) -> RegistrationResult<RigidTransform> {
    if source_points.is_empty() {
        return Err(RegistrationError::EmptySource);
    }
    if target_points.is_empty() {
        return Err(RegistrationError::EmptyTarget);
    }
    if source_points.len() != target_points.len() {
        return Err(RegistrationError::MismatchedPairs {
            source_len: source_points.len(),
            target_len: target_points.len(),
        });
    }

    let source_centroid = centroid(source_points);
    let target_centroid = centroid(target_points);

    // Covariance H = sum(source_i * target_i^T) over centred points
    let mut h = Matrix3::zeros();
    for (s, t) in source_points.iter().zip(target_points.iter()) {
        h += (s.coords - source_centroid) * (t.coords - target_centroid).transpose();
    }

    let svd = h.svd(true, true);
    let u = svd.u.ok_or(RegistrationError::SvdFailed)?;
    let v_t = svd.v_t.ok_or(RegistrationError::SvdFailed)?;

    // R = V * U^T
    let mut rotation_matrix = v_t.transpose() * u.transpose();

    // Handle reflection case (det(R) = -1)
    if rotation_matrix.determinant() < 0.0 {
        let mut v = v_t.transpose();
        for i in 0..3 {
            v[(i, 2)] = -v[(i, 2)];
        }
        rotation_matrix = v * u.transpose();
    }

    let rotation = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(rotation_matrix));
    let translation = target_centroid - rotation * source_centroid;

    let transform = RigidTransform::from_parts(rotation, translation);
    if transform.is_finite() {
        Ok(transform)
    } else {
        Err(RegistrationError::NonFiniteTransform)
    }
}

#[allow(clippy::cast_precision_loss)]
fn centroid(points: &[Point3<f64>]) -> Vector3<f64> {
    points.iter().map(|p| p.coords).sum::<Vector3<f64>>() / points.len() as f64
}
