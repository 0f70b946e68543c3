//! Rigid (rotation + translation) transforms.

use nalgebra::{Isometry3, Matrix3, Matrix4, Point3, Rotation3, Translation3, Unit, UnitQuaternion, Vector3};
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Determinant tolerance when accepting a rotation matrix.
const ORTHONORMAL_TOLERANCE: f64 = 1e-6;

/// A rigid transform: an orthonormal rotation followed by a translation.
///
/// The rotation is stored as a unit quaternion, so no sequence of
/// compositions can introduce scale or shear.
///
/// # Example
///
/// ```
/// use road_types::{RigidTransform, Point3, Vector3};
///
/// let t = RigidTransform::from_translation(Vector3::new(1.0, 2.0, 3.0));
/// let p = t.apply_point(&Point3::origin());
/// assert_eq!(p, Point3::new(1.0, 2.0, 3.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RigidTransform {
    /// The underlying isometry.
    pub isometry: Isometry3<f64>,
}

impl RigidTransform {
    /// The identity transform.
    #[must_use]
    pub fn identity() -> Self {
        Self {
            isometry: Isometry3::identity(),
        }
    }

    /// Pure translation.
    #[must_use]
    pub fn from_translation(translation: Vector3<f64>) -> Self {
        Self {
            isometry: Isometry3::from_parts(Translation3::from(translation), UnitQuaternion::identity()),
        }
    }

    /// Pure rotation about the origin.
    #[must_use]
    pub fn from_rotation(rotation: UnitQuaternion<f64>) -> Self {
        Self {
            isometry: Isometry3::from_parts(Translation3::identity(), rotation),
        }
    }

    /// Rotation of `angle` radians about `axis` through the origin.
    #[must_use]
    pub fn from_axis_angle(axis: &Unit<Vector3<f64>>, angle: f64) -> Self {
        Self::from_rotation(UnitQuaternion::from_axis_angle(axis, angle))
    }

    /// Rotation followed by translation.
    #[must_use]
    pub fn from_parts(rotation: UnitQuaternion<f64>, translation: Vector3<f64>) -> Self {
        Self {
            isometry: Isometry3::from_parts(Translation3::from(translation), rotation),
        }
    }

    /// Build from a 4x4 homogeneous matrix.
    ///
    /// Returns `None` if the upper-left block is not a proper rotation
    /// (orthonormal with determinant 1), the bottom row is not `[0 0 0 1]`,
    /// or any entry is non-finite.
    #[must_use]
    pub fn from_matrix(matrix: &Matrix4<f64>) -> Option<Self> {
        if matrix.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let bottom = matrix.fixed_view::<1, 4>(3, 0);
        if (bottom[0].abs() + bottom[1].abs() + bottom[2].abs() + (bottom[3] - 1.0).abs())
            > ORTHONORMAL_TOLERANCE
        {
            return None;
        }
        let r: Matrix3<f64> = matrix.fixed_view::<3, 3>(0, 0).into_owned();
        let should_be_identity = r.transpose() * r;
        if (should_be_identity - Matrix3::identity()).abs().max() > ORTHONORMAL_TOLERANCE
            || (r.determinant() - 1.0).abs() > ORTHONORMAL_TOLERANCE
        {
            return None;
        }
        let rotation = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r));
        let translation = Vector3::new(matrix[(0, 3)], matrix[(1, 3)], matrix[(2, 3)]);
        Some(Self::from_parts(rotation, translation))
    }

    /// 4x4 homogeneous matrix.
    #[must_use]
    pub fn to_matrix(&self) -> Matrix4<f64> {
        self.isometry.to_homogeneous()
    }

    /// The rotation part.
    #[inline]
    #[must_use]
    pub fn rotation(&self) -> UnitQuaternion<f64> {
        self.isometry.rotation
    }

    /// The translation part.
    #[inline]
    #[must_use]
    pub fn translation(&self) -> Vector3<f64> {
        self.isometry.translation.vector
    }

    /// Rotation angle in radians.
    #[inline]
    #[must_use]
    pub fn rotation_angle(&self) -> f64 {
        self.isometry.rotation.angle()
    }

    /// Transform a point.
    #[inline]
    #[must_use]
    pub fn apply_point(&self, point: &Point3<f64>) -> Point3<f64> {
        self.isometry.transform_point(point)
    }

    /// Rotate a direction (translation is ignored).
    #[inline]
    #[must_use]
    pub fn apply_vector(&self, vector: &Vector3<f64>) -> Vector3<f64> {
        self.isometry.transform_vector(vector)
    }

    /// `self ∘ first`: apply `first`, then `self`.
    #[must_use]
    pub fn compose(&self, first: &Self) -> Self {
        Self {
            isometry: self.isometry * first.isometry,
        }
    }

    /// Apply this transform, then translate.
    #[must_use]
    pub fn then_translate(&self, offset: Vector3<f64>) -> Self {
        Self::from_translation(offset).compose(self)
    }

    /// The inverse transform.
    #[must_use]
    pub fn inverse(&self) -> Self {
        Self {
            isometry: self.isometry.inverse(),
        }
    }

    /// Whether this is the identity within `epsilon` (radians and units).
    #[must_use]
    pub fn is_identity(&self, epsilon: f64) -> bool {
        self.rotation_angle() <= epsilon && self.translation().norm() <= epsilon
    }

    /// Whether every component is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.isometry.rotation.coords.iter().all(|v| v.is_finite())
            && self.translation().iter().all(|v| v.is_finite())
    }
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl fmt::Display for RigidTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = self.translation();
        write!(
            f,
            "rotate {:.4}° translate [{:.4}, {:.4}, {:.4}]",
            self.rotation_angle().to_degrees(),
            t.x,
            t.y,
            t.z
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn compose_applies_right_first() {
        let rotate = RigidTransform::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2);
        let shift = RigidTransform::from_translation(Vector3::new(1.0, 0.0, 0.0));

        let p = shift.compose(&rotate).apply_point(&Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(p.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(p.y, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn inverse_round_trips() {
        let t = RigidTransform::from_axis_angle(&Vector3::y_axis(), 0.3)
            .then_translate(Vector3::new(2.0, -1.0, 0.5));
        let p = Point3::new(0.7, 1.1, -3.0);
        let back = t.inverse().apply_point(&t.apply_point(&p));
        assert_relative_eq!(back, p, epsilon = 1e-12);
    }

    #[test]
    fn matrix_round_trip() {
        let t = RigidTransform::from_axis_angle(&Vector3::x_axis(), 1.0)
            .then_translate(Vector3::new(1.0, 2.0, 3.0));
        let back = RigidTransform::from_matrix(&t.to_matrix()).expect("valid matrix");
        assert_relative_eq!(back.translation(), t.translation(), epsilon = 1e-12);
        assert_relative_eq!(back.rotation_angle(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn rejects_scaled_matrix() {
        let mut m = Matrix4::identity();
        m[(0, 0)] = 2.0;
        assert!(RigidTransform::from_matrix(&m).is_none());

        let mut reflect = Matrix4::identity();
        reflect[(2, 2)] = -1.0;
        assert!(RigidTransform::from_matrix(&reflect).is_none());
    }

    #[test]
    fn identity_detection() {
        assert!(RigidTransform::identity().is_identity(1e-12));
        assert!(!RigidTransform::from_translation(Vector3::new(0.0, 0.1, 0.0)).is_identity(1e-3));
    }
}
