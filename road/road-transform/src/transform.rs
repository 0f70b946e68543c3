//! Rigid rotations built from directions.

use nalgebra::{Unit, UnitQuaternion, Vector3};
use road_types::RigidTransform;

/// Rotation about `axis` by `angle` radians.
///
/// Returns identity if the axis is zero.
#[must_use]
pub fn rotation_about(axis: Vector3<f64>, angle: f64) -> RigidTransform {
    Unit::try_new(axis, f64::EPSILON).map_or_else(RigidTransform::identity, |axis| {
        RigidTransform::from_axis_angle(&axis, angle)
    })
}

/// Create a rotation that maps one direction onto another.
///
/// Both directions are normalized first. Zero vectors give identity.
/// Anti-parallel directions rotate by π about an axis perpendicular to
/// `from`.
///
/// # Example
///
/// ```
/// use road_transform::rotation_between;
/// use nalgebra::Vector3;
///
/// let r = rotation_between(Vector3::x(), Vector3::y());
/// let v = r.apply_vector(&Vector3::x());
/// assert!((v - Vector3::y()).norm() < 1e-12);
/// ```
#[must_use]
pub fn rotation_between(from: Vector3<f64>, to: Vector3<f64>) -> RigidTransform {
    let (Some(from), Some(to)) = (
        from.try_normalize(f64::EPSILON),
        to.try_normalize(f64::EPSILON),
    ) else {
        return RigidTransform::identity();
    };

    let dot = from.dot(&to);

    // Vectors are nearly parallel
    if dot > 1.0 - f64::EPSILON {
        return RigidTransform::identity();
    }

    // Vectors are nearly anti-parallel
    if dot < -1.0 + 1e-12 {
        let helper = if from.x.abs() < 0.9 { Vector3::x() } else { Vector3::y() };
        return rotation_about(helper.cross(&from), std::f64::consts::PI);
    }

    UnitQuaternion::rotation_between(&from, &to)
        .map_or_else(RigidTransform::identity, RigidTransform::from_rotation)
}
