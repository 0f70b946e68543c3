//! Plane representation for surface fitting.

use nalgebra::{Point3, Vector3};
use road_types::UpAxis;

/// A plane in 3D space defined by a point and normal.
///
/// The plane equation is: `normal · (p - point) = 0`
/// or equivalently: `normal · p = d` where `d = normal · point`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// A point on the plane.
    pub point: Point3<f64>,
    /// The plane normal (unit vector).
    pub normal: Vector3<f64>,
}

impl Plane {
    /// Create a new plane from a point and normal.
    ///
    /// The normal is automatically normalized.
    ///
    /// # Returns
    ///
    /// `Some(Plane)` if the normal is non-zero and finite, `None` otherwise.
    #[must_use]
    pub fn new(point: Point3<f64>, normal: Vector3<f64>) -> Option<Self> {
        let norm = normal.norm();
        if norm < f64::EPSILON || !norm.is_finite() {
            return None;
        }
        Some(Self {
            point,
            normal: normal / norm,
        })
    }

    /// Create a plane from three non-collinear points.
    ///
    /// The normal is computed as `(p1 - p0) × (p2 - p0)`, normalized.
    ///
    /// # Returns
    ///
    /// `Some(Plane)` if the points are non-collinear, `None` otherwise.
    #[must_use]
    pub fn from_points(p0: &Point3<f64>, p1: &Point3<f64>, p2: &Point3<f64>) -> Option<Self> {
        let normal = (p1 - p0).cross(&(p2 - p0));
        Self::new(*p0, normal)
    }

    /// Compute the signed distance from a point to the plane.
    ///
    /// Positive distance means the point is on the side the normal points to.
    #[must_use]
    pub fn signed_distance(&self, point: &Point3<f64>) -> f64 {
        self.normal.dot(&(point - self.point))
    }

    /// Compute the absolute distance from a point to the plane.
    #[must_use]
    pub fn distance(&self, point: &Point3<f64>) -> f64 {
        self.signed_distance(point).abs()
    }

    /// Project a point onto the plane.
    #[must_use]
    pub fn project(&self, point: &Point3<f64>) -> Point3<f64> {
        point - self.signed_distance(point) * self.normal
    }

    /// Check if a point is within a given distance threshold of the plane.
    #[must_use]
    pub fn is_inlier(&self, point: &Point3<f64>, threshold: f64) -> bool {
        self.distance(point) <= threshold
    }

    /// Get the plane constant `d` where the plane equation is `n · p = d`.
    #[must_use]
    pub fn d(&self) -> f64 {
        self.normal.dot(&self.point.coords)
    }

    /// How horizontal the plane is: `|n · up|`, 1.0 for a level floor.
    #[must_use]
    pub fn flatness(&self, up: UpAxis) -> f64 {
        up.component(&self.normal).abs()
    }

    /// The same plane with its normal flipped, if needed, to point along `up`.
    #[must_use]
    pub fn facing_up(self, up: UpAxis) -> Self {
        if up.component(&self.normal) < 0.0 {
            Self {
                point: self.point,
                normal: -self.normal,
            }
        } else {
            self
        }
    }
}

/// Create a default plane (Y=0) for testing fallback scenarios.
#[cfg(test)]
fn default_plane() -> Plane {
    Plane {
        point: Point3::origin(),
        normal: Vector3::y(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn plane_from_point_normal() {
        let plane = Plane::new(Point3::origin(), Vector3::new(0.0, 2.0, 0.0)); // Not normalized

        assert!(plane.is_some());
        let plane = plane.unwrap_or_else(default_plane);
        assert_relative_eq!(plane.normal.norm(), 1.0, epsilon = 1e-10);
        assert_relative_eq!(plane.normal.y, 1.0, epsilon = 1e-10);
    }

    #[test]
    fn plane_from_three_points() {
        let plane = Plane::from_points(
            &Point3::new(0.0, 0.0, 0.0),
            &Point3::new(1.0, 0.0, 0.0),
            &Point3::new(0.0, 0.0, 1.0),
        )
        .unwrap_or_else(default_plane);

        // Normal should be ±Y
        assert_relative_eq!(plane.normal.x, 0.0, epsilon = 1e-10);
        assert_relative_eq!(plane.normal.z, 0.0, epsilon = 1e-10);
        assert_relative_eq!(plane.normal.y.abs(), 1.0, epsilon = 1e-10);
    }

    #[test]
    fn collinear_points_no_plane() {
        let plane = Plane::from_points(
            &Point3::new(0.0, 0.0, 0.0),
            &Point3::new(1.0, 0.0, 0.0),
            &Point3::new(2.0, 0.0, 0.0),
        );
        assert!(plane.is_none());
    }

    #[test]
    fn signed_distance_and_projection() {
        let plane = default_plane();

        assert_relative_eq!(plane.signed_distance(&Point3::new(0.0, 5.0, 0.0)), 5.0, epsilon = 1e-10);
        assert_relative_eq!(plane.signed_distance(&Point3::new(0.0, -3.0, 0.0)), -3.0, epsilon = 1e-10);

        let projected = plane.project(&Point3::new(3.0, 7.0, 4.0));
        assert_relative_eq!(projected, Point3::new(3.0, 0.0, 4.0), epsilon = 1e-10);
        assert!(plane.is_inlier(&Point3::new(0.0, 0.05, 0.0), 0.1));
        assert!(!plane.is_inlier(&Point3::new(0.0, 0.2, 0.0), 0.1));
    }

    #[test]
    fn flatness_of_wall_and_floor() {
        let floor = default_plane();
        let wall = Plane::new(Point3::origin(), Vector3::x()).unwrap_or_else(default_plane);
        let tilted = Plane::new(Point3::origin(), Vector3::new(1.0, 1.0, 0.0)).unwrap_or_else(default_plane);

        assert_relative_eq!(floor.flatness(UpAxis::Y), 1.0);
        assert_relative_eq!(wall.flatness(UpAxis::Y), 0.0);
        assert_relative_eq!(tilted.flatness(UpAxis::Y), std::f64::consts::FRAC_1_SQRT_2, epsilon = 1e-12);
    }

    #[test]
    fn facing_up_flips_downward_normal() {
        let down = Plane::new(Point3::new(0.0, 2.0, 0.0), -Vector3::y()).unwrap_or_else(default_plane);
        let up = down.facing_up(UpAxis::Y);
        assert_relative_eq!(up.normal.y, 1.0);
        assert_relative_eq!(up.d(), 2.0);
    }

    #[test]
    fn zero_normal_no_plane() {
        assert!(Plane::new(Point3::origin(), Vector3::zeros()).is_none());
    }
}
