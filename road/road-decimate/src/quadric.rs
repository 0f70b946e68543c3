//! Quadric error metric.
//!
//! A quadric accumulates squared distances to a set of planes. Summing
//! the quadrics of two vertices gives the error of placing the merged
//! vertex anywhere in space.

use nalgebra::{Matrix3, Point3, Vector3};

/// Symmetric 4x4 error quadric, stored as its upper triangle.
///
/// For a plane `n·x + d = 0` the quadric is `[n d]ᵀ[n d]`. The error at a
/// point is `[x 1] Q [x 1]ᵀ`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Quadric {
    // Upper triangle of the 3x3 block: xx xy xz yy yz zz
    a: [f64; 6],
    // Linear terms d*n
    b: [f64; 3],
    // Constant term d*d
    c: f64,
}

impl Quadric {
    /// Quadric of the plane through `point` with unit `normal`.
    #[must_use]
    pub fn from_plane(point: &Point3<f64>, normal: &Vector3<f64>) -> Self {
        let d = -normal.dot(&point.coords);
        let (x, y, z) = (normal.x, normal.y, normal.z);
        Self {
            a: [x * x, x * y, x * z, y * y, y * z, z * z],
            b: [d * x, d * y, d * z],
            c: d * d,
        }
    }

    /// Scale the quadric, e.g. by face area or a constraint weight.
    #[must_use]
    pub fn scaled(mut self, weight: f64) -> Self {
        for v in &mut self.a {
            *v *= weight;
        }
        for v in &mut self.b {
            *v *= weight;
        }
        self.c *= weight;
        self
    }

    /// Accumulate another quadric.
    pub fn add(&mut self, other: &Self) {
        for (v, o) in self.a.iter_mut().zip(other.a.iter()) {
            *v += o;
        }
        for (v, o) in self.b.iter_mut().zip(other.b.iter()) {
            *v += o;
        }
        self.c += other.c;
    }

    /// Sum of two quadrics.
    #[must_use]
    pub fn combined(&self, other: &Self) -> Self {
        let mut out = *self;
        out.add(other);
        out
    }

    fn matrix(&self) -> Matrix3<f64> {
        let [xx, xy, xz, yy, yz, zz] = self.a;
        Matrix3::new(xx, xy, xz, xy, yy, yz, xz, yz, zz)
    }

    /// Error of placing a vertex at `p`.
    #[must_use]
    pub fn evaluate(&self, p: &Point3<f64>) -> f64 {
        let v = p.coords;
        let linear = Vector3::new(self.b[0], self.b[1], self.b[2]);
        (v.dot(&(self.matrix() * v)) + 2.0 * linear.dot(&v) + self.c).max(0.0)
    }

    /// The point minimising the error, or `None` when the system is
    /// singular (e.g. all planes parallel).
    #[must_use]
    pub fn optimal_point(&self) -> Option<Point3<f64>> {
        let m = self.matrix();
        if m.determinant().abs() < 1e-10 {
            return None;
        }
        let inverse = m.try_inverse()?;
        let x = inverse * -Vector3::new(self.b[0], self.b[1], self.b[2]);
        x.iter().all(|c| c.is_finite()).then(|| Point3::from(x))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn zero_quadric_has_no_error() {
        assert_relative_eq!(Quadric::default().evaluate(&Point3::new(1.0, 2.0, 3.0)), 0.0);
    }

    #[test]
    fn plane_error_is_squared_distance() {
        let q = Quadric::from_plane(&Point3::new(0.0, 2.0, 0.0), &Vector3::y());
        assert_relative_eq!(q.evaluate(&Point3::new(5.0, 2.0, -3.0)), 0.0, epsilon = 1e-12);
        assert_relative_eq!(q.evaluate(&Point3::new(0.0, 5.0, 0.0)), 9.0, epsilon = 1e-12);
        assert_relative_eq!(q.scaled(2.0).evaluate(&Point3::new(0.0, 5.0, 0.0)), 18.0, epsilon = 1e-12);
    }

    #[test]
    fn three_planes_meet_at_optimum() {
        let corner = Point3::new(1.0, -2.0, 3.0);
        let mut q = Quadric::from_plane(&corner, &Vector3::x());
        q.add(&Quadric::from_plane(&corner, &Vector3::y()));
        q.add(&Quadric::from_plane(&corner, &Vector3::z()));

        let best = q.optimal_point().unwrap();
        assert_relative_eq!(best, corner, epsilon = 1e-9);
    }

    #[test]
    fn coplanar_faces_are_singular() {
        let q = Quadric::from_plane(&Point3::origin(), &Vector3::y())
            .combined(&Quadric::from_plane(&Point3::new(3.0, 0.0, 1.0), &Vector3::y()));
        assert!(q.optimal_point().is_none());
    }
}
