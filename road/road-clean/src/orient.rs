//! Orientation normalization.
//!
//! Photogrammetry scans arrive in an arbitrary vertical sense. A road
//! seen from above has most of its normals pointing up, so the median
//! up-component of the vertex normals tells whether the scan is upside
//! down. After the flip the mesh is lifted so its lowest point sits at
//! height zero, which gives the ground band a fixed meaning.

use road_types::{Mesh, RigidTransform, UpAxis};
use tracing::{debug, warn};

/// What [`normalize_orientation`] did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationReport {
    /// Median up-component of the vertex normals before any flip.
    pub median_up: f64,
    /// Whether the mesh was turned over.
    pub flipped: bool,
    /// Vertical offset applied after the flip.
    pub lift: f64,
    /// The mesh had no vertices; nothing changed.
    pub empty: bool,
}

/// Turn the mesh right side up and put its lowest point at height zero.
///
/// Vertex normals are recomputed. Applying this twice gives the same
/// result as applying it once.
///
/// # Example
///
/// ```
/// use road_clean::normalize_orientation;
/// use road_types::{grid_patch, RigidTransform, UpAxis, Vector3};
///
/// // An upside-down road patch floating 3 m up
/// let flip = RigidTransform::from_axis_angle(&Vector3::x_axis(), std::f64::consts::PI);
/// let mut mesh = grid_patch(4, 4, 1.0).transformed(&flip.then_translate(Vector3::new(0.0, 3.0, 0.0)));
///
/// let report = normalize_orientation(&mut mesh, UpAxis::Y);
/// assert!(report.flipped);
/// assert!(mesh.positions.iter().all(|p| p.y.abs() < 1e-9));
/// ```
pub fn normalize_orientation(mesh: &mut Mesh, up: UpAxis) -> OrientationReport {
    if mesh.positions.is_empty() {
        warn!("Orientation skipped: mesh is empty");
        return OrientationReport {
            median_up: 0.0,
            flipped: false,
            lift: 0.0,
            empty: true,
        };
    }

    mesh.compute_vertex_normals();
    let median_up = mesh
        .normals
        .as_deref()
        .map_or(0.0, |normals| median(normals.iter().map(|n| up.component(n)).collect()));

    let flipped = median_up < 0.0;
    if flipped {
        mesh.transform(&RigidTransform::from_axis_angle(&up.tilt_axis(), std::f64::consts::PI));
    }

    let lowest = mesh
        .positions
        .iter()
        .map(|p| up.height(p))
        .fold(f64::INFINITY, f64::min);
    let lift = -lowest;
    mesh.translate(up.unit().into_inner() * lift);

    debug!(median_up, flipped, lift, "Normalized orientation");

    OrientationReport {
        median_up,
        flipped,
        lift,
        empty: false,
    }
}

/// Median with the mean of the two middle values for even counts.
fn median(mut values: Vec<f64>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) * 0.5
    } else {
        values[mid]
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use road_types::{grid_patch, MeshBounds, MeshTopology, Point3, Vector3};

    fn bumpy_road() -> Mesh {
        let mut mesh = grid_patch(12, 6, 0.5);
        for p in &mut mesh.positions {
            p.y = 1.0 + 0.1 * (p.x * 2.0).sin() + 0.05 * p.z;
        }
        mesh
    }

    #[test]
    fn upright_mesh_is_only_lifted() {
        let mut mesh = bumpy_road();
        let lowest = mesh.positions.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
        let report = normalize_orientation(&mut mesh, UpAxis::Y);

        assert!(!report.flipped);
        assert!(report.median_up > 0.9);
        assert_relative_eq!(report.lift, -lowest, epsilon = 1e-12);
        assert_relative_eq!(mesh.bounds_opt().unwrap().min.y, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn upside_down_mesh_is_flipped() {
        let flip = RigidTransform::from_axis_angle(&Vector3::x_axis(), std::f64::consts::PI);
        let mut mesh = bumpy_road().transformed(&flip);

        let report = normalize_orientation(&mut mesh, UpAxis::Y);
        assert!(report.flipped);
        assert!(report.median_up < -0.9);

        let normals = mesh.normals.as_ref().unwrap();
        let upward = normals.iter().filter(|n| n.y > 0.0).count();
        assert_eq!(upward, normals.len());
    }

    #[test]
    fn normalizing_twice_is_stable() {
        let mut once = bumpy_road();
        normalize_orientation(&mut once, UpAxis::Y);
        let mut twice = once.clone();
        let report = normalize_orientation(&mut twice, UpAxis::Y);

        assert!(!report.flipped);
        assert_eq!(once.bounds_opt(), twice.bounds_opt());
        for (a, b) in once.positions.iter().zip(&twice.positions) {
            assert_relative_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn z_up_flip_uses_tilt_axis() {
        let mut mesh = Mesh::from_parts(
            vec![Point3::new(0.0, 0.0, 5.0), Point3::new(0.0, 1.0, 5.0), Point3::new(1.0, 0.0, 5.0)],
            vec![[0, 1, 2]],
        );
        // Normal (0,1,0)x(1,0,0) = -Z
        let report = normalize_orientation(&mut mesh, UpAxis::Z);
        assert!(report.flipped);
        assert!(mesh.normals.as_ref().unwrap()[0].z > 0.99);
        assert_relative_eq!(mesh.positions[0].z, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn empty_mesh_is_reported() {
        let mut mesh = Mesh::new();
        let report = normalize_orientation(&mut mesh, UpAxis::Y);
        assert!(report.empty);
        assert!(mesh.is_empty());
    }

    #[test]
    fn median_of_even_count() {
        assert_relative_eq!(median(vec![4.0, 1.0, 3.0, 2.0]), 2.5);
        assert_relative_eq!(median(vec![-1.0, 5.0, 0.0]), 0.0);
    }
}
