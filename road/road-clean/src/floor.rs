//! Floor search: find the road plane and level it.
//!
//! A scan can come in lying on its side, so the most dominant plane may be
//! a wall. Each attempt tips the mesh a further 90° about the horizontal
//! tilt axis and fits a plane again; the first plane that is closer to
//! horizontal than vertical is taken as the floor.

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use road_transform::{ransac_plane, rotation_about, rotation_between, Plane, RansacConfig};
use road_types::{Mesh, Point3, RigidTransform, UpAxis};
use tracing::{debug, info, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::CleanWarning;

/// Parameters for the floor search.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FloorSearchParams {
    /// Vertices sampled for plane fitting (default: 5000).
    pub sample_count: usize,
    /// RANSAC inlier distance (default: 0.05).
    pub distance_threshold: f64,
    /// RANSAC iterations per attempt (default: 1000).
    pub iterations: usize,
    /// Minimum `|n · up|` for a plane to count as floor (default: 0.5).
    pub min_flatness: f64,
    /// Orientations tried, 90° apart (default: 5).
    pub max_attempts: usize,
    /// Up axis.
    pub up: UpAxis,
    /// Seed for vertex sampling and RANSAC.
    pub seed: u64,
}

impl Default for FloorSearchParams {
    fn default() -> Self {
        Self {
            sample_count: 5000,
            distance_threshold: 0.05,
            iterations: 1000,
            min_flatness: 0.5,
            max_attempts: 5,
            up: UpAxis::Y,
            seed: 42,
        }
    }
}

impl FloorSearchParams {
    /// Sets the up axis.
    #[must_use]
    pub const fn with_up(mut self, up: UpAxis) -> Self {
        self.up = up;
        self
    }

    /// Sets the seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Outcome of a floor search.
#[derive(Debug, Clone, PartialEq)]
pub struct FloorSearch {
    /// Transform that levels the floor and centres the mesh at height
    /// zero. `None` if no floor was found.
    pub transform: Option<RigidTransform>,
    /// The accepted plane, in the frame of the attempt that found it.
    pub plane: Option<Plane>,
    /// Attempts made.
    pub attempts: usize,
    /// Best flatness seen over all attempts.
    pub best_flatness: f64,
}

impl FloorSearch {
    /// Whether a floor was found.
    #[must_use]
    pub const fn found(&self) -> bool {
        self.transform.is_some()
    }

    /// The warning to record when no floor was found.
    #[must_use]
    pub fn warning(&self) -> Option<CleanWarning> {
        (!self.found()).then_some(CleanWarning::FloorNotFound {
            attempts: self.attempts,
            best_flatness: self.best_flatness,
        })
    }
}

/// Search for a floor plane without touching the mesh.
///
/// Each attempt rotates the sampled vertices by a further 90° about the
/// tilt axis, fits a plane by RANSAC, and accepts it if its flatness
/// exceeds `min_flatness`. The accepted transform is that rotation,
/// followed by the rotation taking the plane normal onto up, followed by
/// a vertical shift putting the vertex centroid at height zero.
#[must_use]
pub fn find_floor(mesh: &Mesh, params: &FloorSearchParams) -> FloorSearch {
    let mut search = FloorSearch {
        transform: None,
        plane: None,
        attempts: 0,
        best_flatness: 0.0,
    };
    if mesh.positions.len() < 3 {
        return search;
    }

    let samples = sample_vertices(mesh, params.sample_count, params.seed);
    let config = RansacConfig::new()
        .with_inlier_threshold(params.distance_threshold)
        .with_max_iterations(params.iterations)
        .with_seed(params.seed);

    for attempt in 0..params.max_attempts {
        search.attempts = attempt + 1;

        #[allow(clippy::cast_precision_loss)]
        let candidate = rotation_about(
            params.up.tilt_axis().into_inner(),
            std::f64::consts::FRAC_PI_2 * attempt as f64,
        );
        let rotated: Vec<Point3<f64>> = samples.iter().map(|p| candidate.apply_point(p)).collect();

        let plane = match ransac_plane(&rotated, &config) {
            Ok(fit) => fit.plane,
            Err(e) => {
                debug!(attempt, error = %e, "Floor plane fit failed");
                continue;
            }
        };

        let flatness = plane.flatness(params.up);
        search.best_flatness = search.best_flatness.max(flatness);
        debug!(attempt, flatness, "Floor candidate");

        if flatness > params.min_flatness {
            let plane = plane.facing_up(params.up);
            let leveled = rotation_between(plane.normal, params.up.unit().into_inner()).compose(&candidate);
            let transform = leveled.then_translate(params.up.unit().into_inner() * -centroid_height(mesh, &leveled, params.up));
            search.transform = Some(transform);
            search.plane = Some(plane);
            return search;
        }
    }

    search
}

/// Find the floor and level the mesh in place.
///
/// If no floor is found the mesh is left untouched and a warning is
/// logged; the caller decides what to do with the uncorrected scan.
pub fn level_floor(mesh: &mut Mesh, params: &FloorSearchParams) -> FloorSearch {
    let search = find_floor(mesh, params);
    match &search.transform {
        Some(transform) => {
            mesh.transform(transform);
            info!(
                attempts = search.attempts,
                rotation = transform.rotation_angle(),
                "Leveled floor"
            );
        }
        None => warn!(
            attempts = search.attempts,
            best_flatness = search.best_flatness,
            "No floor found, orientation left uncorrected"
        ),
    }
    search
}

/// Up to `count` distinct vertices, chosen uniformly with a fixed seed.
fn sample_vertices(mesh: &Mesh, count: usize, seed: u64) -> Vec<Point3<f64>> {
    let n = mesh.positions.len();
    if n <= count {
        return mesh.positions.clone();
    }
    let mut rng = StdRng::seed_from_u64(seed);
    sample(&mut rng, n, count).iter().map(|i| mesh.positions[i]).collect()
}

#[allow(clippy::cast_precision_loss)]
fn centroid_height(mesh: &Mesh, transform: &RigidTransform, up: UpAxis) -> f64 {
    let sum: f64 = mesh.positions.iter().map(|p| up.height(&transform.apply_point(p))).sum();
    sum / mesh.positions.len() as f64
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use road_types::{grid_patch, Vector3};

    fn centroid_y(mesh: &Mesh) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let n = mesh.positions.len() as f64;
        mesh.positions.iter().map(|p| p.y).sum::<f64>() / n
    }

    #[test]
    fn level_floor_is_kept_level() {
        let mut mesh = grid_patch(10, 10, 0.5);
        mesh.translate(Vector3::new(0.0, 2.0, 0.0));

        let search = level_floor(&mut mesh, &FloorSearchParams::default());
        assert!(search.found());
        assert_eq!(search.attempts, 1);
        for p in &mesh.positions {
            assert_relative_eq!(p.y, 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn tilted_floor_is_leveled_and_centred() {
        let tilt = RigidTransform::from_axis_angle(&Vector3::z_axis(), 0.3);
        let mut mesh = grid_patch(10, 10, 0.5).transformed(&tilt);
        mesh.translate(Vector3::new(0.0, 5.0, 0.0));

        let search = level_floor(&mut mesh, &FloorSearchParams::default());
        assert!(search.found());
        assert!(search.best_flatness > 0.9);
        assert_relative_eq!(centroid_y(&mesh), 0.0, epsilon = 1e-9);
        let spread = mesh.positions.iter().map(|p| p.y.abs()).fold(0.0, f64::max);
        assert!(spread < 1e-6);
    }

    #[test]
    fn floor_on_its_side_is_found_on_second_attempt() {
        // Floor standing up as a wall facing +Z; one 90° turn about X lays it down
        let stand_up = RigidTransform::from_axis_angle(&Vector3::x_axis(), std::f64::consts::FRAC_PI_2);
        let mut mesh = grid_patch(10, 10, 0.5).transformed(&stand_up);

        let search = level_floor(&mut mesh, &FloorSearchParams::default());
        assert!(search.found());
        assert_eq!(search.attempts, 2);
        let spread = mesh.positions.iter().map(|p| p.y.abs()).fold(0.0, f64::max);
        assert!(spread < 1e-6);
    }

    #[test]
    fn pure_wall_exhausts_attempts() {
        // Wall in the x = 0 plane: turning about X never makes it horizontal
        let lay_on_side = RigidTransform::from_axis_angle(&Vector3::z_axis(), std::f64::consts::FRAC_PI_2);
        let mut mesh = grid_patch(10, 10, 0.5).transformed(&lay_on_side);
        let before = mesh.clone();

        let search = level_floor(&mut mesh, &FloorSearchParams::default());
        assert!(!search.found());
        assert_eq!(search.attempts, 5);
        assert!(search.best_flatness < 1e-6);
        assert!(matches!(search.warning(), Some(CleanWarning::FloorNotFound { attempts: 5, .. })));
        assert_eq!(mesh, before);
    }

    #[test]
    fn tiny_mesh_is_not_searched() {
        let mesh = Mesh::from_parts(vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)], vec![]);
        let search = find_floor(&mesh, &FloorSearchParams::default());
        assert!(!search.found());
        assert_eq!(search.attempts, 0);
    }

    #[test]
    fn sampling_is_seeded() {
        let mesh = grid_patch(100, 100, 0.1);
        let a = sample_vertices(&mesh, 500, 9);
        let b = sample_vertices(&mesh, 500, 9);
        assert_eq!(a.len(), 500);
        assert_eq!(a, b);
    }
}
