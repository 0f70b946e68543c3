//! Feature-matched RANSAC for coarse global alignment.
//!
//! Matches FPFH descriptors between the clouds, then repeatedly samples
//! three matches, fits a rigid transform to them, and keeps the
//! hypothesis that brings the most source points within reach of the
//! target. Cheap geometric checks discard hopeless samples before any
//! scoring happens.

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use road_transform::PointIndex;
use road_types::{Point3, PointCloud, RigidTransform};
use tracing::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::features::{match_features, FpfhDescriptor};
use crate::icp::{find_correspondences, fitness_and_rmse};
use crate::kabsch::compute_rigid_transform;
use crate::{RegistrationError, RegistrationResult};

/// Correspondences per hypothesis.
const SAMPLE_SIZE: usize = 3;

/// Parameters for feature RANSAC.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FeatureRansacParams {
    /// Inlier distance for scoring and for the sample distance check (default: 0.75).
    pub max_correspondence_distance: f64,
    /// Sampled edges must agree in length to within this ratio (default: 0.9).
    pub edge_length_ratio: f64,
    /// Iteration cap (default: 4000).
    pub max_iterations: usize,
    /// Stop once this probability of having sampled an all-inlier set is reached (default: 0.999).
    pub confidence: f64,
    /// Random seed.
    pub seed: u64,
}

impl Default for FeatureRansacParams {
    fn default() -> Self {
        Self {
            max_correspondence_distance: 0.75,
            edge_length_ratio: 0.9,
            max_iterations: 4000,
            confidence: 0.999,
            seed: 42,
        }
    }
}

impl FeatureRansacParams {
    /// Sets the seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the iteration cap.
    #[must_use]
    pub const fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

/// Best hypothesis found by feature RANSAC.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RansacAlignment {
    /// Transform mapping the source onto the target.
    pub transform: RigidTransform,
    /// Fraction of source points within the inlier distance.
    pub fitness: f64,
    /// RMSE over those inliers.
    pub inlier_rmse: f64,
    /// Hypotheses drawn.
    pub iterations: usize,
}

/// Coarse alignment of `source` onto `target` from FPFH matches.
///
/// # Errors
///
/// Returns an error if either cloud is empty, the descriptor counts do
/// not match the clouds, or no sample passes the checks.
pub fn ransac_feature_registration(
    source: &PointCloud,
    target: &PointCloud,
    source_features: &[FpfhDescriptor],
    target_features: &[FpfhDescriptor],
    params: &FeatureRansacParams,
) -> RegistrationResult<RansacAlignment> {
    if source.is_empty() {
        return Err(RegistrationError::EmptySource);
    }
    if target.is_empty() {
        return Err(RegistrationError::EmptyTarget);
    }
    if source_features.len() != source.len() || target_features.len() != target.len() {
        return Err(RegistrationError::MismatchedPairs {
            source_len: source_features.len(),
            target_len: target_features.len(),
        });
    }

    let matches = match_features(source_features, target_features);
    if matches.len() < SAMPLE_SIZE {
        return Err(RegistrationError::RansacFailed { iterations: 0 });
    }

    let index = PointIndex::new(&target.points);
    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut best: Option<RansacAlignment> = None;
    let mut needed = params.max_iterations;
    let mut iterations = 0;

    while iterations < needed.min(params.max_iterations) {
        iterations += 1;

        let picks = sample(&mut rng, matches.len(), SAMPLE_SIZE);
        let from: Vec<Point3<f64>> = picks.iter().map(|k| source.points[matches[k].0]).collect();
        let to: Vec<Point3<f64>> = picks.iter().map(|k| target.points[matches[k].1]).collect();

        if !edges_agree(&from, &to, params.edge_length_ratio) {
            continue;
        }
        let Ok(transform) = compute_rigid_transform(&from, &to) else {
            continue;
        };
        let within_reach = from
            .iter()
            .zip(&to)
            .all(|(f, t)| (transform.apply_point(f) - t).norm() <= params.max_correspondence_distance);
        if !within_reach {
            continue;
        }

        let moved: Vec<Point3<f64>> = source.points.iter().map(|p| transform.apply_point(p)).collect();
        let correspondences = find_correspondences(&moved, &index, params.max_correspondence_distance);
        let (fitness, inlier_rmse) = fitness_and_rmse(&correspondences, source.len());

        let better = best.map_or(true, |b| {
            fitness > b.fitness || (fitness == b.fitness && inlier_rmse < b.inlier_rmse)
        });
        if better {
            best = Some(RansacAlignment {
                transform,
                fitness,
                inlier_rmse,
                iterations,
            });
            needed = required_iterations(fitness, params.confidence).unwrap_or(needed);
            debug!(iteration = iterations, fitness, inlier_rmse, needed, "RANSAC improved hypothesis");
        }
    }

    match best {
        Some(found) => Ok(RansacAlignment { iterations, ..found }),
        None => Err(RegistrationError::RansacFailed { iterations }),
    }
}

/// Every pair of sampled points spans edges of similar length in both clouds.
fn edges_agree(from: &[Point3<f64>], to: &[Point3<f64>], ratio: f64) -> bool {
    for i in 0..from.len() {
        for j in (i + 1)..from.len() {
            let a = (from[i] - from[j]).norm();
            let b = (to[i] - to[j]).norm();
            if a < ratio * b || b < ratio * a {
                return false;
            }
        }
    }
    true
}

/// Iterations needed to draw one all-inlier sample at `confidence`,
/// treating fitness as the inlier rate.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_possible_wrap)]
fn required_iterations(fitness: f64, confidence: f64) -> Option<usize> {
    let all_inlier = fitness.powi(SAMPLE_SIZE as i32);
    if all_inlier <= 0.0 {
        return None;
    }
    if all_inlier >= 1.0 {
        return Some(0);
    }
    let estimate = (1.0 - confidence).ln() / (1.0 - all_inlier).ln();
    estimate.is_finite().then(|| estimate.ceil().max(0.0) as usize)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::{compute_fpfh, estimate_normals};
    use road_types::{grid_patch, UnitQuaternion, UpAxis, Vector3};

    fn hill() -> PointCloud {
        let mut mesh = grid_patch(24, 24, 0.5);
        for p in &mut mesh.positions {
            p.y = 0.8 * (-((p.x - 4.0).powi(2) + (p.z - 7.0).powi(2)) / 6.0).exp()
                + 0.5 * (-((p.x - 9.0).powi(2) + (p.z - 3.0).powi(2)) / 3.0).exp()
                + 0.03 * p.x;
        }
        let mut cloud = PointCloud::from_positions(mesh.positions);
        estimate_normals(&mut cloud, 1.0, 30, UpAxis::Y).unwrap();
        cloud
    }

    #[test]
    fn recovers_large_yaw_and_shift() {
        let target = hill();
        let offset = RigidTransform::from_parts(
            UnitQuaternion::from_euler_angles(0.0, 0.7, 0.0),
            Vector3::new(3.0, 0.0, -2.0),
        );
        let mut source = target.clone();
        source.transform(&offset);

        let source_features = compute_fpfh(&source, 1.5, 100).unwrap();
        let target_features = compute_fpfh(&target, 1.5, 100).unwrap();
        let aligned = ransac_feature_registration(
            &source,
            &target,
            &source_features,
            &target_features,
            &FeatureRansacParams::default(),
        )
        .unwrap();

        assert!(aligned.fitness > 0.8, "fitness {}", aligned.fitness);
        let residual = aligned.transform.compose(&offset);
        assert!(residual.rotation_angle() < 0.2);
    }

    #[test]
    fn same_seed_same_answer() {
        let target = hill();
        let mut source = target.clone();
        source.transform(&RigidTransform::from_translation(Vector3::new(1.0, 0.0, 0.5)));
        let sf = compute_fpfh(&source, 1.5, 100).unwrap();
        let tf = compute_fpfh(&target, 1.5, 100).unwrap();
        let params = FeatureRansacParams::default().with_max_iterations(200);

        let a = ransac_feature_registration(&source, &target, &sf, &tf, &params).unwrap();
        let b = ransac_feature_registration(&source, &target, &sf, &tf, &params).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn descriptor_count_must_match() {
        let cloud = hill();
        let features = compute_fpfh(&cloud, 1.5, 100).unwrap();
        let err = ransac_feature_registration(&cloud, &cloud, &features[1..], &features, &FeatureRansacParams::default())
            .unwrap_err();
        assert!(matches!(err, RegistrationError::MismatchedPairs { .. }));
    }

    #[test]
    fn edge_check_rejects_stretched_sample() {
        let from = [Point3::origin(), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 0.0, 1.0)];
        let same = from;
        let stretched = [Point3::origin(), Point3::new(2.0, 0.0, 0.0), Point3::new(0.0, 0.0, 1.0)];
        assert!(edges_agree(&from, &same, 0.9));
        assert!(!edges_agree(&from, &stretched, 0.9));
    }

    #[test]
    fn iteration_estimate() {
        assert_eq!(required_iterations(0.0, 0.999), None);
        assert_eq!(required_iterations(1.0, 0.999), Some(0));
        // 0.5^3 = 0.125 inlier rate needs about 52 draws
        assert_eq!(required_iterations(0.5, 0.999), Some(52));
    }
}
