//! Iterative Closest Point (ICP) refinement.
//!
//! ICP iteratively refines the alignment between two point sets by:
//! 1. Finding closest point correspondences within a distance threshold
//! 2. Computing the rigid transform that best explains them, either
//!    point-to-point (Kabsch) or point-to-plane (linearised least squares)
//! 3. Applying the transform and repeating until fitness and inlier RMSE
//!    stop changing
//!
//! Fitness is the fraction of source points that found a partner;
//! inlier RMSE is measured over those partners only.

use nalgebra::{Matrix6, UnitQuaternion, Vector3, Vector6};
use rayon::prelude::*;
use road_transform::PointIndex;
use road_types::{Point3, PointCloud, RigidTransform};
use tracing::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::kabsch::compute_rigid_transform;
use crate::{RegistrationError, RegistrationResult};

/// Parameters for ICP registration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct IcpParams {
    /// Maximum correspondence distance in metres (default: 2.0).
    pub max_correspondence_distance: f64,
    /// Maximum number of iterations (default: 50).
    pub max_iterations: u32,
    /// Stop when fitness changes by less than this (default: 1e-6).
    pub relative_fitness: f64,
    /// Stop when inlier RMSE changes by less than this (default: 1e-6).
    pub relative_rmse: f64,
}

impl Default for IcpParams {
    fn default() -> Self {
        Self {
            max_correspondence_distance: 2.0,
            max_iterations: 50,
            relative_fitness: 1e-6,
            relative_rmse: 1e-6,
        }
    }
}

impl IcpParams {
    /// Creates new ICP parameters with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum correspondence distance.
    #[must_use]
    pub const fn with_max_correspondence_distance(mut self, distance: f64) -> Self {
        self.max_correspondence_distance = distance;
        self
    }

    /// Sets the maximum number of iterations.
    #[must_use]
    pub const fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets both relative convergence criteria.
    #[must_use]
    pub const fn with_convergence(mut self, relative_fitness: f64, relative_rmse: f64) -> Self {
        self.relative_fitness = relative_fitness;
        self.relative_rmse = relative_rmse;
        self
    }
}

/// Result of a registration: a transform plus how well it fits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IcpResult {
    /// Transform mapping the source onto the target.
    pub transform: RigidTransform,
    /// Fraction of source points with a partner within the threshold, in [0, 1].
    pub fitness: f64,
    /// RMSE over the partnered points.
    pub inlier_rmse: f64,
    /// Number of partnered points.
    pub correspondence_count: usize,
    /// Iterations performed.
    pub iterations: u32,
    /// Whether the relative criteria were met before the iteration cap.
    pub converged: bool,
}

/// A point correspondence between source and target.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Correspondence {
    source_idx: usize,
    target_idx: usize,
    distance_sq: f64,
}

/// Which error ICP minimises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Metric {
    PointToPoint,
    PointToPlane,
}

/// Score a transform without refining it.
///
/// Returns fitness and inlier RMSE of `transform` applied to `source`.
/// An empty source scores zero fitness.
#[must_use]
pub fn evaluate_registration(
    source: &PointCloud,
    target: &PointCloud,
    transform: &RigidTransform,
    max_correspondence_distance: f64,
) -> (f64, f64) {
    let index = PointIndex::new(&target.points);
    let moved: Vec<Point3<f64>> = source.points.iter().map(|p| transform.apply_point(p)).collect();
    let correspondences = find_correspondences(&moved, &index, max_correspondence_distance);
    fitness_and_rmse(&correspondences, source.len())
}

/// Point-to-point ICP.
///
/// # Errors
///
/// Returns an error if either cloud is empty, no correspondences are
/// found, or the transform estimate fails.
///
/// # Example
///
/// ```
/// use road_registration::{icp_point_to_point, IcpParams};
/// use road_types::{Point3, PointCloud, RigidTransform, Vector3};
///
/// let target = PointCloud::from_positions(
///     (0..64).map(|i| Point3::new(f64::from(i % 4), f64::from(i / 16), f64::from((i / 4) % 4))).collect(),
/// );
/// let mut source = target.clone();
/// source.transform(&RigidTransform::from_translation(Vector3::new(0.2, -0.1, 0.1)));
///
/// let result = icp_point_to_point(&source, &target, &RigidTransform::identity(), &IcpParams::default()).unwrap();
/// assert!(result.inlier_rmse < 1e-6);
/// ```
pub fn icp_point_to_point(
    source: &PointCloud,
    target: &PointCloud,
    initial: &RigidTransform,
    params: &IcpParams,
) -> RegistrationResult<IcpResult> {
    run_icp(source, target, initial, params, Metric::PointToPoint)
}

/// Point-to-plane ICP.
///
/// Minimises the distance from each moved source point to the tangent
/// plane of its partner. The target must carry normals. Directions the
/// surface leaves unconstrained, such as sliding along a flat road, are
/// damped so they stay at the current estimate.
///
/// # Errors
///
/// Returns an error if either cloud is empty, the target has no normals,
/// or no correspondences are found.
pub fn icp_point_to_plane(
    source: &PointCloud,
    target: &PointCloud,
    initial: &RigidTransform,
    params: &IcpParams,
) -> RegistrationResult<IcpResult> {
    if target.normals.is_none() {
        return Err(RegistrationError::MissingNormals { cloud: "target" });
    }
    run_icp(source, target, initial, params, Metric::PointToPlane)
}

fn run_icp(
    source: &PointCloud,
    target: &PointCloud,
    initial: &RigidTransform,
    params: &IcpParams,
    metric: Metric,
) -> RegistrationResult<IcpResult> {
    if source.is_empty() {
        return Err(RegistrationError::EmptySource);
    }
    if target.is_empty() {
        return Err(RegistrationError::EmptyTarget);
    }

    let index = PointIndex::new(&target.points);
    let threshold = params.max_correspondence_distance;

    let mut transform = *initial;
    let mut moved: Vec<Point3<f64>> = source.points.iter().map(|p| transform.apply_point(p)).collect();
    let mut correspondences = find_correspondences(&moved, &index, threshold);
    let (mut fitness, mut rmse) = fitness_and_rmse(&correspondences, source.len());

    let mut iterations = 0;
    let mut converged = false;

    for iter in 0..params.max_iterations {
        if correspondences.is_empty() {
            return Err(RegistrationError::NoCorrespondences { threshold });
        }
        iterations = iter + 1;

        let step = match metric {
            Metric::PointToPoint => point_to_point_step(&moved, target, &correspondences)?,
            Metric::PointToPlane => point_to_plane_step(&moved, target, &correspondences)?,
        };
        transform = step.compose(&transform);
        if !transform.is_finite() {
            return Err(RegistrationError::NonFiniteTransform);
        }

        moved = source.points.iter().map(|p| transform.apply_point(p)).collect();
        correspondences = find_correspondences(&moved, &index, threshold);
        let (new_fitness, new_rmse) = fitness_and_rmse(&correspondences, source.len());

        debug!(
            iteration = iterations,
            fitness = new_fitness,
            rmse = new_rmse,
            correspondences = correspondences.len(),
            "ICP iteration"
        );

        let settled = (new_fitness - fitness).abs() < params.relative_fitness
            && (new_rmse - rmse).abs() < params.relative_rmse;
        fitness = new_fitness;
        rmse = new_rmse;
        if settled {
            converged = true;
            break;
        }
    }

    if correspondences.is_empty() {
        return Err(RegistrationError::NoCorrespondences { threshold });
    }

    Ok(IcpResult {
        transform,
        fitness,
        inlier_rmse: rmse,
        correspondence_count: correspondences.len(),
        iterations,
        converged,
    })
}

/// Finds the closest target point for every moved source point.
pub(crate) fn find_correspondences(moved: &[Point3<f64>], index: &PointIndex, threshold: f64) -> Vec<Correspondence> {
    let max_dist_sq = threshold * threshold;
    moved
        .par_iter()
        .enumerate()
        .filter_map(|(source_idx, p)| {
            let hit = index.nearest(p)?;
            (hit.distance_sq <= max_dist_sq).then_some(Correspondence {
                source_idx,
                target_idx: hit.index,
                distance_sq: hit.distance_sq,
            })
        })
        .collect()
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn fitness_and_rmse(correspondences: &[Correspondence], source_len: usize) -> (f64, f64) {
    if correspondences.is_empty() || source_len == 0 {
        return (0.0, 0.0);
    }
    let sum_sq: f64 = correspondences.iter().map(|c| c.distance_sq).sum();
    let n = correspondences.len() as f64;
    (n / source_len as f64, (sum_sq / n).sqrt())
}

fn point_to_point_step(
    moved: &[Point3<f64>],
    target: &PointCloud,
    correspondences: &[Correspondence],
) -> RegistrationResult<RigidTransform> {
    let (from, to): (Vec<Point3<f64>>, Vec<Point3<f64>>) = correspondences
        .iter()
        .map(|c| (moved[c.source_idx], target.points[c.target_idx]))
        .unzip();
    compute_rigid_transform(&from, &to)
}

fn point_to_plane_step(
    moved: &[Point3<f64>],
    target: &PointCloud,
    correspondences: &[Correspondence],
) -> RegistrationResult<RigidTransform> {
    let normals = target
        .normals
        .as_ref()
        .ok_or(RegistrationError::MissingNormals { cloud: "target" })?;

    // Normal equations for x = [rx, ry, rz, tx, ty, tz] with small-angle rotation
    let (ata, atb) = correspondences
        .par_iter()
        .map(|c| {
            let p = moved[c.source_idx];
            let q = target.points[c.target_idx];
            let n = normals[c.target_idx];
            let cross = p.coords.cross(&n);
            let row = Vector6::new(cross.x, cross.y, cross.z, n.x, n.y, n.z);
            let residual = (q - p).dot(&n);
            (row * row.transpose(), row * residual)
        })
        .reduce(
            || (Matrix6::zeros(), Vector6::zeros()),
            |(a1, b1), (a2, b2)| (a1 + a2, b1 + b2),
        );

    // Tikhonov damping keeps unconstrained directions at zero
    let damping = (ata.trace() / 6.0).max(1.0) * 1e-9;
    let damped = ata + Matrix6::identity() * damping;
    let x = damped
        .cholesky()
        .ok_or(RegistrationError::DegenerateSystem)?
        .solve(&atb);

    let rotation = UnitQuaternion::from_euler_angles(x[0], x[1], x[2]);
    Ok(RigidTransform::from_parts(rotation, Vector3::new(x[3], x[4], x[5])))
}
