//! Pairwise chunk stitching: register, then merge.
//!
//! A failed registration never aborts a stitch. The moving chunk is then
//! merged untransformed and the report says so, so callers can surface
//! the misalignment instead of losing the chunk.

use road_types::{Mesh, PointCloud, RigidTransform, UpAxis};
use tracing::{debug, info, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::features::compute_fpfh;
use crate::global::{ransac_feature_registration, FeatureRansacParams};
use crate::icp::{evaluate_registration, icp_point_to_plane, IcpParams};
use crate::normals::estimate_normals;
use crate::{RegistrationError, RegistrationResult};

/// How much alignment work a stitch does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum StitchMode {
    /// Chunks are already roughly co-located; refine with ICP from identity.
    #[default]
    TrustPose,
    /// Coarse FPFH + RANSAC alignment, then tight ICP.
    Full,
}

/// Parameters for stitching two chunks.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct StitchParams {
    /// Registration mode.
    pub mode: StitchMode,
    /// ICP settings. In full mode the distance threshold is replaced by
    /// `fine_threshold`.
    pub icp: IcpParams,
    /// Voxel size for downsampling before feature extraction.
    pub voxel_size: f64,
    /// Normal estimation radius on the downsampled clouds.
    pub normal_radius: f64,
    /// Neighbour cap for normal estimation.
    pub normal_max_neighbors: usize,
    /// FPFH radius.
    pub feature_radius: f64,
    /// Neighbour cap for FPFH.
    pub feature_max_neighbors: usize,
    /// Coarse alignment settings.
    pub ransac: FeatureRansacParams,
    /// ICP correspondence distance after coarse alignment.
    pub fine_threshold: f64,
    /// Up direction, used to orient estimated normals.
    pub up: UpAxis,
}

impl Default for StitchParams {
    fn default() -> Self {
        Self::trust_pose()
    }
}

impl StitchParams {
    /// ICP only, starting from identity, with a metres-scale threshold.
    #[must_use]
    pub fn trust_pose() -> Self {
        Self {
            mode: StitchMode::TrustPose,
            icp: IcpParams::default(),
            voxel_size: 0.5,
            normal_radius: 1.0,
            normal_max_neighbors: 30,
            feature_radius: 2.5,
            feature_max_neighbors: 100,
            ransac: FeatureRansacParams::default(),
            fine_threshold: 0.2,
            up: UpAxis::default(),
        }
    }

    /// Coarse feature alignment followed by tight ICP.
    #[must_use]
    pub fn full() -> Self {
        Self {
            mode: StitchMode::Full,
            ..Self::trust_pose()
        }
    }

    /// Sets the up axis.
    #[must_use]
    pub const fn with_up(mut self, up: UpAxis) -> Self {
        self.up = up;
        self
    }
}

/// Outcome of registering one cloud onto another.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Registration {
    /// Transform mapping the moving cloud onto the fixed one.
    pub transform: RigidTransform,
    /// Fraction of moving points with a partner, in [0, 1].
    pub fitness: f64,
    /// RMSE over partnered points.
    pub inlier_rmse: f64,
}

/// Diagnostics of a stitch.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationReport {
    /// Transform applied to the moving mesh.
    pub transform: RigidTransform,
    /// Fitness of that transform, zero after a fallback.
    pub fitness: f64,
    /// Inlier RMSE of that transform, zero after a fallback.
    pub inlier_rmse: f64,
    /// Fitness of the applied transform at `fine_threshold`.
    ///
    /// ICP's own score counts every moving point within the metres-scale
    /// threshold, including points past the seam paired with the fixed
    /// chunk's edge. At the fine threshold only points lying on the fixed
    /// surface pair up.
    pub overlap_fitness: f64,
    /// RMSE of the applied transform at `fine_threshold`.
    pub overlap_rmse: f64,
    /// Whether registration failed and the identity transform was used.
    pub used_fallback: bool,
    /// Why registration failed, when it did.
    pub fallback_reason: Option<RegistrationError>,
}

/// A merged mesh and how it was aligned.
#[derive(Debug, Clone)]
pub struct StitchResult {
    /// Fixed mesh followed by the transformed moving mesh.
    pub mesh: Mesh,
    /// Registration diagnostics.
    pub report: RegistrationReport,
}

/// Register `moving` onto `fixed`.
///
/// Both clouds need normals in trust-pose mode only for the fixed side;
/// missing normals are estimated. Full mode estimates normals on the
/// downsampled clouds itself.
///
/// # Errors
///
/// Returns an error if ICP fails. A failed coarse alignment is logged
/// and ICP proceeds from identity.
pub fn register(moving: &PointCloud, fixed: &PointCloud, params: &StitchParams) -> RegistrationResult<Registration> {
    match params.mode {
        StitchMode::TrustPose => {
            let mut target = fixed.clone();
            if !target.has_normals() {
                estimate_normals(&mut target, params.normal_radius, params.normal_max_neighbors, params.up)?;
            }
            let result = icp_point_to_plane(moving, &target, &RigidTransform::identity(), &params.icp)?;
            Ok(Registration {
                transform: result.transform,
                fitness: result.fitness,
                inlier_rmse: result.inlier_rmse,
            })
        }
        StitchMode::Full => register_full(moving, fixed, params),
    }
}

fn register_full(moving: &PointCloud, fixed: &PointCloud, params: &StitchParams) -> RegistrationResult<Registration> {
    let coarse = match coarse_alignment(moving, fixed, params) {
        Ok(transform) => transform,
        Err(e) => {
            warn!(error = %e, "Coarse alignment failed, refining from identity");
            RigidTransform::identity()
        }
    };

    let mut source = moving.clone();
    source.normals = None;
    let mut target = fixed.clone();
    estimate_normals(&mut target, params.normal_radius, params.normal_max_neighbors, params.up)?;

    let fine = params.icp.with_max_correspondence_distance(params.fine_threshold);
    let result = icp_point_to_plane(&source, &target, &coarse, &fine)?;
    Ok(Registration {
        transform: result.transform,
        fitness: result.fitness,
        inlier_rmse: result.inlier_rmse,
    })
}

fn coarse_alignment(moving: &PointCloud, fixed: &PointCloud, params: &StitchParams) -> RegistrationResult<RigidTransform> {
    let mut source = moving.voxel_downsample(params.voxel_size);
    let mut target = fixed.voxel_downsample(params.voxel_size);
    source.normals = None;
    target.normals = None;
    estimate_normals(&mut source, params.normal_radius, params.normal_max_neighbors, params.up)?;
    estimate_normals(&mut target, params.normal_radius, params.normal_max_neighbors, params.up)?;

    let source_features = compute_fpfh(&source, params.feature_radius, params.feature_max_neighbors)?;
    let target_features = compute_fpfh(&target, params.feature_radius, params.feature_max_neighbors)?;
    debug!(source = source.len(), target = target.len(), "Downsampled clouds for feature matching");

    let coarse = ransac_feature_registration(&source, &target, &source_features, &target_features, &params.ransac)?;
    info!(
        fitness = coarse.fitness,
        rmse = coarse.inlier_rmse,
        iterations = coarse.iterations,
        "Coarse alignment"
    );
    Ok(coarse.transform)
}

/// Concatenate `fixed` and `moving` after moving `moving` by `transform`.
///
/// No welding: the result has exactly the vertices and faces of both
/// inputs, with `moving`'s indices offset by `fixed`'s vertex count.
/// Normals are recomputed over the merged geometry.
#[must_use]
pub fn merge_meshes(fixed: &Mesh, moving: &Mesh, transform: &RigidTransform) -> Mesh {
    let mut merged = fixed.clone();
    merged.append(&moving.transformed(transform));
    merged.compute_vertex_normals();
    merged
}

/// Align `moving` onto `fixed` and merge them.
///
/// If registration fails the identity transform is used and
/// [`RegistrationReport::used_fallback`] is set.
#[must_use]
pub fn stitch(fixed: &Mesh, moving: &Mesh, params: &StitchParams) -> StitchResult {
    let mut fixed_with_normals = fixed.clone();
    if !fixed_with_normals.has_normals() {
        fixed_with_normals.compute_vertex_normals();
    }
    let target = PointCloud::from_mesh(&fixed_with_normals);
    let source = PointCloud::from_mesh(moving);

    let (transform, fitness, inlier_rmse, fallback_reason) = match register(&source, &target, params) {
        Ok(registration) => {
            info!(
                fitness = registration.fitness,
                rmse = registration.inlier_rmse,
                rotation = registration.transform.rotation_angle(),
                "Registered chunk"
            );
            (registration.transform, registration.fitness, registration.inlier_rmse, None)
        }
        Err(e) => {
            warn!(error = %e, "Registration failed, merging with identity transform");
            (RigidTransform::identity(), 0.0, 0.0, Some(e))
        }
    };

    let (overlap_fitness, overlap_rmse) = evaluate_registration(&source, &target, &transform, params.fine_threshold);
    debug!(overlap_fitness, overlap_rmse, "Seam overlap");
    let report = RegistrationReport {
        transform,
        fitness,
        inlier_rmse,
        overlap_fitness,
        overlap_rmse,
        used_fallback: fallback_reason.is_some(),
        fallback_reason,
    };

    StitchResult {
        mesh: merge_meshes(fixed, moving, &report.transform),
        report,
    }
}
