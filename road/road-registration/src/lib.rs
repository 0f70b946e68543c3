//! Pairwise registration and stitching of cleaned road chunks.
//!
//! This crate provides tools for aligning overlapping scans:
//! - **ICP (Iterative Closest Point)** - point-to-point and point-to-plane
//!   refinement, reporting fitness and inlier RMSE
//! - **FPFH descriptors** - rotation-invariant local shape features
//! - **Feature RANSAC** - coarse alignment from descriptor matches with
//!   edge-length and distance checks
//! - **Stitching** - register, then concatenate two meshes, falling back
//!   to the identity transform when registration fails
//!
//! # Layer 0
//!
//! This is a Layer 0 crate; it only logs through `tracing`.
//!
//! # Quick Start
//!
//! ```
//! use road_registration::{stitch, StitchParams};
//! use road_types::{grid_patch, MeshTopology, RigidTransform, Vector3};
//!
//! let mut fixed = grid_patch(20, 20, 0.25);
//! for p in &mut fixed.positions {
//!     p.y = (p.x * 0.7).sin() * (p.z * 0.9).cos() * 0.3;
//! }
//! fixed.compute_vertex_normals();
//! let moving = fixed.transformed(&RigidTransform::from_translation(Vector3::new(0.1, 0.0, 0.05)));
//!
//! let result = stitch(&fixed, &moving, &StitchParams::trust_pose());
//! assert!(!result.report.used_fallback);
//! assert_eq!(result.mesh.vertex_count(), fixed.vertex_count() * 2);
//! ```
//!
//! # Mode Selection
//!
//! | Scenario | Mode |
//! |----------|------|
//! | Chunks from one capture session, poses already shared | [`StitchMode::TrustPose`] |
//! | Chunks with unknown or large relative pose | [`StitchMode::Full`] |

// Safety: Deny unwrap/expect in library code. Tests may use them (workspace warns).
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod error;
mod features;
mod global;
mod icp;
mod kabsch;
mod normals;
mod stitch;

pub use error::{RegistrationError, RegistrationResult};
pub use features::{compute_fpfh, match_features, FpfhDescriptor, FPFH_DIMENSION};
pub use global::{ransac_feature_registration, FeatureRansacParams, RansacAlignment};
pub use icp::{evaluate_registration, icp_point_to_plane, icp_point_to_point, IcpParams, IcpResult};
pub use kabsch::compute_rigid_transform;
pub use normals::estimate_normals;
pub use stitch::{merge_meshes, register, stitch, Registration, RegistrationReport, StitchMode, StitchParams, StitchResult};
