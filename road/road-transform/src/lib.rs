//! Plane fitting, PCA, spatial indexing and axis alignment for road-scan meshes.
//!
//! This crate provides tools for:
//! - RANSAC plane fitting with least-squares refinement
//! - PCA of point neighborhoods (best-fit planes and surface normals)
//! - Rotations that map one direction onto another
//! - A kd-tree point index that copes with flat and grid-aligned data
//!
//! # Layer 0
//!
//! This is a Layer 0 crate with no I/O and no logging.
//!
//! # Example
//!
//! ```
//! use road_transform::{ransac_plane, rotation_between, RansacConfig};
//! use road_types::{Point3, UpAxis, Vector3};
//!
//! // A floor tilted by a few degrees and raised by 3 m
//! let points: Vec<Point3<f64>> = (0..100)
//!     .map(|i| {
//!         let (x, z) = (f64::from(i % 10), f64::from(i / 10));
//!         Point3::new(x, 3.0 + 0.05 * x, z)
//!     })
//!     .collect();
//!
//! let fit = ransac_plane(&points, &RansacConfig::new().with_seed(7)).unwrap();
//! let plane = fit.plane.facing_up(UpAxis::Y);
//! let level = rotation_between(plane.normal, Vector3::y());
//! assert!((level.apply_vector(&plane.normal).y - 1.0).abs() < 1e-6);
//! ```

// Safety: Deny unwrap/expect in library code. Tests may use them (workspace warns).
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod error;
mod index;
mod pca;
mod plane;
mod ransac;
mod transform;

pub use error::{TransformError, TransformResult};
pub use index::{Neighbor, PointIndex};
pub use pca::{pca_from_iter, PcaResult};
pub use plane::Plane;
pub use ransac::{ransac_plane, RansacConfig, RansacResult};
pub use transform::{rotation_about, rotation_between};
