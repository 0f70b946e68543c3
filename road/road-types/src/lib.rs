//! Core geometry types for road-scan fusion.
//!
//! This crate provides the foundational types shared by every stage of the
//! cleaning-and-fusion pipeline:
//!
//! - [`Mesh`] - Indexed triangle mesh with parallel normal/color arrays
//! - [`PointCloud`] - Points with optional normals and colors
//! - [`Aabb`] - Axis-aligned bounding box
//! - [`RigidTransform`] - Rotation plus translation, never scale or shear
//! - [`UpAxis`] - Which axis is "up" in the canonical frame
//!
//! # Layer 0 Crate
//!
//! No I/O, no logging, no framework dependencies. Everything here is
//! plain data plus the geometric bookkeeping that keeps it consistent.
//!
//! # Units
//!
//! Coordinates are `f64` meters, as produced by the photogrammetry front end.
//!
//! # Example
//!
//! ```
//! use road_types::{grid_patch, Mesh, MeshBounds, MeshTopology, RigidTransform, Vector3};
//!
//! let mut road = grid_patch(10, 4, 1.0);
//! road.transform(&RigidTransform::from_translation(Vector3::new(0.0, 2.0, 0.0)));
//!
//! assert_eq!(road.face_count(), 80);
//! assert!((road.bounds().min.y - 2.0).abs() < 1e-12);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

mod axis;
mod bounds;
mod cloud;
mod color;
mod error;
mod mesh;
mod traits;
mod transform;

pub use axis::UpAxis;
pub use bounds::Aabb;
pub use cloud::PointCloud;
pub use color::VertexColor;
pub use error::MeshError;
pub use mesh::{grid_patch, Mesh};
pub use traits::{MeshBounds, MeshTopology};
pub use transform::RigidTransform;

// Re-export nalgebra types for convenience
pub use nalgebra::{Point3, UnitQuaternion, Vector3};
