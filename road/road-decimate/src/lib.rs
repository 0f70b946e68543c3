//! Mesh simplification using quadric error metrics.
//!
//! Reconstructed road surfaces are dense; this crate brings them down to
//! a fixed triangle budget by collapsing the edges whose removal moves
//! the surface least.
//!
//! # Features
//!
//! - **Edge collapse**: Iteratively collapse edges with lowest error
//! - **Quadric error metrics**: Area-weighted face planes plus border constraint planes
//! - **Color blending**: The surviving vertex blends the colors of both endpoints
//! - **Pinning**: Optionally keep open borders and creases in place
//! - **Target control**: Specify target by triangle count or ratio
//!
//! # Layer 0
//!
//! This is a Layer 0 crate; it only logs through `tracing`.
//!
//! # Example
//!
//! ```
//! use road_decimate::{decimate_mesh, DecimateParams};
//! use road_types::grid_patch;
//!
//! let patch = grid_patch(16, 16, 0.25);
//!
//! let result = decimate_mesh(&patch, &DecimateParams::with_target_triangles(128)).unwrap();
//! assert!(result.final_triangles <= 128);
//!
//! // The outline stays where it was
//! let kept = decimate_mesh(&patch, &DecimateParams::conservative()).unwrap();
//! println!("{kept}");
//! ```
//!
//! # Algorithm
//!
//! 1. Every vertex accumulates the quadrics of its faces' planes, weighted
//!    by face area, plus constraint planes along open borders
//! 2. Each edge gets the position minimising the summed quadric, and that
//!    error as its cost
//! 3. The cheapest edge is collapsed unless it would break the local
//!    topology or turn a face over; its neighbourhood is re-queued
//! 4. Collapses stop at the target or when the queue runs dry

// Safety: Deny unwrap/expect in library code. Tests may use them (workspace warns).
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs)]

mod decimate;
mod error;
mod params;
mod quadric;
mod result;

pub use decimate::decimate_mesh;
pub use error::{DecimateError, DecimateResult};
pub use params::{DecimateParams, DEFAULT_TARGET_TRIANGLES};
pub use quadric::Quadric;
pub use result::DecimationResult;
