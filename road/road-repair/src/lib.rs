//! Topology repair for road-scan meshes.
//!
//! This crate provides tools for:
//! - Mesh validation and health reports
//! - Degenerate and duplicate triangle removal
//! - Non-manifold edge and vertex repair
//! - Connected component analysis (largest-component selection)
//! - Hole detection and filling with consistent winding
//!
//! # Layer 0
//!
//! This is a Layer 0 crate; it only logs through `tracing`.
//!
//! # Example
//!
//! ```
//! use road_repair::{keep_largest_component, repair_mesh, validate_mesh, ComponentMetric, RepairParams};
//! use road_types::grid_patch;
//!
//! let mut mesh = grid_patch(4, 4, 0.5);
//!
//! let summary = repair_mesh(&mut mesh, &RepairParams::default());
//! assert!(!summary.had_changes());
//!
//! let largest = keep_largest_component(&mesh, ComponentMetric::Area);
//! assert_eq!(validate_mesh(&largest.mesh).component_count, 1);
//! ```

// Safety: Deny unwrap/expect in library code. Tests may use them (workspace warns).
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod adjacency;
mod components;
mod error;
mod holes;
mod repair;
mod validate;

pub use adjacency::MeshAdjacency;
pub use components::{
    find_connected_components, keep_largest_component, ComponentAnalysis, ComponentMetric, ComponentSelection,
};
pub use error::{RepairError, RepairResult};
pub use holes::{detect_holes, fill_hole_ear_clipping, fill_holes, BoundaryLoop, HoleFillSummary};
pub use repair::{
    remove_degenerate_triangles, remove_duplicate_faces, remove_non_manifold_edges, repair_mesh,
    split_non_manifold_vertices, RepairParams, RepairSummary,
};
pub use validate::{validate_mesh, MeshReport};
