//! Per-chunk cleaning of raw road-scan meshes.
//!
//! A raw chunk from photogrammetry arrives in an arbitrary vertical sense,
//! surrounded by debris, sky remnants and walls, with a thinly sampled
//! road surface. This crate turns it into a clean road surface:
//!
//! - **Floor search** - find the road plane even in a scan lying on its
//!   side, and level it
//! - **Orientation** - turn the mesh right side up and put its lowest
//!   point at height zero
//! - **Density filter** - crop to the truth-mask region and remove
//!   statistical outliers, never touching the ground band
//! - **Pruning** - keep the largest connected surface, optionally after
//!   cutting a height band and removing walls
//! - **Flattening** - project the ground band onto its best-fit plane
//! - **Surface stages** - repair topology, close holes or rebuild the
//!   surface implicitly, recover colors, smooth and decimate
//!
//! [`ChunkCleaner`] chains the stages. Each stage is also usable on its own.
//!
//! # Layer 0
//!
//! This is a Layer 0 crate; it only logs through `tracing`.
//!
//! # Quick Start
//!
//! ```
//! use road_clean::{ChunkCleaner, CleanParams, SurfaceParams};
//! use road_types::{grid_patch, Point3, PointCloud};
//!
//! let mut chunk = grid_patch(40, 20, 0.25);
//! chunk.positions.push(Point3::new(3.0, 40.0, 2.0));
//! let mask = PointCloud::from_positions(vec![Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 0.2, 5.0)]);
//!
//! let cleaner = ChunkCleaner::new(CleanParams::default().with_surface(SurfaceParams::close_holes()));
//! let cleaned = cleaner.clean(chunk, Some(&mask)).unwrap();
//! assert!(cleaned.report.warnings.is_empty());
//! ```
//!
//! # Failure Policy
//!
//! | Condition | Outcome |
//! |-----------|---------|
//! | Empty stage output, invalid mesh, reconstruction failure | [`CleanError`] |
//! | No floor found, empty mask, too little ground, color transfer failure | [`CleanWarning`] in the report |

// Safety: Deny unwrap/expect in library code. Tests may use them (workspace warns).
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod cleaner;
mod density;
mod error;
mod flatten;
mod floor;
mod orient;
mod outlier;
mod prune;
mod reconstruct;
mod smooth;
mod surface;
mod transfer;

pub use cleaner::{ChunkCleaner, CleanParams, CleanReport, CleanedChunk};
pub use density::{density_filter, DensityFilterParams, DensityFilterResult};
pub use error::{CleanError, CleanResult, CleanWarning};
pub use flatten::{flatten_road, FlattenOutcome, FlattenParams};
pub use floor::{find_floor, level_floor, FloorSearch, FloorSearchParams};
pub use orient::{normalize_orientation, OrientationReport};
pub use outlier::{statistical_outliers, OutlierMask, OutlierParams};
pub use prune::{prune_artifacts, PruneResult, PruneStrategy, SeveranceParams};
pub use reconstruct::{reconstruct_implicit, ImplicitParams, ImplicitSurface};
pub use smooth::{smooth_mesh, SmoothParams, SmoothSummary, SmoothingMethod};
pub use surface::{reconstruct_surface, SurfaceMode, SurfaceParams, SurfaceResult};
pub use transfer::{transfer_colors, TransferSummary};
