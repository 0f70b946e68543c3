//! Vertex color transfer between meshes.

use rayon::prelude::*;
use road_transform::PointIndex;
use road_types::{Mesh, VertexColor};
use tracing::debug;

use crate::error::{CleanError, CleanResult};

/// Statistics of a color transfer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferSummary {
    /// Vertices that received a color.
    pub colored_vertices: usize,
    /// Largest distance from a target vertex to its color source.
    pub max_distance: f64,
}

/// Color every vertex of `target` from the nearest vertex of `source`.
///
/// Existing target colors are replaced.
///
/// # Errors
///
/// Returns [`CleanError::AttributeTransfer`] if `source` has no vertices
/// or carries no colors.
pub fn transfer_colors(source: &Mesh, target: &mut Mesh) -> CleanResult<TransferSummary> {
    let colors = source
        .colors
        .as_deref()
        .ok_or_else(|| CleanError::AttributeTransfer {
            reason: "source mesh has no vertex colors".to_string(),
        })?;
    if source.positions.is_empty() {
        return Err(CleanError::AttributeTransfer {
            reason: "source mesh has no vertices".to_string(),
        });
    }

    let index = PointIndex::new(&source.positions);
    let matches: Vec<(VertexColor, f64)> = target
        .positions
        .par_iter()
        .map(|p| {
            index
                .nearest(p)
                .map_or((VertexColor::GREY, f64::INFINITY), |hit| (colors[hit.index], hit.distance()))
        })
        .collect();

    let max_distance = matches.iter().map(|&(_, d)| d).fold(0.0, f64::max);
    target.colors = Some(matches.into_iter().map(|(c, _)| c).collect());

    let summary = TransferSummary {
        colored_vertices: target.positions.len(),
        max_distance,
    };
    debug!(
        vertices = summary.colored_vertices,
        max_distance = summary.max_distance,
        "Transferred vertex colors"
    );
    Ok(summary)
}
