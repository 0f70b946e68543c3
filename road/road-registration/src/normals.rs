//! Normal estimation for registration clouds.
//!
//! Normals come from PCA of each point's neighbourhood: the axis of least
//! variance. A radius search capped at a neighbour count matches how the
//! downsampled clouds are described before feature matching.

use rayon::prelude::*;
use road_transform::{pca_from_iter, PointIndex};
use road_types::{PointCloud, UpAxis, Vector3};
use tracing::debug;

use crate::{RegistrationError, RegistrationResult};

/// Neighbours used when the radius holds too few points.
const FALLBACK_NEIGHBORS: usize = 8;

/// Estimate a unit normal for every point.
///
/// Neighbours are the points within `radius`, capped at the
/// `max_neighbors` closest. Each normal is flipped to agree with the
/// normal the point carried before, or failing that to point along `up`.
/// Points whose neighbourhood is degenerate get the up direction.
///
/// # Errors
///
/// Returns [`RegistrationError::EmptySource`] for an empty cloud.
///
/// # Example
///
/// ```
/// use road_registration::estimate_normals;
/// use road_types::{grid_patch, PointCloud, UpAxis};
///
/// let mut cloud = PointCloud::from_positions(grid_patch(10, 10, 0.5).positions);
/// estimate_normals(&mut cloud, 1.0, 30, UpAxis::Y).unwrap();
///
/// let normals = cloud.normals.unwrap();
/// assert!(normals.iter().all(|n| n.y > 0.99));
/// ```
pub fn estimate_normals(
    cloud: &mut PointCloud,
    radius: f64,
    max_neighbors: usize,
    up: UpAxis,
) -> RegistrationResult<()> {
    if cloud.is_empty() {
        return Err(RegistrationError::EmptySource);
    }

    let index = PointIndex::new(&cloud.points);
    let up_dir = up.unit().into_inner();
    let previous = cloud.normals.as_deref();
    let points = &cloud.points;

    let normals: Vec<Vector3<f64>> = points
        .par_iter()
        .enumerate()
        .map(|(i, p)| {
            let mut neighbors = index.within(p, radius);
            neighbors.truncate(max_neighbors.max(3));
            if neighbors.len() < 3 {
                neighbors = index.nearest_n(p, FALLBACK_NEIGHBORS);
            }

            let Some(pca) = pca_from_iter(neighbors.iter().map(|n| &points[n.index])) else {
                return up_dir;
            };
            let normal = pca.normal();

            let reference = previous
                .map(|prev| prev[i])
                .filter(|n| n.norm_squared() > 0.0)
                .unwrap_or(up_dir);
            if normal.dot(&reference) < 0.0 {
                -normal
            } else {
                normal
            }
        })
        .collect();

    debug!(points = normals.len(), radius, max_neighbors, "Estimated normals");
    cloud.normals = Some(normals);
    Ok(())
}
