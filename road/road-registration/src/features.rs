//! Fast Point Feature Histograms (FPFH).
//!
//! Each point gets a 33-bin descriptor of how the surface bends around
//! it: three 11-bin histograms over the angles between its normal and
//! those of its neighbours. Descriptors are invariant to rigid motion, so
//! matching them pairs up points of two scans without a pose guess.

use std::f64::consts::PI;

use nalgebra::Vector3;
use rayon::prelude::*;
use road_transform::{Neighbor, PointIndex};
use road_types::{Point3, PointCloud};

use crate::{RegistrationError, RegistrationResult};

/// Bins per angle histogram.
const BINS: usize = 11;

/// Length of an FPFH descriptor.
pub const FPFH_DIMENSION: usize = 3 * BINS;

/// A 33-bin FPFH descriptor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FpfhDescriptor(pub [f64; FPFH_DIMENSION]);

impl Default for FpfhDescriptor {
    fn default() -> Self {
        Self([0.0; FPFH_DIMENSION])
    }
}

impl FpfhDescriptor {
    /// Squared Euclidean distance between two descriptors.
    #[must_use]
    pub fn distance_sq(&self, other: &Self) -> f64 {
        self.0.iter().zip(other.0.iter()).map(|(a, b)| (a - b) * (a - b)).sum()
    }

    /// Whether every bin is zero (the point had no usable neighbours).
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|v| *v == 0.0)
    }
}

/// Compute FPFH descriptors for every point of a cloud with normals.
///
/// Neighbourhoods are all points within `radius`, capped at the
/// `max_neighbors` closest.
///
/// # Errors
///
/// Returns [`RegistrationError::MissingNormals`] if the cloud has none.
pub fn compute_fpfh(cloud: &PointCloud, radius: f64, max_neighbors: usize) -> RegistrationResult<Vec<FpfhDescriptor>> {
    let normals = cloud
        .normals
        .as_ref()
        .ok_or(RegistrationError::MissingNormals { cloud: "features" })?;
    if cloud.is_empty() {
        return Ok(Vec::new());
    }

    let index = PointIndex::new(&cloud.points);
    let neighborhoods: Vec<Vec<Neighbor>> = cloud
        .points
        .par_iter()
        .map(|p| {
            let mut hits = index.within(p, radius);
            hits.truncate(max_neighbors.max(1));
            hits
        })
        .collect();

    let spfh: Vec<FpfhDescriptor> = (0..cloud.len())
        .into_par_iter()
        .map(|i| simplified_histogram(i, &cloud.points, normals, &neighborhoods[i]))
        .collect();

    let features = (0..cloud.len())
        .into_par_iter()
        .map(|i| weighted_histogram(i, &spfh, &neighborhoods[i]))
        .collect();

    Ok(features)
}

/// Simplified point feature histogram: point `i` against its neighbours.
#[allow(clippy::cast_precision_loss)]
fn simplified_histogram(
    i: usize,
    points: &[Point3<f64>],
    normals: &[Vector3<f64>],
    neighbors: &[Neighbor],
) -> FpfhDescriptor {
    let mut histogram = FpfhDescriptor::default();
    let others = neighbors.iter().filter(|n| n.index != i).count();
    if others == 0 {
        return histogram;
    }
    let increment = 100.0 / others as f64;

    for neighbor in neighbors.iter().filter(|n| n.index != i) {
        let Some([f1, f2, f3]) = pair_features(&points[i], &normals[i], &points[neighbor.index], &normals[neighbor.index])
        else {
            continue;
        };
        histogram.0[bin((f1 + PI) / (2.0 * PI))] += increment;
        histogram.0[BINS + bin((f2 + 1.0) * 0.5)] += increment;
        histogram.0[2 * BINS + bin((f3 + 1.0) * 0.5)] += increment;
    }
    histogram
}

/// Blend a point's own histogram with its neighbours', weighted by inverse
/// squared distance and renormalised per sub-histogram.
fn weighted_histogram(i: usize, spfh: &[FpfhDescriptor], neighbors: &[Neighbor]) -> FpfhDescriptor {
    let mut feature = FpfhDescriptor::default();
    let mut sums = [0.0; 3];

    for neighbor in neighbors {
        if neighbor.index == i || neighbor.distance_sq == 0.0 {
            continue;
        }
        for (j, value) in spfh[neighbor.index].0.iter().enumerate() {
            let weighted = value / neighbor.distance_sq;
            sums[j / BINS] += weighted;
            feature.0[j] += weighted;
        }
    }

    for sum in &mut sums {
        if *sum != 0.0 {
            *sum = 100.0 / *sum;
        }
    }
    for (j, value) in feature.0.iter_mut().enumerate() {
        *value = *value * sums[j / BINS] + spfh[i].0[j];
    }
    feature
}

/// Darboux-frame angles between two oriented points.
///
/// Returns `None` for coincident points or parallel geometry where the
/// frame is undefined.
fn pair_features(
    p1: &Point3<f64>,
    n1: &Vector3<f64>,
    p2: &Point3<f64>,
    n2: &Vector3<f64>,
) -> Option<[f64; 3]> {
    let mut delta = p2 - p1;
    let distance = delta.norm();
    if distance == 0.0 {
        return None;
    }

    let angle1 = n1.dot(&delta) / distance;
    let angle2 = n2.dot(&delta) / distance;

    // The source of the frame is the point whose normal is closer to the connecting line
    let (u, other, f3) = if angle1.abs().acos() > angle2.abs().acos() {
        delta = -delta;
        (n2, n1, -angle2)
    } else {
        (n1, n2, angle1)
    };

    let v = delta.cross(u);
    let v_norm = v.norm();
    if v_norm == 0.0 {
        return None;
    }
    let v = v / v_norm;
    let w = u.cross(&v);

    let f2 = v.dot(other);
    let f1 = w.dot(other).atan2(u.dot(other));
    Some([f1, f2, f3])
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn bin(fraction: f64) -> usize {
    ((fraction * BINS as f64).floor().max(0.0) as usize).min(BINS - 1)
}

/// Nearest descriptor in `targets` for every descriptor in `sources`.
///
/// Brute force: FPFH space is dominated by empty bins, which tree splits
/// handle poorly.
#[must_use]
pub fn match_features(sources: &[FpfhDescriptor], targets: &[FpfhDescriptor]) -> Vec<(usize, usize)> {
    if targets.is_empty() {
        return Vec::new();
    }
    sources
        .par_iter()
        .enumerate()
        .filter_map(|(s, descriptor)| {
            targets
                .iter()
                .enumerate()
                .map(|(t, candidate)| (t, descriptor.distance_sq(candidate)))
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(t, _)| (s, t))
        })
        .collect()
}
