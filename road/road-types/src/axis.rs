//! Canonical up axis.

use nalgebra::{Point3, Unit, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Which coordinate axis points "up" in the canonical frame.
///
/// Scans from the photogrammetry front end arrive Y-up, which is the
/// default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum UpAxis {
    /// +X is up.
    X,
    /// +Y is up.
    #[default]
    Y,
    /// +Z is up.
    Z,
}

impl UpAxis {
    /// Index of the axis in a coordinate triple.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::X => 0,
            Self::Y => 1,
            Self::Z => 2,
        }
    }

    /// Unit vector pointing up.
    #[must_use]
    pub fn unit(self) -> Unit<Vector3<f64>> {
        match self {
            Self::X => Vector3::x_axis(),
            Self::Y => Vector3::y_axis(),
            Self::Z => Vector3::z_axis(),
        }
    }

    /// A horizontal axis used to flip or tip the mesh over.
    ///
    /// Rotating about it by 180° reverses up and down; by 90° it swaps the
    /// up axis with the remaining horizontal one.
    #[must_use]
    pub fn tilt_axis(self) -> Unit<Vector3<f64>> {
        match self {
            Self::X => Vector3::z_axis(),
            Self::Y | Self::Z => Vector3::x_axis(),
        }
    }

    /// Height of a point along this axis.
    #[inline]
    #[must_use]
    pub fn height(self, point: &Point3<f64>) -> f64 {
        point[self.index()]
    }

    /// Up component of a direction.
    #[inline]
    #[must_use]
    pub fn component(self, vector: &Vector3<f64>) -> f64 {
        vector[self.index()]
    }
}
