//! Parameters for mesh decimation.

use std::f64::consts::FRAC_PI_6;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Triangle budget of a finished chunk or environment.
pub const DEFAULT_TARGET_TRIANGLES: usize = 300_000;

/// Parameters for mesh decimation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DecimateParams {
    /// Target number of triangles. If None, uses `target_ratio` instead.
    pub target_triangles: Option<usize>,

    /// Target ratio of triangles to keep (0.0 to 1.0). Default: 0.5
    pub target_ratio: f64,

    /// Pin vertices on open borders so the outline of the road stays put.
    /// Default: false
    pub preserve_boundary: bool,

    /// Pin vertices on edges whose dihedral angle exceeds
    /// `sharp_angle_threshold`. Default: false
    pub preserve_sharp_features: bool,

    /// Dihedral angle threshold in radians. Default: π/6 (30 degrees)
    pub sharp_angle_threshold: f64,

    /// Maximum quadric error of a single collapse. If None, no limit.
    pub max_error: Option<f64>,

    /// Weight of the constraint planes placed along open borders. Higher
    /// values keep borders in place when they are not pinned. Default: 10.0
    pub boundary_penalty: f64,

    /// Reject collapses that turn a surrounding face over. Default: true
    pub prevent_flips: bool,
}

impl Default for DecimateParams {
    fn default() -> Self {
        Self {
            target_triangles: None,
            target_ratio: 0.5,
            preserve_boundary: false,
            preserve_sharp_features: false,
            sharp_angle_threshold: FRAC_PI_6,
            max_error: None,
            boundary_penalty: 10.0,
            prevent_flips: true,
        }
    }
}

impl DecimateParams {
    /// Create params targeting a specific triangle count.
    #[must_use]
    pub fn with_target_triangles(count: usize) -> Self {
        Self {
            target_triangles: Some(count),
            ..Default::default()
        }
    }

    /// Create params targeting a ratio of original triangles.
    #[must_use]
    pub fn with_target_ratio(ratio: f64) -> Self {
        Self {
            target_ratio: ratio.clamp(0.0, 1.0),
            ..Default::default()
        }
    }

    /// Budget used for finished surfaces.
    #[must_use]
    pub fn surface_budget() -> Self {
        Self::with_target_triangles(DEFAULT_TARGET_TRIANGLES)
    }

    /// Keep borders and creases; only flat interior regions get coarser.
    #[must_use]
    pub fn conservative() -> Self {
        Self {
            target_ratio: 0.75,
            preserve_boundary: true,
            preserve_sharp_features: true,
            sharp_angle_threshold: 0.3491, // 20 degrees
            ..Default::default()
        }
    }

    /// Set preserve boundary option.
    #[must_use]
    pub const fn with_preserve_boundary(mut self, preserve: bool) -> Self {
        self.preserve_boundary = preserve;
        self
    }

    /// Set preserve sharp features option.
    #[must_use]
    pub const fn with_preserve_sharp_features(mut self, preserve: bool) -> Self {
        self.preserve_sharp_features = preserve;
        self
    }

    /// Set maximum error threshold.
    #[must_use]
    pub const fn with_max_error(mut self, max_error: f64) -> Self {
        self.max_error = Some(max_error);
        self
    }

    /// Triangle count to stop at for a mesh of `original` triangles.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn target_for(&self, original: usize) -> usize {
        self.target_triangles
            .unwrap_or_else(|| ((original as f64) * self.target_ratio.clamp(0.0, 1.0)).ceil() as usize)
    }
}
