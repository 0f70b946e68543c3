//! Per-vertex RGB color.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An 8-bit RGB vertex color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VertexColor {
    /// Red component (0-255).
    pub r: u8,
    /// Green component (0-255).
    pub g: u8,
    /// Blue component (0-255).
    pub b: u8,
}

impl VertexColor {
    /// Black color (0, 0, 0).
    pub const BLACK: Self = Self::new(0, 0, 0);

    /// Mid grey, used for vertices that had no color to recover.
    pub const GREY: Self = Self::new(128, 128, 128);

    /// Create a new color from RGB components.
    ///
    /// # Example
    ///
    /// ```
    /// use road_types::VertexColor;
    ///
    /// let red = VertexColor::new(255, 0, 0);
    /// assert_eq!(red.r, 255);
    /// ```
    #[inline]
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Create a color from floating point values in [0, 1] range.
    ///
    /// Values are clamped to the valid range and rounded.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    // Truncation and sign loss are safe: values are clamped to [0.0, 1.0] before * 255.0
    pub fn from_float(r: f64, g: f64, b: f64) -> Self {
        Self {
            r: (r.clamp(0.0, 1.0) * 255.0).round() as u8,
            g: (g.clamp(0.0, 1.0) * 255.0).round() as u8,
            b: (b.clamp(0.0, 1.0) * 255.0).round() as u8,
        }
    }

    /// Convert to floating point values in [0, 1] range.
    #[inline]
    #[must_use]
    pub fn to_float(self) -> [f64; 3] {
        [
            f64::from(self.r) / 255.0,
            f64::from(self.g) / 255.0,
            f64::from(self.b) / 255.0,
        ]
    }

    /// Blend two colors, `t = 0` giving `self` and `t = 1` giving `other`.
    ///
    /// # Example
    ///
    /// ```
    /// use road_types::VertexColor;
    ///
    /// let mid = VertexColor::new(0, 0, 0).lerp(VertexColor::new(200, 100, 50), 0.5);
    /// assert_eq!(mid, VertexColor::new(100, 50, 25));
    /// ```
    #[must_use]
    pub fn lerp(self, other: Self, t: f64) -> Self {
        let t = t.clamp(0.0, 1.0);
        let a = self.to_float();
        let b = other.to_float();
        Self::from_float(
            (b[0] - a[0]).mul_add(t, a[0]),
            (b[1] - a[1]).mul_add(t, a[1]),
            (b[2] - a[2]).mul_add(t, a[2]),
        )
    }

    /// Average of a set of colors, or `None` if the set is empty.
    #[must_use]
    pub fn mean<'a>(colors: impl IntoIterator<Item = &'a Self>) -> Option<Self> {
        let mut sum = [0u64; 3];
        let mut count = 0u64;
        for c in colors {
            sum[0] += u64::from(c.r);
            sum[1] += u64::from(c.g);
            sum[2] += u64::from(c.b);
            count += 1;
        }
        if count == 0 {
            return None;
        }
        #[allow(clippy::cast_possible_truncation)]
        // The mean of u8 values always fits in u8
        Some(Self::new(
            ((sum[0] + count / 2) / count) as u8,
            ((sum[1] + count / 2) / count) as u8,
            ((sum[2] + count / 2) / count) as u8,
        ))
    }
}

impl From<[u8; 3]> for VertexColor {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Self::new(r, g, b)
    }
}
