//! RGBA colors used to paint clusters and dendrogram nodes.

use serde::{Deserialize, Serialize};

/// The conjugate of the golden ratio, used to spread palette hues.
const GOLDEN_RATIO_CONJUGATE: f32 = 0.618_034;

/// An RGBA color with components in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    /// Red component.
    pub r: f32,
    /// Green component.
    pub g: f32,
    /// Blue component.
    pub b: f32,
    /// Alpha component.
    pub a: f32,
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

impl Color {
    /// Opaque white.
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);

    /// The dark grey used for unselected dendrogram nodes.
    pub const GREY: Self = Self::new(0.3, 0.3, 0.3, 1.0);

    /// Creates a new color from its components.
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Creates an opaque color from hue, saturation and value, all in `[0, 1]`.
    ///
    /// Hues outside of `[0, 1]` wrap around.
    #[allow(clippy::many_single_char_names, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_hsv(h: f32, s: f32, v: f32) -> Self {
        let h = h.rem_euclid(1.0) * 6.0;
        let sector = h.floor();
        let f = h - sector;
        let p = v * (1.0 - s);
        let q = v * (1.0 - s * f);
        let t = v * (1.0 - s * (1.0 - f));

        let (r, g, b) = match sector as u32 % 6 {
            0 => (v, t, p),
            1 => (q, v, p),
            2 => (p, v, t),
            3 => (p, q, v),
            4 => (t, p, v),
            _ => (v, p, q),
        };
        Self::new(r, g, b, 1.0)
    }

    /// The `n`-th color of an endless palette of well separated, fully
    /// saturated hues.
    pub fn nth_hsv(n: usize) -> Self {
        Self::from_hsv((n as f32 * GOLDEN_RATIO_CONJUGATE).fract(), 1.0, 1.0)
    }

    /// `count` colors evenly spread over the hue circle, as used for painting
    /// the result of a clustering run.
    pub fn hue_ramp(count: usize) -> Vec<Self> {
        let step = if count == 0 { 0.0 } else { 1.0 / count as f32 };
        (0..count).map(|i| Self::from_hsv(i as f32 * step, 1.0, 0.75)).collect()
    }
}
