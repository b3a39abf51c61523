//! Color quantization: snap a continuous RGB triple to a reduced set.
//!
//! A [`Quantizer`] is built once per pipeline run and then called for
//! every pixel, so [`Quantizer::quantize`] is a pure function that never
//! allocates.

use crate::types::{ColorDepth, ColorMode, Palette, ProcessingSettings};

/// Rec. 709 luminance weights for R, G, B.
pub const LUMA_WEIGHTS: [f32; 3] = [0.2126, 0.7152, 0.0722];

/// Fewest levels per channel.
pub const MIN_LEVELS: u16 = 2;

/// Most levels per channel (identity quantization).
pub const MAX_LEVELS: u16 = 256;

/// Maps RGB samples onto a palette or an evenly spaced level grid.
#[derive(Debug, Clone, PartialEq)]
pub enum Quantizer {
    /// Nearest palette color by squared Euclidean RGB distance.
    Palette(Palette),
    /// Evenly spaced levels across `0..=255`.
    Levels {
        /// Number of levels after clamping.
        levels: u16,
        /// Distance between adjacent levels.
        step: f32,
        /// Quantize luminance and write it to all three channels.
        grayscale: bool,
    },
}

impl Quantizer {
    /// Level quantizer. `levels` is clamped to
    /// [`MIN_LEVELS`]`..=`[`MAX_LEVELS`].
    #[must_use]
    pub fn levels(levels: u16, mode: ColorMode) -> Self {
        let levels = levels.clamp(MIN_LEVELS, MAX_LEVELS);
        Self::Levels {
            levels,
            step: level_step(levels),
            grayscale: mode == ColorMode::Grayscale,
        }
    }

    /// Palette quantizer.
    #[must_use]
    pub const fn palette(palette: Palette) -> Self {
        Self::Palette(palette)
    }

    /// Build the quantizer described by a settings snapshot. A palette,
    /// when present, takes precedence over levels and color mode.
    #[must_use]
    pub fn from_settings(settings: &ProcessingSettings) -> Self {
        match &settings.color_depth {
            ColorDepth::Palette(palette) => Self::palette(palette.clone()),
            ColorDepth::Levels(levels) => Self::levels(*levels, settings.color_mode),
        }
    }

    /// Quantize one RGB sample. Inputs may lie outside `0..=255` (error
    /// diffusion can push them there); outputs never do.
    #[must_use]
    pub fn quantize(&self, r: f32, g: f32, b: f32) -> [u8; 3] {
        match self {
            Self::Palette(palette) => nearest(palette, r, g, b),
            Self::Levels {
                step,
                grayscale: false,
                ..
            } => [snap(r, *step), snap(g, *step), snap(b, *step)],
            Self::Levels {
                step,
                grayscale: true,
                ..
            } => {
                let luma = LUMA_WEIGHTS[0].mul_add(r, LUMA_WEIGHTS[1].mul_add(g, LUMA_WEIGHTS[2] * b));
                let v = snap(luma, *step);
                [v, v, v]
            }
        }
    }
}

/// Spacing between adjacent levels. One level (or none) degenerates to
/// a step of 255.
#[must_use]
pub fn level_step(levels: u16) -> f32 {
    if levels <= 1 {
        255.0
    } else {
        255.0 / f32::from(levels - 1)
    }
}

fn snap(value: f32, step: f32) -> u8 {
    to_channel((value / step).round() * step)
}

/// Clamp and round an `f32` sample into a channel value.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn to_channel(value: f32) -> u8 {
    value.clamp(0.0, 255.0).round() as u8
}

/// First palette entry with the smallest squared distance.
fn nearest(palette: &Palette, r: f32, g: f32, b: f32) -> [u8; 3] {
    let mut best = [0, 0, 0];
    let mut best_distance = f32::INFINITY;
    for &color in palette.colors() {
        let dr = r - f32::from(color[0]);
        let dg = g - f32::from(color[1]);
        let db = b - f32::from(color[2]);
        let distance = dr.mul_add(dr, dg.mul_add(dg, db * db));
        if distance < best_distance {
            best_distance = distance;
            best = color;
        }
    }
    best
}
