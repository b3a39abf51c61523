//! Dithering strategies: decide what each pixel feeds the quantizer.
//!
//! This module defines the [`Dither`] trait and the closed
//! [`DitherAlgorithm`] enum that implements it. New strategies are added
//! as enum variants, not registered at runtime.
//!
//! All strategies write RGB in place and leave alpha untouched.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::quantize::Quantizer;
use crate::rows::for_each_row;
use crate::types::PixelSurface;

/// Selects which dithering strategy to run.
///
/// Deserialized from the settings store's string keys. Unknown keys fall
/// back to [`None`](Self::None) rather than failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DitherAlgorithm {
    /// Quantize every pixel directly.
    #[default]
    None,
    /// Floyd-Steinberg error diffusion.
    FloydSteinberg,
    /// Ordered dithering with an 8x8 Bayer threshold matrix.
    OrderedBayer8x8,
}

impl DitherAlgorithm {
    /// The canonical settings key.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::FloydSteinberg => "floyd-steinberg",
            Self::OrderedBayer8x8 => "ordered-bayer-8x8",
        }
    }

    /// Parse a settings key. `identity` is the tone-only profile's name
    /// for no dithering; anything unrecognized also maps to `None`.
    #[must_use]
    pub fn from_key(key: &str) -> Self {
        match key {
            "floyd-steinberg" | "floydSteinberg" | "floyd_steinberg" => Self::FloydSteinberg,
            "ordered-bayer-8x8" | "orderedBayer8x8" | "bayer" | "ordered" => Self::OrderedBayer8x8,
            "none" | "identity" => Self::None,
            other => {
                tracing::debug!(key = other, "unknown dithering algorithm, using none");
                Self::None
            }
        }
    }
}

impl From<String> for DitherAlgorithm {
    fn from(key: String) -> Self {
        Self::from_key(&key)
    }
}

impl From<DitherAlgorithm> for String {
    fn from(algorithm: DitherAlgorithm) -> Self {
        algorithm.key().to_owned()
    }
}

impl fmt::Display for DitherAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Parameters shared by every strategy.
#[derive(Debug, Clone, Copy)]
pub struct DitherOptions<'a> {
    /// Strength in `0.0..=1.0`; clamped on use.
    pub intensity: f32,
    /// Maps adjusted samples to output colors.
    pub quantizer: &'a Quantizer,
}

/// Trait for dithering strategies.
///
/// Input: a surface after tone adjustment. Output: the same surface with
/// every RGB sample replaced by a quantizer output.
pub trait Dither {
    /// Dither `surface` in place.
    fn apply(&self, surface: &mut PixelSurface, options: &DitherOptions<'_>);
}

impl Dither for DitherAlgorithm {
    fn apply(&self, surface: &mut PixelSurface, options: &DitherOptions<'_>) {
        let intensity = options.intensity.clamp(0.0, 1.0);
        match *self {
            Self::None => quantize_direct(surface, options.quantizer),
            Self::FloydSteinberg => floyd_steinberg(surface, options.quantizer, intensity),
            Self::OrderedBayer8x8 => ordered_bayer(surface, options.quantizer, intensity),
        }
    }
}

/// Direct quantization, no error feedback.
fn quantize_direct(surface: &mut PixelSurface, quantizer: &Quantizer) {
    let width = surface.width();
    for_each_row(surface.as_raw_mut(), width, |_, row| {
        for px in row.chunks_exact_mut(4) {
            let q = quantizer.quantize(f32::from(px[0]), f32::from(px[1]), f32::from(px[2]));
            px[..3].copy_from_slice(&q);
        }
    });
}

/// Floyd-Steinberg neighbor offsets `(dx, dy)` and weights.
const FLOYD_STEINBERG: [(isize, usize, f32); 4] = [
    (1, 0, 7.0 / 16.0),
    (-1, 1, 3.0 / 16.0),
    (0, 1, 5.0 / 16.0),
    (1, 1, 1.0 / 16.0),
];

/// Raster-order error diffusion. Strictly sequential: each pixel depends
/// on error pushed from its already-visited neighbors.
fn floyd_steinberg(surface: &mut PixelSurface, quantizer: &Quantizer, intensity: f32) {
    let width = surface.width() as usize;
    let height = surface.height() as usize;
    let pixels = surface.as_raw_mut();

    // Error-adjusted RGB accumulators, three per pixel.
    let mut work: Vec<f32> = pixels
        .chunks_exact(4)
        .flat_map(|px| [f32::from(px[0]), f32::from(px[1]), f32::from(px[2])])
        .collect();

    for y in 0..height {
        for x in 0..width {
            let i = y * width + x;
            let adjusted = [work[i * 3], work[i * 3 + 1], work[i * 3 + 2]];
            let q = quantizer.quantize(adjusted[0], adjusted[1], adjusted[2]);
            pixels[i * 4..i * 4 + 3].copy_from_slice(&q);

            if intensity <= 0.0 {
                continue;
            }
            let error = [
                (adjusted[0] - f32::from(q[0])) * intensity,
                (adjusted[1] - f32::from(q[1])) * intensity,
                (adjusted[2] - f32::from(q[2])) * intensity,
            ];

            for &(dx, dy, weight) in &FLOYD_STEINBERG {
                let Some(nx) = x.checked_add_signed(dx) else {
                    continue;
                };
                let ny = y + dy;
                if nx >= width || ny >= height {
                    continue;
                }
                let j = (ny * width + nx) * 3;
                for (acc, e) in work[j..j + 3].iter_mut().zip(error) {
                    *acc = e.mul_add(weight, *acc).clamp(0.0, 255.0);
                }
            }
        }
    }
}

/// Standard 8x8 Bayer dispersion matrix, values `0..64`.
#[rustfmt::skip]
const BAYER_8X8: [[u8; 8]; 8] = [
    [ 0, 32,  8, 40,  2, 34, 10, 42],
    [48, 16, 56, 24, 50, 18, 58, 26],
    [12, 44,  4, 36, 14, 46,  6, 38],
    [60, 28, 52, 20, 62, 30, 54, 22],
    [ 3, 35, 11, 43,  1, 33,  9, 41],
    [51, 19, 59, 27, 49, 17, 57, 25],
    [15, 47,  7, 39, 13, 45,  5, 37],
    [63, 31, 55, 23, 61, 29, 53, 21],
];

/// Normalized threshold for pixel `(x, y)` in `-0.5..0.5`.
fn bayer_threshold(x: usize, y: usize) -> f32 {
    (f32::from(BAYER_8X8[y % 8][x % 8]) + 0.5) / 64.0 - 0.5
}

/// Ordered dithering: add a position-dependent offset to every channel,
/// then quantize. No state carries between pixels.
fn ordered_bayer(surface: &mut PixelSurface, quantizer: &Quantizer, intensity: f32) {
    let width = surface.width();
    let scale = intensity * 255.0;
    for_each_row(surface.as_raw_mut(), width, |y, row| {
        for (x, px) in row.chunks_exact_mut(4).enumerate() {
            let offset = bayer_threshold(x, y) * scale;
            // The quantizer clamps its output, so the sums go in unclamped.
            let q = quantizer.quantize(
                f32::from(px[0]) + offset,
                f32::from(px[1]) + offset,
                f32::from(px[2]) + offset,
            );
            px[..3].copy_from_slice(&q);
        }
    });
}
