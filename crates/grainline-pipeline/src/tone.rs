//! Brightness and contrast adjustment.
//!
//! Contrast is a slope around mid-gray (128): the factor is
//! `tan((contrast + 1) * π/4)`, so `-1` flattens everything to gray, `0`
//! leaves the slope at 1, and `1` approaches a hard threshold. Brightness
//! is a plain additive offset applied after the slope.
//!
//! Both depend only on the input sample, so the mapping is tabulated once
//! per call and applied through a 256-entry lookup.

use std::f64::consts::FRAC_PI_4;

use crate::quantize::to_channel;
use crate::rows::for_each_row;
use crate::types::PixelSurface;

/// Whether `adjust` with these parameters would leave every sample
/// unchanged.
#[must_use]
pub fn is_noop(brightness: i32, contrast: f32) -> bool {
    brightness == 0 && contrast.abs() <= f32::EPSILON
}

/// Slope for a contrast value, clamped to `-1.0..=1.0` first.
#[must_use]
pub fn contrast_factor(contrast: f32) -> f64 {
    ((f64::from(contrast.clamp(-1.0, 1.0)) + 1.0) * FRAC_PI_4).tan()
}

/// Adjust brightness and contrast of every RGB sample in place. Alpha is
/// untouched.
pub fn adjust(surface: &mut PixelSurface, brightness: i32, contrast: f32) {
    let lut = lookup_table(brightness, contrast);
    tracing::trace!(brightness, contrast, "applying tone adjustment");
    let width = surface.width();
    for_each_row(surface.as_raw_mut(), width, |_, row| {
        for px in row.chunks_exact_mut(4) {
            px[0] = lut[usize::from(px[0])];
            px[1] = lut[usize::from(px[1])];
            px[2] = lut[usize::from(px[2])];
        }
    });
}

#[allow(clippy::cast_possible_truncation)]
fn lookup_table(brightness: i32, contrast: f32) -> [u8; 256] {
    let factor = contrast_factor(contrast);
    let offset = f64::from(brightness);
    let mut lut = [0u8; 256];
    for (v, out) in (0u8..=255).zip(lut.iter_mut()) {
        // The slope can be ~1e16 near contrast 1; clamp in f64 before
        // narrowing.
        let mapped = factor.mul_add(f64::from(v) - 128.0, 128.0 + offset);
        *out = to_channel(mapped.clamp(0.0, 255.0) as f32);
    }
    lut
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ramp() -> PixelSurface {
        PixelSurface::from_fn(256, 1, |x, _| {
            let v = u8::try_from(x).unwrap();
            [v, 255 - v, v / 2, 255 - v / 3]
        })
        .unwrap()
    }

    #[test]
    fn zero_parameters_are_noop() {
        assert!(is_noop(0, 0.0));
        assert!(!is_noop(1, 0.0));
        assert!(!is_noop(0, 0.1));
    }

    #[test]
    fn neutral_adjustment_leaves_surface_unchanged() {
        // Even when not short-circuited, factor ~1 must round back to v.
        let original = ramp();
        let mut surface = original.clone();
        adjust(&mut surface, 0, 0.0);
        assert_eq!(surface, original);
    }

    #[test]
    fn brightness_adds_and_clamps() {
        let original = ramp();
        let mut surface = original.clone();
        adjust(&mut surface, 10, 0.0);
        for (src, dst) in original.as_raw().chunks_exact(4).zip(surface.as_raw().chunks_exact(4)) {
            for c in 0..3 {
                assert_eq!(dst[c], src[c].saturating_add(10));
            }
            assert_eq!(dst[3], src[3]);
        }
    }

    #[test]
    fn negative_brightness_clamps_at_zero() {
        let mut surface = PixelSurface::filled(2, 2, [5, 100, 255, 40]).unwrap();
        adjust(&mut surface, -20, 0.0);
        assert_eq!(surface.pixel(1, 1), Some([0, 80, 235, 40]));
    }

    #[test]
    fn minimum_contrast_flattens_to_mid_gray() {
        let mut surface = ramp();
        adjust(&mut surface, 0, -1.0);
        for px in surface.as_raw().chunks_exact(4) {
            assert_eq!(&px[..3], &[128, 128, 128]);
        }
    }

    #[test]
    fn maximum_contrast_thresholds_around_mid_gray() {
        let mut surface = PixelSurface::from_fn(3, 1, |x, _| {
            let v = [100, 128, 200][x as usize];
            [v, v, v, 255]
        })
        .unwrap();
        adjust(&mut surface, 0, 1.0);
        assert_eq!(surface.pixel(0, 0), Some([0, 0, 0, 255]));
        assert_eq!(surface.pixel(1, 0), Some([128, 128, 128, 255]));
        assert_eq!(surface.pixel(2, 0), Some([255, 255, 255, 255]));
    }

    #[test]
    fn contrast_is_clamped() {
        assert!((contrast_factor(5.0) - contrast_factor(1.0)).abs() < f64::EPSILON);
        assert!(contrast_factor(-3.0).abs() < 1e-12);
        assert!((contrast_factor(0.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn positive_contrast_spreads_values() {
        let mut surface = PixelSurface::from_fn(2, 1, |x, _| {
            let v = if x == 0 { 100 } else { 156 };
            [v, v, v, 255]
        })
        .unwrap();
        adjust(&mut surface, 0, 0.5);
        let dark = surface.pixel(0, 0).unwrap()[0];
        let light = surface.pixel(1, 0).unwrap()[0];
        assert!(dark < 100);
        assert!(light > 156);
    }
}
