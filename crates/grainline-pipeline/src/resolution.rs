//! Output resolution presets and viewport fitting.
//!
//! Scaling is the first processing stage, so tone and dithering run on
//! the reduced grid. A half-resolution preview dithered at its own size
//! gives the coarse, chunky look once the presentation layer stretches
//! it back up.

use std::fmt;

use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, PipelineError, PixelSurface};

/// Processing resolution relative to the source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionPreset {
    /// Keep the source size.
    #[default]
    Original,
    /// Halve both axes.
    Half,
    /// Quarter both axes.
    Quarter,
}

impl ResolutionPreset {
    /// Divisor applied to each axis.
    #[must_use]
    pub const fn divisor(self) -> u32 {
        match self {
            Self::Original => 1,
            Self::Half => 2,
            Self::Quarter => 4,
        }
    }

    /// Size after applying the preset. Each axis keeps at least one pixel.
    #[must_use]
    pub const fn scaled(self, source: Dimensions) -> Dimensions {
        let divisor = self.divisor();
        let width = source.width / divisor;
        let height = source.height / divisor;
        Dimensions::new(
            if width == 0 { 1 } else { width },
            if height == 0 { 1 } else { height },
        )
    }
}

impl fmt::Display for ResolutionPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Original => f.write_str("original"),
            Self::Half => f.write_str("half"),
            Self::Quarter => f.write_str("quarter"),
        }
    }
}

/// Resample `surface` to the preset's size with a triangle filter.
///
/// [`ResolutionPreset::Original`] and presets that would not change the
/// size return the surface untouched.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidDimensions`] only if resampling
/// produced an empty image, which the one-pixel minimum rules out.
pub fn scale(surface: PixelSurface, preset: ResolutionPreset) -> Result<PixelSurface, PipelineError> {
    let source = surface.dimensions();
    let target = preset.scaled(source);
    if target == source {
        return Ok(surface);
    }
    tracing::debug!(
        %preset,
        from_width = source.width,
        from_height = source.height,
        to_width = target.width,
        to_height = target.height,
        "scaling surface"
    );
    let resized = imageops::resize(surface.as_image(), target.width, target.height, FilterType::Triangle);
    PixelSurface::from_image(resized)
}

/// Presentation size for an image of size `image` drawn into `viewport`.
///
/// With `aspect_lock` the image is scaled uniformly to the largest size
/// that fits; otherwise it is stretched to fill the viewport. Empty inputs
/// yield an empty size.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn fit_viewport(image: Dimensions, viewport: Dimensions, aspect_lock: bool) -> Dimensions {
    if image.width == 0 || image.height == 0 || viewport.width == 0 || viewport.height == 0 {
        return Dimensions::new(0, 0);
    }
    if !aspect_lock {
        return viewport;
    }
    let scale = (f64::from(viewport.width) / f64::from(image.width))
        .min(f64::from(viewport.height) / f64::from(image.height));
    let width = (f64::from(image.width) * scale).round().clamp(1.0, f64::from(viewport.width));
    let height = (f64::from(image.height) * scale).round().clamp(1.0, f64::from(viewport.height));
    Dimensions::new(width as u32, height as u32)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn gray(width: u32, height: u32) -> PixelSurface {
        PixelSurface::filled(width, height, [128, 128, 128, 255]).unwrap()
    }

    #[test]
    fn default_is_original() {
        assert_eq!(ResolutionPreset::default(), ResolutionPreset::Original);
    }

    #[test]
    fn serde_is_lowercase() {
        let json = serde_json::to_string(&ResolutionPreset::Quarter).unwrap();
        assert_eq!(json, "\"quarter\"");
        let parsed: ResolutionPreset = serde_json::from_str("\"half\"").unwrap();
        assert_eq!(parsed, ResolutionPreset::Half);
    }

    #[test]
    fn original_keeps_surface() {
        let surface = gray(10, 6);
        let scaled = scale(surface.clone(), ResolutionPreset::Original).unwrap();
        assert_eq!(scaled, surface);
    }

    #[test]
    fn half_divides_both_axes() {
        let scaled = scale(gray(10, 6), ResolutionPreset::Half).unwrap();
        assert_eq!(scaled.dimensions(), Dimensions::new(5, 3));
        assert_eq!(scaled.as_raw().len(), 5 * 3 * 4);
        assert_eq!(scaled.pixel(2, 1), Some([128, 128, 128, 255]));
    }

    #[test]
    fn quarter_keeps_at_least_one_pixel() {
        let scaled = scale(gray(3, 9), ResolutionPreset::Quarter).unwrap();
        assert_eq!(scaled.dimensions(), Dimensions::new(1, 2));
        let scaled = scale(gray(1, 1), ResolutionPreset::Quarter).unwrap();
        assert_eq!(scaled.dimensions(), Dimensions::new(1, 1));
    }

    #[test]
    fn locked_fit_preserves_aspect() {
        let fitted = fit_viewport(Dimensions::new(400, 200), Dimensions::new(300, 300), true);
        assert_eq!(fitted, Dimensions::new(300, 150));
        let fitted = fit_viewport(Dimensions::new(100, 400), Dimensions::new(300, 200), true);
        assert_eq!(fitted, Dimensions::new(50, 200));
    }

    #[test]
    fn locked_fit_upscales_small_images() {
        let fitted = fit_viewport(Dimensions::new(20, 10), Dimensions::new(200, 200), true);
        assert_eq!(fitted, Dimensions::new(200, 100));
    }

    #[test]
    fn unlocked_fit_stretches() {
        let fitted = fit_viewport(Dimensions::new(400, 200), Dimensions::new(300, 300), false);
        assert_eq!(fitted, Dimensions::new(300, 300));
    }

    #[test]
    fn empty_viewport_yields_empty_size() {
        let fitted = fit_viewport(Dimensions::new(400, 200), Dimensions::new(0, 300), true);
        assert_eq!(fitted, Dimensions::new(0, 0));
    }
}
