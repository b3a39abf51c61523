//! Shared types for the grainline image processing pipeline.

use serde::{Deserialize, Serialize};

use crate::dither::DitherAlgorithm;
use crate::resolution::ResolutionPreset;

/// Re-export `RgbaImage` so downstream crates can build surfaces
/// without depending on `image` directly.
pub use image::RgbaImage;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create a new set of dimensions.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Total pixel count (`width * height`).
    #[must_use]
    pub const fn pixel_count(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// A canonical RGBA pixel buffer: 8 bits per channel, row-major, no
/// padding.
///
/// The buffer always holds exactly `width * height * 4` bytes and both
/// dimensions are non-zero. Stages that change the size build a new
/// surface rather than reinterpreting an existing buffer.
#[derive(Debug, Clone)]
pub struct PixelSurface(RgbaImage);

impl PixelSurface {
    /// Wrap a decoded image.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidDimensions`] if either dimension
    /// is zero.
    pub fn from_image(image: RgbaImage) -> Result<Self, PipelineError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(PipelineError::InvalidDimensions { width, height });
        }
        Ok(Self(image))
    }

    /// Build a surface from raw RGBA bytes.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidDimensions`] if either dimension
    /// is zero or `data.len() != width * height * 4`.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self, PipelineError> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(4));
        if expected != Some(data.len()) {
            return Err(PipelineError::InvalidDimensions { width, height });
        }
        let image = RgbaImage::from_raw(width, height, data)
            .ok_or(PipelineError::InvalidDimensions { width, height })?;
        Self::from_image(image)
    }

    /// Build a surface by evaluating `f(x, y)` for every pixel.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidDimensions`] if either dimension
    /// is zero.
    pub fn from_fn(
        width: u32,
        height: u32,
        mut f: impl FnMut(u32, u32) -> [u8; 4],
    ) -> Result<Self, PipelineError> {
        Self::from_image(RgbaImage::from_fn(width, height, |x, y| {
            image::Rgba(f(x, y))
        }))
    }

    /// Build a surface filled with a single color.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidDimensions`] if either dimension
    /// is zero.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Result<Self, PipelineError> {
        Self::from_image(RgbaImage::from_pixel(width, height, image::Rgba(rgba)))
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.0.width()
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.0.height()
    }

    /// Width and height.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width(), self.height())
    }

    /// RGBA value of the pixel at `(x, y)`, or `None` when out of bounds.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        self.0.get_pixel_checked(x, y).map(|p| p.0)
    }

    /// The raw RGBA bytes.
    #[must_use]
    pub fn as_raw(&self) -> &[u8] {
        self.0.as_raw()
    }

    /// Mutable access to the raw RGBA bytes. The slice length is fixed,
    /// so the size invariant cannot be broken through it.
    pub fn as_raw_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }

    /// Borrow as an `image` buffer for `imageops` calls.
    #[must_use]
    pub const fn as_image(&self) -> &RgbaImage {
        &self.0
    }

    /// Consume the surface, returning the `image` buffer.
    #[must_use]
    pub fn into_image(self) -> RgbaImage {
        self.0
    }

    /// Consume the surface, returning the raw RGBA bytes.
    #[must_use]
    pub fn into_raw(self) -> Vec<u8> {
        self.0.into_raw()
    }
}

impl PartialEq for PixelSurface {
    fn eq(&self, other: &Self) -> bool {
        self.dimensions() == other.dimensions() && self.as_raw() == other.as_raw()
    }
}

impl Eq for PixelSurface {}

/// An ordered, non-empty set of RGB colors.
///
/// Entries are clamped to `0..=255` once at construction so the
/// quantizer never has to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<[i32; 3]>", into = "Vec<[u8; 3]>")]
pub struct Palette(Vec<[u8; 3]>);

impl Palette {
    /// Build a palette, clamping every channel into `0..=255`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `entries` is empty.
    pub fn new(entries: impl IntoIterator<Item = [i32; 3]>) -> Result<Self, PipelineError> {
        let colors: Vec<[u8; 3]> = entries
            .into_iter()
            .map(|rgb| rgb.map(clamp_channel))
            .collect();
        if colors.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "palette must contain at least one color".into(),
            ));
        }
        Ok(Self(colors))
    }

    /// The palette colors in order.
    #[must_use]
    pub fn colors(&self) -> &[[u8; 3]] {
        &self.0
    }

    /// Number of colors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`; kept for API symmetry with `len`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
const fn clamp_channel(value: i32) -> u8 {
    if value < 0 {
        0
    } else if value > 255 {
        255
    } else {
        value as u8
    }
}

impl TryFrom<Vec<[i32; 3]>> for Palette {
    type Error = PipelineError;

    fn try_from(entries: Vec<[i32; 3]>) -> Result<Self, Self::Error> {
        Self::new(entries)
    }
}

impl From<Palette> for Vec<[u8; 3]> {
    fn from(palette: Palette) -> Self {
        palette.0
    }
}

/// Target color set for quantization: evenly spaced levels per channel,
/// or an explicit palette that overrides levels entirely.
///
/// Serialized untagged so the settings store can send either a number
/// (`8`) or a list of triples (`[[0,0,0],[255,255,255]]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColorDepth {
    /// Levels per channel (the UI offers 2, 4, 8, 16, 32, 64).
    Levels(u16),
    /// Explicit palette.
    Palette(Palette),
}

impl Default for ColorDepth {
    fn default() -> Self {
        Self::Levels(ProcessingSettings::DEFAULT_LEVELS)
    }
}

/// Whether level quantization treats channels independently or
/// collapses them to luminance first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    /// Each channel is snapped independently.
    #[default]
    Rgb,
    /// Rec. 709 luminance is snapped and written to all three channels.
    Grayscale,
}

/// One immutable snapshot of the user's processing settings.
///
/// Produced by the external settings store and cloned into every
/// processing request. Field names follow the store's camelCase JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessingSettings {
    /// Dithering strategy.
    pub algorithm: DitherAlgorithm,

    /// Levels per channel or an explicit palette.
    pub color_depth: ColorDepth,

    /// Per-channel or luminance level quantization. Ignored in palette
    /// mode.
    pub color_mode: ColorMode,

    /// Dithering strength in `0.0..=1.0`.
    pub dithering_intensity: f32,

    /// Additive brightness offset applied to every color channel.
    pub brightness: i32,

    /// Contrast in `-1.0..=1.0`; `0.0` leaves samples unchanged.
    pub contrast: f32,

    /// Output resolution relative to the source.
    #[serde(rename = "resolutionPreset")]
    pub resolution: ResolutionPreset,

    /// Whether the presentation layer preserves aspect ratio when
    /// fitting the result to its viewport.
    pub aspect_lock: bool,

    /// Carried by the tone-only profile; not consumed by this pipeline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pixel_scale: Option<f32>,

    /// Carried by the tone-only profile; not consumed by this pipeline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strength: Option<f32>,
}

impl ProcessingSettings {
    /// Default color levels for the creative profile.
    pub const DEFAULT_LEVELS: u16 = 8;

    /// Default dithering intensity for the creative profile.
    pub const DEFAULT_INTENSITY: f32 = 0.75;

    /// The creative profile: Floyd-Steinberg at 8 levels, intensity
    /// 0.75, original resolution, aspect-locked.
    #[must_use]
    pub const fn creative() -> Self {
        Self {
            algorithm: DitherAlgorithm::FloydSteinberg,
            color_depth: ColorDepth::Levels(Self::DEFAULT_LEVELS),
            color_mode: ColorMode::Rgb,
            dithering_intensity: Self::DEFAULT_INTENSITY,
            brightness: 0,
            contrast: 0.0,
            resolution: ResolutionPreset::Original,
            aspect_lock: true,
            pixel_scale: None,
            strength: None,
        }
    }

    /// The tone-only profile: no dithering and full 256-level depth, so
    /// only brightness and contrast change the image.
    #[must_use]
    pub const fn tone_only() -> Self {
        Self {
            algorithm: DitherAlgorithm::None,
            color_depth: ColorDepth::Levels(256),
            color_mode: ColorMode::Rgb,
            dithering_intensity: 0.0,
            brightness: 0,
            contrast: 0.0,
            resolution: ResolutionPreset::Original,
            aspect_lock: true,
            pixel_scale: Some(1.0),
            strength: Some(1.0),
        }
    }
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self::creative()
    }
}

/// Underlying codec failure behind [`PipelineError::DecodeFailed`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeCause {
    /// PNG, JPEG, or WebP decoding failed.
    #[error(transparent)]
    Raster(#[from] image::ImageError),

    /// SVG parsing failed.
    #[error(transparent)]
    Svg(#[from] resvg::usvg::Error),
}

/// Errors that can occur while decoding or processing an image.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Neither the declared MIME type nor the file extension names a
    /// supported format.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// The input exceeds the decode size ceiling.
    #[error("file is {size} bytes, larger than the {limit} byte limit")]
    FileTooLarge {
        /// Input size in bytes.
        size: usize,
        /// The ceiling that was exceeded.
        limit: usize,
    },

    /// The image or buffer has a zero dimension or a mismatched length.
    #[error("invalid image dimensions {width}x{height}")]
    InvalidDimensions {
        /// Reported width.
        width: u32,
        /// Reported height.
        height: u32,
    },

    /// The codec rejected the data.
    #[error("failed to decode image: {0}")]
    DecodeFailed(#[source] DecodeCause),

    /// The input image data was empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Settings could not be parsed or are out of range.
    #[error("invalid processing settings: {0}")]
    InvalidConfig(String),
}

impl From<DecodeCause> for PipelineError {
    fn from(cause: DecodeCause) -> Self {
        Self::DecodeFailed(cause)
    }
}

impl From<image::ImageError> for PipelineError {
    fn from(err: image::ImageError) -> Self {
        Self::DecodeFailed(DecodeCause::Raster(err))
    }
}

impl From<resvg::usvg::Error> for PipelineError {
    fn from(err: resvg::usvg::Error) -> Self {
        Self::DecodeFailed(DecodeCause::Svg(err))
    }
}
