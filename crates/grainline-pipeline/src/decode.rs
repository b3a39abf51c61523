//! Image decoding to a canonical, upright RGBA surface.
//!
//! Accepts raw file bytes plus the MIME type the browser (or caller)
//! declared, and produces a [`PixelSurface`] ready for processing:
//!
//! 1. Reject inputs over [`MAX_FILE_BYTES`] before looking at them.
//! 2. Resolve the format from the declared MIME type, falling back to
//!    the file extension.
//! 3. Decode PNG/JPEG/WebP with `image`, or rasterize SVG with `resvg`.
//! 4. For JPEG, apply the EXIF orientation (best effort).

use image::DynamicImage;
use resvg::{tiny_skia, usvg};

use crate::orientation::Orientation;
use crate::types::{PipelineError, PixelSurface, RgbaImage};

/// Hard ceiling on input size: 15 MiB.
pub const MAX_FILE_BYTES: usize = 15 * 1024 * 1024;

/// Largest SVG canvas rasterized: 64 megapixels (256 MiB of RGBA).
///
/// A few bytes of SVG can declare any intrinsic size, so the canvas is
/// bounded before it is allocated.
pub const MAX_SVG_PIXELS: u64 = 64 * 1024 * 1024;

/// The input formats the decoder accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// `image/png`
    Png,
    /// `image/jpeg`
    Jpeg,
    /// `image/webp`
    WebP,
    /// `image/svg+xml`
    Svg,
}

impl SourceFormat {
    /// Look up a format by MIME type. Parameters (`; charset=...`) and
    /// letter case are ignored.
    #[must_use]
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or_default().trim();
        match essence.to_ascii_lowercase().as_str() {
            "image/png" => Some(Self::Png),
            "image/jpeg" => Some(Self::Jpeg),
            "image/webp" => Some(Self::WebP),
            "image/svg+xml" => Some(Self::Svg),
            _ => None,
        }
    }

    /// Look up a format by file extension (without the dot).
    #[must_use]
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::WebP),
            "svg" => Some(Self::Svg),
            _ => None,
        }
    }

    /// Resolve the format: declared MIME type first, then the extension
    /// of `file_name`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnsupportedFormat`] if neither matches.
    pub fn resolve(declared_mime: &str, file_name: Option<&str>) -> Result<Self, PipelineError> {
        Self::from_mime(declared_mime)
            .or_else(|| {
                file_name
                    .and_then(|name| name.rsplit_once('.'))
                    .and_then(|(_, extension)| Self::from_extension(extension))
            })
            .ok_or_else(|| {
                let declared = if declared_mime.is_empty() {
                    file_name.unwrap_or("unknown")
                } else {
                    declared_mime
                };
                PipelineError::UnsupportedFormat(declared.to_owned())
            })
    }

    /// The canonical MIME type.
    #[must_use]
    pub const fn mime(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
            Self::Svg => "image/svg+xml",
        }
    }

    /// The matching `image` crate format, or `None` for SVG.
    const fn raster_format(self) -> Option<image::ImageFormat> {
        match self {
            Self::Png => Some(image::ImageFormat::Png),
            Self::Jpeg => Some(image::ImageFormat::Jpeg),
            Self::WebP => Some(image::ImageFormat::WebP),
            Self::Svg => None,
        }
    }
}

/// Decode image bytes using only the declared MIME type.
///
/// # Errors
///
/// See [`decode_named`].
pub fn decode(bytes: &[u8], declared_mime: &str) -> Result<PixelSurface, PipelineError> {
    decode_named(bytes, declared_mime, None)
}

/// Decode image bytes into an upright RGBA surface.
///
/// `file_name` is only consulted when `declared_mime` is not a
/// supported type.
///
/// # Errors
///
/// - [`PipelineError::FileTooLarge`] if `bytes` exceeds [`MAX_FILE_BYTES`]
///   (checked before anything else).
/// - [`PipelineError::UnsupportedFormat`] if the format cannot be resolved.
/// - [`PipelineError::EmptyInput`] if `bytes` is empty.
/// - [`PipelineError::DecodeFailed`] if the codec rejects the data.
/// - [`PipelineError::InvalidDimensions`] if the image has a zero dimension,
///   or an SVG declares more than [`MAX_SVG_PIXELS`].
pub fn decode_named(
    bytes: &[u8],
    declared_mime: &str,
    file_name: Option<&str>,
) -> Result<PixelSurface, PipelineError> {
    if bytes.len() > MAX_FILE_BYTES {
        return Err(PipelineError::FileTooLarge {
            size: bytes.len(),
            limit: MAX_FILE_BYTES,
        });
    }

    let format = SourceFormat::resolve(declared_mime, file_name)?;

    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let surface = match format.raster_format() {
        Some(raster) => {
            let image = image::load_from_memory_with_format(bytes, raster)?;
            let orientation = if format == SourceFormat::Jpeg {
                Orientation::from_jpeg(bytes)
            } else {
                Orientation::Identity
            };
            tracing::debug!(
                format = format.mime(),
                width = image.width(),
                height = image.height(),
                orientation = orientation.exif_value(),
                "decoded raster image",
            );
            PixelSurface::from_image(upright_rgba(image, orientation))?
        }
        None => PixelSurface::from_image(rasterize_svg(bytes)?)?,
    };

    Ok(surface)
}

fn upright_rgba(image: DynamicImage, orientation: Orientation) -> RgbaImage {
    orientation.apply(image).into_rgba8()
}

/// Rasterize an SVG document at its intrinsic size, returning straight
/// (non-premultiplied) RGBA.
fn rasterize_svg(bytes: &[u8]) -> Result<RgbaImage, PipelineError> {
    let tree = usvg::Tree::from_data(bytes, &usvg::Options::default())?;
    let size = tree.size().to_int_size();
    let (width, height) = (size.width(), size.height());
    if u64::from(width) * u64::from(height) > MAX_SVG_PIXELS {
        tracing::debug!(width, height, "SVG canvas over pixel limit");
        return Err(PipelineError::InvalidDimensions { width, height });
    }

    let mut pixmap = tiny_skia::Pixmap::new(width, height)
        .ok_or(PipelineError::InvalidDimensions { width, height })?;
    resvg::render(&tree, tiny_skia::Transform::identity(), &mut pixmap.as_mut());

    let data: Vec<u8> = pixmap
        .pixels()
        .iter()
        .flat_map(|pixel| {
            let color = pixel.demultiply();
            [color.red(), color.green(), color.blue(), color.alpha()]
        })
        .collect();

    tracing::debug!(width, height, "rasterized SVG");
    RgbaImage::from_raw(width, height, data).ok_or(PipelineError::InvalidDimensions { width, height })
}
