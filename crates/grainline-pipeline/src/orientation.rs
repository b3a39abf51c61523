//! EXIF orientation values and the transforms that make an image upright.

use std::io::Cursor;

use image::DynamicImage;

use crate::types::{PipelineError, PixelSurface};

/// The eight EXIF orientations (tag `0x0112`).
///
/// Each variant names the transform that turns the stored pixels into
/// the upright image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    /// 1: stored upright.
    #[default]
    Identity,
    /// 2: mirrored left-to-right.
    FlipHorizontal,
    /// 3: rotated 180°.
    Rotate180,
    /// 4: mirrored top-to-bottom.
    FlipVertical,
    /// 5: mirrored along the main diagonal.
    Transpose,
    /// 6: needs a 90° clockwise rotation.
    Rotate90,
    /// 7: mirrored along the anti-diagonal.
    Transverse,
    /// 8: needs a 90° counter-clockwise rotation.
    Rotate270,
}

impl Orientation {
    /// Read the EXIF orientation of a JPEG byte stream.
    ///
    /// Best effort: a missing, malformed, or out-of-range tag yields
    /// [`Orientation::Identity`].
    #[must_use]
    pub fn from_jpeg(bytes: &[u8]) -> Self {
        let orientation = exif::Reader::new()
            .read_from_container(&mut Cursor::new(bytes))
            .ok()
            .and_then(|reader| {
                reader
                    .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
                    .and_then(|field| field.value.get_uint(0))
            })
            .and_then(|value| u16::try_from(value).ok())
            .and_then(Self::from_exif)
            .unwrap_or_default();
        tracing::trace!(?orientation, "read JPEG EXIF orientation");
        orientation
    }

    /// Map a raw EXIF value to an orientation. Values outside `1..=8`
    /// yield `None`.
    #[must_use]
    pub const fn from_exif(value: u16) -> Option<Self> {
        Some(match value {
            1 => Self::Identity,
            2 => Self::FlipHorizontal,
            3 => Self::Rotate180,
            4 => Self::FlipVertical,
            5 => Self::Transpose,
            6 => Self::Rotate90,
            7 => Self::Transverse,
            8 => Self::Rotate270,
            _ => return None,
        })
    }

    /// The raw EXIF value.
    #[must_use]
    pub const fn exif_value(self) -> u16 {
        match self {
            Self::Identity => 1,
            Self::FlipHorizontal => 2,
            Self::Rotate180 => 3,
            Self::FlipVertical => 4,
            Self::Transpose => 5,
            Self::Rotate90 => 6,
            Self::Transverse => 7,
            Self::Rotate270 => 8,
        }
    }

    /// Whether the transform exchanges width and height (values 5–8).
    #[must_use]
    pub const fn swaps_dimensions(self) -> bool {
        matches!(
            self,
            Self::Transpose | Self::Rotate90 | Self::Transverse | Self::Rotate270
        )
    }

    /// Apply the transform to a decoded image.
    #[must_use]
    pub fn apply(self, image: DynamicImage) -> DynamicImage {
        match self {
            Self::Identity => image,
            Self::FlipHorizontal => image.fliph(),
            Self::Rotate180 => image.rotate180(),
            Self::FlipVertical => image.flipv(),
            Self::Transpose => image.rotate90().fliph(),
            Self::Rotate90 => image.rotate90(),
            Self::Transverse => image.rotate270().fliph(),
            Self::Rotate270 => image.rotate270(),
        }
    }

    /// Apply the transform to a surface, producing a new surface sized to
    /// the post-transform dimensions.
    ///
    /// # Errors
    ///
    /// Propagates [`PipelineError::InvalidDimensions`]; cannot occur for
    /// a valid input surface.
    pub fn apply_to_surface(self, surface: PixelSurface) -> Result<PixelSurface, PipelineError> {
        if self == Self::Identity {
            return Ok(surface);
        }
        let image = DynamicImage::ImageRgba8(surface.into_image());
        PixelSurface::from_image(self.apply(image).into_rgba8())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;

    /// Build an APP1 segment (marker included) holding a TIFF block with
    /// a single IFD0 orientation entry.
    pub(crate) fn exif_segment(orientation: u16, little_endian: bool) -> Vec<u8> {
        let u16_bytes = |v: u16| {
            if little_endian {
                v.to_le_bytes()
            } else {
                v.to_be_bytes()
            }
        };
        let u32_bytes = |v: u32| {
            if little_endian {
                v.to_le_bytes()
            } else {
                v.to_be_bytes()
            }
        };

        let mut tiff = Vec::new();
        tiff.extend_from_slice(if little_endian { b"II" } else { b"MM" });
        tiff.extend_from_slice(&u16_bytes(42));
        tiff.extend_from_slice(&u32_bytes(8));
        // One IFD0 entry: tag 0x0112, type SHORT, count 1.
        tiff.extend_from_slice(&u16_bytes(1));
        tiff.extend_from_slice(&u16_bytes(0x0112));
        tiff.extend_from_slice(&u16_bytes(3));
        tiff.extend_from_slice(&u32_bytes(1));
        tiff.extend_from_slice(&u16_bytes(orientation));
        tiff.extend_from_slice(&[0, 0]);
        tiff.extend_from_slice(&u32_bytes(0));

        let mut body = b"Exif\0\0".to_vec();
        body.extend_from_slice(&tiff);

        let length = u16::try_from(body.len() + 2).unwrap();
        let mut segment = vec![0xFF, 0xE1];
        segment.extend_from_slice(&length.to_be_bytes());
        segment.extend_from_slice(&body);
        segment
    }

    /// A minimal marker stream: SOI, the given segments, then SOS.
    fn stream(segments: &[&[u8]]) -> Vec<u8> {
        let mut bytes = vec![0xFF, 0xD8];
        for segment in segments {
            bytes.extend_from_slice(segment);
        }
        bytes.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x02]);
        bytes
    }

    #[test]
    fn reads_big_endian_orientation() {
        let bytes = stream(&[&exif_segment(6, false)]);
        assert_eq!(Orientation::from_jpeg(&bytes), Orientation::Rotate90);
    }

    #[test]
    fn reads_little_endian_orientation() {
        let bytes = stream(&[&exif_segment(8, true)]);
        assert_eq!(Orientation::from_jpeg(&bytes), Orientation::Rotate270);
    }

    #[test]
    fn skips_preceding_segments() {
        // APP0 (JFIF-style) segment before the EXIF block.
        let app0 = [0xFF, 0xE0, 0x00, 0x06, b'J', b'F', b'I', b'F'];
        let bytes = stream(&[&app0, &exif_segment(3, false)]);
        assert_eq!(Orientation::from_jpeg(&bytes), Orientation::Rotate180);
    }

    #[test]
    fn missing_exif_defaults_to_identity() {
        let bytes = stream(&[]);
        assert_eq!(Orientation::from_jpeg(&bytes), Orientation::Identity);
    }

    #[test]
    fn non_jpeg_defaults_to_identity() {
        assert_eq!(Orientation::from_jpeg(b"\x89PNG\r\n"), Orientation::Identity);
        assert_eq!(Orientation::from_jpeg(&[]), Orientation::Identity);
    }

    #[test]
    fn out_of_range_value_defaults_to_identity() {
        let bytes = stream(&[&exif_segment(9, false)]);
        assert_eq!(Orientation::from_jpeg(&bytes), Orientation::Identity);
        let bytes = stream(&[&exif_segment(0, true)]);
        assert_eq!(Orientation::from_jpeg(&bytes), Orientation::Identity);
    }

    #[test]
    fn truncated_segment_defaults_to_identity() {
        let segment = exif_segment(6, false);
        let mut bytes = vec![0xFF, 0xD8];
        bytes.extend_from_slice(&segment[..segment.len() - 5]);
        assert_eq!(Orientation::from_jpeg(&bytes), Orientation::Identity);
    }

    #[test]
    fn bogus_ifd_offset_defaults_to_identity() {
        let mut segment = exif_segment(6, false);
        // Marker, length, "Exif\0\0", byte order, magic.
        let at = 4 + 6 + 4;
        segment[at..at + 4].copy_from_slice(&u32::MAX.to_be_bytes());
        let bytes = stream(&[&segment]);
        assert_eq!(Orientation::from_jpeg(&bytes), Orientation::Identity);
    }

    #[test]
    fn unknown_byte_order_defaults_to_identity() {
        let mut segment = exif_segment(6, false);
        let at = 4 + 6;
        segment[at..at + 2].copy_from_slice(b"XX");
        let bytes = stream(&[&segment]);
        assert_eq!(Orientation::from_jpeg(&bytes), Orientation::Identity);
    }

    /// 3x2 surface whose red channel encodes the source index `y * 3 + x`.
    fn indexed() -> PixelSurface {
        PixelSurface::from_fn(3, 2, |x, y| {
            [u8::try_from(y * 3 + x).unwrap(), 0, 0, 255]
        })
        .unwrap()
    }

    fn red_rows(surface: &PixelSurface) -> Vec<Vec<u8>> {
        (0..surface.height())
            .map(|y| {
                (0..surface.width())
                    .map(|x| surface.pixel(x, y).unwrap()[0])
                    .collect()
            })
            .collect()
    }

    fn transformed(value: u16) -> PixelSurface {
        Orientation::from_exif(value)
            .unwrap()
            .apply_to_surface(indexed())
            .unwrap()
    }

    #[test]
    fn exif_values_round_trip() {
        for value in 1..=8 {
            assert_eq!(Orientation::from_exif(value).unwrap().exif_value(), value);
        }
        assert_eq!(Orientation::from_exif(0), None);
        assert_eq!(Orientation::from_exif(9), None);
    }

    #[test]
    fn default_is_identity() {
        assert_eq!(Orientation::default(), Orientation::Identity);
    }

    #[test]
    fn identity_keeps_pixels() {
        assert_eq!(red_rows(&transformed(1)), vec![vec![0, 1, 2], vec![3, 4, 5]]);
    }

    #[test]
    fn flip_horizontal() {
        assert_eq!(red_rows(&transformed(2)), vec![vec![2, 1, 0], vec![5, 4, 3]]);
    }

    #[test]
    fn rotate_180() {
        assert_eq!(red_rows(&transformed(3)), vec![vec![5, 4, 3], vec![2, 1, 0]]);
    }

    #[test]
    fn flip_vertical() {
        assert_eq!(red_rows(&transformed(4)), vec![vec![3, 4, 5], vec![0, 1, 2]]);
    }

    #[test]
    fn transpose() {
        assert_eq!(
            red_rows(&transformed(5)),
            vec![vec![0, 3], vec![1, 4], vec![2, 5]]
        );
    }

    #[test]
    fn rotate_90_clockwise() {
        assert_eq!(
            red_rows(&transformed(6)),
            vec![vec![3, 0], vec![4, 1], vec![5, 2]]
        );
    }

    #[test]
    fn transverse() {
        assert_eq!(
            red_rows(&transformed(7)),
            vec![vec![5, 2], vec![4, 1], vec![3, 0]]
        );
    }

    #[test]
    fn rotate_90_counter_clockwise() {
        assert_eq!(
            red_rows(&transformed(8)),
            vec![vec![2, 5], vec![1, 4], vec![0, 3]]
        );
    }

    #[test]
    fn swapping_orientations_swap_dimensions() {
        for value in 1..=8 {
            let orientation = Orientation::from_exif(value).unwrap();
            let out = transformed(value);
            if orientation.swaps_dimensions() {
                assert_eq!((out.width(), out.height()), (2, 3), "orientation {value}");
            } else {
                assert_eq!((out.width(), out.height()), (3, 2), "orientation {value}");
            }
        }
    }
}
