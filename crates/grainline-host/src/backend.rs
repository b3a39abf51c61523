//! The seam between the host and whatever owns image handles.
//!
//! In the browser the backend wraps a single reusable `OffscreenCanvas`
//! and exchanges `ImageBitmap`s; natively there are no handles and
//! everything travels as raw RGBA.

use std::convert::Infallible;

use grainline_pipeline::PixelSurface;

use crate::error::HostError;
use crate::protocol::Capability;

/// Converts between backend image handles and pixel surfaces.
pub trait SurfaceBackend {
    /// Opaque handle to an image owned by the backend.
    type Handle;

    /// Report what the backend supports. Must not block.
    fn probe(&mut self) -> Capability;

    /// Read a handle's pixels back through the drawing surface. The
    /// handle is consumed.
    ///
    /// # Errors
    ///
    /// [`HostError::CanvasUnavailable`] if there is no drawing context.
    fn read_pixels(&mut self, handle: Self::Handle) -> Result<PixelSurface, HostError>;

    /// Turn a processed surface into a handle.
    ///
    /// # Errors
    ///
    /// [`HostError::CanvasUnavailable`] if there is no drawing context.
    fn make_handle(&mut self, surface: PixelSurface) -> Result<Self::Handle, HostError>;
}

/// Native backend: raw pixels only.
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterBackend;

impl SurfaceBackend for RasterBackend {
    type Handle = Infallible;

    fn probe(&mut self) -> Capability {
        Capability::RawPixels
    }

    fn read_pixels(&mut self, handle: Infallible) -> Result<PixelSurface, HostError> {
        match handle {}
    }

    fn make_handle(&mut self, _surface: PixelSurface) -> Result<Infallible, HostError> {
        Err(HostError::CanvasUnavailable(
            "raster backend has no drawing surface".to_owned(),
        ))
    }
}
