//! `OffscreenCanvas` surface backend.
//!
//! One canvas and its 2D context are created on the first probe and
//! reused for every read and write; the canvas is only resized, never
//! replaced.

use grainline_host::{Capability, HostError, SurfaceBackend};
use grainline_pipeline::PixelSurface;
use wasm_bindgen::{Clamped, JsCast, JsValue};
use web_sys::{ImageBitmap, ImageData, OffscreenCanvas, OffscreenCanvasRenderingContext2d};

/// The drawing surface, once created.
struct Canvas {
    canvas: OffscreenCanvas,
    context: OffscreenCanvasRenderingContext2d,
}

impl Canvas {
    fn create() -> Result<Self, JsValue> {
        let canvas = OffscreenCanvas::new(1, 1)?;
        let context = canvas
            .get_context("2d")?
            .ok_or_else(|| JsValue::from_str("2d context unsupported"))?
            .dyn_into::<OffscreenCanvasRenderingContext2d>()?;
        Ok(Self { canvas, context })
    }

    fn fit(&self, width: u32, height: u32) {
        if self.canvas.width() != width {
            self.canvas.set_width(width);
        }
        if self.canvas.height() != height {
            self.canvas.set_height(height);
        }
        self.context
            .clear_rect(0.0, 0.0, f64::from(width), f64::from(height));
    }
}

/// Exchanges `ImageBitmap`s through a single reusable `OffscreenCanvas`.
#[derive(Default)]
pub struct OffscreenBackend {
    canvas: Option<Canvas>,
    probed: bool,
}

impl OffscreenBackend {
    fn canvas(&self) -> Result<&Canvas, HostError> {
        self.canvas.as_ref().ok_or_else(|| {
            HostError::CanvasUnavailable("OffscreenCanvas 2d context unavailable".to_owned())
        })
    }
}

impl SurfaceBackend for OffscreenBackend {
    type Handle = ImageBitmap;

    fn probe(&mut self) -> Capability {
        if !self.probed {
            self.probed = true;
            self.canvas = Canvas::create().ok();
        }
        if self.canvas.is_some() {
            Capability::Handle
        } else {
            Capability::RawPixels
        }
    }

    fn read_pixels(&mut self, bitmap: ImageBitmap) -> Result<PixelSurface, HostError> {
        let canvas = self.canvas()?;
        let (width, height) = (bitmap.width(), bitmap.height());
        canvas.fit(width, height);
        let drawn = canvas
            .context
            .draw_image_with_image_bitmap(&bitmap, 0.0, 0.0);
        // The bitmap was transferred to us; release it either way.
        bitmap.close();
        drawn.map_err(|err| canvas_error("drawImage", &err))?;

        let data = canvas
            .context
            .get_image_data(0.0, 0.0, f64::from(width), f64::from(height))
            .map_err(|err| canvas_error("getImageData", &err))?;
        Ok(PixelSurface::from_raw(width, height, data.data().0)?)
    }

    fn make_handle(&mut self, surface: PixelSurface) -> Result<ImageBitmap, HostError> {
        let canvas = self.canvas()?;
        let (width, height) = (surface.width(), surface.height());
        canvas.fit(width, height);
        let data = ImageData::new_with_u8_clamped_array_and_sh(Clamped(surface.as_raw()), width, height)
            .map_err(|err| canvas_error("ImageData", &err))?;
        canvas
            .context
            .put_image_data(&data, 0.0, 0.0)
            .map_err(|err| canvas_error("putImageData", &err))?;
        canvas
            .canvas
            .transfer_to_image_bitmap()
            .map_err(|err| canvas_error("transferToImageBitmap", &err))
    }
}

fn canvas_error(operation: &str, err: &JsValue) -> HostError {
    let detail = err.as_string().unwrap_or_else(|| format!("{err:?}"));
    HostError::CanvasUnavailable(format!("{operation} failed: {detail}"))
}
