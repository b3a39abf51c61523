//! Incremental pipeline: advance stage by stage, inspecting each
//! intermediate surface before continuing.
//!
//! [`crate::process`] runs everything in one call. [`Pipeline`] lets the
//! caller drive it:
//!
//! ```rust
//! # use grainline_pipeline::{Pipeline, PipelineError, PixelSurface, ProcessingSettings};
//! # fn run(surface: PixelSurface) -> Result<(), PipelineError> {
//! let settings = ProcessingSettings::default();
//! let dithered = Pipeline::new(surface, settings)
//!     .scale()?
//!     .tone()
//!     .dither();
//!
//! let output = dithered.into_surface();
//! # Ok(())
//! # }
//! ```
//!
//! Each stage consumes `self` and moves the surface forward; no stage
//! keeps a copy of the previous one. Callers that want to compare before
//! and after clone at the point of interest.

use crate::decode;
use crate::dither::{Dither, DitherOptions};
use crate::quantize::Quantizer;
use crate::resolution;
use crate::tone;
use crate::types::{Dimensions, PipelineError, PixelSurface, ProcessingSettings};

/// Entry point for building a staged pipeline.
pub struct Pipeline;

impl Pipeline {
    /// Start a pipeline from an already decoded surface.
    pub const fn new(surface: PixelSurface, settings: ProcessingSettings) -> Pending {
        Pending { settings, surface }
    }

    /// Decode encoded bytes and start a pipeline from the result.
    ///
    /// # Errors
    ///
    /// Any [`PipelineError`] returned by [`decode::decode`].
    pub fn decode(
        bytes: &[u8],
        declared_mime: &str,
        settings: ProcessingSettings,
    ) -> Result<Pending, PipelineError> {
        Ok(Self::new(decode::decode(bytes, declared_mime)?, settings))
    }
}

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Pipeline state before any processing.
#[must_use = "pipeline stages are consumed by advancing; call .scale() to continue"]
pub struct Pending {
    settings: ProcessingSettings,
    surface: PixelSurface,
}

impl Pending {
    /// The source surface.
    #[must_use]
    pub const fn surface(&self) -> &PixelSurface {
        &self.surface
    }

    /// Settings this run uses.
    #[must_use]
    pub const fn settings(&self) -> &ProcessingSettings {
        &self.settings
    }

    /// Apply the resolution preset and advance to [`Scaled`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidDimensions`] if resampling
    /// produced an empty surface.
    pub fn scale(self) -> Result<Scaled, PipelineError> {
        let source = self.surface.dimensions();
        let surface = resolution::scale(self.surface, self.settings.resolution)?;
        Ok(Scaled {
            settings: self.settings,
            source,
            surface,
        })
    }
}

// ───────────────────────── Stage 1: Scaled ───────────────────────────

/// Pipeline state after resolution scaling.
#[must_use = "pipeline stages are consumed by advancing; call .tone() to continue"]
pub struct Scaled {
    settings: ProcessingSettings,
    source: Dimensions,
    surface: PixelSurface,
}

impl Scaled {
    /// The scaled surface.
    #[must_use]
    pub const fn surface(&self) -> &PixelSurface {
        &self.surface
    }

    /// Size before scaling.
    #[must_use]
    pub const fn source_dimensions(&self) -> Dimensions {
        self.source
    }

    /// Adjust brightness and contrast and advance to [`Toned`]. Neutral
    /// settings skip the pass entirely.
    pub fn tone(mut self) -> Toned {
        let brightness = self.settings.brightness;
        let contrast = self.settings.contrast;
        let applied = !tone::is_noop(brightness, contrast);
        if applied {
            tone::adjust(&mut self.surface, brightness, contrast);
        }
        Toned {
            settings: self.settings,
            source: self.source,
            surface: self.surface,
            applied,
        }
    }
}

// ───────────────────────── Stage 2: Toned ────────────────────────────

/// Pipeline state after tone adjustment.
#[must_use = "pipeline stages are consumed by advancing; call .dither() to continue"]
pub struct Toned {
    settings: ProcessingSettings,
    source: Dimensions,
    surface: PixelSurface,
    applied: bool,
}

impl Toned {
    /// The tone-adjusted surface.
    #[must_use]
    pub const fn surface(&self) -> &PixelSurface {
        &self.surface
    }

    /// Whether the tone pass ran.
    #[must_use]
    pub const fn applied(&self) -> bool {
        self.applied
    }

    /// Quantize through the configured dithering strategy and advance to
    /// [`Dithered`].
    pub fn dither(mut self) -> Dithered {
        let quantizer = Quantizer::from_settings(&self.settings);
        let options = DitherOptions {
            intensity: self.settings.dithering_intensity,
            quantizer: &quantizer,
        };
        tracing::trace!(algorithm = %self.settings.algorithm, "dithering");
        self.settings.algorithm.apply(&mut self.surface, &options);
        Dithered {
            settings: self.settings,
            source: self.source,
            surface: self.surface,
        }
    }
}

// ───────────────────────── Stage 3: Dithered ─────────────────────────

/// Final pipeline state.
#[must_use = "call .into_surface() to take the output"]
pub struct Dithered {
    settings: ProcessingSettings,
    source: Dimensions,
    surface: PixelSurface,
}

impl Dithered {
    /// The output surface.
    #[must_use]
    pub const fn surface(&self) -> &PixelSurface {
        &self.surface
    }

    /// Size of the surface the run started from.
    #[must_use]
    pub const fn source_dimensions(&self) -> Dimensions {
        self.source
    }

    /// Settings the run used.
    #[must_use]
    pub const fn settings(&self) -> &ProcessingSettings {
        &self.settings
    }

    /// Take the output surface.
    #[must_use]
    pub fn into_surface(self) -> PixelSurface {
        self.surface
    }
}
