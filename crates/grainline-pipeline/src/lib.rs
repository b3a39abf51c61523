//! grainline-pipeline: Pure image processing pipeline (sans-IO).
//!
//! Turns encoded images into stylized RGBA previews through:
//! decode (EXIF-aware) -> resolution scaling -> tone adjustment ->
//! quantization with dithering.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! byte slices and pixel buffers. Threading, message passing and browser
//! surfaces live in `grainline-host` and `grainline-worker`.

pub mod decode;
pub mod diagnostics;
pub mod dither;
pub mod orientation;
pub mod pipeline;
pub mod quantize;
pub mod resolution;
mod rows;
pub mod tone;
pub mod types;

pub use decode::{MAX_FILE_BYTES, MAX_SVG_PIXELS, SourceFormat, decode, decode_named};
pub use diagnostics::{Clock, PipelineDiagnostics};
pub use dither::{Dither, DitherAlgorithm, DitherOptions};
pub use orientation::Orientation;
pub use pipeline::Pipeline;
pub use quantize::Quantizer;
pub use resolution::{ResolutionPreset, fit_viewport};
pub use types::{
    ColorDepth, ColorMode, DecodeCause, Dimensions, Palette, PipelineError, PixelSurface,
    ProcessingSettings,
};

use diagnostics::{PipelineSummary, StageDiagnostics, StageMetrics};

/// Run the processing stages on a decoded surface.
///
/// # Pipeline steps
///
/// 1. Resolution scaling (preset divisor, triangle filter)
/// 2. Tone adjustment (skipped when brightness and contrast are neutral)
/// 3. Quantization through the selected dithering strategy
///
/// The surface is consumed; the result may be a different allocation when
/// scaling changed its size.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidDimensions`] if scaling produced an
/// empty surface.
pub fn process(
    surface: PixelSurface,
    settings: &ProcessingSettings,
) -> Result<PixelSurface, PipelineError> {
    let output = Pipeline::new(surface, settings.clone())
        .scale()?
        .tone()
        .dither()
        .into_surface();
    Ok(output)
}

/// Like [`process`], also returning per-stage diagnostics.
///
/// # Errors
///
/// See [`process`].
pub fn process_with_diagnostics<C: Clock>(
    surface: PixelSurface,
    settings: &ProcessingSettings,
    clock: &C,
) -> Result<(PixelSurface, PipelineDiagnostics), PipelineError> {
    run_with_diagnostics(surface, settings, clock, None, clock.now())
}

/// Decode `bytes` and run [`process_with_diagnostics`], timing the decode
/// as its own stage.
///
/// # Errors
///
/// Any error from [`decode()`] or [`process`].
pub fn decode_and_process_with_diagnostics<C: Clock>(
    bytes: &[u8],
    declared_mime: &str,
    settings: &ProcessingSettings,
    clock: &C,
) -> Result<(PixelSurface, PipelineDiagnostics), PipelineError> {
    let start = clock.now();
    let surface = decode(bytes, declared_mime)?;
    let decode_stage = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::Decode {
            input_bytes: bytes.len(),
            width: surface.width(),
            height: surface.height(),
        },
    };
    run_with_diagnostics(surface, settings, clock, Some(decode_stage), start)
}

fn run_with_diagnostics<C: Clock>(
    surface: PixelSurface,
    settings: &ProcessingSettings,
    clock: &C,
    decode: Option<StageDiagnostics>,
    start: C::Instant,
) -> Result<(PixelSurface, PipelineDiagnostics), PipelineError> {
    let input = surface.dimensions();

    // 1. Scale.
    let t = clock.now();
    let scaled = Pipeline::new(surface, settings.clone()).scale()?;
    let scale = StageDiagnostics {
        duration: clock.elapsed(&t),
        metrics: StageMetrics::Scale {
            preset: settings.resolution,
            from: input,
            to: scaled.surface().dimensions(),
        },
    };

    // 2. Tone.
    let t = clock.now();
    let toned = scaled.tone();
    let tone = toned.applied().then(|| StageDiagnostics {
        duration: clock.elapsed(&t),
        metrics: StageMetrics::Tone {
            brightness: settings.brightness,
            contrast: settings.contrast,
        },
    });

    // 3. Dither.
    let t = clock.now();
    let dithered = toned.dither();
    let dither_duration = clock.elapsed(&t);
    let output = dithered.into_surface();
    let dither = StageDiagnostics {
        duration: dither_duration,
        metrics: StageMetrics::Dither {
            algorithm: settings.algorithm,
            intensity: settings.dithering_intensity.clamp(0.0, 1.0),
            output_colors: diagnostics::count_colors(output.as_raw()),
        },
    };

    let diagnostics = PipelineDiagnostics {
        decode,
        scale,
        tone,
        dither,
        total_duration: clock.elapsed(&start),
        summary: PipelineSummary {
            input,
            output: output.dimensions(),
            pixel_count: output.dimensions().pixel_count(),
        },
    };
    tracing::debug!(
        total_ms = diagnostics::duration_ms(diagnostics.total_duration),
        "pipeline finished"
    );
    Ok((output, diagnostics))
}
