//! Pipeline diagnostics: timing and size metrics for each stage.
//!
//! Collected by [`process_with_diagnostics`](crate::process_with_diagnostics)
//! and [`decode_and_process_with_diagnostics`](crate::decode_and_process_with_diagnostics)
//! for tuning and benchmarking. Time is read through the [`Clock`] trait
//! so the core stays free of platform timers (`std::time::Instant`
//! panics on `wasm32-unknown-unknown`).
//!
//! Durations are serialized as fractional seconds (`f64`), since
//! `std::time::Duration` does not implement serde traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dither::DitherAlgorithm;
use crate::resolution::ResolutionPreset;
use crate::types::Dimensions;

/// Source of monotonic timestamps.
pub trait Clock {
    /// Opaque timestamp.
    type Instant;

    /// Current timestamp.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|_| serde::de::Error::custom("duration seconds must be finite and non-negative"))
    }
}

/// Diagnostics collected from a single pipeline run.
///
/// Stages that may be skipped have `Option` fields that are `None` when
/// the stage did not run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Decoding, when the run started from encoded bytes.
    pub decode: Option<StageDiagnostics>,
    /// Resolution scaling.
    pub scale: StageDiagnostics,
    /// Tone adjustment (skipped when brightness and contrast are neutral).
    pub tone: Option<StageDiagnostics>,
    /// Quantization and dithering.
    pub dither: StageDiagnostics,
    /// Wall-clock duration of the whole run (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary across all stages.
    pub summary: PipelineSummary,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Decoding.
    Decode {
        /// Size of the encoded input.
        input_bytes: usize,
        /// Decoded (oriented) width.
        width: u32,
        /// Decoded (oriented) height.
        height: u32,
    },
    /// Resolution scaling.
    Scale {
        /// Preset applied.
        preset: ResolutionPreset,
        /// Size before scaling.
        from: Dimensions,
        /// Size after scaling.
        to: Dimensions,
    },
    /// Tone adjustment.
    Tone {
        /// Brightness offset.
        brightness: i32,
        /// Contrast, before clamping.
        contrast: f32,
    },
    /// Quantization and dithering.
    Dither {
        /// Strategy used.
        algorithm: DitherAlgorithm,
        /// Intensity after clamping.
        intensity: f32,
        /// Distinct RGB colors in the output.
        output_colors: usize,
    },
}

/// High-level summary for the whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Input size to the pipeline (after decode).
    pub input: Dimensions,
    /// Output size.
    pub output: Dimensions,
    /// Output pixel count.
    pub pixel_count: u64,
}

impl PipelineDiagnostics {
    /// The stages that ran, in order, with display names.
    #[must_use]
    pub fn stages(&self) -> Vec<(&'static str, &StageDiagnostics)> {
        let mut stages = Vec::with_capacity(4);
        if let Some(decode) = &self.decode {
            stages.push(("Decode", decode));
        }
        stages.push(("Scale", &self.scale));
        if let Some(tone) = &self.tone {
            stages.push(("Tone", tone));
        }
        stages.push(("Dither", &self.dither));
        stages
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Pipeline Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{} -> {}x{} ({} pixels)",
            self.summary.input.width,
            self.summary.input.height,
            self.summary.output.width,
            self.summary.output.height,
            self.summary.pixel_count,
        ));
        lines.push(format!("Total duration: {:.3}ms", duration_ms(self.total_duration)));
        lines.push(String::new());

        lines.push(format!(
            "{:<16} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(72));

        let total_ms = duration_ms(self.total_duration);
        for (name, diag) in self.stages() {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 { ms / total_ms * 100.0 } else { 0.0 };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<16} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
pub(crate) fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Decode {
            input_bytes,
            width,
            height,
        } => format!("{input_bytes} bytes -> {width}x{height}"),
        StageMetrics::Scale { preset, from, to } => {
            format!("{preset}: {}x{} -> {}x{}", from.width, from.height, to.width, to.height)
        }
        StageMetrics::Tone {
            brightness,
            contrast,
        } => format!("brightness={brightness:+} contrast={contrast:.2}"),
        StageMetrics::Dither {
            algorithm,
            intensity,
            output_colors,
        } => format!("{algorithm} intensity={intensity:.2} colors={output_colors}"),
    }
}

/// Number of distinct RGB triples in an RGBA buffer.
pub(crate) fn count_colors(pixels: &[u8]) -> usize {
    let mut seen = std::collections::HashSet::new();
    for px in pixels.chunks_exact(4) {
        seen.insert([px[0], px[1], px[2]]);
    }
    seen.len()
}
