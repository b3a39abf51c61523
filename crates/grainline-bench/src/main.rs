//! grainline-bench: CLI tool for settings experimentation and diagnostics.
//!
//! Decodes an image file, runs the processing pipeline with configurable
//! settings, and prints per-stage diagnostics. Useful for:
//!
//! - Comparing dithering strategies and color depths
//! - Measuring how resolution presets change stage durations
//! - Checking the round trip through the host thread
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin grainline-bench -- [OPTIONS] <IMAGE_PATH>
//! ```
//!
//! Log output is controlled by `RUST_LOG` (default `grainline=warn`).

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::convert::Infallible;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use grainline_host::{HostClient, Output, RasterBackend, Response};
use grainline_pipeline::{
    Clock, ColorDepth, ColorMode, DitherAlgorithm, PipelineDiagnostics, PixelSurface,
    ProcessingSettings, ResolutionPreset, SourceFormat,
};
use tracing_subscriber::prelude::*;

/// How long a host round trip may take before the run is abandoned.
const HOST_TIMEOUT: Duration = Duration::from_secs(120);

/// Settings experimentation and diagnostics for grainline.
///
/// Runs the processing pipeline on a given image with configurable
/// settings and prints per-stage timing and color-count diagnostics.
#[derive(Parser)]
#[command(name = "grainline-bench", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, WebP, SVG).
    image_path: PathBuf,

    /// Declared MIME type. Falls back to the file extension.
    #[arg(long)]
    mime: Option<String>,

    /// Settings profile that the individual flags modify.
    #[arg(long, value_enum, default_value_t = Profile::Creative)]
    profile: Profile,

    /// Dithering strategy.
    #[arg(long, value_enum)]
    algorithm: Option<Algorithm>,

    /// Quantization levels per channel.
    #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<u16>::new().range(2..=256))]
    levels: Option<u16>,

    /// Quantize Rec. 709 luminance instead of each channel.
    #[arg(long)]
    grayscale: bool,

    /// Dithering intensity (0.0-1.0).
    #[arg(long)]
    intensity: Option<f32>,

    /// Brightness offset added to each channel.
    #[arg(long, allow_hyphen_values = true)]
    brightness: Option<i32>,

    /// Contrast (-1.0-1.0).
    #[arg(long, allow_hyphen_values = true)]
    contrast: Option<f32>,

    /// Processing resolution.
    #[arg(long, value_enum)]
    resolution: Option<Resolution>,

    /// Send each run through a host thread instead of calling the
    /// pipeline directly.
    #[arg(long)]
    via_host: bool,

    /// Write the first run's output to a PNG file.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of a human-readable report.
    #[arg(long)]
    json: bool,

    /// Full processing settings as a JSON string.
    ///
    /// When provided, all other settings flags are ignored. The JSON uses
    /// the settings store's camelCase field names.
    #[arg(long)]
    settings_json: Option<String>,
}

/// Starting profile.
#[derive(Clone, Copy, ValueEnum)]
enum Profile {
    /// Floyd-Steinberg at 8 levels, intensity 0.75.
    Creative,
    /// No dithering at 256 levels; only tone changes the image.
    ToneOnly,
}

/// Dithering strategy selection.
#[derive(Clone, Copy, ValueEnum)]
enum Algorithm {
    /// Direct quantization.
    None,
    /// Floyd-Steinberg error diffusion.
    FloydSteinberg,
    /// 8x8 Bayer ordered dithering.
    Bayer,
}

/// Resolution preset selection.
#[derive(Clone, Copy, ValueEnum)]
enum Resolution {
    /// Source size.
    Original,
    /// Half of each axis.
    Half,
    /// Quarter of each axis.
    Quarter,
}

/// Build [`ProcessingSettings`] from CLI arguments.
///
/// If `--settings-json` is provided, the JSON is parsed directly and all
/// individual settings flags are ignored. Otherwise the selected profile
/// is adjusted by whichever flags were given.
fn settings_from_cli(cli: &Cli) -> Result<ProcessingSettings, String> {
    if let Some(ref json) = cli.settings_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --settings-json: {e}"));
    }

    let mut settings = match cli.profile {
        Profile::Creative => ProcessingSettings::creative(),
        Profile::ToneOnly => ProcessingSettings::tone_only(),
    };
    if let Some(algorithm) = cli.algorithm {
        settings.algorithm = match algorithm {
            Algorithm::None => DitherAlgorithm::None,
            Algorithm::FloydSteinberg => DitherAlgorithm::FloydSteinberg,
            Algorithm::Bayer => DitherAlgorithm::OrderedBayer8x8,
        };
    }
    if let Some(levels) = cli.levels {
        settings.color_depth = ColorDepth::Levels(levels);
    }
    if cli.grayscale {
        settings.color_mode = ColorMode::Grayscale;
    }
    if let Some(intensity) = cli.intensity {
        settings.dithering_intensity = intensity;
    }
    if let Some(brightness) = cli.brightness {
        settings.brightness = brightness;
    }
    if let Some(contrast) = cli.contrast {
        settings.contrast = contrast;
    }
    if let Some(resolution) = cli.resolution {
        settings.resolution = match resolution {
            Resolution::Original => ResolutionPreset::Original,
            Resolution::Half => ResolutionPreset::Half,
            Resolution::Quarter => ResolutionPreset::Quarter,
        };
    }
    Ok(settings)
}

/// The MIME type to decode with: `--mime` if recognized, else the
/// extension of the input path.
fn mime_from_cli(cli: &Cli) -> Result<&'static str, String> {
    let file_name = cli.image_path.file_name().and_then(|name| name.to_str());
    SourceFormat::resolve(cli.mime.as_deref().unwrap_or_default(), file_name)
        .map(SourceFormat::mime)
        .map_err(|e| format!("Error: {e}"))
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "grainline=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().without_time().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let settings = match settings_from_cli(&cli) {
        Ok(s) => s,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };
    let mime = match mime_from_cli(&cli) {
        Ok(mime) => mime,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let image_bytes = match std::fs::read(&cli.image_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.image_path.display());
            return ExitCode::FAILURE;
        }
    };

    eprintln!(
        "Image: {} ({} bytes, {mime})",
        cli.image_path.display(),
        image_bytes.len(),
    );
    eprintln!("Settings: {settings:#?}");
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let result = if cli.via_host {
        run_via_host(&cli, &image_bytes, mime, &settings)
    } else {
        run_in_process(&cli, &image_bytes, mime, &settings)
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{msg}");
            ExitCode::FAILURE
        }
    }
}

/// Run the pipeline directly, printing the diagnostics of every run.
fn run_in_process(
    cli: &Cli,
    image_bytes: &[u8],
    mime: &str,
    settings: &ProcessingSettings,
) -> Result<(), String> {
    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        let (surface, diagnostics) = grainline_pipeline::decode_and_process_with_diagnostics(
            image_bytes,
            mime,
            settings,
            &StdClock,
        )
        .map_err(|e| format!("Pipeline error: {e}"))?;

        if cli.json {
            let json = serde_json::to_string_pretty(&diagnostics)
                .map_err(|e| format!("Error serializing diagnostics: {e}"))?;
            println!("{json}");
        } else {
            println!("{}", diagnostics.report());
        }

        if run == 0 {
            write_output(cli, surface);
        }
        all_diagnostics.push(diagnostics);

        if cli.runs > 1 {
            eprintln!();
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }
    Ok(())
}

/// Decode on this thread and process on a host thread, timing the round
/// trip of each run.
fn run_via_host(
    cli: &Cli,
    image_bytes: &[u8],
    mime: &str,
    settings: &ProcessingSettings,
) -> Result<(), String> {
    let mut client: HostClient<Infallible> =
        HostClient::spawn(RasterBackend).map_err(|e| format!("Error spawning host thread: {e}"))?;
    client.init().map_err(|e| format!("Host error: {e}"))?;

    let mut round_trips = Vec::with_capacity(cli.runs);
    let outcome: Result<(), String> = (0..cli.runs).try_for_each(|run| {
        let start = StdClock.now();
        let surface = grainline_pipeline::decode(image_bytes, mime)
            .map_err(|e| format!("Decode error: {e}"))?;
        let decoded = StdClock.elapsed(&start);

        let sent = StdClock.now();
        client
            .process_surface(surface, Some(settings.clone()))
            .map_err(|e| format!("Host error: {e}"))?;
        let output = await_surface(&mut client)?;
        let round_trip = StdClock.elapsed(&sent);

        if cli.json {
            let json = serde_json::json!({
                "run": run + 1,
                "decodeMs": decoded.as_secs_f64() * 1000.0,
                "roundTripMs": round_trip.as_secs_f64() * 1000.0,
                "width": output.width(),
                "height": output.height(),
            });
            println!("{json}");
        } else {
            println!(
                "Run {}: decode {:.3}ms, host round trip {:.3}ms -> {}x{}",
                run + 1,
                decoded.as_secs_f64() * 1000.0,
                round_trip.as_secs_f64() * 1000.0,
                output.width(),
                output.height(),
            );
        }

        if run == 0 {
            write_output(cli, output);
        }
        round_trips.push(round_trip);
        Ok(())
    });
    client.terminate();
    outcome?;

    if cli.runs > 1 {
        print_round_trip_summary(&round_trips);
    }
    Ok(())
}

/// Wait for the result of the request just sent, skipping the `READY`
/// acknowledgement.
fn await_surface(client: &mut HostClient<Infallible>) -> Result<PixelSurface, String> {
    loop {
        match client.recv_timeout(HOST_TIMEOUT) {
            Ok(Some(Response::ProcessComplete { output, .. })) => {
                return match output {
                    Output::Pixels(surface) => Ok(surface),
                    Output::Handle(never) => match never {},
                };
            }
            Ok(Some(Response::Error { kind, message, .. })) => {
                return Err(format!("Host error ({kind}): {message}"));
            }
            Ok(Some(_)) => {}
            Ok(None) => return Err(format!("Host did not answer within {HOST_TIMEOUT:?}")),
            Err(e) => return Err(format!("Host error: {e}")),
        }
    }
}

/// Write the output PNG if `--output` was given. Failures are reported
/// but do not fail the run.
fn write_output(cli: &Cli, surface: PixelSurface) {
    let Some(ref path) = cli.output else {
        return;
    };
    let (width, height) = (surface.width(), surface.height());
    match surface.into_image().save_with_format(path, image::ImageFormat::Png) {
        Ok(()) => eprintln!("Output written to {} ({width}x{height})", path.display()),
        Err(e) => eprintln!("Error writing output to {}: {e}", path.display()),
    }
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Function pointer type for extracting a stage duration from diagnostics.
type StageExtractor = fn(&PipelineDiagnostics) -> Option<Duration>;

/// Min, mean and max of a set of durations, in milliseconds.
#[allow(clippy::cast_precision_loss)]
fn stats_ms(durations: impl Iterator<Item = Duration>) -> Option<(f64, f64, f64)> {
    let ms: Vec<f64> = durations.map(|d| d.as_secs_f64() * 1000.0).collect();
    let min = ms.iter().copied().reduce(f64::min)?;
    let max = ms.iter().copied().reduce(f64::max)?;
    let mean = ms.iter().sum::<f64>() / ms.len() as f64;
    Some((min, mean, max))
}

/// Print aggregated statistics across multiple runs.
fn print_multi_run_summary(all_diagnostics: &[PipelineDiagnostics]) {
    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    let Some((min, mean, max)) = stats_ms(all_diagnostics.iter().map(|d| d.total_duration)) else {
        println!("Warning: no diagnostics to summarize");
        return;
    };
    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    println!();
    println!("{:<24} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(40));

    let stage_extractors: &[(&str, StageExtractor)] = &[
        ("Decode", |d| d.decode.as_ref().map(|s| s.duration)),
        ("Scale", |d| Some(d.scale.duration)),
        ("Tone", |d| d.tone.as_ref().map(|s| s.duration)),
        ("Dither", |d| Some(d.dither.duration)),
    ];

    for (name, extractor) in stage_extractors {
        if let Some((_, stage_mean, _)) = stats_ms(all_diagnostics.iter().filter_map(extractor)) {
            println!("{name:<24} {stage_mean:>10.3}ms");
        }
    }
}

/// Print aggregated host round trips across multiple runs.
fn print_round_trip_summary(round_trips: &[Duration]) {
    println!();
    println!("Summary ({} runs)\n{}", round_trips.len(), "=".repeat(60));
    if let Some((min, mean, max)) = stats_ms(round_trips.iter().copied()) {
        println!("Host round trip: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("grainline-bench").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn flags_adjust_the_selected_profile() {
        let cli = parse(&[
            "photo.jpg",
            "--profile",
            "tone-only",
            "--brightness",
            "-20",
            "--resolution",
            "half",
        ]);
        let settings = settings_from_cli(&cli).unwrap();
        assert_eq!(settings.algorithm, DitherAlgorithm::None);
        assert_eq!(settings.color_depth, ColorDepth::Levels(256));
        assert_eq!(settings.brightness, -20);
        assert_eq!(settings.resolution, ResolutionPreset::Half);
    }

    #[test]
    fn settings_json_overrides_flags() {
        let cli = parse(&[
            "photo.png",
            "--algorithm",
            "bayer",
            "--settings-json",
            r#"{"algorithm":"floyd-steinberg","colorDepth":2}"#,
        ]);
        let settings = settings_from_cli(&cli).unwrap();
        assert_eq!(settings.algorithm, DitherAlgorithm::FloydSteinberg);
        assert_eq!(settings.color_depth, ColorDepth::Levels(2));
    }

    #[test]
    fn mime_falls_back_to_extension() {
        assert_eq!(mime_from_cli(&parse(&["scan.JPG"])).unwrap(), "image/jpeg");
        assert_eq!(
            mime_from_cli(&parse(&["scan.bin", "--mime", "image/png"])).unwrap(),
            "image/png"
        );
        assert!(mime_from_cli(&parse(&["notes.txt"])).is_err());
    }

    #[test]
    fn levels_below_two_are_rejected() {
        assert!(Cli::try_parse_from(["grainline-bench", "a.png", "--levels", "1"]).is_err());
    }
}
