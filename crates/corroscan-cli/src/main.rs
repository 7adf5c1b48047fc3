//! corroscan: estimate the rusted fraction of a photographed metal surface.
//!
//! Runs the analysis pipeline on an image file, prints the rust ratio
//! and per-stage diagnostics, and optionally writes the overlay image.
//! Useful for:
//!
//! - Tuning HSV windows for a particular camera or lighting setup
//! - Comparing kernel sizes and border policies
//! - Measuring per-stage durations on large photographs
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin corroscan -- [OPTIONS] <IMAGE_PATH>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use corroscan_pipeline::diagnostics::{
    Clock, PipelineDiagnostics, process_staged_with_diagnostics,
};
use corroscan_pipeline::{
    AreaMetric, BorderPolicy, ChannelRange, LabelStyle, MorphologyConfig, OverlayConfig,
    PipelineConfig,
};
use serde::Serialize;

/// Rust-area estimation by HSV thresholding.
///
/// Classifies each pixel of the input image as rust or not, cleans the
/// result with a morphological opening and closing, and reports the rust
/// pixels as a percentage of the whole image.
#[derive(Parser)]
#[command(name = "corroscan", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// Lowest rust hue (0-179).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_HUE_MIN)]
    hue_min: u8,

    /// Highest rust hue (0-179).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_HUE_MAX)]
    hue_max: u8,

    /// Lowest rust saturation.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_SATURATION_MIN)]
    saturation_min: u8,

    /// Highest rust saturation.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_SATURATION_MAX)]
    saturation_max: u8,

    /// Lowest rust value (brightness).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_VALUE_MIN)]
    value_min: u8,

    /// Highest rust value (brightness).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_VALUE_MAX)]
    value_max: u8,

    /// Rust window as `H0-H1,S0-S1,V0-V1`; repeat for several windows.
    ///
    /// Overrides the single-range flags above.
    #[arg(long = "range", value_name = "H0-H1,S0-S1,V0-V1", value_parser = parse_range)]
    ranges: Vec<ChannelRange>,

    /// Use the two-window red preset (H 0-20 and H 170-179).
    #[arg(long, conflicts_with = "ranges")]
    split_red: bool,

    /// Side of the square morphology neighborhood (odd).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_KERNEL_SIZE)]
    kernel_size: u32,

    /// Skip the opening/closing cleanup.
    #[arg(long)]
    no_morphology: bool,

    /// How morphology treats pixels outside the image.
    #[arg(long, value_enum, default_value_t = Border::Background)]
    border: Border,

    /// Write the overlay image (PNG) to this path.
    #[arg(long)]
    overlay: Option<PathBuf>,

    /// Burn the ratio label into the overlay's top-left corner.
    #[arg(long)]
    label: bool,

    /// Label size in output pixels per font unit (with `--label`).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_LABEL_SCALE)]
    label_scale: f32,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, all other pipeline parameter flags are ignored.
    /// The JSON must be a valid `PipelineConfig` serialization.
    #[arg(long)]
    config_json: Option<String>,
}

/// Morphology border policy selection.
#[derive(Clone, Copy, ValueEnum)]
enum Border {
    /// Out-of-bounds neighbors count as background.
    Background,
    /// Out-of-bounds neighbors are skipped.
    Ignore,
}

/// Parse `H0-H1,S0-S1,V0-V1` into a [`ChannelRange`].
///
/// Bounds are only checked for syntax here; the pipeline validates
/// ordering and the hue limit before processing.
fn parse_range(s: &str) -> Result<ChannelRange, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [hue, saturation, value] = parts.as_slice() else {
        return Err(format!(
            "expected three comma-separated windows H0-H1,S0-S1,V0-V1, got {s:?}"
        ));
    };
    Ok(ChannelRange::new(
        parse_window("hue", hue)?,
        parse_window("saturation", saturation)?,
        parse_window("value", value)?,
    ))
}

fn parse_window(channel: &str, s: &str) -> Result<(u8, u8), String> {
    let (lo, hi) = s
        .split_once('-')
        .ok_or_else(|| format!("{channel} window must look like MIN-MAX, got {s:?}"))?;
    let bound = |b: &str| {
        b.trim()
            .parse::<u8>()
            .map_err(|e| format!("{channel} bound {b:?}: {e}"))
    };
    Ok((bound(lo)?, bound(hi)?))
}

/// Build a [`PipelineConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored.  Otherwise, a config is
/// assembled from the individual flags.
fn config_from_cli(cli: &Cli) -> Result<PipelineConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    let ranges = if !cli.ranges.is_empty() {
        cli.ranges.clone()
    } else if cli.split_red {
        PipelineConfig::split_red().ranges
    } else {
        vec![ChannelRange::new(
            (cli.hue_min, cli.hue_max),
            (cli.saturation_min, cli.saturation_max),
            (cli.value_min, cli.value_max),
        )]
    };

    let morphology = (!cli.no_morphology).then_some(MorphologyConfig {
        kernel_size: cli.kernel_size,
        border: match cli.border {
            Border::Background => BorderPolicy::Background,
            Border::Ignore => BorderPolicy::Ignore,
        },
    });

    let label = cli.label.then_some(LabelStyle {
        scale: cli.label_scale,
        ..LabelStyle::default()
    });

    Ok(PipelineConfig {
        ranges,
        morphology,
        overlay: OverlayConfig {
            label,
            ..OverlayConfig::default()
        },
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
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
        "Image: {} ({} bytes)",
        cli.image_path.display(),
        image_bytes.len(),
    );
    for range in &config.ranges {
        eprintln!("Range: {range}");
    }
    match &config.morphology {
        Some(m) => eprintln!("Morphology: kernel {} ({} border)", m.kernel_size, m.border),
        None => eprintln!("Morphology: disabled"),
    }
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let mut records = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        let (staged, diagnostics) =
            match process_staged_with_diagnostics(&image_bytes, &config, &StdClock) {
                Ok(result) => result,
                Err(e) => {
                    eprintln!("Pipeline error: {e}");
                    return ExitCode::FAILURE;
                }
            };

        if !cli.json {
            println!("{}", diagnostics.report());
            println!();
            println!(
                "Rust: {} ({}/{} px)",
                staged.metric.ratio_label(),
                staged.metric.rust_pixel_count,
                staged.metric.total_pixel_count,
            );
        }

        // Write the overlay on the first run only.
        if run == 0
            && let Some(ref overlay_path) = cli.overlay
        {
            if let Err(e) = staged
                .overlay
                .save_with_format(overlay_path, image::ImageFormat::Png)
            {
                eprintln!("Error writing overlay to {}: {e}", overlay_path.display());
                return ExitCode::FAILURE;
            }
            eprintln!("Overlay written to {}", overlay_path.display());
        }

        records.push(RunRecord {
            metric: staged.metric,
            diagnostics,
        });

        if cli.runs > 1 && !cli.json {
            println!();
        }
    }

    let summary = RunSummary::of(&records);

    if cli.json {
        // One document on stdout, whatever the run count.
        let rendered = if let [single] = records.as_slice() {
            serde_json::to_string_pretty(single)
        } else {
            serde_json::to_string_pretty(&MultiRunOutput {
                runs: &records,
                summary: summary.as_ref(),
            })
        };
        match rendered {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error serializing diagnostics: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else if let Some(summary) = summary.filter(|s| s.runs > 1) {
        println!("{}", summary.report());
    }

    ExitCode::SUCCESS
}

/// Outcome of one pipeline run.
#[derive(Serialize)]
struct RunRecord {
    metric: AreaMetric,
    diagnostics: PipelineDiagnostics,
}

/// JSON document for `--json --runs N` with `N > 1`.
#[derive(Serialize)]
struct MultiRunOutput<'a> {
    runs: &'a [RunRecord],
    summary: Option<&'a RunSummary>,
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

/// Minimum, mean and maximum of a series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
struct Spread {
    min: f64,
    mean: f64,
    max: f64,
}

impl Spread {
    #[allow(clippy::cast_precision_loss)]
    fn of(values: &[f64]) -> Option<Self> {
        let min = values.iter().copied().reduce(f64::min)?;
        let max = values.iter().copied().reduce(f64::max)?;
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        Some(Self { min, mean, max })
    }

    /// `max - min`.
    fn range(&self) -> f64 {
        self.max - self.min
    }
}

/// Mean duration of one stage across runs.
#[derive(Debug, Serialize)]
struct StageMean {
    stage: &'static str,
    mean_ms: f64,
}

/// Timing and ratio stability across repeated runs on one image.
#[derive(Debug, Serialize)]
struct RunSummary {
    runs: usize,
    total_ms: Spread,
    stages: Vec<StageMean>,
    ratio_percent: Spread,
    /// Whether every run found the same rust pixels.
    stable: bool,
}

impl RunSummary {
    /// Aggregate `records`, or `None` if there are none.
    fn of(records: &[RunRecord]) -> Option<Self> {
        let ms = |d: Duration| d.as_secs_f64() * 1000.0;
        let totals: Vec<f64> = records.iter().map(|r| ms(r.diagnostics.total_duration)).collect();
        let ratios: Vec<f64> = records.iter().map(|r| r.metric.ratio_percent).collect();

        let stage_extractors: &[(&'static str, StageExtractor)] = &[
            ("decode", |d| Some(d.decode.duration)),
            ("convert", |d| Some(d.convert.duration)),
            ("threshold", |d| Some(d.threshold.duration)),
            ("combine", |d| Some(d.combine.duration)),
            ("filter", |d| d.filter.as_ref().map(|s| s.duration)),
            ("measure", |d| Some(d.measure.duration)),
            ("render", |d| Some(d.render.duration)),
        ];
        let stages = stage_extractors
            .iter()
            .filter_map(|&(stage, extract)| {
                let durations: Vec<f64> = records
                    .iter()
                    .filter_map(|r| extract(&r.diagnostics))
                    .map(ms)
                    .collect();
                Spread::of(&durations).map(|spread| StageMean {
                    stage,
                    mean_ms: spread.mean,
                })
            })
            .collect();

        let first = records.first()?;
        Some(Self {
            runs: records.len(),
            total_ms: Spread::of(&totals)?,
            stages,
            ratio_percent: Spread::of(&ratios)?,
            stable: records
                .iter()
                .all(|r| r.metric.rust_pixel_count == first.metric.rust_pixel_count),
        })
    }

    fn report(&self) -> String {
        let mut lines = vec![format!("Summary ({} runs)\n{}", self.runs, "=".repeat(60))];
        let Spread { min, mean, max } = self.total_ms;
        lines.push(format!(
            "Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms"
        ));
        lines.push(String::new());
        lines.push(format!("{:<24} {:>12}", "Stage", "Mean (ms)"));
        lines.push("-".repeat(40));
        for StageMean { stage, mean_ms } in &self.stages {
            lines.push(format!("{stage:<24} {mean_ms:>10.3}ms"));
        }
        lines.push(String::new());
        if self.stable {
            lines.push(format!(
                "Rust ratio: {:.2}% on every run",
                self.ratio_percent.mean
            ));
        } else {
            lines.push(format!(
                "Rust ratio varied: min={:.2}%  max={:.2}%  spread={:.2} points",
                self.ratio_percent.min,
                self.ratio_percent.max,
                self.ratio_percent.range(),
            ));
        }
        lines.join("\n")
    }
}
