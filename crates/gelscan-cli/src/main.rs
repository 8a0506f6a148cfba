//! gelscan: extract lane density profiles from an electrophoresis gel image.
//!
//! Loads an image, applies the preprocessing settings given on the command
//! line and prints the image parameters and per-lane histograms. By default
//! the edits go through the background worker exactly as an interactive
//! front end would send them; `--direct` runs the transforms in-process
//! without the worker.
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin gelscan -- [OPTIONS] <IMAGE_PATH>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::mpsc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use gelscan_pipeline::{
    ChannelSelection, GelImage, ImageParameters, LaneBorder, LaneHistogram, NoiseFilter,
    PreprocessingSettings, Rotation,
};
use gelscan_worker::{Edit, Host, ImageHandle, OutputKind, Publication, WorkerConfig};
use tracing_subscriber::EnvFilter;

/// How long to wait for the worker before giving up.
const WORKER_TIMEOUT: Duration = Duration::from_secs(120);

/// Lane density profiles from electrophoresis gel images.
#[derive(Parser)]
#[command(name = "gelscan", version)]
struct Cli {
    /// Path to the gel image (PNG, JPEG, TIFF, BMP, WebP).
    image_path: PathBuf,

    /// Clockwise rotation in degrees (0, 90, 180 or 270).
    #[arg(long, default_value_t = 0)]
    rotation: u16,

    /// Invert sample values (dark bands on a light background).
    #[arg(long)]
    invert: bool,

    /// Stretch values surviving the threshold to the full range.
    #[arg(long)]
    normalize: bool,

    /// Threshold as a fraction of the maximum sample value (0.0-1.0).
    #[arg(long, default_value_t = 0.0)]
    threshold: f64,

    /// Channels used for the preview and histograms (comma separated).
    #[arg(long, value_enum, value_delimiter = ',', default_values_t = [Channel::Red, Channel::Green, Channel::Blue])]
    channels: Vec<Channel>,

    /// Apply a median noise filter.
    #[arg(long)]
    median: bool,

    /// Place this many evenly spaced lanes across the processed image.
    #[arg(long, conflicts_with = "lane")]
    lanes: Option<usize>,

    /// Fraction of the width covered by evenly spaced lanes.
    #[arg(long, default_value_t = gelscan_pipeline::lanes::DEFAULT_COVERAGE)]
    coverage: f64,

    /// Explicit lane as START:END columns of the processed image
    /// (repeatable).
    #[arg(long, value_parser = parse_lane)]
    lane: Vec<LaneBorder>,

    /// Full preprocessing settings as a JSON string.
    ///
    /// When provided, all other preprocessing flags are ignored.
    #[arg(long)]
    settings_json: Option<String>,

    /// Worker configuration as a JSON string.
    #[arg(long)]
    worker_config_json: Option<String>,

    /// Write the grey preview and channel images as PNGs into this
    /// directory.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Output parameters and histograms as JSON instead of a report.
    #[arg(long)]
    json: bool,

    /// Run the transforms in-process instead of through the worker.
    #[arg(long)]
    direct: bool,

    /// Log worker activity at debug level (`RUST_LOG` overrides).
    #[arg(short, long)]
    verbose: bool,
}

/// A color channel of a three-channel image.
#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Channel {
    Red,
    Green,
    Blue,
}

impl Channel {
    const ALL: [Self; 3] = [Self::Red, Self::Green, Self::Blue];

    const fn name(self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Green => "green",
            Self::Blue => "blue",
        }
    }
}

/// Parse a `START:END` lane argument.
fn parse_lane(arg: &str) -> Result<LaneBorder, String> {
    let (start, end) = arg
        .split_once(':')
        .ok_or_else(|| format!("expected START:END, got {arg:?}"))?;
    let start: u32 = start
        .trim()
        .parse()
        .map_err(|e| format!("invalid lane start {start:?}: {e}"))?;
    let end: u32 = end
        .trim()
        .parse()
        .map_err(|e| format!("invalid lane end {end:?}: {e}"))?;
    LaneBorder::new(start, end).map_err(|e| e.to_string())
}

/// Build [`PreprocessingSettings`] from CLI arguments.
///
/// If `--settings-json` is provided, the JSON is parsed directly and all
/// individual preprocessing flags are ignored.
fn settings_from_cli(cli: &Cli) -> Result<PreprocessingSettings, String> {
    if let Some(ref json) = cli.settings_json {
        return serde_json::from_str(json)
            .map_err(|e| format!("Error parsing --settings-json: {e}"));
    }

    let rotation = Rotation::from_degrees(cli.rotation).map_err(|e| e.to_string())?;
    let selected = Channel::ALL.map(|c| cli.channels.contains(&c));
    Ok(PreprocessingSettings {
        selected_channels: ChannelSelection::new(selected.to_vec()),
        rotation,
        inversion: cli.invert,
        normalization: cli.normalize,
        threshold: cli.threshold,
        noise_filters: if cli.median {
            vec![NoiseFilter::Median]
        } else {
            Vec::new()
        },
    })
}

fn worker_config_from_cli(cli: &Cli) -> Result<WorkerConfig, String> {
    cli.worker_config_json.as_ref().map_or_else(
        || Ok(WorkerConfig::default()),
        |json| {
            serde_json::from_str(json).map_err(|e| format!("Error parsing --worker-config-json: {e}"))
        },
    )
}

/// Lane borders for an image `width` columns wide after rotation.
fn lanes_for_width(cli: &Cli, width: u32) -> Result<Vec<LaneBorder>, String> {
    let lanes = match cli.lanes {
        Some(count) => gelscan_pipeline::default_lane_borders(width, count, cli.coverage)
            .map_err(|e| format!("Cannot place {count} lanes: {e}"))?,
        None => cli.lane.clone(),
    };
    if let Some(lane) = lanes.iter().find(|lane| !lane.fits_within(width)) {
        return Err(format!(
            "Lane [{}, {}) lies outside the processed image ({width} columns)",
            lane.start(),
            lane.end(),
        ));
    }
    Ok(lanes)
}

/// Everything printed or written for one image.
struct Report {
    parameters: ImageParameters,
    lanes: Vec<LaneBorder>,
    histograms: Vec<LaneHistogram>,
    preview_png: Vec<u8>,
    channel_pngs: Option<[Vec<u8>; 3]>,
}

/// Run the transforms in-process.
fn run_direct(
    cli: &Cli,
    bytes: &[u8],
    settings: &PreprocessingSettings,
) -> Result<Report, String> {
    let source = gelscan_pipeline::decode(bytes).map_err(|e| format!("Error decoding image: {e}"))?;
    let parameters = gelscan_pipeline::image_parameters(&source);
    let lanes = lanes_for_width(cli, settings.rotation.rotated(parameters.size).width)?;

    let outputs = gelscan_pipeline::process(&source, settings, &lanes)
        .map_err(|e| format!("Pipeline error: {e}"))?;
    let encode = |image: &GelImage| {
        gelscan_pipeline::encode_png(image).map_err(|e| format!("Error encoding PNG: {e}"))
    };
    let channel_pngs = match &outputs.channels {
        Some([red, green, blue]) => Some([encode(red)?, encode(green)?, encode(blue)?]),
        None => None,
    };

    Ok(Report {
        parameters,
        lanes,
        histograms: outputs.histograms.unwrap_or_default(),
        preview_png: encode(&outputs.preview)?,
        channel_pngs,
    })
}

/// Send the edits through the background worker and collect what it
/// publishes.
fn run_worker(
    cli: &Cli,
    bytes: Vec<u8>,
    settings: PreprocessingSettings,
    config: WorkerConfig,
) -> Result<Report, String> {
    let host = Host::spawn(config).map_err(|e| format!("Error starting worker: {e}"))?;
    let (tx, rx) = mpsc::channel();
    for kind in [
        OutputKind::ImageParameters,
        OutputKind::ProcessedImage,
        OutputKind::ProcessedChannels,
        OutputKind::ProcessedLanes,
        OutputKind::Rejected,
    ] {
        let tx = tx.clone();
        host.subscribe(kind, move |envelope| {
            let _ = tx.send(envelope.publication.clone());
        });
    }

    let submit = |edit: Edit| host.submit(edit, None).map_err(|e| e.to_string());
    let receive = || -> Result<Publication, String> {
        match rx.recv_timeout(WORKER_TIMEOUT) {
            Ok(Publication::Rejected(rejection)) => Err(format!(
                "Worker rejected {} edit: {}",
                rejection.edit, rejection.message
            )),
            Ok(publication) => Ok(publication),
            Err(e) => Err(format!("No answer from worker: {e}")),
        }
    };

    submit(Edit::OriginalImage(bytes))?;
    let Publication::ImageParameters(parameters) = receive()? else {
        return Err("Worker published results before image parameters".to_owned());
    };
    let lanes = lanes_for_width(cli, settings.rotation.rotated(parameters.size).width)?;
    submit(Edit::LaneChange(lanes.clone()))?;
    submit(Edit::SettingsChange(settings))?;

    let resolve = |handle: &ImageHandle| {
        host.resolve(handle)
            .map(|png| png.to_vec())
            .ok_or_else(|| format!("Image handle {handle} is no longer live"))
    };
    let mut preview_png = Vec::new();
    let mut channel_pngs = None;
    let histograms = loop {
        match receive()? {
            Publication::ProcessedImage(handle) => preview_png = resolve(&handle)?,
            Publication::ProcessedChannels([red, green, blue]) => {
                channel_pngs = Some([resolve(&red)?, resolve(&green)?, resolve(&blue)?]);
            }
            Publication::ProcessedLanes(histograms) => break histograms,
            other => tracing::debug!(kind = ?other.kind(), "ignoring publication"),
        }
    };

    host.shutdown().map_err(|e| e.to_string())?;
    Ok(Report {
        parameters,
        lanes,
        histograms,
        preview_png,
        channel_pngs,
    })
}

fn write_images(dir: &Path, report: &Report) -> Result<(), String> {
    std::fs::create_dir_all(dir).map_err(|e| format!("Error creating {}: {e}", dir.display()))?;
    let mut files = vec![("preview.png".to_owned(), &report.preview_png)];
    if let Some(ref pngs) = report.channel_pngs {
        for (channel, png) in Channel::ALL.iter().zip(pngs) {
            files.push((format!("channel-{}.png", channel.name()), png));
        }
    }
    for (name, png) in files {
        let path = dir.join(name);
        std::fs::write(&path, png)
            .map_err(|e| format!("Error writing {}: {e}", path.display()))?;
        eprintln!("Wrote {} ({} bytes)", path.display(), png.len());
    }
    Ok(())
}

/// Row with the highest value in column `k`, and the column total.
fn column_summary(histogram: &LaneHistogram, k: usize) -> (usize, f64) {
    let mut peak = (0, f64::NEG_INFINITY);
    let mut total = 0.0;
    for (y, row) in histogram.rows().iter().enumerate() {
        total += row[k];
        if row[k] > peak.1 {
            peak = (y, row[k]);
        }
    }
    (peak.0, total)
}

fn print_report(report: &Report) {
    let p = &report.parameters;
    println!(
        "Image: {}x{}, {} channel(s), {}-bit{}",
        p.size.width,
        p.size.height,
        p.channel_count,
        p.bit_depth.bits(),
        if p.has_alpha { ", alpha" } else { "" },
    );
    println!();

    if report.histograms.is_empty() {
        println!("No lanes.");
        return;
    }

    println!("{:<6} {:>14} {:>8} {:>10} {:>12}", "Lane", "Columns", "Channel", "Peak row", "Density");
    println!("{}", "-".repeat(54));
    for (i, (lane, histogram)) in report.lanes.iter().zip(&report.histograms).enumerate() {
        let columns = format!("[{}, {})", lane.start(), lane.end());
        for k in 0..histogram.channel_count() {
            let (peak, total) = column_summary(histogram, k);
            println!("{:<6} {columns:>14} {k:>8} {peak:>10} {total:>12.4}", i + 1);
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<(), String> {
    let settings = settings_from_cli(cli)?;
    let config = worker_config_from_cli(cli)?;
    let bytes = std::fs::read(&cli.image_path)
        .map_err(|e| format!("Error reading {}: {e}", cli.image_path.display()))?;
    eprintln!("Image: {} ({} bytes)", cli.image_path.display(), bytes.len());

    let report = if cli.direct {
        run_direct(cli, &bytes, &settings)?
    } else {
        run_worker(cli, bytes, settings, config)?
    };

    if let Some(ref dir) = cli.output {
        write_images(dir, &report)?;
    }

    if cli.json {
        let json = serde_json::json!({
            "parameters": report.parameters,
            "lanes": report.lanes,
            "histograms": report.histograms,
        });
        let text = serde_json::to_string_pretty(&json)
            .map_err(|e| format!("Error serializing report: {e}"))?;
        println!("{text}");
    } else {
        print_report(&report);
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{msg}");
            ExitCode::FAILURE
        }
    }
}
