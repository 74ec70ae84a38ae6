//! WSI Reader - command-line access to pyramidal Whole Slide Images.
//!
//! `info` prints slide metadata, `read` runs one strided read and writes the
//! result to disk.

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wsi_reader::{
    config::{Cli, Command, InfoConfig, ReadConfig},
    PixelBuffer, ResolutionLevel, SampleType, Slide,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Command::Info(config) => run_info(config).await,
        Command::Read(config) => run_read(config).await,
    }
}

// =============================================================================
// Info Command
// =============================================================================

#[derive(Serialize)]
struct SlideSummary<'a> {
    path: String,
    format: &'a str,
    shape: (usize, usize, usize),
    sample_type: &'a str,
    scales: Vec<u32>,
    levels: &'a [ResolutionLevel],
}

async fn run_info(config: InfoConfig) -> ExitCode {
    init_logging(config.reader.verbose);

    if let Err(e) = config.reader.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let slide = match Slide::open_with(&config.path, config.reader.slide_options()).await {
        Ok(slide) => slide,
        Err(e) => {
            error!("Failed to open {}: {}", config.path.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let summary = SlideSummary {
        path: config.path.display().to_string(),
        format: slide.format().name(),
        shape: slide.shape(),
        sample_type: slide.sample_type().name(),
        scales: slide.scales(),
        levels: slide.levels(),
    };

    if config.json {
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Failed to serialize metadata: {}", e);
                slide.close().await;
                return ExitCode::FAILURE;
            }
        }
    } else {
        print_summary(&summary);
    }

    slide.close().await;
    ExitCode::SUCCESS
}

fn print_summary(summary: &SlideSummary<'_>) {
    let (height, width, channels) = summary.shape;
    println!("{}", summary.path);
    println!("  Format:   {}", summary.format);
    println!(
        "  Shape:    {} x {} x {} ({})",
        height, width, channels, summary.sample_type
    );
    println!("  Scales:   {:?}", summary.scales);
    println!();
    println!("  Level  Downsample        Size         Tile     Grid");
    println!("  ─────  ──────────  ─────────────  ─────────  ───────");
    for (index, level) in summary.levels.iter().enumerate() {
        println!(
            "  {:>5}  {:>10}  {:>13}  {:>9}  {:>7}",
            index,
            level.downsample,
            format!("{}x{}", level.width, level.height),
            format!("{}x{}", level.tile_width, level.tile_height),
            format!("{}x{}", level.tiles_x(), level.tiles_y()),
        );
    }
}

// =============================================================================
// Read Command
// =============================================================================

async fn run_read(config: ReadConfig) -> ExitCode {
    init_logging(config.reader.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let slide = match Slide::open_with(&config.path, config.reader.slide_options()).await {
        Ok(slide) => slide,
        Err(e) => {
            error!("Failed to open {}: {}", config.path.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let result = slide.read(config.rows, config.cols).await;
    let stats = slide.cache().stats().await;
    slide.close().await;

    let buffer = match result {
        Ok(buffer) => buffer,
        Err(e) => {
            error!("Read failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!(
        rows = %config.rows,
        cols = %config.cols,
        height = buffer.height,
        width = buffer.width,
        decodes = stats.decodes,
        "read complete"
    );

    let written = if config.wants_png() {
        write_png(&config.output, &buffer)
    } else {
        tokio::fs::write(&config.output, buffer.as_bytes())
            .await
            .map_err(|e| e.to_string())
    };

    if let Err(e) = written {
        error!("Failed to write {}: {}", config.output.display(), e);
        return ExitCode::FAILURE;
    }

    println!(
        "{}: {} x {} x {} {}",
        config.output.display(),
        buffer.height,
        buffer.width,
        buffer.channels,
        buffer.sample_type.name()
    );
    ExitCode::SUCCESS
}

/// Encode `buffer` as PNG. Only 8 and 16-bit gray, RGB and RGBA map to PNG.
fn write_png(path: &Path, buffer: &PixelBuffer) -> Result<(), String> {
    use image::ColorType;

    let color = match (buffer.sample_type, buffer.channels) {
        (SampleType::U8, 1) => ColorType::L8,
        (SampleType::U8, 3) => ColorType::Rgb8,
        (SampleType::U8, 4) => ColorType::Rgba8,
        (SampleType::U16, 1) => ColorType::L16,
        (SampleType::U16, 3) => ColorType::Rgb16,
        (SampleType::U16, 4) => ColorType::Rgba16,
        (sample_type, channels) => {
            return Err(format!(
                "cannot write {} channel {} pixels as PNG; use a raw output file",
                channels,
                sample_type.name()
            ))
        }
    };

    let width = u32::try_from(buffer.width).map_err(|e| e.to_string())?;
    let height = u32::try_from(buffer.height).map_err(|e| e.to_string())?;

    image::save_buffer_with_format(
        path,
        buffer.as_bytes(),
        width,
        height,
        color,
        image::ImageFormat::Png,
    )
    .map_err(|e| e.to_string())
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "wsi_reader=debug"
    } else {
        "wsi_reader=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
