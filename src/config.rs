//! Command-line configuration for the `wsi-reader` binary.
//!
//! This module provides:
//! - Command-line arguments via clap
//! - Environment variables with `WSI_` prefix for the shared reader options
//! - Defaults matching the library's [`SlideOptions`]
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use wsi_reader::config::{Cli, Command};
//!
//! let cli = Cli::parse();
//! match cli.command {
//!     Command::Info(config) => println!("{}", config.path.display()),
//!     Command::Read(config) => println!("{} x {}", config.rows, config.cols),
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `WSI_CACHE_CAPACITY` - Decoded tile cache size in bytes (default: 256 MiB)
//! - `WSI_FILL_VALUE` - Value for pixels outside the image (default: 0)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::slide::SlideOptions;
use crate::tile::{AxisSlice, DEFAULT_TILE_CACHE_CAPACITY};

// =============================================================================
// CLI Structure
// =============================================================================

/// WSI Reader - random access to pyramidal Whole Slide Images.
///
/// Reads strided regions of tiled TIFF, Aperio SVS and JPEG 2000 slides,
/// decoding only the tiles a region touches.
#[derive(Parser, Debug, Clone)]
#[command(name = "wsi-reader")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print format, shape, scales and level geometry of a slide.
    Info(InfoConfig),

    /// Read a strided region and write it to a file.
    ///
    /// Slices use Python syntax over level-0 pixels: START:STOP[:STEP].
    /// Positions outside the image are filled.
    Read(ReadConfig),
}

// =============================================================================
// Shared Options
// =============================================================================

/// Options shared by every subcommand that opens a slide.
#[derive(Args, Debug, Clone)]
pub struct ReaderConfig {
    /// Decoded tile cache capacity in bytes.
    #[arg(long, default_value_t = DEFAULT_TILE_CACHE_CAPACITY, env = "WSI_CACHE_CAPACITY")]
    pub cache_capacity: usize,

    /// Value written for output pixels outside the image.
    #[arg(long, default_value_t = 0.0, env = "WSI_FILL_VALUE", allow_hyphen_values = true)]
    pub fill_value: f64,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl ReaderConfig {
    /// Validate the options and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.cache_capacity == 0 {
            return Err("cache_capacity must be greater than 0".to_string());
        }
        if !self.fill_value.is_finite() {
            return Err(format!(
                "fill_value must be a finite number, got {}",
                self.fill_value
            ));
        }
        Ok(())
    }

    pub fn slide_options(&self) -> SlideOptions {
        SlideOptions {
            cache_capacity: self.cache_capacity,
            fill_value: self.fill_value,
        }
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_TILE_CACHE_CAPACITY,
            fill_value: 0.0,
            verbose: false,
        }
    }
}

// =============================================================================
// Subcommand Options
// =============================================================================

/// Arguments of `wsi-reader info`.
#[derive(Args, Debug, Clone)]
pub struct InfoConfig {
    /// Path of the slide file.
    pub path: PathBuf,

    /// Print JSON instead of text.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    #[command(flatten)]
    pub reader: ReaderConfig,
}

/// Arguments of `wsi-reader read`.
#[derive(Args, Debug, Clone)]
pub struct ReadConfig {
    /// Path of the slide file.
    pub path: PathBuf,

    /// Row slice, START:STOP[:STEP].
    #[arg(long, default_value = "::", allow_hyphen_values = true)]
    pub rows: AxisSlice,

    /// Column slice, START:STOP[:STEP].
    #[arg(long, default_value = "::", allow_hyphen_values = true)]
    pub cols: AxisSlice,

    /// Output file. `.png` writes an image, anything else raw samples.
    #[arg(short, long)]
    pub output: PathBuf,

    #[command(flatten)]
    pub reader: ReaderConfig,
}

impl ReadConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.reader.validate()?;
        if self.rows.step == 0 || self.cols.step == 0 {
            return Err("slice step must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Whether the output extension asks for a PNG image.
    pub fn wants_png(&self) -> bool {
        self.output
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("png"))
            .unwrap_or(false)
    }
}

// =============================================================================
// Tests
// =============================================================================
