//! Backend trait for format-agnostic tile access.
//!
//! A backend owns everything format-specific about one open file: where the
//! tiles live, how they are compressed and how to turn them into pixels. The
//! rest of the crate sees a list of [`ResolutionLevel`]s and a way to decode
//! one tile at a time.
//!
//! Implementations:
//! - [`crate::format::TiffBackend`] for Aperio SVS and generic tiled TIFF
//! - [`crate::format::Jp2Backend`] for JP2 files and bare codestreams

use async_trait::async_trait;
use serde::Serialize;

use crate::error::SlideError;
use crate::format::FormatKind;
use crate::tile::{PixelBuffer, SampleType};

// =============================================================================
// Resolution Level
// =============================================================================

/// Geometry of one pyramid level as seen by the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolutionLevel {
    /// Integer downsample factor relative to level 0
    pub downsample: u32,

    /// Width of this level in pixels
    pub width: u32,

    /// Height of this level in pixels
    pub height: u32,

    /// Nominal tile width. Edge tiles may be narrower.
    pub tile_width: u32,

    /// Nominal tile height. Edge tiles may be shorter.
    pub tile_height: u32,

    pub channels: u16,
    pub sample_type: SampleType,
}

impl ResolutionLevel {
    /// Number of tile columns.
    pub fn tiles_x(&self) -> u32 {
        self.width.div_ceil(self.tile_width.max(1))
    }

    /// Number of tile rows.
    pub fn tiles_y(&self) -> u32 {
        self.height.div_ceil(self.tile_height.max(1))
    }

    /// Valid extent of a tile, `None` outside the grid.
    pub fn tile_extent(&self, col: u32, row: u32) -> Option<(u32, u32)> {
        if col >= self.tiles_x() || row >= self.tiles_y() {
            return None;
        }
        let w = (self.width - col * self.tile_width).min(self.tile_width);
        let h = (self.height - row * self.tile_height).min(self.tile_height);
        Some((w, h))
    }
}

// =============================================================================
// SlideBackend Trait
// =============================================================================

/// Format-specific half of an open slide.
///
/// Levels are reported finest first and never change after open. Tile
/// decoding is pure with respect to the file: the same key always yields the
/// same pixels, which is what lets the tile cache share results.
#[async_trait]
pub trait SlideBackend: Send + Sync {
    /// Container format of the file.
    fn format(&self) -> FormatKind;

    /// Identifier of the underlying file, used in logs.
    fn identifier(&self) -> &str;

    /// All resolution levels, level 0 first.
    fn levels(&self) -> &[ResolutionLevel];

    /// Decode one tile.
    ///
    /// The result covers the tile's valid extent, so edge tiles come back
    /// smaller than the nominal tile size.
    ///
    /// # Errors
    ///
    /// - [`SlideError::InvalidRequest`] when the key is outside the grid
    /// - [`SlideError::Decode`] when the bytes cannot be read or decoded
    /// - [`SlideError::Closed`] after [`close`](Self::close)
    async fn decode_tile(
        &self,
        level: usize,
        col: u32,
        row: u32,
    ) -> Result<PixelBuffer, SlideError>;

    /// Release file resources. Idempotent.
    async fn close(&self) {}
}

/// Look up a level and check a tile key against its grid.
pub(crate) fn check_tile_key(
    levels: &[ResolutionLevel],
    level: usize,
    col: u32,
    row: u32,
) -> Result<(ResolutionLevel, u32, u32), SlideError> {
    let info = levels.get(level).copied().ok_or_else(|| {
        SlideError::InvalidRequest(format!(
            "level {} out of range ({} levels)",
            level,
            levels.len()
        ))
    })?;
    let (w, h) = info.tile_extent(col, row).ok_or_else(|| {
        SlideError::InvalidRequest(format!(
            "tile ({}, {}) outside the {}x{} grid of level {}",
            col,
            row,
            info.tiles_x(),
            info.tiles_y(),
            level
        ))
    })?;
    Ok((info, w, h))
}

// =============================================================================
// Tests
// =============================================================================
