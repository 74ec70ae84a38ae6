//! Read planning: from a strided level-0 request to a list of tiles.
//!
//! A read is two independent axes. Each axis is a slice `start:stop:step`
//! over level-0 pixel coordinates with slice-length semantics:
//!
//! ```text
//! len = max(0, ceil((stop - start) / step))
//! output[i] samples level-0 coordinate start + i * step
//! ```
//!
//! Coordinates outside `[0, extent)` are legal and produce fill pixels.
//! Negative bounds are literal coordinates, not offsets from the end.
//!
//! The level is picked from the larger of the two steps. A level-0
//! coordinate `y` maps to level pixel `min(y / f, level_height - 1)`, with
//! `f` the level's downsample factor. Consecutive outputs that land in the
//! same tile form a run, and every (row run, column run) pair becomes one
//! [`TileFetch`].

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use serde::Serialize;

use crate::error::SlideError;
use crate::slide::{PyramidIndex, ResolutionLevel};

use super::cache::TileKey;

// =============================================================================
// AxisSlice
// =============================================================================

/// One axis of a read request, in level-0 pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AxisSlice {
    /// First coordinate; `None` means 0
    pub start: Option<i64>,

    /// End coordinate, exclusive; `None` means the image extent
    pub stop: Option<i64>,

    /// Distance between sampled coordinates, at least 1
    pub step: usize,
}

impl AxisSlice {
    pub fn new(start: Option<i64>, stop: Option<i64>, step: usize) -> Self {
        Self { start, stop, step }
    }

    /// The whole axis at full resolution (`::`).
    pub fn full() -> Self {
        Self::new(None, None, 1)
    }

    /// `start:stop` with step 1.
    pub fn range(start: i64, stop: i64) -> Self {
        Self::new(Some(start), Some(stop), 1)
    }

    pub fn with_step(self, step: usize) -> Self {
        Self { step, ..self }
    }

    /// Resolve the slice against an axis of `extent` pixels.
    ///
    /// Any `i64` bounds are accepted; a slice longer than `usize::MAX`
    /// outputs is [`SlideError::InvalidRequest`].
    pub fn resolve(&self, extent: u32) -> Result<AxisSpan, SlideError> {
        if self.step == 0 {
            return Err(SlideError::InvalidRequest("slice step cannot be zero".to_string()));
        }
        let start = self.start.unwrap_or(0);
        let stop = self.stop.map_or(extent as i128, i128::from);
        let (start_wide, extent) = (start as i128, extent as i128);
        let step = self.step as i128;

        let count = ceil_div((stop - start_wide).max(0), step);
        let len = usize::try_from(count).map_err(|_| {
            SlideError::InvalidRequest(format!("slice {} has too many outputs", self))
        })?;

        // Outputs whose coordinate falls inside [0, extent); both are at
        // most `len`
        let first = ceil_div((-start_wide).max(0), step).min(count);
        let end = ceil_div((extent - start_wide).max(0), step).clamp(first, count);

        Ok(AxisSpan {
            start,
            step: self.step,
            len,
            inside: first as usize..end as usize,
        })
    }
}

impl Default for AxisSlice {
    fn default() -> Self {
        Self::full()
    }
}

impl fmt::Display for AxisSlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(start) = self.start {
            write!(f, "{}", start)?;
        }
        f.write_str(":")?;
        if let Some(stop) = self.stop {
            write!(f, "{}", stop)?;
        }
        if self.step != 1 {
            write!(f, ":{}", self.step)?;
        }
        Ok(())
    }
}

impl FromStr for AxisSlice {
    type Err = String;

    /// Parse `start:stop[:step]`, any part may be empty.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.len() < 2 || parts.len() > 3 {
            return Err(format!(
                "invalid slice '{}': expected START:STOP or START:STOP:STEP",
                s
            ));
        }

        let bound = |part: &str| -> Result<Option<i64>, String> {
            let part = part.trim();
            if part.is_empty() {
                return Ok(None);
            }
            part.parse::<i64>()
                .map(Some)
                .map_err(|_| format!("invalid slice bound '{}' in '{}'", part, s))
        };

        let step = match parts.get(2).map(|p| p.trim()) {
            None | Some("") => 1,
            Some(p) => p
                .parse::<usize>()
                .map_err(|_| format!("invalid slice step '{}' in '{}'", p, s))?,
        };
        if step == 0 {
            return Err(format!("slice step cannot be zero in '{}'", s));
        }

        Ok(Self::new(bound(parts[0])?, bound(parts[1])?, step))
    }
}

/// Ceiling division for a non-negative numerator and positive divisor.
fn ceil_div(n: i128, d: i128) -> i128 {
    (n + d - 1) / d
}

// =============================================================================
// AxisSpan
// =============================================================================

/// A slice resolved against an axis extent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisSpan {
    /// Level-0 coordinate of output 0 (may be negative)
    pub start: i64,
    pub step: usize,

    /// Number of outputs
    pub len: usize,

    /// Outputs that sample inside the image; the rest are fill
    pub inside: Range<usize>,
}

impl AxisSpan {
    /// Level-0 coordinate sampled by output `i`, saturated to the `i64`
    /// range. Exact for every output in `inside`.
    pub fn coordinate(&self, i: usize) -> i64 {
        let wide = self.start as i128 + i as i128 * self.step as i128;
        wide.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    /// Number of fill outputs before the image.
    pub fn leading_fill(&self) -> usize {
        self.inside.start
    }

    /// Number of fill outputs after the image.
    pub fn trailing_fill(&self) -> usize {
        self.len - self.inside.end
    }
}

// =============================================================================
// AxisPlan
// =============================================================================

/// Consecutive outputs of one axis that fall in the same tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisRun {
    /// Tile column or row
    pub tile: u32,

    /// Output indices covered by this run
    pub outputs: Range<usize>,
}

/// One axis mapped onto a level's tile grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisPlan {
    pub span: AxisSpan,

    /// Level pixel for each output in `span.inside`
    pub level_coords: Vec<u32>,

    /// Runs in output order
    pub runs: Vec<AxisRun>,

    /// Nominal tile size along this axis
    pub tile_size: u32,
}

impl AxisPlan {
    fn new(span: AxisSpan, downsample: u32, level_extent: u32, tile_size: u32) -> Self {
        let last = level_extent.saturating_sub(1) as i64;
        let level_coords: Vec<u32> = span
            .inside
            .clone()
            .map(|i| (span.coordinate(i) / downsample as i64).min(last) as u32)
            .collect();

        let mut runs: Vec<AxisRun> = Vec::new();
        for (offset, &coord) in level_coords.iter().enumerate() {
            let output = span.inside.start + offset;
            let tile = coord / tile_size;
            match runs.last_mut() {
                Some(run) if run.tile == tile => run.outputs.end = output + 1,
                _ => runs.push(AxisRun {
                    tile,
                    outputs: output..output + 1,
                }),
            }
        }

        Self {
            span,
            level_coords,
            runs,
            tile_size,
        }
    }

    /// Pixel offset of output `i` inside its tile. `i` must be in
    /// `span.inside`.
    pub fn tile_offset(&self, i: usize) -> usize {
        let coord = self.level_coords[i - self.span.inside.start];
        (coord % self.tile_size) as usize
    }

    /// Whether outputs `range` read consecutive level pixels.
    pub fn is_contiguous(&self, range: &Range<usize>) -> bool {
        let base = self.span.inside.start;
        self.level_coords[range.start - base..range.end - base]
            .windows(2)
            .all(|w| w[1] == w[0] + 1)
    }
}

// =============================================================================
// Fetch Plan
// =============================================================================

/// Tile-local rectangle that contributes to the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TileWindow {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// One tile to fetch and where its pixels go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileFetch {
    pub key: TileKey,

    /// Output rows filled from this tile
    pub rows: Range<usize>,

    /// Output columns filled from this tile
    pub cols: Range<usize>,

    /// Bounding box of the sampled tile pixels
    pub window: TileWindow,
}

/// Everything needed to execute one read.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchPlan {
    /// Level read from
    pub level: usize,
    pub level_info: ResolutionLevel,

    pub rows: AxisPlan,
    pub cols: AxisPlan,

    /// Tiles in row-major order
    pub tiles: Vec<TileFetch>,
}

impl FetchPlan {
    /// (height, width) of the output.
    pub fn output_size(&self) -> (usize, usize) {
        (self.rows.span.len, self.cols.span.len)
    }

    /// Whether no output pixel samples the image.
    pub fn is_fill_only(&self) -> bool {
        self.tiles.is_empty()
    }
}

/// Plan a strided read of `rows` x `cols` against `index`.
pub fn plan_read(
    index: &PyramidIndex,
    rows: &AxisSlice,
    cols: &AxisSlice,
) -> Result<FetchPlan, SlideError> {
    let base = index.base();
    let row_span = rows.resolve(base.height)?;
    let col_span = cols.resolve(base.width)?;

    let target = rows.step.max(cols.step).min(u32::MAX as usize) as u32;
    let level = index.best_level_for(target);
    let info = *index
        .level(level)
        .ok_or_else(|| SlideError::corrupt(format!("level {} missing from index", level)))?;

    let rows = AxisPlan::new(row_span, info.downsample, info.height, info.tile_height);
    let cols = AxisPlan::new(col_span, info.downsample, info.width, info.tile_width);

    let mut tiles = Vec::with_capacity(rows.runs.len() * cols.runs.len());
    for row_run in &rows.runs {
        let (y0, y1) = window_bounds(&rows, &row_run.outputs);
        for col_run in &cols.runs {
            let (x0, x1) = window_bounds(&cols, &col_run.outputs);
            tiles.push(TileFetch {
                key: TileKey::new(level, col_run.tile, row_run.tile),
                rows: row_run.outputs.clone(),
                cols: col_run.outputs.clone(),
                window: TileWindow {
                    x: x0,
                    y: y0,
                    width: x1 - x0 + 1,
                    height: y1 - y0 + 1,
                },
            });
        }
    }

    Ok(FetchPlan {
        level,
        level_info: info,
        rows,
        cols,
        tiles,
    })
}

/// First and last tile-local offsets of a run. Level coordinates are
/// non-decreasing, so these are the ends of the run.
fn window_bounds(axis: &AxisPlan, outputs: &Range<usize>) -> (u32, u32) {
    let first = axis.tile_offset(outputs.start) as u32;
    let last = axis.tile_offset(outputs.end - 1) as u32;
    (first, last)
}

// =============================================================================
// Tests
// =============================================================================
