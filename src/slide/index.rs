//! Validated pyramid geometry.
//!
//! [`PyramidIndex`] is built once per slide from the levels a backend
//! reports. Anything that would make level selection or coordinate mapping
//! ambiguous is rejected up front as [`SlideError::CorruptPyramid`].

use crate::error::SlideError;
use crate::tile::SampleType;

use super::reader::ResolutionLevel;

/// Relative tolerance between a level's size and level 0 divided by its
/// downsample factor.
const SIZE_TOLERANCE: f64 = 0.05;

/// The resolution levels of one slide, finest first.
#[derive(Debug, Clone, PartialEq)]
pub struct PyramidIndex {
    levels: Vec<ResolutionLevel>,
}

impl PyramidIndex {
    /// Validate `levels` and build the index.
    ///
    /// Requirements:
    /// - at least one level, the first with downsample factor 1
    /// - strictly increasing downsample factors
    /// - each level within 5% (or one pixel) of level 0 divided by its factor
    /// - identical channel count and sample type on every level
    /// - non-zero image and tile dimensions
    pub fn build(levels: &[ResolutionLevel]) -> Result<Self, SlideError> {
        let base = levels
            .first()
            .ok_or_else(|| SlideError::corrupt("no resolution levels"))?;
        if base.downsample != 1 {
            return Err(SlideError::corrupt(format!(
                "level 0 has downsample factor {}, expected 1",
                base.downsample
            )));
        }

        for (index, level) in levels.iter().enumerate() {
            if level.width == 0 || level.height == 0 {
                return Err(SlideError::corrupt(format!("level {} is empty", index)));
            }
            if level.tile_width == 0 || level.tile_height == 0 {
                return Err(SlideError::corrupt(format!(
                    "level {} has zero tile size",
                    index
                )));
            }
            if level.channels != base.channels || level.sample_type != base.sample_type {
                return Err(SlideError::corrupt(format!(
                    "level {} has {} {} channels, level 0 has {} {}",
                    index,
                    level.channels,
                    level.sample_type.name(),
                    base.channels,
                    base.sample_type.name()
                )));
            }

            check_extent(index, "width", base.width, level.width, level.downsample)?;
            check_extent(index, "height", base.height, level.height, level.downsample)?;
        }

        for (index, pair) in levels.windows(2).enumerate() {
            if pair[1].downsample <= pair[0].downsample {
                return Err(SlideError::corrupt(format!(
                    "downsample factors not increasing: level {} has {}, level {} has {}",
                    index,
                    pair[0].downsample,
                    index + 1,
                    pair[1].downsample
                )));
            }
        }

        Ok(Self {
            levels: levels.to_vec(),
        })
    }

    pub fn levels(&self) -> &[ResolutionLevel] {
        &self.levels
    }

    pub fn level(&self, index: usize) -> Option<&ResolutionLevel> {
        self.levels.get(index)
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// The full-resolution level.
    pub fn base(&self) -> &ResolutionLevel {
        // build() guarantees at least one level
        &self.levels[0]
    }

    /// (height, width, channels) at full resolution.
    pub fn shape(&self) -> (usize, usize, usize) {
        let base = self.base();
        (
            base.height as usize,
            base.width as usize,
            base.channels as usize,
        )
    }

    /// Downsample factors, ascending, starting at 1.
    pub fn scales(&self) -> Vec<u32> {
        self.levels.iter().map(|l| l.downsample).collect()
    }

    pub fn sample_type(&self) -> SampleType {
        self.base().sample_type
    }

    /// Index of the level to read for a target decimation.
    ///
    /// Picks the level with the largest downsample factor that does not
    /// exceed `target`. When every factor exceeds `target` the coarsest
    /// level is used.
    pub fn best_level_for(&self, target: u32) -> usize {
        self.levels
            .iter()
            .rposition(|l| l.downsample <= target)
            .unwrap_or(self.levels.len() - 1)
    }
}

fn check_extent(
    index: usize,
    axis: &str,
    base: u32,
    actual: u32,
    downsample: u32,
) -> Result<(), SlideError> {
    if downsample == 0 {
        return Err(SlideError::corrupt(format!(
            "level {} has downsample factor 0",
            index
        )));
    }
    let expected = base as f64 / downsample as f64;
    let tolerance = (expected * SIZE_TOLERANCE).max(1.0);
    if (actual as f64 - expected).abs() > tolerance {
        return Err(SlideError::corrupt(format!(
            "level {} {} is {}, expected about {:.0} for downsample {}",
            index, axis, actual, expected, downsample
        )));
    }
    Ok(())
}
