//! Tiled TIFF backend.
//!
//! Serves Aperio SVS and generic pyramidal TIFF files. Directory parsing,
//! validation and the tile offset tables are all handled at open time; after
//! that a tile decode is one range read plus one codec call.

use async_trait::async_trait;
use tracing::debug;

use crate::error::{SlideError, TiffError};
use crate::io::{LocalFileReader, RangeReader};
use crate::slide::{check_tile_key, ResolutionLevel, SlideBackend};
use crate::tile::PixelBuffer;

use super::codec::TileCodec;
use super::detect::FormatKind;
use super::tiff::{validate_pyramid, PyramidLevel, TiffPyramid, TileData};

// =============================================================================
// Level Data
// =============================================================================

/// Everything needed to decode the tiles of one level.
#[derive(Debug, Clone)]
struct TiffLevelData {
    level: PyramidLevel,
    tiles: TileData,
    codec: TileCodec,
}

// =============================================================================
// TiffBackend
// =============================================================================

/// Backend for tiled TIFF pyramids.
pub struct TiffBackend<R = LocalFileReader> {
    reader: R,
    format: FormatKind,
    pyramid: TiffPyramid,
    levels: Vec<TiffLevelData>,
    resolutions: Vec<ResolutionLevel>,
}

impl<R: RangeReader> TiffBackend<R> {
    /// Parse and validate the pyramid in `reader` and load its tile tables.
    ///
    /// # Errors
    ///
    /// - [`SlideError::UnsupportedFormat`] for strips, unknown compression
    ///   or a pixel layout no codec handles
    /// - [`SlideError::CorruptPyramid`] for broken directories or tile tables
    pub async fn open(reader: R, format: FormatKind) -> Result<Self, SlideError> {
        let pyramid = TiffPyramid::parse(&reader).await?;
        let layouts = validate_pyramid(&pyramid).map_err(TiffError::from)?;

        let byte_order = pyramid.header.byte_order;
        let mut levels = Vec::with_capacity(pyramid.levels.len());
        let mut resolutions = Vec::with_capacity(pyramid.levels.len());
        for (level, layout) in pyramid.levels.iter().zip(layouts) {
            let tiles = TileData::load(&reader, level, &pyramid.header).await?;
            let codec = TileCodec::new(
                layout,
                byte_order,
                level.tile_width,
                level.tile_height,
                tiles.jpeg_tables.clone(),
            );

            debug!(
                slide = reader.identifier(),
                level = level.level_index,
                ifd = level.ifd_index,
                width = level.width,
                height = level.height,
                downsample = level.downsample,
                compression = layout.compression.name(),
                "loaded TIFF level"
            );

            resolutions.push(ResolutionLevel {
                downsample: level.downsample,
                width: level.width,
                height: level.height,
                tile_width: level.tile_width,
                tile_height: level.tile_height,
                channels: layout.channels,
                sample_type: layout.sample_type,
            });
            levels.push(TiffLevelData {
                level: level.clone(),
                tiles,
                codec,
            });
        }

        Ok(Self {
            reader,
            format,
            pyramid,
            levels,
            resolutions,
        })
    }

    /// The parsed directory structure.
    pub fn pyramid(&self) -> &TiffPyramid {
        &self.pyramid
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }
}

#[async_trait]
impl<R: RangeReader> SlideBackend for TiffBackend<R> {
    fn format(&self) -> FormatKind {
        self.format
    }

    fn identifier(&self) -> &str {
        self.reader.identifier()
    }

    fn levels(&self) -> &[ResolutionLevel] {
        &self.resolutions
    }

    async fn decode_tile(
        &self,
        level: usize,
        col: u32,
        row: u32,
    ) -> Result<PixelBuffer, SlideError> {
        let (_, width, height) = check_tile_key(&self.resolutions, level, col, row)?;
        let data = &self.levels[level];

        let location = data
            .level
            .tile_index(col, row)
            .and_then(|index| data.tiles.tile_location(index));
        let (offset, length) = location.ok_or_else(|| {
            SlideError::corrupt(format!(
                "no tile table entry for ({}, {}) at level {}",
                col, row, level
            ))
        })?;

        let tile = if length == 0 {
            // Sparse tile: nothing was ever written here
            data.codec.empty_tile()
        } else {
            let bytes = self
                .reader
                .read_exact_at(offset, length as usize)
                .await
                .map_err(|e| SlideError::decode(level, col, row, e.into()))?;
            data.codec
                .decode(&bytes)
                .map_err(|e| SlideError::decode(level, col, row, e))?
        };

        Ok(tile.crop(0, 0, width as usize, height as usize))
    }

    async fn close(&self) {
        self.reader.close().await;
    }
}

// =============================================================================
// Tests
// =============================================================================
