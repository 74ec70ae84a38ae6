//! TIFF pyramid level identification.
//!
//! A pyramidal TIFF stores one resolution per tiled IFD. Files written by
//! slide scanners interleave other directories with the levels: Aperio SVS
//! puts a stripped thumbnail second and a label and macro image at the end.
//!
//! # Level rules
//!
//! 1. The first IFD is level 0 and must be tiled
//! 2. Every later tiled IFD is a level, in file order
//! 3. Stripped IFDs and transparency masks are skipped
//!
//! Level downsample factors are `round(height0 / height)`. Whether they form
//! a consistent pyramid is checked later, when the index is built.

use std::collections::HashSet;

use bytes::Bytes;
use tracing::debug;

use crate::error::TiffError;
use crate::io::RangeReader;
use crate::tile::SampleType;

use super::parser::{Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};
use super::tags::{
    Compression, TiffTag, PREDICTOR_NONE, SAMPLE_FORMAT_IEEEFP, SAMPLE_FORMAT_UINT,
    SUBFILE_TRANSPARENCY_MASK,
};
use super::values::ValueReader;

// =============================================================================
// Constants
// =============================================================================

/// Maximum number of IFDs to follow
const MAX_IFDS: usize = 100;

/// Bytes of ImageDescription kept for format detection
const MAX_DESCRIPTION_LEN: u64 = 1024;

// =============================================================================
// PyramidLevel
// =============================================================================

/// A single tiled directory of the pyramid.
#[derive(Debug, Clone)]
pub struct PyramidLevel {
    /// Index of this level in the pyramid (0 = highest resolution)
    pub level_index: usize,

    /// Index of the IFD in the file's IFD chain
    pub ifd_index: usize,

    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,

    /// Number of tiles in X direction
    pub tiles_x: u32,

    /// Number of tiles in Y direction
    pub tiles_y: u32,

    /// Integer downsample relative to level 0
    pub downsample: u32,

    /// Raw Compression tag value (1 when absent)
    pub compression: u16,

    /// Raw PhotometricInterpretation tag value
    pub photometric: Option<u16>,

    pub samples_per_pixel: u16,

    /// BitsPerSample, one value per sample
    pub bits_per_sample: Vec<u16>,

    /// Raw SampleFormat tag value (uint when absent)
    pub sample_format: u16,

    pub planar_configuration: u16,
    pub predictor: u16,

    pub tile_offsets_entry: Option<IfdEntry>,
    pub tile_byte_counts_entry: Option<IfdEntry>,
    pub jpeg_tables_entry: Option<IfdEntry>,
}

impl PyramidLevel {
    /// Build a level from a tiled IFD, resolving the tags that may be stored
    /// out of line.
    async fn from_ifd<R: RangeReader>(
        values: &ValueReader<'_, R>,
        ifd: &Ifd,
        ifd_index: usize,
    ) -> Result<Self, TiffError> {
        let width = read_required(values, ifd, TiffTag::ImageWidth).await?;
        let height = read_required(values, ifd, TiffTag::ImageLength).await?;
        let tile_width = read_required(values, ifd, TiffTag::TileWidth).await?;
        let tile_height = read_required(values, ifd, TiffTag::TileLength).await?;

        if tile_width == 0 || tile_height == 0 {
            return Err(TiffError::InvalidTagValue {
                tag: "TileWidth/TileLength",
                message: format!("zero tile size {}x{}", tile_width, tile_height),
            });
        }
        if width == 0 || height == 0 {
            return Err(TiffError::InvalidTagValue {
                tag: "ImageWidth/ImageLength",
                message: format!("zero image size {}x{}", width, height),
            });
        }

        let samples_per_pixel =
            read_optional(values, ifd, TiffTag::SamplesPerPixel).await?.unwrap_or(1) as u16;

        let bits_per_sample = match ifd.get_entry_by_tag(TiffTag::BitsPerSample) {
            Some(entry) => values
                .read_u64_array(entry)
                .await?
                .into_iter()
                .map(|v| v as u16)
                .collect(),
            None => vec![1],
        };

        Ok(PyramidLevel {
            level_index: 0,
            ifd_index,
            width,
            height,
            tile_width,
            tile_height,
            tiles_x: width.div_ceil(tile_width),
            tiles_y: height.div_ceil(tile_height),
            downsample: 1,
            compression: read_optional(values, ifd, TiffTag::Compression)
                .await?
                .unwrap_or(1) as u16,
            photometric: read_optional(values, ifd, TiffTag::PhotometricInterpretation)
                .await?
                .map(|v| v as u16),
            samples_per_pixel,
            bits_per_sample,
            sample_format: read_optional(values, ifd, TiffTag::SampleFormat)
                .await?
                .unwrap_or(SAMPLE_FORMAT_UINT as u32) as u16,
            planar_configuration: read_optional(values, ifd, TiffTag::PlanarConfiguration)
                .await?
                .unwrap_or(1) as u16,
            predictor: read_optional(values, ifd, TiffTag::Predictor)
                .await?
                .unwrap_or(PREDICTOR_NONE as u32) as u16,
            tile_offsets_entry: ifd.get_entry_by_tag(TiffTag::TileOffsets).cloned(),
            tile_byte_counts_entry: ifd.get_entry_by_tag(TiffTag::TileByteCounts).cloned(),
            jpeg_tables_entry: ifd.get_entry_by_tag(TiffTag::JpegTables).cloned(),
        })
    }

    /// Total number of tiles in the grid.
    pub fn tile_count(&self) -> u64 {
        self.tiles_x as u64 * self.tiles_y as u64
    }

    /// Linear index of a tile, row-major. `None` outside the grid.
    pub fn tile_index(&self, tile_x: u32, tile_y: u32) -> Option<usize> {
        if tile_x >= self.tiles_x || tile_y >= self.tiles_y {
            return None;
        }
        Some(tile_y as usize * self.tiles_x as usize + tile_x as usize)
    }

    /// Valid pixel extent of a tile. Edge tiles are smaller than nominal.
    pub fn tile_dimensions(&self, tile_x: u32, tile_y: u32) -> Option<(u32, u32)> {
        if tile_x >= self.tiles_x || tile_y >= self.tiles_y {
            return None;
        }
        let w = (self.width - tile_x * self.tile_width).min(self.tile_width);
        let h = (self.height - tile_y * self.tile_height).min(self.tile_height);
        Some((w, h))
    }

    pub fn compression_kind(&self) -> Option<Compression> {
        Compression::from_u16(self.compression)
    }

    /// Sample type of this level, `None` when bit depths differ between
    /// samples or the combination is not one the reader handles.
    pub fn sample_type(&self) -> Option<SampleType> {
        let bits = *self.bits_per_sample.first()?;
        if self.bits_per_sample.iter().any(|&b| b != bits) {
            return None;
        }
        match (self.sample_format, bits) {
            (SAMPLE_FORMAT_UINT, 8) => Some(SampleType::U8),
            (SAMPLE_FORMAT_UINT, 16) => Some(SampleType::U16),
            (SAMPLE_FORMAT_UINT, 32) => Some(SampleType::U32),
            (SAMPLE_FORMAT_IEEEFP, 32) => Some(SampleType::F32),
            _ => None,
        }
    }
}

async fn read_optional<R: RangeReader>(
    values: &ValueReader<'_, R>,
    ifd: &Ifd,
    tag: TiffTag,
) -> Result<Option<u32>, TiffError> {
    match ifd.get_entry_by_tag(tag) {
        Some(entry) => Ok(Some(values.read_u32(entry).await?)),
        None => Ok(None),
    }
}

async fn read_required<R: RangeReader>(
    values: &ValueReader<'_, R>,
    ifd: &Ifd,
    tag: TiffTag,
) -> Result<u32, TiffError> {
    read_optional(values, ifd, tag)
        .await?
        .ok_or(TiffError::MissingTag(tag.name()))
}

// =============================================================================
// TiffPyramid
// =============================================================================

/// The pyramid levels of a TIFF file, ordered level 0 first.
#[derive(Debug, Clone)]
pub struct TiffPyramid {
    pub header: TiffHeader,

    pub levels: Vec<PyramidLevel>,

    /// ImageDescription of the first IFD, truncated
    pub description: Option<String>,

    /// Number of IFDs in the chain
    pub ifd_count: usize,
}

impl TiffPyramid {
    /// Read the header and IFD chain and identify the pyramid levels.
    pub async fn parse<R: RangeReader>(reader: &R) -> Result<Self, TiffError> {
        let header = read_header(reader).await?;
        let ifds = Self::parse_all_ifds(reader, &header).await?;
        let values = ValueReader::new(reader, &header);

        let first = ifds.first().ok_or(TiffError::InvalidIfdOffset(0))?;
        if !first.is_tiled() {
            return Err(TiffError::StripOrganization);
        }

        let description = match first.get_entry_by_tag(TiffTag::ImageDescription) {
            Some(entry) => Some(read_description(&values, entry).await?),
            None => None,
        };

        let mut levels: Vec<PyramidLevel> = Vec::new();
        for (ifd_index, ifd) in ifds.iter().enumerate() {
            if !ifd.is_tiled() {
                debug!(ifd_index, "skipping stripped IFD");
                continue;
            }
            let subfile = ifd
                .get_u32(TiffTag::NewSubfileType, header.byte_order)
                .unwrap_or(0);
            if subfile & SUBFILE_TRANSPARENCY_MASK != 0 {
                debug!(ifd_index, "skipping transparency mask");
                continue;
            }

            let mut level = PyramidLevel::from_ifd(&values, ifd, ifd_index).await?;
            level.level_index = levels.len();
            if let Some(base) = levels.first() {
                level.downsample = (base.height as f64 / level.height as f64).round() as u32;
            }
            levels.push(level);
        }

        Ok(TiffPyramid {
            header,
            levels,
            description,
            ifd_count: ifds.len(),
        })
    }

    /// Parse all IFDs following the next-IFD chain.
    ///
    /// A chain that revisits an offset is rejected.
    async fn parse_all_ifds<R: RangeReader>(
        reader: &R,
        header: &TiffHeader,
    ) -> Result<Vec<Ifd>, TiffError> {
        let mut ifds = Vec::new();
        let mut seen = HashSet::new();
        let mut offset = header.first_ifd_offset;

        while offset != 0 && ifds.len() < MAX_IFDS {
            if !seen.insert(offset) || offset >= reader.size() {
                return Err(TiffError::InvalidIfdOffset(offset));
            }
            let ifd = read_ifd(reader, header, offset).await?;
            offset = ifd.next_ifd_offset;
            ifds.push(ifd);
        }

        Ok(ifds)
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn get_level(&self, level: usize) -> Option<&PyramidLevel> {
        self.levels.get(level)
    }

    pub fn base_level(&self) -> Option<&PyramidLevel> {
        self.levels.first()
    }

    /// Dimensions of level 0 as (width, height).
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.base_level().map(|l| (l.width, l.height))
    }
}

/// Read and parse the file header.
pub async fn read_header<R: RangeReader>(reader: &R) -> Result<TiffHeader, TiffError> {
    let size = reader.size();
    if size < TIFF_HEADER_SIZE as u64 {
        return Err(TiffError::FileTooSmall {
            required: TIFF_HEADER_SIZE as u64,
            actual: size,
        });
    }
    let len = (BIGTIFF_HEADER_SIZE as u64).min(size) as usize;
    let bytes = reader.read_exact_at(0, len).await?;
    TiffHeader::parse(&bytes, size)
}

/// Read the IFD at `offset`.
pub async fn read_ifd<R: RangeReader>(
    reader: &R,
    header: &TiffHeader,
    offset: u64,
) -> Result<Ifd, TiffError> {
    let count_bytes = reader.read_exact_at(offset, header.ifd_count_size()).await?;
    let entry_count = header.read_entry_count(&count_bytes);

    let ifd_size = Ifd::calculate_size(entry_count, header);
    let ifd_bytes = reader.read_exact_at(offset, ifd_size).await?;
    Ifd::parse(&ifd_bytes, header)
}

/// Read at most [`MAX_DESCRIPTION_LEN`] bytes of an ImageDescription.
pub async fn read_description<R: RangeReader>(
    values: &ValueReader<'_, R>,
    entry: &IfdEntry,
) -> Result<String, TiffError> {
    let mut truncated = entry.clone();
    truncated.count = truncated.count.min(MAX_DESCRIPTION_LEN);
    values.read_string(&truncated).await
}

// =============================================================================
// Tile Data Loading
// =============================================================================

/// Tile locations of one level, loaded at open time.
#[derive(Debug, Clone)]
pub struct TileData {
    /// Byte offset of each tile in the file
    pub offsets: Vec<u64>,

    /// Byte count of each tile, 0 for sparse tiles
    pub byte_counts: Vec<u64>,

    pub jpeg_tables: Option<Bytes>,
}

impl TileData {
    /// Load tile locations for `level`, checking both arrays cover the grid.
    pub async fn load<R: RangeReader>(
        reader: &R,
        level: &PyramidLevel,
        header: &TiffHeader,
    ) -> Result<Self, TiffError> {
        let values = ValueReader::new(reader, header);

        let offsets_entry = level
            .tile_offsets_entry
            .as_ref()
            .ok_or(TiffError::MissingTag("TileOffsets"))?;
        let counts_entry = level
            .tile_byte_counts_entry
            .as_ref()
            .ok_or(TiffError::MissingTag("TileByteCounts"))?;

        let expected = level.tile_count();
        for (entry, tag) in [(offsets_entry, "TileOffsets"), (counts_entry, "TileByteCounts")] {
            if entry.count != expected {
                return Err(TiffError::InvalidTagValue {
                    tag,
                    message: format!(
                        "expected {} values for a {}x{} grid, found {}",
                        expected, level.tiles_x, level.tiles_y, entry.count
                    ),
                });
            }
        }

        let offsets = values.read_u64_array(offsets_entry).await?;
        let byte_counts = values.read_u64_array(counts_entry).await?;

        let jpeg_tables = match level.jpeg_tables_entry {
            Some(ref entry) => Some(values.read_bytes(entry).await?),
            None => None,
        };

        Ok(TileData {
            offsets,
            byte_counts,
            jpeg_tables,
        })
    }

    /// Byte range of a tile as (offset, length).
    pub fn tile_location(&self, index: usize) -> Option<(u64, u64)> {
        Some((*self.offsets.get(index)?, *self.byte_counts.get(index)?))
    }
}

// =============================================================================
// Tests
// =============================================================================
