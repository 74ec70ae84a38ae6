//! Validation of TIFF pyramid levels.
//!
//! Unsupported files are rejected at open time with a clear reason rather
//! than failing tile by tile later.
//!
//! # Supported Subset
//!
//! - **Organization**: tiled, chunky (PlanarConfiguration 1)
//! - **Compression**: none, Deflate, JPEG (8-bit), Aperio JPEG 2000
//! - **Samples**: uint 8/16/32 or float 32, all samples the same depth
//! - **Photometric**: grayscale with one sample, RGB with 3 or 4, YCbCr
//!   only when the codec converts it (JPEG, JPEG 2000)
//! - **Predictor**: none, or horizontal differencing on integer samples

use crate::error::TiffError;
use crate::tile::SampleType;

use super::pyramid::{PyramidLevel, TiffPyramid};
use super::tags::{Compression, Photometric, PREDICTOR_HORIZONTAL, PREDICTOR_NONE};

// =============================================================================
// Validation Errors
// =============================================================================

/// A reason a level cannot be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// No tiled levels were found
    NoPyramidLevels,

    /// Unsupported or unknown compression scheme
    UnsupportedCompression {
        ifd_index: usize,
        compression: u16,
        compression_name: String,
    },

    /// Required tile tags are absent
    MissingTileTags {
        ifd_index: usize,
        missing_tags: Vec<&'static str>,
    },

    /// Sample format, photometric or planar layout is not decodable
    UnsupportedLayout { ifd_index: usize, message: String },
}

impl From<ValidationError> for TiffError {
    fn from(error: ValidationError) -> Self {
        match error {
            ValidationError::NoPyramidLevels => TiffError::MissingTag("tiled image directory"),
            ValidationError::UnsupportedCompression {
                compression_name, ..
            } => TiffError::UnsupportedCompression(compression_name),
            ValidationError::MissingTileTags { missing_tags, .. } => {
                TiffError::MissingTag(missing_tags.first().copied().unwrap_or("TileOffsets"))
            }
            ValidationError::UnsupportedLayout { ifd_index, message } => {
                TiffError::UnsupportedLayout(format!("IFD {}: {}", ifd_index, message))
            }
        }
    }
}

// =============================================================================
// Level Layout
// =============================================================================

/// How the pixels of a validated level are decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelLayout {
    pub compression: Compression,
    pub sample_type: SampleType,

    /// Samples per pixel in decoded tiles
    pub channels: u16,

    /// Samples per pixel as stored
    pub stored_samples: u16,

    /// Whether tiles hold YCbCr that the codec must convert to RGB
    pub ycbcr: bool,

    /// Horizontal differencing is applied after decompression
    pub horizontal_predictor: bool,
}

/// Validate one level and work out its decoded layout.
pub fn validate_level(level: &PyramidLevel) -> Result<LevelLayout, ValidationError> {
    let ifd_index = level.ifd_index;
    let layout_error = |message: String| ValidationError::UnsupportedLayout { ifd_index, message };

    let compression = match level.compression_kind() {
        Some(c) if c.is_supported() => c,
        Some(c) => {
            return Err(ValidationError::UnsupportedCompression {
                ifd_index,
                compression: level.compression,
                compression_name: c.name().to_string(),
            })
        }
        None => {
            return Err(ValidationError::UnsupportedCompression {
                ifd_index,
                compression: level.compression,
                compression_name: format!("Unknown ({})", level.compression),
            })
        }
    };

    let mut missing_tags = Vec::new();
    if level.tile_offsets_entry.is_none() {
        missing_tags.push("TileOffsets");
    }
    if level.tile_byte_counts_entry.is_none() {
        missing_tags.push("TileByteCounts");
    }
    if !missing_tags.is_empty() {
        return Err(ValidationError::MissingTileTags {
            ifd_index,
            missing_tags,
        });
    }

    let sample_type = level.sample_type().ok_or_else(|| {
        layout_error(format!(
            "bits per sample {:?} with sample format {}",
            level.bits_per_sample, level.sample_format
        ))
    })?;

    let samples = level.samples_per_pixel;
    if level.planar_configuration != 1 && samples > 1 {
        return Err(layout_error(format!(
            "planar configuration {}",
            level.planar_configuration
        )));
    }

    if compression.requires_8bit() && sample_type != SampleType::U8 {
        return Err(layout_error(format!(
            "{} requires 8-bit samples, found {}",
            compression.name(),
            sample_type.name()
        )));
    }
    let is_jpeg2000 = matches!(
        compression,
        Compression::Jpeg2000YCbCr | Compression::Jpeg2000Rgb
    );
    if is_jpeg2000 && !matches!(sample_type, SampleType::U8 | SampleType::U16) {
        return Err(layout_error(format!(
            "JPEG 2000 tiles with {} samples",
            sample_type.name()
        )));
    }

    let photometric = level.photometric.map(Photometric::from_u16);
    let converts_ycbcr = compression == Compression::Jpeg || is_jpeg2000;
    let (channels, ycbcr) = match (photometric, samples) {
        (None, 1)
        | (Some(Some(Photometric::MinIsBlack)), 1)
        | (Some(Some(Photometric::MinIsWhite)), 1) => (1, false),
        (None, 3 | 4) | (Some(Some(Photometric::Rgb)), 3 | 4) => (samples, false),
        (Some(Some(Photometric::YCbCr)), 3) if converts_ycbcr => (3, true),
        _ => {
            return Err(layout_error(format!(
                "photometric {:?} with {} samples and {} compression",
                level.photometric,
                samples,
                compression.name()
            )))
        }
    };

    let horizontal_predictor = match level.predictor {
        PREDICTOR_NONE => false,
        PREDICTOR_HORIZONTAL if sample_type != SampleType::F32 => true,
        other => return Err(layout_error(format!("predictor {}", other))),
    };

    Ok(LevelLayout {
        compression,
        sample_type,
        channels,
        stored_samples: samples,
        // Aperio 33003 stores YCbCr regardless of the photometric tag
        ycbcr: ycbcr || compression == Compression::Jpeg2000YCbCr,
        horizontal_predictor,
    })
}

/// Validate every level of a pyramid.
pub fn validate_pyramid(pyramid: &TiffPyramid) -> Result<Vec<LevelLayout>, ValidationError> {
    if pyramid.levels.is_empty() {
        return Err(ValidationError::NoPyramidLevels);
    }
    pyramid.levels.iter().map(validate_level).collect()
}

// =============================================================================
// Tests
// =============================================================================
