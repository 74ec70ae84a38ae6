//! JPEG tile handling.
//!
//! # Abbreviated JPEG Streams
//!
//! Aperio SVS and many other tiled TIFFs use "abbreviated JPEG streams".
//! Each tile's JPEG data lacks the quantization (DQT) and Huffman (DHT)
//! tables needed for decoding. These are stored once in the TIFF's
//! `JPEGTables` tag and must be merged with each tile's data before decoding.
//!
//! # Merging Process
//!
//! 1. JPEGTables starts with SOI (FFD8) and ends with EOI (FFD9)
//! 2. Tile data also starts with SOI and ends with EOI
//! 3. To merge: strip EOI from tables, strip SOI from tile, concatenate
//!
//! Result: SOI + tables_content + tile_content + EOI

use std::io::Cursor;

use bytes::{Bytes, BytesMut};
use image::{ImageFormat, ImageReader};

use crate::error::CodecError;

// =============================================================================
// JPEG Markers
// =============================================================================

/// Start Of Image marker
pub const SOI: [u8; 2] = [0xFF, 0xD8];

/// End Of Image marker
pub const EOI: [u8; 2] = [0xFF, 0xD9];

/// Define Huffman Table marker
pub const DHT: [u8; 2] = [0xFF, 0xC4];

/// Define Quantization Table marker
pub const DQT: [u8; 2] = [0xFF, 0xDB];

/// Start Of Scan marker
pub const SOS: [u8; 2] = [0xFF, 0xDA];

// =============================================================================
// JPEG Stream Analysis
// =============================================================================

/// Check if JPEG data is an abbreviated stream (missing tables).
///
/// Marker segments after SOI are walked until SOS; the stream is abbreviated
/// when neither DQT nor DHT appears before it.
pub fn is_abbreviated_stream(data: &[u8]) -> bool {
    if data.len() < 4 || data[0..2] != SOI {
        return false;
    }

    let mut pos = 2;
    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            pos += 1;
            continue;
        }

        let marker = [data[pos], data[pos + 1]];
        if marker == DQT || marker == DHT {
            return false;
        }
        if marker == SOS {
            return true;
        }

        // Skip marker segment (marker + 2-byte length + data)
        if pos + 3 < data.len() && marker[1] != 0x00 && marker[1] != 0xD8 && marker[1] != 0xD9 {
            let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
            pos += 2 + length;
        } else {
            pos += 2;
        }
    }

    false
}

/// Check if JPEG data carries its own quantization tables.
pub fn is_complete_stream(data: &[u8]) -> bool {
    if data.len() < 4 || data[0..2] != SOI {
        return false;
    }
    data[2..].windows(2).any(|w| w == DQT)
}

// =============================================================================
// JPEG Tables Merging
// =============================================================================

/// Merge JPEGTables with abbreviated tile data.
///
/// The result keeps the SOI of the tables and the EOI of the tile.
pub fn merge_jpeg_tables(tables: &[u8], tile_data: &[u8]) -> Bytes {
    if tables.is_empty() {
        return Bytes::copy_from_slice(tile_data);
    }
    if tile_data.is_empty() {
        return Bytes::new();
    }

    let tables_end = if tables.ends_with(&EOI) {
        tables.len() - 2
    } else {
        tables.len()
    };
    let tile_start = if tile_data.starts_with(&SOI) { 2 } else { 0 };

    let mut result = BytesMut::with_capacity(tables_end + tile_data.len() - tile_start);
    result.extend_from_slice(&tables[..tables_end]);
    result.extend_from_slice(&tile_data[tile_start..]);
    result.freeze()
}

/// Prepare tile data for decoding, merging tables when the tile needs them.
pub fn prepare_tile_jpeg(tables: Option<&[u8]>, tile_data: &[u8]) -> Bytes {
    match tables {
        Some(tables) if !is_complete_stream(tile_data) || is_abbreviated_stream(tile_data) => {
            merge_jpeg_tables(tables, tile_data)
        }
        _ => Bytes::copy_from_slice(tile_data),
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode a complete JPEG stream to interleaved 8-bit samples.
///
/// The decoder converts YCbCr to RGB; `channels` selects gray (1), RGB (3)
/// or RGBA (4) output. Returns (width, height, samples).
pub fn decode_jpeg(data: &[u8], channels: usize) -> Result<(u32, u32, Vec<u8>), CodecError> {
    let reader = ImageReader::with_format(Cursor::new(data), ImageFormat::Jpeg);
    let img = reader.decode().map_err(|e| CodecError::Jpeg(e.to_string()))?;

    let (width, height) = (img.width(), img.height());
    let samples = match channels {
        1 => img.into_luma8().into_raw(),
        3 => img.into_rgb8().into_raw(),
        4 => img.into_rgba8().into_raw(),
        other => {
            return Err(CodecError::Unsupported(format!(
                "JPEG tiles with {} channels",
                other
            )))
        }
    };

    Ok((width, height, samples))
}

// =============================================================================
// Tests
// =============================================================================
