//! Tile decompression for tiled TIFF levels.
//!
//! [`TileCodec`] turns the stored bytes of one tile into a nominal
//! `tile_width x tile_height` [`PixelBuffer`] in native byte order. Cropping
//! of edge tiles happens in the backend, which knows the grid.

use std::io::Read;

use bytes::Bytes;
use flate2::read::ZlibDecoder;

use crate::error::CodecError;
use crate::tile::{PixelBuffer, SampleType};

use super::jp2::decode_bytes;
use super::jpeg::{decode_jpeg, prepare_tile_jpeg};
use super::tiff::{ByteOrder, Compression, LevelLayout};

/// Decoder for the tiles of one TIFF level.
#[derive(Debug, Clone)]
pub struct TileCodec {
    layout: LevelLayout,
    byte_order: ByteOrder,
    tile_width: u32,
    tile_height: u32,
    jpeg_tables: Option<Bytes>,
}

impl TileCodec {
    pub fn new(
        layout: LevelLayout,
        byte_order: ByteOrder,
        tile_width: u32,
        tile_height: u32,
        jpeg_tables: Option<Bytes>,
    ) -> Self {
        Self {
            layout,
            byte_order,
            tile_width,
            tile_height,
            jpeg_tables,
        }
    }

    pub fn layout(&self) -> &LevelLayout {
        &self.layout
    }

    /// Size in bytes of one decoded tile.
    pub fn tile_bytes(&self) -> usize {
        self.tile_width as usize
            * self.tile_height as usize
            * self.layout.channels as usize
            * self.layout.sample_type.size()
    }

    /// A tile with no stored data.
    pub fn empty_tile(&self) -> PixelBuffer {
        PixelBuffer::zeros(
            self.tile_height as usize,
            self.tile_width as usize,
            self.layout.channels as usize,
            self.layout.sample_type,
        )
    }

    /// Decode the stored bytes of one tile.
    pub fn decode(&self, data: &[u8]) -> Result<PixelBuffer, CodecError> {
        match self.layout.compression {
            Compression::None => self.finish_raw(data.to_vec()),
            Compression::Deflate | Compression::AdobeDeflate => {
                let mut inflated = Vec::with_capacity(self.stored_bytes());
                ZlibDecoder::new(data)
                    .read_to_end(&mut inflated)
                    .map_err(|e| CodecError::Deflate(e.to_string()))?;
                self.finish_raw(inflated)
            }
            Compression::Lzw => {
                let decoded = weezl::decode::Decoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8)
                    .decode(data)
                    .map_err(|e| CodecError::Lzw(e.to_string()))?;
                self.finish_raw(decoded)
            }
            Compression::Jpeg => self.decode_jpeg(data),
            Compression::Jpeg2000YCbCr | Compression::Jpeg2000Rgb => self.decode_jpeg2000(data),
            other => Err(CodecError::Unsupported(format!(
                "{} compression",
                other.name()
            ))),
        }
    }

    /// Bytes of one uncompressed tile as stored.
    fn stored_bytes(&self) -> usize {
        self.tile_width as usize
            * self.tile_height as usize
            * self.layout.stored_samples as usize
            * self.layout.sample_type.size()
    }

    /// Finish an uncompressed tile: trim padding, byte-swap, undo prediction.
    fn finish_raw(&self, mut data: Vec<u8>) -> Result<PixelBuffer, CodecError> {
        let expected = self.stored_bytes();
        if data.len() < expected {
            return Err(CodecError::SizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        data.truncate(expected);

        let sample_size = self.layout.sample_type.size();
        if sample_size > 1 && !self.byte_order.is_native() {
            for sample in data.chunks_exact_mut(sample_size) {
                sample.reverse();
            }
        }

        if self.layout.horizontal_predictor {
            undo_horizontal_predictor(
                &mut data,
                self.tile_width as usize,
                self.layout.stored_samples as usize,
                self.layout.sample_type,
            );
        }

        PixelBuffer::from_raw(
            self.tile_height as usize,
            self.tile_width as usize,
            self.layout.channels as usize,
            self.layout.sample_type,
            data,
        )
    }

    fn decode_jpeg(&self, data: &[u8]) -> Result<PixelBuffer, CodecError> {
        let stream = prepare_tile_jpeg(self.jpeg_tables.as_deref(), data);
        let channels = self.layout.channels as usize;
        let (width, height, samples) = decode_jpeg(&stream, channels)?;
        self.fit(width, height, samples)
    }

    fn decode_jpeg2000(&self, data: &[u8]) -> Result<PixelBuffer, CodecError> {
        let mut planes = decode_bytes(data)?;
        if self.layout.ycbcr {
            planes.ycbcr_to_rgb();
        }
        let samples = planes.interleave(self.layout.channels as usize, self.layout.sample_type)?;
        self.fit(planes.width, planes.height, samples)
    }

    /// Place a decoded image into a nominal tile. Encoders may emit edge
    /// tiles at their valid size; missing area stays zero.
    fn fit(&self, width: u32, height: u32, samples: Vec<u8>) -> Result<PixelBuffer, CodecError> {
        let channels = self.layout.channels as usize;
        let decoded = PixelBuffer::from_raw(
            height as usize,
            width as usize,
            channels,
            self.layout.sample_type,
            samples,
        )?;
        if width == self.tile_width && height == self.tile_height {
            return Ok(decoded);
        }
        if width > self.tile_width || height > self.tile_height {
            return Err(CodecError::SizeMismatch {
                expected: self.tile_bytes(),
                actual: decoded.byte_len(),
            });
        }

        let mut tile = self.empty_tile();
        let dst_stride = tile.row_stride();
        let src_stride = decoded.row_stride();
        for row in 0..decoded.height {
            let dst = row * dst_stride;
            tile.data[dst..dst + src_stride]
                .copy_from_slice(&decoded.data[row * src_stride..(row + 1) * src_stride]);
        }
        Ok(tile)
    }
}

/// Reverse TIFF horizontal differencing on native-endian integer samples.
fn undo_horizontal_predictor(data: &mut [u8], width: usize, samples: usize, sample_type: SampleType) {
    let size = sample_type.size();
    let row_bytes = width * samples * size;
    if row_bytes == 0 {
        return;
    }

    for row in data.chunks_exact_mut(row_bytes) {
        match sample_type {
            SampleType::U8 => {
                for i in samples..row.len() {
                    row[i] = row[i].wrapping_add(row[i - samples]);
                }
            }
            SampleType::U16 => {
                let count = row.len() / 2;
                for i in samples..count {
                    let prev = u16::from_ne_bytes([row[(i - samples) * 2], row[(i - samples) * 2 + 1]]);
                    let cur = u16::from_ne_bytes([row[i * 2], row[i * 2 + 1]]);
                    row[i * 2..i * 2 + 2].copy_from_slice(&cur.wrapping_add(prev).to_ne_bytes());
                }
            }
            SampleType::U32 => {
                let count = row.len() / 4;
                for i in samples..count {
                    let p = (i - samples) * 4;
                    let prev = u32::from_ne_bytes([row[p], row[p + 1], row[p + 2], row[p + 3]]);
                    let c = i * 4;
                    let cur = u32::from_ne_bytes([row[c], row[c + 1], row[c + 2], row[c + 3]]);
                    row[c..c + 4].copy_from_slice(&cur.wrapping_add(prev).to_ne_bytes());
                }
            }
            // Floating point prediction is rejected at open time
            SampleType::F32 => {}
        }
    }
}
