//! Test utilities for integration tests.
//!
//! This module provides mock implementations and a builder that writes real
//! tiled pyramidal TIFF files with various configurations.

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use flate2::write::ZlibEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::{GrayImage, RgbImage};
use tempfile::TempDir;

use wsi_reader::error::{CodecError, IoError, SlideError};
use wsi_reader::format::FormatKind;
use wsi_reader::io::RangeReader;
use wsi_reader::slide::{ResolutionLevel, SlideBackend};
use wsi_reader::tile::{PixelBuffer, SampleType};

// =============================================================================
// Synthetic Image Content
// =============================================================================

/// Sample generator: level-0 position (y, x) and channel to a sample value.
pub type Pattern = fn(u32, u32, u16) -> u16;

/// Busy 8-bit pattern; neighboring pixels differ.
pub fn pattern_u8(y: u32, x: u32, c: u16) -> u16 {
    ((y * 5 + x * 3 + c as u32 * 85) % 256) as u16
}

/// Busy 16-bit pattern using the high byte as well.
pub fn pattern_u16(y: u32, x: u32, c: u16) -> u16 {
    ((y * 131 + x * 7 + c as u32 * 5000) % 65536) as u16
}

/// Slow diagonal ramp that survives lossy compression.
pub fn gradient(y: u32, x: u32, c: u16) -> u16 {
    (((x + y) / 8 + c as u32 * 40) % 256) as u16
}

// =============================================================================
// Mock Range Reader with Read Tracking
// =============================================================================

/// An in-memory range reader that counts reads and honors close.
pub struct CountingReader {
    data: Bytes,
    identifier: String,
    reads: Arc<AtomicUsize>,
    closed: AtomicBool,
}

impl CountingReader {
    pub fn new(data: Vec<u8>, identifier: impl Into<String>) -> Self {
        Self {
            data: Bytes::from(data),
            identifier: identifier.into(),
            reads: Arc::new(AtomicUsize::new(0)),
            closed: AtomicBool::new(false),
        }
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Shared counter, still readable after the reader moved into a backend.
    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.reads)
    }
}

#[async_trait]
impl RangeReader for CountingReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(IoError::Closed);
        }
        self.reads.fetch_add(1, Ordering::SeqCst);

        let start = offset as usize;
        let end = start + len;
        if end > self.data.len() {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: len as u64,
                size: self.data.len() as u64,
            });
        }
        Ok(self.data.slice(start..end))
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

// =============================================================================
// Mock Slide Backend
// =============================================================================

/// A backend serving a synthetic 8-bit pyramid without any file.
///
/// Level pixels sample [`pattern_u8`] at level-0 coordinates. Every decode is
/// counted and can be slowed down to widen race windows.
pub struct MockBackend {
    levels: Vec<ResolutionLevel>,
    decodes: Arc<AtomicUsize>,
    delay: Option<Duration>,
    failing: Option<(usize, u32, u32)>,
}

impl MockBackend {
    /// `height` x `width` x `channels` image with one level per factor.
    pub fn new(height: u32, width: u32, channels: u16, tile: u32, factors: &[u32]) -> Self {
        let levels = factors
            .iter()
            .map(|&f| ResolutionLevel {
                downsample: f,
                width: width / f,
                height: height / f,
                tile_width: tile,
                tile_height: tile,
                channels,
                sample_type: SampleType::U8,
            })
            .collect();
        Self {
            levels,
            decodes: Arc::new(AtomicUsize::new(0)),
            delay: None,
            failing: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing_tile(mut self, level: usize, col: u32, row: u32) -> Self {
        self.failing = Some((level, col, row));
        self
    }

    pub fn decode_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.decodes)
    }
}

#[async_trait]
impl SlideBackend for MockBackend {
    fn format(&self) -> FormatKind {
        FormatKind::GenericTiff
    }

    fn identifier(&self) -> &str {
        "mock://synthetic"
    }

    fn levels(&self) -> &[ResolutionLevel] {
        &self.levels
    }

    async fn decode_tile(
        &self,
        level: usize,
        col: u32,
        row: u32,
    ) -> Result<PixelBuffer, SlideError> {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing == Some((level, col, row)) {
            return Err(SlideError::decode(
                level,
                col,
                row,
                CodecError::Deflate("invalid stored block lengths".to_string()),
            ));
        }

        let info = self
            .levels
            .get(level)
            .copied()
            .ok_or_else(|| SlideError::InvalidRequest(format!("no level {}", level)))?;
        let (w, h) = info
            .tile_extent(col, row)
            .ok_or_else(|| SlideError::InvalidRequest(format!("no tile {},{}", col, row)))?;

        let f = info.downsample;
        let mut data = Vec::with_capacity((w * h) as usize * info.channels as usize);
        for y in 0..h {
            for x in 0..w {
                let y0 = (row * info.tile_height + y) * f;
                let x0 = (col * info.tile_width + x) * f;
                for c in 0..info.channels {
                    data.push(pattern_u8(y0, x0, c) as u8);
                }
            }
        }
        PixelBuffer::from_raw(
            h as usize,
            w as usize,
            info.channels as usize,
            SampleType::U8,
            data,
        )
        .map_err(|e| SlideError::decode(level, col, row, e))
    }
}

// =============================================================================
// TIFF File Builder
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ByteOrderType {
    LittleEndian,
    BigEndian,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TileCompression {
    None,
    Lzw,
    Deflate,
    Jpeg,
    /// Aperio JPEG 2000 with YCbCr components (33003)
    Jpeg2000YCbCr,
    /// Aperio JPEG 2000 with RGB components (33005)
    Jpeg2000Rgb,
}

impl TileCompression {
    fn code(self) -> u16 {
        match self {
            TileCompression::None => 1,
            TileCompression::Lzw => 5,
            TileCompression::Deflate => 8,
            TileCompression::Jpeg => 7,
            TileCompression::Jpeg2000YCbCr => 33003,
            TileCompression::Jpeg2000Rgb => 33005,
        }
    }
}

/// Builder for tiled pyramidal TIFF files.
///
/// Level `i` has the base size divided (rounding up) by its factor, and its
/// pixel (y, x) holds the pattern at level-0 position (y * f, x * f). Tiles
/// are always stored at full nominal size with zero padding on the edges.
pub struct TiffBuilder {
    width: u32,
    height: u32,
    tile: u32,
    factors: Vec<u32>,
    channels: u16,
    sample_type: SampleType,
    compression: TileCompression,
    predictor: bool,
    byte_order: ByteOrderType,
    description: Option<String>,
    label: bool,
    sparse: Vec<(usize, u32, u32)>,
    corrupt: Vec<(usize, u32, u32)>,
    pattern: Pattern,
}

impl TiffBuilder {
    pub fn new(width: u32, height: u32, tile: u32) -> Self {
        Self {
            width,
            height,
            tile,
            factors: vec![1],
            channels: 1,
            sample_type: SampleType::U8,
            compression: TileCompression::None,
            predictor: false,
            byte_order: ByteOrderType::LittleEndian,
            description: None,
            label: false,
            sparse: Vec::new(),
            corrupt: Vec::new(),
            pattern: pattern_u8,
        }
    }

    pub fn levels(mut self, factors: &[u32]) -> Self {
        self.factors = factors.to_vec();
        self
    }

    pub fn channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    /// 16-bit samples; switches the default pattern to [`pattern_u16`].
    pub fn u16_samples(mut self) -> Self {
        self.sample_type = SampleType::U16;
        self.pattern = pattern_u16;
        self
    }

    pub fn compression(mut self, compression: TileCompression) -> Self {
        self.compression = compression;
        self
    }

    pub fn predictor(mut self) -> Self {
        self.predictor = true;
        self
    }

    pub fn byte_order(mut self, order: ByteOrderType) -> Self {
        self.byte_order = order;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Append a small stripped image, like the label of an SVS file.
    pub fn with_label(mut self) -> Self {
        self.label = true;
        self
    }

    pub fn pattern(mut self, pattern: Pattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Store the tile with offset and byte count 0.
    pub fn sparse_tile(mut self, level: usize, col: u32, row: u32) -> Self {
        self.sparse.push((level, col, row));
        self
    }

    /// Store undecodable bytes for the tile.
    pub fn corrupt_tile(mut self, level: usize, col: u32, row: u32) -> Self {
        self.corrupt.push((level, col, row));
        self
    }

    /// Expected sample at level-0 position (y, x).
    pub fn expected(&self, y: u32, x: u32, c: u16) -> u16 {
        (self.pattern)(y, x, c)
    }

    pub fn build(&self) -> Vec<u8> {
        let mut w = TiffWriter {
            order: self.byte_order,
            out: Vec::new(),
        };
        match self.byte_order {
            ByteOrderType::LittleEndian => w.out.extend_from_slice(b"II"),
            ByteOrderType::BigEndian => w.out.extend_from_slice(b"MM"),
        }
        w.u16(42);
        let mut next_pointer = w.out.len();
        w.u32(0);

        let bits = (self.sample_type.size() * 8) as u16;
        let photometric = if self.channels == 1 { 1 } else { 2 };

        for (index, &f) in self.factors.iter().enumerate() {
            let lw = self.width.div_ceil(f);
            let lh = self.height.div_ceil(f);
            let tiles_x = lw.div_ceil(self.tile);
            let tiles_y = lh.div_ceil(self.tile);

            let mut offsets = Vec::new();
            let mut counts = Vec::new();
            for row in 0..tiles_y {
                for col in 0..tiles_x {
                    if self.sparse.contains(&(index, col, row)) {
                        offsets.push(0);
                        counts.push(0);
                        continue;
                    }
                    let bytes = if self.corrupt.contains(&(index, col, row)) {
                        self.corrupt_bytes()
                    } else {
                        self.encode_tile(f, lw, lh, col, row)
                    };
                    w.align();
                    offsets.push(w.out.len() as u32);
                    counts.push(bytes.len() as u32);
                    w.out.extend_from_slice(&bytes);
                }
            }

            let mut entries = vec![
                (254, Value::Long(vec![if index == 0 { 0 } else { 1 }])),
                (256, Value::Long(vec![lw])),
                (257, Value::Long(vec![lh])),
                (258, Value::Short(vec![bits; self.channels as usize])),
                (259, Value::Short(vec![self.compression.code()])),
                (262, Value::Short(vec![photometric])),
                (277, Value::Short(vec![self.channels])),
                (284, Value::Short(vec![1])),
                (322, Value::Short(vec![self.tile as u16])),
                (323, Value::Short(vec![self.tile as u16])),
                (324, Value::Long(offsets)),
                (325, Value::Long(counts)),
                (339, Value::Short(vec![1; self.channels as usize])),
            ];
            if index == 0 {
                if let Some(ref description) = self.description {
                    entries.push((270, Value::Ascii(description.clone())));
                }
            }
            if self.predictor {
                entries.push((317, Value::Short(vec![2])));
            }
            next_pointer = w.ifd(entries, next_pointer);
        }

        if self.label {
            let strip = vec![128u8; 64];
            w.align();
            let strip_offset = w.out.len() as u32;
            w.out.extend_from_slice(&strip);
            let entries = vec![
                (254, Value::Long(vec![0])),
                (256, Value::Long(vec![8])),
                (257, Value::Long(vec![8])),
                (258, Value::Short(vec![8])),
                (259, Value::Short(vec![1])),
                (262, Value::Short(vec![1])),
                (273, Value::Long(vec![strip_offset])),
                (277, Value::Short(vec![1])),
                (278, Value::Long(vec![8])),
                (279, Value::Long(vec![64])),
            ];
            w.ifd(entries, next_pointer);
        }

        w.out
    }

    /// Write the file into a fresh temporary directory.
    pub fn write(&self, name: &str) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(name);
        std::fs::write(&path, self.build()).unwrap();
        (dir, path)
    }

    fn corrupt_bytes(&self) -> Vec<u8> {
        match self.compression {
            // Shorter than a full tile
            TileCompression::None => vec![7u8; 3],
            _ => vec![0x13; 48],
        }
    }

    fn encode_tile(&self, f: u32, lw: u32, lh: u32, col: u32, row: u32) -> Vec<u8> {
        let tile = self.tile;
        let channels = self.channels;
        let mut samples: Vec<u16> = Vec::with_capacity((tile * tile) as usize * channels as usize);
        for y in 0..tile {
            for x in 0..tile {
                let ly = row * tile + y;
                let lx = col * tile + x;
                for c in 0..channels {
                    let value = if ly < lh && lx < lw {
                        (self.pattern)(ly * f, lx * f, c)
                    } else {
                        0
                    };
                    samples.push(value);
                }
            }
        }

        let row_len = (tile * channels as u32) as usize;
        let raw = match self.sample_type {
            SampleType::U8 => {
                let mut bytes: Vec<u8> = samples.iter().map(|&v| v as u8).collect();
                match self.compression {
                    TileCompression::Jpeg => return encode_jpeg(bytes, tile, channels),
                    TileCompression::Jpeg2000YCbCr => {
                        rgb_to_ycbcr(&mut bytes);
                        return encode_jpeg2000(
                            &bytes,
                            tile,
                            tile,
                            channels,
                            3,
                            None,
                            J2kContainer::Codestream,
                        );
                    }
                    TileCompression::Jpeg2000Rgb => {
                        return encode_jpeg2000(
                            &bytes,
                            tile,
                            tile,
                            channels,
                            3,
                            None,
                            J2kContainer::Codestream,
                        )
                    }
                    _ => {}
                }
                if self.predictor {
                    difference(&mut bytes, row_len, channels as usize, u8::wrapping_sub);
                }
                bytes
            }
            SampleType::U16 => {
                if self.predictor {
                    difference(&mut samples, row_len, channels as usize, u16::wrapping_sub);
                }
                let mut bytes = Vec::with_capacity(samples.len() * 2);
                for v in samples {
                    match self.byte_order {
                        ByteOrderType::LittleEndian => bytes.extend_from_slice(&v.to_le_bytes()),
                        ByteOrderType::BigEndian => bytes.extend_from_slice(&v.to_be_bytes()),
                    }
                }
                bytes
            }
            other => panic!("builder does not write {} samples", other.name()),
        };

        match self.compression {
            TileCompression::Deflate => {
                let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
                encoder.write_all(&raw).unwrap();
                encoder.finish().unwrap()
            }
            TileCompression::Lzw => {
                weezl::encode::Encoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8)
                    .encode(&raw)
                    .unwrap()
            }
            _ => raw,
        }
    }
}

/// Horizontal differencing, applied right to left within each row.
fn difference<T: Copy>(samples: &mut [T], row_len: usize, channels: usize, sub: fn(T, T) -> T) {
    for row in samples.chunks_exact_mut(row_len) {
        for i in (channels..row_len).rev() {
            row[i] = sub(row[i], row[i - channels]);
        }
    }
}

/// Full-range (JFIF) RGB to YCbCr, in place on interleaved triplets.
fn rgb_to_ycbcr(bytes: &mut [u8]) {
    for px in bytes.chunks_exact_mut(3) {
        let (r, g, b) = (px[0] as f32, px[1] as f32, px[2] as f32);
        let y = 0.299 * r + 0.587 * g + 0.114 * b;
        let cb = 128.0 - 0.168_736 * r - 0.331_264 * g + 0.5 * b;
        let cr = 128.0 + 0.5 * r - 0.418_688 * g - 0.081_312 * b;
        px[0] = y.round().clamp(0.0, 255.0) as u8;
        px[1] = cb.round().clamp(0.0, 255.0) as u8;
        px[2] = cr.round().clamp(0.0, 255.0) as u8;
    }
}

fn encode_jpeg(bytes: Vec<u8>, tile: u32, channels: u16) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, 95);
    match channels {
        1 => encoder
            .encode_image(&GrayImage::from_raw(tile, tile, bytes).unwrap())
            .unwrap(),
        3 => encoder
            .encode_image(&RgbImage::from_raw(tile, tile, bytes).unwrap())
            .unwrap(),
        n => panic!("builder does not write {}-channel JPEG tiles", n),
    }
    buf
}

// =============================================================================
// JPEG 2000 Encoding
// =============================================================================

/// Container written by [`encode_jpeg2000`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum J2kContainer {
    /// Bare codestream, starting with SOC
    Codestream,
    /// JP2 boxes around the codestream
    Jp2,
}

/// Interleaved 8-bit samples of `pattern` over a `width x height` image.
pub fn sample_image(width: u32, height: u32, channels: u16, pattern: Pattern) -> Vec<u8> {
    let mut out = Vec::with_capacity((width * height) as usize * channels as usize);
    for y in 0..height {
        for x in 0..width {
            for c in 0..channels {
                out.push(pattern(y, x, c) as u8);
            }
        }
    }
    out
}

/// Losslessly encode interleaved 8-bit `samples` with OpenJPEG.
///
/// `resolutions` counts resolution levels (decompositions + 1). With `tile`
/// set, the codestream is split into square tiles of that size.
pub fn encode_jpeg2000(
    samples: &[u8],
    width: u32,
    height: u32,
    channels: u16,
    resolutions: u32,
    tile: Option<u32>,
    container: J2kContainer,
) -> Vec<u8> {
    use openjpeg_sys as opj;
    use std::ffi::CString;

    let pixels = (width * height) as usize;
    assert_eq!(samples.len(), pixels * channels as usize);

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("encoded");
    let c_path = CString::new(path.to_str().unwrap()).unwrap();

    let mut components: Vec<opj::opj_image_cmptparm_t> = (0..channels)
        .map(|_| opj::opj_image_cmptparm_t {
            dx: 1,
            dy: 1,
            w: width,
            h: height,
            x0: 0,
            y0: 0,
            prec: 8,
            bpp: 8,
            sgnd: 0,
        })
        .collect();
    let color_space = if channels >= 3 {
        opj::COLOR_SPACE::OPJ_CLRSPC_SRGB
    } else {
        opj::COLOR_SPACE::OPJ_CLRSPC_GRAY
    };
    let format = match container {
        J2kContainer::Codestream => opj::CODEC_FORMAT::OPJ_CODEC_J2K,
        J2kContainer::Jp2 => opj::CODEC_FORMAT::OPJ_CODEC_JP2,
    };

    unsafe {
        let image = opj::opj_image_create(channels as u32, components.as_mut_ptr(), color_space);
        assert!(!image.is_null(), "opj_image_create failed");
        (*image).x0 = 0;
        (*image).y0 = 0;
        (*image).x1 = width;
        (*image).y1 = height;
        for c in 0..channels as usize {
            let comp = &mut *(*image).comps.add(c);
            let plane = std::slice::from_raw_parts_mut(comp.data, pixels);
            for (i, value) in plane.iter_mut().enumerate() {
                *value = samples[i * channels as usize + c] as i32;
            }
        }

        let mut params: opj::opj_cparameters_t = std::mem::zeroed();
        opj::opj_set_default_encoder_parameters(&mut params);
        params.tcp_numlayers = 1;
        params.tcp_rates[0] = 0.0;
        params.cp_disto_alloc = 1;
        params.numresolution = resolutions as i32;
        params.tcp_mct = if channels >= 3 { 1 } else { 0 };
        if let Some(tile) = tile {
            params.tile_size_on = 1;
            params.cp_tdx = tile as i32;
            params.cp_tdy = tile as i32;
        }

        let codec = opj::opj_create_compress(format);
        assert!(!codec.is_null(), "opj_create_compress failed");
        let stream = opj::opj_stream_create_default_file_stream(c_path.as_ptr(), 0);
        assert!(!stream.is_null(), "cannot open {}", path.display());

        let encoded = opj::opj_setup_encoder(codec, &mut params, image) == 1
            && opj::opj_start_compress(codec, image, stream) == 1
            && opj::opj_encode(codec, stream) == 1
            && opj::opj_end_compress(codec, stream) == 1;

        opj::opj_stream_destroy(stream);
        opj::opj_destroy_codec(codec);
        opj::opj_image_destroy(image);
        assert!(encoded, "JPEG 2000 encoding failed");
    }

    std::fs::read(&path).unwrap()
}

enum Value {
    Short(Vec<u16>),
    Long(Vec<u32>),
    Ascii(String),
}

struct TiffWriter {
    order: ByteOrderType,
    out: Vec<u8>,
}

impl TiffWriter {
    fn u16(&mut self, value: u16) {
        match self.order {
            ByteOrderType::LittleEndian => self.out.extend_from_slice(&value.to_le_bytes()),
            ByteOrderType::BigEndian => self.out.extend_from_slice(&value.to_be_bytes()),
        }
    }

    fn u32(&mut self, value: u32) {
        match self.order {
            ByteOrderType::LittleEndian => self.out.extend_from_slice(&value.to_le_bytes()),
            ByteOrderType::BigEndian => self.out.extend_from_slice(&value.to_be_bytes()),
        }
    }

    fn patch_u32(&mut self, pos: usize, value: u32) {
        let bytes = match self.order {
            ByteOrderType::LittleEndian => value.to_le_bytes(),
            ByteOrderType::BigEndian => value.to_be_bytes(),
        };
        self.out[pos..pos + 4].copy_from_slice(&bytes);
    }

    fn align(&mut self) {
        if self.out.len() % 2 == 1 {
            self.out.push(0);
        }
    }

    fn encode(&self, value: &Value) -> (u16, u32, Vec<u8>) {
        let mut w = TiffWriter {
            order: self.order,
            out: Vec::new(),
        };
        match value {
            Value::Short(values) => {
                values.iter().for_each(|&v| w.u16(v));
                (3, values.len() as u32, w.out)
            }
            Value::Long(values) => {
                values.iter().for_each(|&v| w.u32(v));
                (4, values.len() as u32, w.out)
            }
            Value::Ascii(text) => {
                let mut bytes = text.as_bytes().to_vec();
                bytes.push(0);
                (2, bytes.len() as u32, bytes)
            }
        }
    }

    /// Write one IFD, link it from `pointer_pos` and return the position of
    /// its own next-IFD pointer.
    fn ifd(&mut self, mut entries: Vec<(u16, Value)>, pointer_pos: usize) -> usize {
        entries.sort_by_key(|(tag, _)| *tag);

        let mut encoded = Vec::with_capacity(entries.len());
        for (tag, value) in &entries {
            let (field_type, count, bytes) = self.encode(value);
            let field = if bytes.len() > 4 {
                self.align();
                let offset = self.out.len() as u32;
                self.out.extend_from_slice(&bytes);
                let mut w = TiffWriter {
                    order: self.order,
                    out: Vec::new(),
                };
                w.u32(offset);
                w.out
            } else {
                let mut inline = bytes;
                inline.resize(4, 0);
                inline
            };
            encoded.push((*tag, field_type, count, field));
        }

        self.align();
        let ifd_pos = self.out.len() as u32;
        self.patch_u32(pointer_pos, ifd_pos);

        self.u16(encoded.len() as u16);
        for (tag, field_type, count, field) in encoded {
            self.u16(tag);
            self.u16(field_type);
            self.u32(count);
            self.out.extend_from_slice(&field);
        }
        let next = self.out.len();
        self.u32(0);
        next
    }
}
