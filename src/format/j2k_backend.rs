//! JPEG 2000 backend.
//!
//! A standalone JP2 file or bare codestream is one image whose wavelet
//! decomposition is the pyramid: resolution reduction `r` halves each
//! dimension `r` times. Levels are exposed as a virtual tile grid so the
//! planner and cache treat them exactly like TIFF tiles; each virtual tile
//! is decoded as an OpenJPEG region at the matching reduction.
//!
//! The codestream is read through the handle's [`RangeReader`] on the first
//! decode and kept for the life of the handle. OpenJPEG then recognizes it
//! from its leading marker, whatever the file is called.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::{CodecError, SlideError};
use crate::io::{LocalFileReader, RangeReader};
use crate::slide::{check_tile_key, ResolutionLevel, SlideBackend};
use crate::tile::{PixelBuffer, SampleType};

use super::detect::FormatKind;
use super::jp2::{decode_region, find_codestream, CodestreamInfo};

/// Upper bound on the virtual tile edge.
pub const MAX_VIRTUAL_TILE: u32 = 1024;

/// Backend for JP2 files and raw JPEG 2000 codestreams.
pub struct Jp2Backend<R = LocalFileReader> {
    reader: R,
    format: FormatKind,
    info: CodestreamInfo,
    levels: Vec<ResolutionLevel>,

    /// File range of the codestream
    codestream_offset: u64,
    codestream_len: u64,
    codestream: OnceCell<Bytes>,

    closed: AtomicBool,
}

impl<R: RangeReader> Jp2Backend<R> {
    /// Read the codestream header in `reader` and derive its levels.
    ///
    /// `reader` is held until [`close`](SlideBackend::close).
    pub async fn open(reader: R, format: FormatKind) -> Result<Self, SlideError> {
        let (offset, len) = match format {
            FormatKind::Jp2 => {
                let header = find_codestream(&reader).await?;
                (header.content_offset, header.content_len)
            }
            FormatKind::J2kCodestream => (0, reader.size()),
            other => {
                return Err(SlideError::unsupported(format!(
                    "{} is not a JPEG 2000 format",
                    other.name()
                )))
            }
        };

        let info = CodestreamInfo::read(&reader, offset).await?;
        info.check_supported()?;
        let levels = resolution_levels(&info)?;

        debug!(
            slide = reader.identifier(),
            width = info.width,
            height = info.height,
            components = info.components.len(),
            precision = info.precision(),
            decomposition_levels = info.decomposition_levels,
            codestream_offset = offset,
            codestream_len = len,
            "opened JPEG 2000 codestream"
        );

        Ok(Self {
            reader,
            format,
            info,
            levels,
            codestream_offset: offset,
            codestream_len: len,
            codestream: OnceCell::new(),
            closed: AtomicBool::new(false),
        })
    }

    /// Main-header geometry of the codestream.
    pub fn info(&self) -> &CodestreamInfo {
        &self.info
    }

    /// Get a reference to the underlying reader.
    pub fn reader(&self) -> &R {
        &self.reader
    }

    /// The codestream bytes, read on first use.
    async fn codestream(&self) -> Result<&Bytes, SlideError> {
        self.codestream
            .get_or_try_init(|| async {
                let len = usize::try_from(self.codestream_len).map_err(|_| {
                    SlideError::unsupported(format!(
                        "codestream of {} bytes does not fit in memory",
                        self.codestream_len
                    ))
                })?;
                let bytes = self.reader.read_exact_at(self.codestream_offset, len).await?;
                debug!(
                    slide = self.reader.identifier(),
                    bytes = len,
                    "loaded JPEG 2000 codestream"
                );
                Ok::<_, SlideError>(bytes)
            })
            .await
    }
}

/// One level per resolution reduction, finest first.
fn resolution_levels(info: &CodestreamInfo) -> Result<Vec<ResolutionLevel>, SlideError> {
    let channels = info.components.len();
    if !(1..=4).contains(&channels) {
        return Err(SlideError::unsupported(format!(
            "{} components per pixel",
            channels
        )));
    }
    let sample_type = match info.precision() {
        0..=8 => SampleType::U8,
        9..=16 => SampleType::U16,
        _ => SampleType::U32,
    };

    let levels = (0..=info.decomposition_levels.min(31) as u32)
        .map(|r| {
            let scale = 1u32 << r;
            ResolutionLevel {
                downsample: scale,
                width: info.width.div_ceil(scale),
                height: info.height.div_ceil(scale),
                tile_width: (info.tile_width >> r).clamp(1, MAX_VIRTUAL_TILE),
                tile_height: (info.tile_height >> r).clamp(1, MAX_VIRTUAL_TILE),
                channels: channels as u16,
                sample_type,
            }
        })
        .collect();
    Ok(levels)
}

#[async_trait]
impl<R: RangeReader> SlideBackend for Jp2Backend<R> {
    fn format(&self) -> FormatKind {
        self.format
    }

    fn identifier(&self) -> &str {
        self.reader.identifier()
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
        let (info, width, height) = check_tile_key(&self.levels, level, col, row)?;
        if self.closed.load(Ordering::Acquire) {
            return Err(SlideError::Closed);
        }

        // Tile rectangle on the full-resolution reference grid
        let scale = info.downsample as u64;
        let x0 = col as u64 * info.tile_width as u64;
        let y0 = row as u64 * info.tile_height as u64;
        let to_grid = |v: u64, limit: u32| (v * scale).min(limit as u64) as u32;
        let (gx0, gy0) = (to_grid(x0, self.info.width), to_grid(y0, self.info.height));
        let gx1 = to_grid(x0 + width as u64, self.info.width);
        let gy1 = to_grid(y0 + height as u64, self.info.height);

        let codestream = self.codestream().await.map_err(|e| match e {
            SlideError::Io(io) => SlideError::decode(level, col, row, CodecError::Io(io)),
            other => other,
        })?;
        let planes = decode_region(codestream, level as u32, gx0, gy0, gx1, gy1)
            .map_err(|e| SlideError::decode(level, col, row, e))?;
        let samples = planes
            .interleave(info.channels as usize, info.sample_type)
            .map_err(|e| SlideError::decode(level, col, row, e))?;
        let region = PixelBuffer::from_raw(
            planes.height as usize,
            planes.width as usize,
            info.channels as usize,
            info.sample_type,
            samples,
        )
        .map_err(|e| SlideError::decode(level, col, row, e))?;

        if region.width < width as usize || region.height < height as usize {
            let expected = width as usize * height as usize * region.pixel_stride();
            return Err(SlideError::decode(
                level,
                col,
                row,
                CodecError::SizeMismatch {
                    expected,
                    actual: region.byte_len(),
                },
            ));
        }
        Ok(region.crop(0, 0, width as usize, height as usize))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.reader.close().await;
    }
}
