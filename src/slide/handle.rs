//! The slide handle: open, inspect, read, close.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::SlideError;
use crate::format::{probe, FormatKind, Jp2Backend, TiffBackend};
use crate::io::{LocalFileReader, RangeReader};
use crate::tile::{
    allocate_output, plan_read, stitch_tile, AxisSlice, PixelBuffer, SampleType, TileCache,
    TileKey, TileRef, DEFAULT_TILE_CACHE_CAPACITY,
};

use super::index::PyramidIndex;
use super::reader::{ResolutionLevel, SlideBackend};

// =============================================================================
// Options
// =============================================================================

/// Tunables for an open slide.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlideOptions {
    /// Tile cache capacity in bytes of decoded pixels
    pub cache_capacity: usize,

    /// Value written for output pixels outside the image
    pub fill_value: f64,
}

impl Default for SlideOptions {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_TILE_CACHE_CAPACITY,
            fill_value: 0.0,
        }
    }
}

// =============================================================================
// Backend dispatch
// =============================================================================

/// The backends [`Slide::open`] can pick, chosen once from the file
/// signature.
pub enum Backend {
    Tiff(TiffBackend),
    Jpeg2000(Jp2Backend),
}

impl Backend {
    /// Probe `path` and open the matching backend.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SlideError> {
        let reader = LocalFileReader::open(path.as_ref()).await?;
        let format = probe(&reader).await?;

        if format.is_tiff() {
            Ok(Backend::Tiff(TiffBackend::open(reader, format).await?))
        } else {
            Ok(Backend::Jpeg2000(Jp2Backend::open(reader, format).await?))
        }
    }
}

#[async_trait]
impl SlideBackend for Backend {
    fn format(&self) -> FormatKind {
        match self {
            Backend::Tiff(b) => b.format(),
            Backend::Jpeg2000(b) => b.format(),
        }
    }

    fn identifier(&self) -> &str {
        match self {
            Backend::Tiff(b) => b.identifier(),
            Backend::Jpeg2000(b) => b.identifier(),
        }
    }

    fn levels(&self) -> &[ResolutionLevel] {
        match self {
            Backend::Tiff(b) => b.levels(),
            Backend::Jpeg2000(b) => b.levels(),
        }
    }

    async fn decode_tile(
        &self,
        level: usize,
        col: u32,
        row: u32,
    ) -> Result<PixelBuffer, SlideError> {
        match self {
            Backend::Tiff(b) => b.decode_tile(level, col, row).await,
            Backend::Jpeg2000(b) => b.decode_tile(level, col, row).await,
        }
    }

    async fn close(&self) {
        match self {
            Backend::Tiff(b) => b.close().await,
            Backend::Jpeg2000(b) => b.close().await,
        }
    }
}

// =============================================================================
// Slide
// =============================================================================

/// An open pyramidal image.
///
/// All methods take `&self`; share a slide between tasks with `Arc` and
/// issue reads concurrently. Reads that need the same tile share one decode.
pub struct Slide<B: SlideBackend = Backend> {
    backend: B,
    index: PyramidIndex,
    cache: TileCache,
    fill_value: f64,
    closed: AtomicBool,
}

impl Slide<Backend> {
    /// Open the slide at `path` with default options.
    ///
    /// # Errors
    ///
    /// - [`SlideError::FileNotFound`] when `path` does not exist
    /// - [`SlideError::UnsupportedFormat`] when no backend recognizes the file
    /// - [`SlideError::CorruptPyramid`] when the levels are missing or
    ///   inconsistent
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SlideError> {
        Self::open_with(path, SlideOptions::default()).await
    }

    /// Open the slide at `path`.
    pub async fn open_with(
        path: impl AsRef<Path>,
        options: SlideOptions,
    ) -> Result<Self, SlideError> {
        let backend = Backend::open(path).await?;
        match Self::from_backend(backend, options) {
            Ok(slide) => Ok(slide),
            Err((backend, err)) => {
                backend.close().await;
                Err(err)
            }
        }
    }
}

impl<B: SlideBackend> Slide<B> {
    /// Wrap an already opened backend, validating its levels.
    ///
    /// On failure the backend is handed back with the error.
    pub fn from_backend(backend: B, options: SlideOptions) -> Result<Self, (B, SlideError)> {
        let index = match PyramidIndex::build(backend.levels()) {
            Ok(index) => index,
            Err(err) => return Err((backend, err)),
        };

        let (height, width, channels) = index.shape();
        info!(
            slide = backend.identifier(),
            format = backend.format().name(),
            levels = index.level_count(),
            height,
            width,
            channels,
            sample_type = index.sample_type().name(),
            "opened slide"
        );

        Ok(Self {
            backend,
            index,
            cache: TileCache::with_capacity(options.cache_capacity),
            fill_value: options.fill_value,
            closed: AtomicBool::new(false),
        })
    }

    /// (height, width, channels) at full resolution.
    pub fn shape(&self) -> (usize, usize, usize) {
        self.index.shape()
    }

    /// Downsample factors of the stored levels, ascending, starting at 1.
    pub fn scales(&self) -> Vec<u32> {
        self.index.scales()
    }

    pub fn levels(&self) -> &[ResolutionLevel] {
        self.index.levels()
    }

    pub fn index(&self) -> &PyramidIndex {
        &self.index
    }

    pub fn format(&self) -> FormatKind {
        self.backend.format()
    }

    pub fn sample_type(&self) -> SampleType {
        self.index.sample_type()
    }

    pub fn identifier(&self) -> &str {
        self.backend.identifier()
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn fill_value(&self) -> f64 {
        self.fill_value
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Read a strided region given in level-0 pixel coordinates.
    ///
    /// The output has `rows` x `cols` slice-length shape. Positions outside
    /// the image hold the fill value. Any tile decode failure fails the
    /// whole read.
    pub async fn read(&self, rows: AxisSlice, cols: AxisSlice) -> Result<PixelBuffer, SlideError> {
        self.ensure_open()?;
        let plan = plan_read(&self.index, &rows, &cols)?;

        debug!(
            slide = self.identifier(),
            rows = %rows,
            cols = %cols,
            level = plan.level,
            tiles = plan.tiles.len(),
            "planned read"
        );

        let mut output = allocate_output(&plan, self.fill_value)?;
        for fetch in &plan.tiles {
            let tile = self.tile(fetch.key).await?;
            stitch_tile(&mut output, &plan, fetch, &tile)?;
        }
        Ok(output)
    }

    /// Decoded tile for `key`, through the cache.
    pub async fn tile(&self, key: TileKey) -> Result<TileRef, SlideError> {
        self.ensure_open()?;
        let tile = self
            .cache
            .get_or_decode(key, || {
                self.backend.decode_tile(key.level, key.col, key.row)
            })
            .await
            .map_err(|err| {
                warn!(
                    slide = self.identifier(),
                    level = key.level,
                    col = key.col,
                    row = key.row,
                    error = %err,
                    "tile decode failed"
                );
                err
            })?;

        // A decode that finished while `close` ran may have cached its tile
        // after the cache was drained.
        if self.is_closed() {
            drop(tile);
            self.cache.clear().await;
            return Err(SlideError::Closed);
        }
        Ok(tile)
    }

    /// Close the slide. Later reads fail with [`SlideError::Closed`];
    /// metadata stays available. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.backend.close().await;
        self.cache.clear().await;
        debug!(slide = self.identifier(), "closed slide");
    }

    fn ensure_open(&self) -> Result<(), SlideError> {
        if self.is_closed() {
            Err(SlideError::Closed)
        } else {
            Ok(())
        }
    }
}

impl<R: RangeReader> Slide<TiffBackend<R>> {
    /// Open a tiled TIFF slide from any [`RangeReader`].
    pub async fn open_tiff(reader: R, options: SlideOptions) -> Result<Self, SlideError> {
        let format = probe(&reader).await?;
        if !format.is_tiff() {
            return Err(SlideError::unsupported(format!(
                "{} is not a TIFF format",
                format.name()
            )));
        }
        let backend = TiffBackend::open(reader, format).await?;
        match Self::from_backend(backend, options) {
            Ok(slide) => Ok(slide),
            Err((backend, err)) => {
                backend.close().await;
                Err(err)
            }
        }
    }
}

impl<R: RangeReader> Slide<Jp2Backend<R>> {
    /// Open a JP2 file or raw JPEG 2000 codestream from any [`RangeReader`].
    pub async fn open_jpeg2000(reader: R, options: SlideOptions) -> Result<Self, SlideError> {
        let format = probe(&reader).await?;
        let backend = Jp2Backend::open(reader, format).await?;
        match Self::from_backend(backend, options) {
            Ok(slide) => Ok(slide),
            Err((backend, err)) => {
                backend.close().await;
                Err(err)
            }
        }
    }
}
