//! # WSI Reader
//!
//! Random-access reads of pyramidal Whole Slide Images (WSI).
//!
//! A slide is opened once; afterwards any strided region of the
//! full-resolution image can be read. Each read picks the pyramid level that
//! matches its stride, decodes only the tiles the region touches and caches
//! them, so overlapping reads share work.
//!
//! ## Features
//!
//! - **Formats**: Aperio SVS and tiled pyramidal TIFF/BigTIFF (uncompressed,
//!   Deflate, JPEG, Aperio JPEG 2000 tiles), standalone JP2/J2K files
//! - **Strided reads**: slice semantics on both axes, out-of-bounds areas
//!   filled with a configurable value
//! - **Tile cache**: byte-bounded LRU with single-flight decoding and pinning
//! - **Concurrency**: every operation takes `&self`; share a [`Slide`]
//!   through `Arc` and read from many tasks
//!
//! ## Architecture
//!
//! - [`io`] - byte range access to slide files
//! - [`mod@format`] - format detection, TIFF and JPEG 2000 parsing, tile codecs
//! - [`slide`] - the [`Slide`] handle, backends and pyramid index
//! - [`tile`] - pixel buffers, read planning, tile cache and stitching
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use wsi_reader::{AxisSlice, Slide};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), wsi_reader::SlideError> {
//!     let slide = Slide::open("sample.svs").await?;
//!     let (height, width, channels) = slide.shape();
//!     println!("{} x {} x {}, scales {:?}", height, width, channels, slide.scales());
//!
//!     // A 512x512 region at full resolution
//!     let region = slide
//!         .read(AxisSlice::range(1000, 1512), AxisSlice::range(2000, 2512))
//!         .await?;
//!     assert_eq!(region.shape(), (512, 512, channels));
//!
//!     slide.close().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod format;
pub mod io;
pub mod slide;
pub mod tile;

// Re-export commonly used types
pub use error::{CodecError, FormatError, IoError, Jp2Error, SlideError, TiffError};
pub use format::{probe, FormatKind, Jp2Backend, TiffBackend};
pub use io::{LocalFileReader, MemoryReader, RangeReader};
pub use slide::{Backend, PyramidIndex, ResolutionLevel, Slide, SlideBackend, SlideOptions};
pub use tile::{
    AxisSlice, CacheStats, PixelBuffer, SampleType, TileCache, TileKey, TileRef,
    DEFAULT_TILE_CACHE_CAPACITY,
};
