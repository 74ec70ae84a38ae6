//! Slide abstraction layer.
//!
//! This module ties a format backend to the tile layer and exposes the
//! public handle, [`Slide`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │                 Slide                   │
//! │  open / shape / scales / read / close   │
//! └────────────────────┬────────────────────┘
//!                      │
//!          ┌───────────┴───────────┐
//!          ▼                       ▼
//! ┌─────────────────┐    ┌─────────────────────┐
//! │  PyramidIndex   │    │     TileCache       │
//! │ (level choice)  │    │ (decoded tiles)     │
//! └─────────────────┘    └──────────┬──────────┘
//!                                   │ miss
//!                                   ▼
//! ┌─────────────────────────────────────────┐
//! │           SlideBackend Trait            │
//! └────────────────────┬────────────────────┘
//!          ┌───────────┴───────────┐
//!          ▼                       ▼
//! ┌─────────────────┐    ┌─────────────────────┐
//! │   TiffBackend   │    │     Jp2Backend      │
//! │ (SVS, tiled TIF)│    │ (JP2, J2K)          │
//! └─────────────────┘    └─────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use wsi_reader::slide::Slide;
//! use wsi_reader::tile::AxisSlice;
//!
//! let slide = Slide::open("sample.svs").await?;
//! let (height, width, channels) = slide.shape();
//!
//! // Every 16th pixel of the whole image
//! let thumb = slide
//!     .read(AxisSlice::full().with_step(16), AxisSlice::full().with_step(16))
//!     .await?;
//!
//! slide.close().await;
//! ```

mod handle;
mod index;
mod reader;

pub use handle::{Backend, Slide, SlideOptions};
pub use index::PyramidIndex;
pub use reader::{ResolutionLevel, SlideBackend};

pub(crate) use reader::check_tile_key;
