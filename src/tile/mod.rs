//! Tile layer: pixel buffers, read planning, caching and stitching.
//!
//! # Architecture
//!
//! A read flows through this module in three steps:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │   plan_read: slices -> level + tiles    │
//! └────────────────────┬────────────────────┘
//!                      │  FetchPlan
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │  TileCache::get_or_decode (per tile)    │
//! │  single flight, LRU by bytes, pinning   │
//! └────────────────────┬────────────────────┘
//!                      │  TileRef
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │  stitch_tile: sampled copy into output  │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`PixelBuffer`]: interleaved native-endian pixels, for tiles and results
//! - [`AxisSlice`] / [`plan_read`]: strided request to [`FetchPlan`]
//! - [`TileCache`]: decoded tiles keyed by [`TileKey`]
//! - [`stitch_tile`]: copies a tile's sampled pixels into the output

mod buffer;
mod cache;
mod planner;
mod stitcher;

pub use buffer::{PixelBuffer, SampleType};
pub use cache::{CacheStats, TileCache, TileKey, TileRef, DEFAULT_TILE_CACHE_CAPACITY};
pub use planner::{
    plan_read, AxisPlan, AxisRun, AxisSlice, AxisSpan, FetchPlan, TileFetch, TileWindow,
};
pub use stitcher::{allocate_output, stitch_tile};
