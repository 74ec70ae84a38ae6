//! Container parsers, codecs and the backends built on them.
//!
//! # Format Detection
//!
//! Use [`probe`] to identify the container held by a reader. Supported
//! formats:
//!
//! - **Aperio SVS**: tiled TIFF with an "Aperio" ImageDescription
//! - **Generic pyramidal TIFF**: any other tiled TIFF or BigTIFF
//! - **JPEG 2000**: JP2 files and bare codestreams
//!
//! # Backends
//!
//! - [`TiffBackend`]: tiled TIFF levels, tiles decoded by [`TileCodec`]
//! - [`Jp2Backend`]: wavelet resolutions of one JPEG 2000 image

pub mod codec;
pub mod detect;
pub mod j2k_backend;
pub mod jp2;
pub mod jpeg;
pub mod tiff;
pub mod tiff_backend;

pub use codec::TileCodec;
pub use detect::{detect_jpeg2000, is_tiff_header, probe, FormatKind};
pub use j2k_backend::Jp2Backend;
pub use jpeg::{is_abbreviated_stream, is_complete_stream, merge_jpeg_tables, prepare_tile_jpeg};
pub use tiff_backend::TiffBackend;
