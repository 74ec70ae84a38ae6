//! TIFF parsing for pyramidal slides.
//!
//! # Key Concepts
//!
//! - **Byte order**: TIFF files declare their endianness (II = little-endian, MM = big-endian)
//!   in the header. All multi-byte values, including uncompressed samples, follow it.
//!
//! - **Classic TIFF vs BigTIFF**: Classic TIFF uses 32-bit offsets (max 4GB files),
//!   while BigTIFF uses 64-bit offsets. The parser handles both transparently.
//!
//! - **IFD (Image File Directory)**: Contains metadata and pointers to image data.
//!   Each tiled IFD is one pyramid level; labels, macros and thumbnails are skipped.
//!
//! - **Inline vs offset values**: Small values are stored inline in the IFD entry,
//!   larger values are stored at an offset pointed to by the entry.

mod parser;
mod pyramid;
mod tags;
mod validation;
mod values;

pub use parser::{ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};
pub use pyramid::{read_description, read_header, read_ifd, PyramidLevel, TiffPyramid, TileData};
pub use tags::{Compression, FieldType, Photometric, TiffTag};
pub use validation::{validate_level, validate_pyramid, LevelLayout, ValidationError};
pub use values::{parse_u64_array, ValueReader};
