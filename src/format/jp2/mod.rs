//! JPEG 2000 container and codestream support.
//!
//! Header parsing is done here on top of [`RangeReader`](crate::io::RangeReader)
//! so geometry is known without decoding; pixels come from OpenJPEG through
//! the `jpeg2k` crate.

mod boxes;
mod codestream;
mod decode;

pub use boxes::{find_codestream, read_box_header, BoxHeader, JP2C};
pub use codestream::{CodestreamInfo, ComponentInfo};
pub use decode::{decode_bytes, decode_region, ComponentPlanes};
