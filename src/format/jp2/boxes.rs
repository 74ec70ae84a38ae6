//! JP2 box walking.
//!
//! A JP2 file is a sequence of boxes:
//!
//! ```text
//! LBox  u32   box length including header (0 = to end of file, 1 = XLBox follows)
//! TBox  [u8; 4]  box type
//! XLBox u64   extended length, present when LBox == 1
//! ```
//!
//! The pixels live in the contiguous codestream box `jp2c`.

use crate::error::Jp2Error;
use crate::io::RangeReader;

/// Type of the contiguous codestream box.
pub const JP2C: [u8; 4] = *b"jp2c";

/// Upper bound on top-level boxes examined before giving up.
const MAX_BOXES: usize = 64;

/// Header of one box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxHeader {
    pub box_type: [u8; 4],

    /// File offset of the box content
    pub content_offset: u64,

    /// Length of the box content
    pub content_len: u64,
}

/// Read the box header at `offset`.
pub async fn read_box_header<R: RangeReader>(
    reader: &R,
    offset: u64,
) -> Result<BoxHeader, Jp2Error> {
    let size = reader.size();
    let invalid = |message: String| Jp2Error::InvalidBox { offset, message };

    if offset + 8 > size {
        return Err(invalid("box header extends past end of file".to_string()));
    }
    let head = reader.read_exact_at(offset, 8).await?;
    let lbox = u32::from_be_bytes([head[0], head[1], head[2], head[3]]) as u64;
    let box_type = [head[4], head[5], head[6], head[7]];

    let (header_len, total_len) = match lbox {
        0 => (8, size - offset),
        1 => {
            if offset + 16 > size {
                return Err(invalid("extended length extends past end of file".to_string()));
            }
            let ext = reader.read_exact_at(offset + 8, 8).await?;
            let xl = u64::from_be_bytes([
                ext[0], ext[1], ext[2], ext[3], ext[4], ext[5], ext[6], ext[7],
            ]);
            (16, xl)
        }
        len => (8, len),
    };

    if total_len < header_len {
        return Err(invalid(format!("length {} is shorter than its header", total_len)));
    }
    if offset.saturating_add(total_len) > size {
        return Err(invalid(format!(
            "length {} extends past end of file ({} bytes)",
            total_len, size
        )));
    }

    Ok(BoxHeader {
        box_type,
        content_offset: offset + header_len,
        content_len: total_len - header_len,
    })
}

/// Locate the codestream box among the top-level boxes.
pub async fn find_codestream<R: RangeReader>(reader: &R) -> Result<BoxHeader, Jp2Error> {
    let mut offset = 0;
    for _ in 0..MAX_BOXES {
        if offset >= reader.size() {
            break;
        }
        let header = read_box_header(reader, offset).await?;
        if header.box_type == JP2C {
            return Ok(header);
        }
        offset = header.content_offset + header.content_len;
    }
    Err(Jp2Error::MissingCodestream)
}
