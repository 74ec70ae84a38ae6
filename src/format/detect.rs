//! Container format detection.
//!
//! The format is decided by the file signature, never by the extension:
//! `.svs` files are tiled TIFFs, and `.jp2`/`.j2k` may hold either a JP2
//! container or a bare codestream.
//!
//! - **JPEG 2000 codestream**: SOC followed by SIZ (`FF 4F FF 51`)
//! - **JP2 container**: the 12-byte signature box, or a bare `0D 0A 87 0A`
//! - **TIFF / BigTIFF**: `II` or `MM` byte order mark and version 42 or 43.
//!   The first ImageDescription decides between Aperio SVS and a generic
//!   tiled TIFF; descriptions of DICOM or XML-described containers are
//!   rejected.
//!
//! Detection reads only headers and at most 1 KiB of description text.

use serde::Serialize;

use crate::error::FormatError;
use crate::io::RangeReader;

use super::tiff::{
    read_description, read_header, read_ifd, ByteOrder, TiffTag, ValueReader, BIGTIFF_HEADER_SIZE,
    TIFF_HEADER_SIZE,
};

// =============================================================================
// FormatKind
// =============================================================================

/// Container format of a slide file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatKind {
    /// Aperio SVS (tiled TIFF with an "Aperio" ImageDescription)
    AperioSvs,

    /// Any other tiled pyramidal TIFF
    GenericTiff,

    /// JP2 container holding a JPEG 2000 codestream
    Jp2,

    /// Bare JPEG 2000 codestream
    J2kCodestream,
}

impl FormatKind {
    pub const fn name(&self) -> &'static str {
        match self {
            FormatKind::AperioSvs => "Aperio SVS",
            FormatKind::GenericTiff => "Generic Pyramidal TIFF",
            FormatKind::Jp2 => "JPEG 2000 (JP2)",
            FormatKind::J2kCodestream => "JPEG 2000 codestream",
        }
    }

    /// Whether the tiled-TIFF backend reads this format.
    pub const fn is_tiff(&self) -> bool {
        matches!(self, FormatKind::AperioSvs | FormatKind::GenericTiff)
    }
}

// =============================================================================
// Signatures
// =============================================================================

/// SOC + SIZ markers at the start of a codestream.
const J2K_CODESTREAM_SIGNATURE: [u8; 4] = [0xFF, 0x4F, 0xFF, 0x51];

/// JP2 signature box: length 12, type "jP  ", content 0D 0A 87 0A.
const JP2_SIGNATURE_BOX: [u8; 12] = [
    0x00, 0x00, 0x00, 0x0C, 0x6A, 0x50, 0x20, 0x20, 0x0D, 0x0A, 0x87, 0x0A,
];

/// JP2 signature content without its box header.
const JP2_BARE_SIGNATURE: [u8; 4] = [0x0D, 0x0A, 0x87, 0x0A];

const APERIO_MARKER: &str = "Aperio";

/// Description fragments of container flavors this reader does not model.
const REJECTED_DESCRIPTION_MARKERS: [&str; 3] = ["DICOM", "xml", "XML"];

// =============================================================================
// Detection
// =============================================================================

/// Classify the container held by `reader`.
///
/// Fails with [`FormatError::UnsupportedFormat`] for anything that is not a
/// JPEG 2000 or TIFF file, and with [`FormatError::Tiff`] when a TIFF's first
/// directory cannot be read.
pub async fn probe<R: RangeReader>(reader: &R) -> Result<FormatKind, FormatError> {
    let size = reader.size();
    if size < J2K_CODESTREAM_SIGNATURE.len() as u64 {
        return Err(FormatError::unsupported(format!(
            "file is too small to identify ({} bytes)",
            size
        )));
    }

    let len = (BIGTIFF_HEADER_SIZE as u64).min(size) as usize;
    let head = reader.read_exact_at(0, len).await?;

    if let Some(kind) = detect_jpeg2000(&head) {
        return Ok(kind);
    }
    if !is_tiff_header(&head) {
        return Err(FormatError::unsupported(
            "signature does not match TIFF, BigTIFF or JPEG 2000",
        ));
    }

    detect_tiff_flavor(reader).await
}

/// Match the JPEG 2000 signatures.
pub fn detect_jpeg2000(head: &[u8]) -> Option<FormatKind> {
    if head.starts_with(&J2K_CODESTREAM_SIGNATURE) {
        Some(FormatKind::J2kCodestream)
    } else if head.starts_with(&JP2_SIGNATURE_BOX) || head.starts_with(&JP2_BARE_SIGNATURE) {
        Some(FormatKind::Jp2)
    } else {
        None
    }
}

/// Check if bytes start with a TIFF or BigTIFF header.
pub fn is_tiff_header(bytes: &[u8]) -> bool {
    if bytes.len() < TIFF_HEADER_SIZE {
        return false;
    }

    let byte_order = match &bytes[0..2] {
        b"II" => ByteOrder::LittleEndian,
        b"MM" => ByteOrder::BigEndian,
        _ => return false,
    };

    let version = byte_order.read_u16(&bytes[2..4]);
    version == 42 || version == 43
}

/// Decide between SVS and generic TIFF from the first ImageDescription.
async fn detect_tiff_flavor<R: RangeReader>(reader: &R) -> Result<FormatKind, FormatError> {
    let header = read_header(reader).await?;
    let ifd = read_ifd(reader, &header, header.first_ifd_offset).await?;

    let description = match ifd.get_entry_by_tag(TiffTag::ImageDescription) {
        Some(entry) => {
            let values = ValueReader::new(reader, &header);
            read_description(&values, entry).await?
        }
        None => return Ok(FormatKind::GenericTiff),
    };

    classify_description(&description)
}

fn classify_description(description: &str) -> Result<FormatKind, FormatError> {
    if let Some(marker) = REJECTED_DESCRIPTION_MARKERS
        .iter()
        .find(|m| description.contains(*m))
    {
        return Err(FormatError::unsupported(format!(
            "TIFF flavor described by {} metadata is not supported",
            marker
        )));
    }

    if description.contains(APERIO_MARKER) {
        Ok(FormatKind::AperioSvs)
    } else {
        Ok(FormatKind::GenericTiff)
    }
}

// =============================================================================
// Tests
// =============================================================================
