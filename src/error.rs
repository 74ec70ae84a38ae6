use thiserror::Error;

/// I/O errors that can occur when reading from the slide file
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Error reported by the operating system while reading
    #[error("Read error: {0}")]
    Read(String),

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// File does not exist
    #[error("File not found: {0}")]
    NotFound(String),

    /// The reader was closed and can no longer serve reads
    #[error("Reader is closed")]
    Closed,
}

/// Errors related to format detection and validation
#[derive(Debug, Clone, Error)]
pub enum FormatError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// TIFF parsing error
    #[error("TIFF error: {0}")]
    Tiff(#[from] TiffError),

    /// JPEG 2000 header parsing error
    #[error("JPEG 2000 error: {0}")]
    Jp2(#[from] Jp2Error),

    /// File format is not supported
    #[error("Unsupported format: {reason}")]
    UnsupportedFormat { reason: String },
}

impl FormatError {
    /// Shorthand for an [`FormatError::UnsupportedFormat`] error.
    pub fn unsupported(reason: impl Into<String>) -> Self {
        FormatError::UnsupportedFormat {
            reason: reason.into(),
        }
    }
}

/// Errors that can occur when parsing TIFF files
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),

    /// Invalid BigTIFF offset byte size (must be 8)
    #[error("Invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidBigTiffOffsetSize(u16),

    /// File is too small to contain a valid TIFF header
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Invalid IFD offset (points outside file or back into the chain)
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// Required tag is missing from IFD
    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// Tag has unexpected type or count
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// Unsupported compression scheme
    #[error("Unsupported compression: {0}")]
    UnsupportedCompression(String),

    /// File uses strips instead of tiles
    #[error("Unsupported organization: file uses strips instead of tiles")]
    StripOrganization,

    /// Pixel layout (photometric, sample format, planar configuration) the
    /// reader does not decode
    #[error("Unsupported pixel layout: {0}")]
    UnsupportedLayout(String),

    /// Unknown field type in IFD entry
    #[error("Unknown field type: {0}")]
    UnknownFieldType(u16),
}

impl TiffError {
    /// Whether this error describes a file that is not a TIFF at all, as
    /// opposed to a TIFF whose directory structure is broken.
    pub fn is_header_error(&self) -> bool {
        matches!(
            self,
            TiffError::InvalidMagic(_)
                | TiffError::InvalidVersion(_)
                | TiffError::InvalidBigTiffOffsetSize(_)
                | TiffError::FileTooSmall { .. }
        )
    }
}

/// Errors that can occur when parsing JPEG 2000 headers
#[derive(Debug, Clone, Error)]
pub enum Jp2Error {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// A JP2 box header is malformed
    #[error("Invalid box at offset {offset}: {message}")]
    InvalidBox { offset: u64, message: String },

    /// The JP2 container holds no contiguous codestream box
    #[error("No codestream box (jp2c) found")]
    MissingCodestream,

    /// A required marker segment is absent from the main header
    #[error("Missing marker segment: {0}")]
    MissingMarker(&'static str),

    /// A marker segment is shorter than its declared content
    #[error("Truncated {marker} marker segment at offset {offset}")]
    TruncatedMarker { marker: &'static str, offset: u64 },

    /// Codestream geometry this reader cannot address
    #[error("Unsupported codestream: {0}")]
    Unsupported(String),
}

/// Errors raised while turning compressed tile bytes into pixels
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    /// I/O error while fetching the tile bytes
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// JPEG stream failed to decode
    #[error("JPEG decode failed: {0}")]
    Jpeg(String),

    /// zlib stream failed to inflate
    #[error("Deflate decode failed: {0}")]
    Deflate(String),

    /// LZW stream failed to decode
    #[error("LZW decode failed: {0}")]
    Lzw(String),

    /// JPEG 2000 codestream failed to decode
    #[error("JPEG 2000 decode failed: {0}")]
    Jpeg2000(String),

    /// Pixel layout the codec cannot produce
    #[error("Unsupported tile layout: {0}")]
    Unsupported(String),

    /// Decoded data does not match the tile geometry
    #[error("Decoded size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
}

/// Errors surfaced by the slide handle.
///
/// This is the public error taxonomy: everything the handle does reports one
/// of these variants.
#[derive(Debug, Clone, Error)]
pub enum SlideError {
    /// The path does not name an existing file
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// The file signature is not recognized by any backend, or the file uses
    /// a layout no backend supports
    #[error("Unsupported format: {reason}")]
    UnsupportedFormat { reason: String },

    /// Level geometry is missing or inconsistent
    #[error("Corrupt pyramid: {reason}")]
    CorruptPyramid { reason: String },

    /// A tile failed to decode
    #[error("Failed to decode tile ({col}, {row}) at level {level}: {source}")]
    Decode {
        level: usize,
        col: u32,
        row: u32,
        #[source]
        source: CodecError,
    },

    /// The handle was closed
    #[error("Slide handle is closed")]
    Closed,

    /// The read request cannot be satisfied as written
    #[error("Invalid read request: {0}")]
    InvalidRequest(String),

    /// I/O error outside of tile decoding
    #[error("I/O error: {0}")]
    Io(IoError),
}

impl SlideError {
    /// Shorthand for a [`SlideError::CorruptPyramid`] error.
    pub fn corrupt(reason: impl Into<String>) -> Self {
        SlideError::CorruptPyramid {
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`SlideError::UnsupportedFormat`] error.
    pub fn unsupported(reason: impl Into<String>) -> Self {
        SlideError::UnsupportedFormat {
            reason: reason.into(),
        }
    }

    /// Wrap a codec failure with the key of the tile that produced it.
    ///
    /// A closed reader is reported as [`SlideError::Closed`] rather than as a
    /// decode failure.
    pub fn decode(level: usize, col: u32, row: u32, source: CodecError) -> Self {
        match source {
            CodecError::Io(IoError::Closed) => SlideError::Closed,
            source => SlideError::Decode {
                level,
                col,
                row,
                source,
            },
        }
    }
}

impl From<IoError> for SlideError {
    fn from(err: IoError) -> Self {
        match err {
            IoError::NotFound(path) => SlideError::FileNotFound(path),
            IoError::Closed => SlideError::Closed,
            other => SlideError::Io(other),
        }
    }
}

impl From<TiffError> for SlideError {
    fn from(err: TiffError) -> Self {
        if let TiffError::Io(io) = err {
            return io.into();
        }

        let unsupported = err.is_header_error()
            || matches!(
                err,
                TiffError::UnsupportedCompression(_)
                    | TiffError::StripOrganization
                    | TiffError::UnsupportedLayout(_)
            );
        if unsupported {
            SlideError::unsupported(err.to_string())
        } else {
            SlideError::corrupt(err.to_string())
        }
    }
}

impl From<Jp2Error> for SlideError {
    fn from(err: Jp2Error) -> Self {
        match err {
            Jp2Error::Io(io) => io.into(),
            Jp2Error::Unsupported(reason) => SlideError::unsupported(reason),
            other => SlideError::corrupt(other.to_string()),
        }
    }
}

impl From<FormatError> for SlideError {
    fn from(err: FormatError) -> Self {
        match err {
            FormatError::Io(io) => io.into(),
            FormatError::Tiff(tiff) => tiff.into(),
            FormatError::Jp2(jp2) => jp2.into(),
            FormatError::UnsupportedFormat { reason } => SlideError::UnsupportedFormat { reason },
        }
    }
}
