//! Decoded pixel storage.
//!
//! Both decoded tiles and read results are [`PixelBuffer`]s: interleaved,
//! row-major samples in native byte order.

use serde::Serialize;

use crate::error::CodecError;

// =============================================================================
// SampleType
// =============================================================================

/// Numeric type of a single channel sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleType {
    U8,
    U16,
    U32,
    F32,
}

impl SampleType {
    /// Size of one sample in bytes.
    #[inline]
    pub const fn size(self) -> usize {
        match self {
            SampleType::U8 => 1,
            SampleType::U16 => 2,
            SampleType::U32 | SampleType::F32 => 4,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            SampleType::U8 => "u8",
            SampleType::U16 => "u16",
            SampleType::U32 => "u32",
            SampleType::F32 => "f32",
        }
    }

    /// Encode `value` as one native-endian sample.
    ///
    /// Integer types round and saturate; NaN becomes 0.
    pub fn encode(self, value: f64) -> Vec<u8> {
        match self {
            SampleType::U8 => vec![value.round() as u8],
            SampleType::U16 => (value.round() as u16).to_ne_bytes().to_vec(),
            SampleType::U32 => (value.round() as u32).to_ne_bytes().to_vec(),
            SampleType::F32 => (value as f32).to_ne_bytes().to_vec(),
        }
    }
}

// =============================================================================
// PixelBuffer
// =============================================================================

/// A rectangle of interleaved pixels.
///
/// `data` holds `height * width * channels` samples of `sample_type`, row
/// after row, channels interleaved, in native byte order.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
    pub sample_type: SampleType,
    pub data: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap decoded bytes, checking they match the geometry.
    pub fn from_raw(
        height: usize,
        width: usize,
        channels: usize,
        sample_type: SampleType,
        data: Vec<u8>,
    ) -> Result<Self, CodecError> {
        let expected = Self::required_bytes(height, width, channels, sample_type)
            .unwrap_or(usize::MAX);
        if data.len() != expected {
            return Err(CodecError::SizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            height,
            width,
            channels,
            sample_type,
            data,
        })
    }

    /// A buffer with every sample set to zero.
    pub fn zeros(height: usize, width: usize, channels: usize, sample_type: SampleType) -> Self {
        Self {
            height,
            width,
            channels,
            sample_type,
            data: vec![0; height * width * channels * sample_type.size()],
        }
    }

    /// A buffer with every sample set to `fill`, or `None` when its size
    /// overflows `usize` or cannot be allocated.
    pub fn try_filled(
        height: usize,
        width: usize,
        channels: usize,
        sample_type: SampleType,
        fill: f64,
    ) -> Option<Self> {
        let len = Self::required_bytes(height, width, channels, sample_type)?;
        let mut data = Vec::new();
        data.try_reserve_exact(len).ok()?;

        let sample = sample_type.encode(fill);
        if sample.iter().all(|&b| b == 0) {
            data.resize(len, 0);
        } else {
            for _ in 0..len / sample.len() {
                data.extend_from_slice(&sample);
            }
        }
        Some(Self {
            height,
            width,
            channels,
            sample_type,
            data,
        })
    }

    /// Byte length of a buffer with this geometry, `None` on overflow.
    pub fn required_bytes(
        height: usize,
        width: usize,
        channels: usize,
        sample_type: SampleType,
    ) -> Option<usize> {
        height
            .checked_mul(width)?
            .checked_mul(channels)?
            .checked_mul(sample_type.size())
    }

    /// (height, width, channels)
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.height, self.width, self.channels)
    }

    #[inline]
    pub fn sample_size(&self) -> usize {
        self.sample_type.size()
    }

    /// Bytes per pixel.
    #[inline]
    pub fn pixel_stride(&self) -> usize {
        self.channels * self.sample_type.size()
    }

    /// Bytes per row.
    #[inline]
    pub fn row_stride(&self) -> usize {
        self.width * self.pixel_stride()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Samples of the pixel at (`y`, `x`), or `None` outside the buffer.
    pub fn pixel(&self, y: usize, x: usize) -> Option<&[u8]> {
        if y >= self.height || x >= self.width {
            return None;
        }
        let start = y * self.row_stride() + x * self.pixel_stride();
        Some(&self.data[start..start + self.pixel_stride()])
    }

    /// Copy out the `width` x `height` rectangle at (`x`, `y`).
    ///
    /// The rectangle is clamped to the buffer.
    pub fn crop(&self, x: usize, y: usize, width: usize, height: usize) -> PixelBuffer {
        let x = x.min(self.width);
        let y = y.min(self.height);
        let width = width.min(self.width - x);
        let height = height.min(self.height - y);
        if x == 0 && y == 0 && width == self.width && height == self.height {
            return self.clone();
        }

        let pixel = self.pixel_stride();
        let src_stride = self.row_stride();
        let row_bytes = width * pixel;
        let mut data = Vec::with_capacity(row_bytes * height);
        for row in y..y + height {
            let start = row * src_stride + x * pixel;
            data.extend_from_slice(&self.data[start..start + row_bytes]);
        }

        PixelBuffer {
            height,
            width,
            channels: self.channels,
            sample_type: self.sample_type,
            data,
        }
    }
}
