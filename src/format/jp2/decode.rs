//! JPEG 2000 decoding through OpenJPEG.
//!
//! `jpeg2k` images wrap raw OpenJPEG state and are not `Send`, so every
//! function here is synchronous and hands back owned component planes.

use jpeg2k::{DecodeArea, DecodeParameters, Image};

use crate::error::CodecError;
use crate::tile::SampleType;

/// Decoded component planes of one image or region.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentPlanes {
    pub width: u32,
    pub height: u32,
    pub precision: u32,

    /// One `width * height` plane per component
    pub planes: Vec<Vec<i32>>,
}

impl ComponentPlanes {
    fn from_image(image: &Image) -> Result<Self, CodecError> {
        let components = image.components();
        let first = components
            .first()
            .ok_or_else(|| CodecError::Jpeg2000("image has no components".to_string()))?;
        let (width, height) = (first.width(), first.height());

        let planes = components
            .iter()
            .map(|c| {
                if c.width() == width && c.height() == height {
                    c.data().to_vec()
                } else {
                    upsample(c.data(), c.width(), c.height(), width, height)
                }
            })
            .collect();

        Ok(Self {
            width,
            height,
            precision: first.precision(),
            planes,
        })
    }

    /// Convert full-range YCbCr planes to RGB in place.
    pub fn ycbcr_to_rgb(&mut self) {
        if self.planes.len() < 3 {
            return;
        }
        let bits = self.precision.clamp(1, 31);
        let max = ((1u32 << bits) - 1) as f32;
        let offset = (1u32 << (bits - 1)) as f32;

        let (y_plane, rest) = self.planes.split_at_mut(1);
        let (cb_plane, cr_plane) = rest.split_at_mut(1);
        for ((y, cb), cr) in y_plane[0]
            .iter_mut()
            .zip(cb_plane[0].iter_mut())
            .zip(cr_plane[0].iter_mut())
        {
            let (yv, cbv, crv) = (*y as f32, *cb as f32 - offset, *cr as f32 - offset);
            let r = yv + 1.402 * crv;
            let g = yv - 0.344_136 * cbv - 0.714_136 * crv;
            let b = yv + 1.772 * cbv;
            *y = r.round().clamp(0.0, max) as i32;
            *cb = g.round().clamp(0.0, max) as i32;
            *cr = b.round().clamp(0.0, max) as i32;
        }
    }

    /// Interleave the first `channels` planes into native-endian samples.
    pub fn interleave(&self, channels: usize, sample_type: SampleType) -> Result<Vec<u8>, CodecError> {
        if self.planes.len() < channels {
            return Err(CodecError::Jpeg2000(format!(
                "expected {} components, decoded {}",
                channels,
                self.planes.len()
            )));
        }

        let pixels = self.width as usize * self.height as usize;
        let mut out = Vec::with_capacity(pixels * channels * sample_type.size());
        for i in 0..pixels {
            for plane in &self.planes[..channels] {
                let v = plane[i].max(0) as u32;
                match sample_type {
                    SampleType::U8 => out.push(v.min(u8::MAX as u32) as u8),
                    SampleType::U16 => {
                        out.extend_from_slice(&(v.min(u16::MAX as u32) as u16).to_ne_bytes())
                    }
                    SampleType::U32 => out.extend_from_slice(&v.to_ne_bytes()),
                    SampleType::F32 => out.extend_from_slice(&(v as f32).to_ne_bytes()),
                }
            }
        }
        Ok(out)
    }
}

/// Nearest-neighbor upsampling of a subsampled component plane.
fn upsample(data: &[i32], src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> Vec<i32> {
    let mut out = Vec::with_capacity(dst_w as usize * dst_h as usize);
    for y in 0..dst_h as u64 {
        let sy = (y * src_h as u64 / dst_h.max(1) as u64) as usize;
        for x in 0..dst_w as u64 {
            let sx = (x * src_w as u64 / dst_w.max(1) as u64) as usize;
            out.push(data.get(sy * src_w as usize + sx).copied().unwrap_or(0));
        }
    }
    out
}

/// Decode an in-memory codestream (an Aperio tile).
pub fn decode_bytes(data: &[u8]) -> Result<ComponentPlanes, CodecError> {
    let image = Image::from_bytes(data).map_err(|e| CodecError::Jpeg2000(e.to_string()))?;
    ComponentPlanes::from_image(&image)
}

/// Decode the reference-grid rectangle `[x0, x1) x [y0, y1)` of an in-memory
/// JP2 file or codestream at resolution reduction `reduce`.
///
/// The container is recognized from its leading bytes.
pub fn decode_region(
    data: &[u8],
    reduce: u32,
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
) -> Result<ComponentPlanes, CodecError> {
    let params = DecodeParameters::new()
        .reduce(reduce)
        .decode_area(Some(DecodeArea::new(x0, y0, x1, y1)));
    let image =
        Image::from_bytes_with(data, params).map_err(|e| CodecError::Jpeg2000(e.to_string()))?;
    ComponentPlanes::from_image(&image)
}
