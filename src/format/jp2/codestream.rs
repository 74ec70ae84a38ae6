//! JPEG 2000 codestream main header parsing.
//!
//! Only the markers that fix the geometry are read:
//!
//! - SIZ: image and tile sizes, origins, component precision and sampling
//! - COD: number of wavelet decomposition levels
//!
//! Parsing stops at the first SOT (start of tile-part).

use crate::error::Jp2Error;
use crate::io::RangeReader;

// =============================================================================
// Markers
// =============================================================================

const SOC: u16 = 0xFF4F;
const SIZ: u16 = 0xFF51;
const COD: u16 = 0xFF52;
const SOT: u16 = 0xFF90;

/// Main-header marker segments examined before giving up on finding SOT.
const MAX_MARKERS: usize = 256;

// =============================================================================
// CodestreamInfo
// =============================================================================

/// Per-component SIZ parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentInfo {
    /// Bit depth (1-38)
    pub precision: u8,
    pub signed: bool,
    pub dx: u8,
    pub dy: u8,
}

/// Geometry of a codestream, read from its main header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodestreamInfo {
    pub width: u32,
    pub height: u32,
    pub x_origin: u32,
    pub y_origin: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tile_x_origin: u32,
    pub tile_y_origin: u32,
    pub components: Vec<ComponentInfo>,
    pub decomposition_levels: u8,
}

impl CodestreamInfo {
    /// Parse the main header of the codestream starting at `offset`.
    pub async fn read<R: RangeReader>(reader: &R, offset: u64) -> Result<Self, Jp2Error> {
        let soc = reader.read_exact_at(offset, 2).await?;
        if u16::from_be_bytes([soc[0], soc[1]]) != SOC {
            return Err(Jp2Error::MissingMarker("SOC"));
        }

        let mut pos = offset + 2;
        let mut siz = None;
        let mut decomposition_levels = None;

        for _ in 0..MAX_MARKERS {
            if pos + 4 > reader.size() {
                break;
            }
            let head = reader.read_exact_at(pos, 4).await?;
            let marker = u16::from_be_bytes([head[0], head[1]]);
            if marker == SOT {
                break;
            }
            let seg_len = u16::from_be_bytes([head[2], head[3]]) as u64;
            if seg_len < 2 || pos + 2 + seg_len > reader.size() {
                return Err(Jp2Error::TruncatedMarker {
                    marker: marker_name(marker),
                    offset: pos,
                });
            }

            match marker {
                SIZ => {
                    let body = reader.read_exact_at(pos + 4, seg_len as usize - 2).await?;
                    siz = Some(parse_siz(&body, pos)?);
                }
                COD => {
                    let body = reader.read_exact_at(pos + 4, seg_len as usize - 2).await?;
                    // Scod, progression, layers (2), MCT, then decomposition levels
                    let levels = *body.get(5).ok_or(Jp2Error::TruncatedMarker {
                        marker: "COD",
                        offset: pos,
                    })?;
                    decomposition_levels = Some(levels);
                }
                _ => {}
            }
            pos += 2 + seg_len;
        }

        let mut info = siz.ok_or(Jp2Error::MissingMarker("SIZ"))?;
        info.decomposition_levels = decomposition_levels.ok_or(Jp2Error::MissingMarker("COD"))?;
        Ok(info)
    }

    /// Reject geometry the reader cannot address as a uniform pyramid.
    pub fn check_supported(&self) -> Result<(), Jp2Error> {
        if self.x_origin != 0
            || self.y_origin != 0
            || self.tile_x_origin != 0
            || self.tile_y_origin != 0
        {
            return Err(Jp2Error::Unsupported(
                "image or tile grid origin is not zero".to_string(),
            ));
        }
        if self.width == 0 || self.height == 0 || self.tile_width == 0 || self.tile_height == 0 {
            return Err(Jp2Error::Unsupported(format!(
                "degenerate geometry {}x{} with {}x{} tiles",
                self.width, self.height, self.tile_width, self.tile_height
            )));
        }

        let first = self
            .components
            .first()
            .ok_or_else(|| Jp2Error::Unsupported("no components".to_string()))?;
        for c in &self.components {
            if c.dx != 1 || c.dy != 1 {
                return Err(Jp2Error::Unsupported("subsampled components".to_string()));
            }
            if c.signed {
                return Err(Jp2Error::Unsupported("signed components".to_string()));
            }
            if c.precision != first.precision {
                return Err(Jp2Error::Unsupported("mixed component precision".to_string()));
            }
        }
        if first.precision > 32 {
            return Err(Jp2Error::Unsupported(format!(
                "{}-bit components",
                first.precision
            )));
        }
        Ok(())
    }

    /// Precision shared by all components.
    pub fn precision(&self) -> u8 {
        self.components.first().map(|c| c.precision).unwrap_or(8)
    }
}

fn parse_siz(body: &[u8], offset: u64) -> Result<CodestreamInfo, Jp2Error> {
    let truncated = Jp2Error::TruncatedMarker {
        marker: "SIZ",
        offset,
    };
    if body.len() < 36 {
        return Err(truncated);
    }
    let u32_at = |i: usize| u32::from_be_bytes([body[i], body[i + 1], body[i + 2], body[i + 3]]);

    // Rsiz (2), then the eight 32-bit size/origin fields, then Csiz
    let xsiz = u32_at(2);
    let ysiz = u32_at(6);
    let x_origin = u32_at(10);
    let y_origin = u32_at(14);
    let tile_width = u32_at(18);
    let tile_height = u32_at(22);
    let tile_x_origin = u32_at(26);
    let tile_y_origin = u32_at(30);
    let csiz = u16::from_be_bytes([body[34], body[35]]) as usize;

    if body.len() < 36 + 3 * csiz {
        return Err(truncated);
    }
    let components = body[36..36 + 3 * csiz]
        .chunks_exact(3)
        .map(|c| ComponentInfo {
            precision: (c[0] & 0x7F) + 1,
            signed: c[0] & 0x80 != 0,
            dx: c[1],
            dy: c[2],
        })
        .collect();

    Ok(CodestreamInfo {
        width: xsiz.saturating_sub(x_origin),
        height: ysiz.saturating_sub(y_origin),
        x_origin,
        y_origin,
        tile_width,
        tile_height,
        tile_x_origin,
        tile_y_origin,
        components,
        decomposition_levels: 0,
    })
}

fn marker_name(marker: u16) -> &'static str {
    match marker {
        SIZ => "SIZ",
        COD => "COD",
        _ => "main header",
    }
}

// =============================================================================
// Tests
// =============================================================================
