//! Assembly of decoded tiles into a read result.
//!
//! The output is allocated once, pre-filled with the fill value, and every
//! [`TileFetch`] of the plan then copies its sampled pixels in. Tiles write
//! disjoint output rectangles, so the order they arrive in does not matter.
//! Sampling is nearest-neighbor: pixels are picked, never averaged.

use crate::error::{CodecError, SlideError};

use super::buffer::PixelBuffer;
use super::planner::{FetchPlan, TileFetch};

/// Allocate the output of `plan`, every sample set to `fill`.
///
/// An output too large to address or allocate is
/// [`SlideError::InvalidRequest`].
pub fn allocate_output(plan: &FetchPlan, fill: f64) -> Result<PixelBuffer, SlideError> {
    let (height, width) = plan.output_size();
    let channels = plan.level_info.channels as usize;
    PixelBuffer::try_filled(height, width, channels, plan.level_info.sample_type, fill).ok_or_else(
        || {
            SlideError::InvalidRequest(format!(
                "output of {} x {} x {} {} samples cannot be allocated",
                height,
                width,
                channels,
                plan.level_info.sample_type.name()
            ))
        },
    )
}

/// Copy the pixels `fetch` contributes from `tile` into `output`.
///
/// `tile` must be the decoded tile for `fetch.key`, at least as large as the
/// fetch window.
pub fn stitch_tile(
    output: &mut PixelBuffer,
    plan: &FetchPlan,
    fetch: &TileFetch,
    tile: &PixelBuffer,
) -> Result<(), SlideError> {
    let window = fetch.window;
    let covers = tile.width >= (window.x + window.width) as usize
        && tile.height >= (window.y + window.height) as usize;
    if !covers || tile.channels != output.channels || tile.sample_type != output.sample_type {
        let expected = (window.x + window.width) as usize
            * (window.y + window.height) as usize
            * output.pixel_stride();
        return Err(SlideError::decode(
            fetch.key.level,
            fetch.key.col,
            fetch.key.row,
            CodecError::SizeMismatch {
                expected,
                actual: tile.byte_len(),
            },
        ));
    }

    let pixel = output.pixel_stride();
    let out_stride = output.row_stride();
    let tile_stride = tile.row_stride();
    let contiguous = plan.cols.is_contiguous(&fetch.cols);
    let first_x = plan.cols.tile_offset(fetch.cols.start);
    let run_bytes = fetch.cols.len() * pixel;

    for out_y in fetch.rows.clone() {
        let tile_row = plan.rows.tile_offset(out_y) * tile_stride;
        let out_row = out_y * out_stride;

        if contiguous {
            let src = tile_row + first_x * pixel;
            let dst = out_row + fetch.cols.start * pixel;
            output.data[dst..dst + run_bytes].copy_from_slice(&tile.data[src..src + run_bytes]);
            continue;
        }

        for out_x in fetch.cols.clone() {
            let src = tile_row + plan.cols.tile_offset(out_x) * pixel;
            let dst = out_row + out_x * pixel;
            output.data[dst..dst + pixel].copy_from_slice(&tile.data[src..src + pixel]);
        }
    }
    Ok(())
}
