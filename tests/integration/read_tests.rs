//! Region read integration tests.
//!
//! Tests verify:
//! - Output shapes follow slice semantics on both axes
//! - Strided reads pick the matching pyramid level and sample it
//! - Out-of-bounds areas hold the fill value
//! - Full-resolution reads reproduce the stored pixels exactly

use wsi_reader::error::SlideError;
use wsi_reader::slide::{Slide, SlideOptions};
use wsi_reader::tile::{AxisSlice, TileKey};

use super::test_utils::{pattern_u8, MockBackend, TiffBuilder};

fn mock_slide(backend: MockBackend, options: SlideOptions) -> Slide<MockBackend> {
    match Slide::from_backend(backend, options) {
        Ok(slide) => slide,
        Err((_, err)) => panic!("failed to wrap backend: {}", err),
    }
}

/// The 10000 x 8000 RGB pyramid with factors 1 through 16.
fn reference_backend() -> MockBackend {
    MockBackend::new(10000, 8000, 3, 256, &[1, 2, 4, 8, 16])
}

// =============================================================================
// Shapes and Level Selection
// =============================================================================

#[tokio::test]
async fn test_open_reports_shape_and_scales() {
    let slide = mock_slide(reference_backend(), SlideOptions::default());
    assert_eq!(slide.shape(), (10000, 8000, 3));
    assert_eq!(slide.scales(), vec![1, 2, 4, 8, 16]);
}

#[tokio::test]
async fn test_stride_16_reads_coarsest_level() {
    let slide = mock_slide(reference_backend(), SlideOptions::default());
    let out = slide
        .read(AxisSlice::full().with_step(16), AxisSlice::full().with_step(16))
        .await
        .unwrap();

    assert_eq!(out.shape(), (625, 500, 3));
    // Level 4 is 625 x 500 in 256-pixel tiles
    assert!(slide.cache().contains(&TileKey::new(4, 0, 0)).await);
    assert!(!slide.cache().contains(&TileKey::new(0, 0, 0)).await);
    assert_eq!(slide.cache().stats().await.decodes, 3 * 2);

    for &(y, x) in &[(0usize, 0usize), (100, 321), (624, 499)] {
        let expected: Vec<u8> = (0..3)
            .map(|c| pattern_u8(y as u32 * 16, x as u32 * 16, c) as u8)
            .collect();
        assert_eq!(out.pixel(y, x), Some(&expected[..]), "pixel ({}, {})", y, x);
    }
}

#[tokio::test]
async fn test_mixed_strides_use_larger_step_for_level() {
    let slide = mock_slide(reference_backend(), SlideOptions::default());
    let out = slide
        .read(
            AxisSlice::range(0, 4096).with_step(8),
            AxisSlice::range(0, 512).with_step(2),
        )
        .await
        .unwrap();

    assert_eq!(out.shape(), (512, 256, 3));
    assert!(slide.cache().contains(&TileKey::new(3, 0, 0)).await);
    // Column step 2 at level 3 (factor 8) repeats level pixels
    assert_eq!(out.pixel(0, 0), out.pixel(0, 3));
    assert_ne!(out.pixel(0, 0), out.pixel(0, 4));
}

#[tokio::test]
async fn test_stride_between_levels_rounds_down() {
    let slide = mock_slide(reference_backend(), SlideOptions::default());
    slide
        .read(AxisSlice::range(0, 300).with_step(3), AxisSlice::range(0, 300).with_step(3))
        .await
        .unwrap();
    assert!(slide.cache().contains(&TileKey::new(1, 0, 0)).await);
    assert_eq!(slide.cache().len().await, 1);
}

#[tokio::test]
async fn test_empty_and_reversed_slices() {
    let slide = mock_slide(reference_backend(), SlideOptions::default());

    let out = slide
        .read(AxisSlice::range(500, 500), AxisSlice::full())
        .await
        .unwrap();
    assert_eq!(out.shape(), (0, 8000, 3));
    assert!(out.is_empty());

    let out = slide
        .read(AxisSlice::range(10, 20), AxisSlice::range(30, 5))
        .await
        .unwrap();
    assert_eq!(out.shape(), (10, 0, 3));
    assert_eq!(slide.cache().stats().await.decodes, 0);
}

#[tokio::test]
async fn test_zero_step_is_invalid() {
    let slide = mock_slide(reference_backend(), SlideOptions::default());
    let err = slide
        .read(AxisSlice::full(), AxisSlice::full().with_step(0))
        .await
        .unwrap_err();
    assert!(matches!(err, SlideError::InvalidRequest(_)));
}

// =============================================================================
// Out-of-Bounds Fill
// =============================================================================

#[tokio::test]
async fn test_oversized_request_has_fill_borders() {
    let options = SlideOptions {
        fill_value: 7.0,
        ..SlideOptions::default()
    };
    let slide = mock_slide(reference_backend(), options);
    let out = slide
        .read(
            AxisSlice::range(-1000, 11000).with_step(4),
            AxisSlice::range(-1000, 9000).with_step(4),
        )
        .await
        .unwrap();

    assert_eq!(out.shape(), (3000, 2500, 3));

    let fill = [7u8, 7, 7];
    // 250 fill rows and columns on every side
    assert_eq!(out.pixel(0, 0), Some(&fill[..]));
    assert_eq!(out.pixel(249, 1200), Some(&fill[..]));
    assert_eq!(out.pixel(1200, 249), Some(&fill[..]));
    assert_eq!(out.pixel(2750, 1200), Some(&fill[..]));
    assert_eq!(out.pixel(1200, 2250), Some(&fill[..]));
    assert_eq!(out.pixel(2999, 2499), Some(&fill[..]));

    // First and last in-bounds pixels map to level 2 (factor 4)
    let first: Vec<u8> = (0..3).map(|c| pattern_u8(0, 0, c) as u8).collect();
    assert_eq!(out.pixel(250, 250), Some(&first[..]));
    let last: Vec<u8> = (0..3).map(|c| pattern_u8(9996, 7996, c) as u8).collect();
    assert_eq!(out.pixel(2749, 2249), Some(&last[..]));

    assert!(slide.cache().contains(&TileKey::new(2, 0, 0)).await);
}

#[tokio::test]
async fn test_request_entirely_outside_decodes_nothing() {
    let options = SlideOptions {
        fill_value: 3.0,
        ..SlideOptions::default()
    };
    let slide = mock_slide(reference_backend(), options);
    let out = slide
        .read(AxisSlice::range(20000, 20010), AxisSlice::range(-50, -40))
        .await
        .unwrap();

    assert_eq!(out.shape(), (10, 10, 3));
    assert!(out.as_bytes().iter().all(|&b| b == 3));
    assert_eq!(slide.cache().stats().await.decodes, 0);
}

#[tokio::test]
async fn test_extreme_bounds_never_panic() {
    let options = SlideOptions {
        fill_value: 9.0,
        ..SlideOptions::default()
    };
    let slide = mock_slide(MockBackend::new(64, 64, 1, 64, &[1]), options);

    let out = slide
        .read(
            AxisSlice::new(Some(i64::MIN), Some(i64::MIN + 5), 1),
            AxisSlice::new(Some(i64::MAX - 3), None, 1),
        )
        .await
        .unwrap();
    assert_eq!(out.shape(), (5, 0, 1));

    let out = slide
        .read(
            AxisSlice::new(Some(i64::MIN), Some(i64::MAX), usize::MAX),
            AxisSlice::range(60, 70),
        )
        .await
        .unwrap();
    assert_eq!(out.shape(), (1, 10, 1));
    assert!(out.as_bytes().iter().all(|&b| b == 9));
    assert_eq!(slide.cache().stats().await.decodes, 0);
}

#[tokio::test]
async fn test_unallocatable_output_is_invalid() {
    let slide = mock_slide(MockBackend::new(64, 64, 3, 64, &[1]), SlideOptions::default());
    let huge = AxisSlice::range(0, 1 << 33);

    let err = slide.read(huge, huge).await.unwrap_err();
    assert!(matches!(err, SlideError::InvalidRequest(_)), "{:?}", err);

    let err = slide
        .read(AxisSlice::range(i64::MIN, 0), AxisSlice::full())
        .await
        .unwrap_err();
    assert!(matches!(err, SlideError::InvalidRequest(_)), "{:?}", err);

    // The handle is still usable
    let out = slide.read(AxisSlice::range(0, 2), AxisSlice::range(0, 2)).await.unwrap();
    assert_eq!(out.shape(), (2, 2, 3));
}

// =============================================================================
// Real Files
// =============================================================================

#[tokio::test]
async fn test_full_resolution_read_is_exact() {
    let builder = TiffBuilder::new(300, 200, 64).channels(3).levels(&[1, 2, 4]);
    let (_dir, path) = builder.write("rgb.tif");

    let slide = Slide::open(&path).await.unwrap();
    assert_eq!(slide.shape(), (200, 300, 3));
    assert_eq!(slide.scales(), vec![1, 2, 4]);

    let out = slide.read(AxisSlice::full(), AxisSlice::full()).await.unwrap();
    assert_eq!(out.shape(), (200, 300, 3));
    for y in 0..200u32 {
        for x in 0..300u32 {
            let expected: Vec<u8> = (0..3).map(|c| builder.expected(y, x, c) as u8).collect();
            assert_eq!(out.pixel(y as usize, x as usize), Some(&expected[..]));
        }
    }
    slide.close().await;
}

#[tokio::test]
async fn test_strided_read_samples_stored_level() {
    let builder = TiffBuilder::new(300, 200, 64).levels(&[1, 2, 4]);
    let (_dir, path) = builder.write("gray.tif");
    let slide = Slide::open(&path).await.unwrap();

    let out = slide
        .read(AxisSlice::range(1, 200).with_step(3), AxisSlice::full().with_step(3))
        .await
        .unwrap();
    assert_eq!(out.shape(), (67, 100, 1));

    // Step 3 reads level 1: level-0 coordinate c maps to pixel c / 2
    for &(i, j) in &[(0usize, 0usize), (10, 17), (66, 99)] {
        let y0 = 1 + 3 * i as u32;
        let x0 = 3 * j as u32;
        let expected = builder.expected((y0 / 2) * 2, (x0 / 2) * 2, 0) as u8;
        assert_eq!(out.pixel(i, j), Some(&[expected][..]), "output ({}, {})", i, j);
    }
}

#[tokio::test]
async fn test_region_equals_slice_of_full_read() {
    let builder = TiffBuilder::new(257, 129, 32).channels(3);
    let (_dir, path) = builder.write("odd.tif");
    let slide = Slide::open(&path).await.unwrap();

    let full = slide.read(AxisSlice::full(), AxisSlice::full()).await.unwrap();
    let region = slide
        .read(AxisSlice::range(31, 97), AxisSlice::range(200, 257))
        .await
        .unwrap();

    assert_eq!(region.shape(), (66, 57, 3));
    for y in 0..66 {
        for x in 0..57 {
            assert_eq!(region.pixel(y, x), full.pixel(y + 31, x + 200));
        }
    }
}

#[tokio::test]
async fn test_repeated_reads_are_identical() {
    let (_dir, path) = TiffBuilder::new(128, 128, 64).channels(3).write("same.tif");
    let slide = Slide::open(&path).await.unwrap();

    let rows = AxisSlice::range(-10, 100).with_step(2);
    let cols = AxisSlice::range(5, 140);
    let first = slide.read(rows, cols).await.unwrap();
    let second = slide.read(rows, cols).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(slide.cache().stats().await.decodes, 4);
}
