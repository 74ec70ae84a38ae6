//! Format-specific integration tests.
//!
//! Tests verify:
//! - Probe classifies SVS, generic TIFF and JPEG 2000 signatures
//! - Byte order, sample type and compression variants decode identically
//! - Sparse and corrupt tiles behave as documented
//! - Open failures map to the public error taxonomy

use wsi_reader::error::SlideError;
use wsi_reader::format::FormatKind;
use wsi_reader::slide::Slide;
use wsi_reader::tile::{AxisSlice, SampleType};

use super::test_utils::{gradient, ByteOrderType, TiffBuilder, TileCompression};

async fn read_full(builder: &TiffBuilder, name: &str) -> wsi_reader::PixelBuffer {
    let (_dir, path) = builder.write(name);
    let slide = Slide::open(&path).await.unwrap();
    let out = slide.read(AxisSlice::full(), AxisSlice::full()).await.unwrap();
    slide.close().await;
    out
}

async fn open_err(bytes: Vec<u8>, name: &str) -> SlideError {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join(name);
    std::fs::write(&path, bytes).unwrap();
    match Slide::open(&path).await {
        Ok(_) => panic!("{} opened unexpectedly", name),
        Err(err) => err,
    }
}

// =============================================================================
// Format Detection
// =============================================================================

#[tokio::test]
async fn test_generic_tiff_detected() {
    let (_dir, path) = TiffBuilder::new(64, 64, 64).write("plain.tif");
    let slide = Slide::open(&path).await.unwrap();
    assert_eq!(slide.format(), FormatKind::GenericTiff);
}

#[tokio::test]
async fn test_svs_detected_and_label_skipped() {
    let builder = TiffBuilder::new(512, 384, 128)
        .channels(3)
        .levels(&[1, 4])
        .description("Aperio Image Library v12.0.5\r\n512x384 [0,0 512x384] (128x128) JPEG/RGB Q=70")
        .with_label();
    let (_dir, path) = builder.write("slide.svs");

    let slide = Slide::open(&path).await.unwrap();
    assert_eq!(slide.format(), FormatKind::AperioSvs);
    assert_eq!(slide.scales(), vec![1, 4]);
    assert_eq!(slide.levels()[1].width, 128);
    assert_eq!(slide.levels()[1].height, 96);
}

#[tokio::test]
async fn test_xml_description_unsupported() {
    let bytes = TiffBuilder::new(64, 64, 64)
        .description("<?xml version=\"1.0\"?><OME></OME>")
        .build();
    let err = open_err(bytes, "ome.tif").await;
    assert!(matches!(err, SlideError::UnsupportedFormat { .. }), "{:?}", err);
}

#[tokio::test]
async fn test_unknown_signature_unsupported() {
    let err = open_err(b"%PDF-1.7 not a slide at all".to_vec(), "doc.pdf").await;
    assert!(matches!(err, SlideError::UnsupportedFormat { .. }));

    let err = open_err(vec![0x49, 0x49], "tiny.tif").await;
    assert!(matches!(err, SlideError::UnsupportedFormat { .. }));
}

#[tokio::test]
async fn test_missing_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("absent.svs");
    assert!(matches!(
        Slide::open(&path).await,
        Err(SlideError::FileNotFound(_))
    ));
}

#[tokio::test]
async fn test_jp2_without_codestream_is_corrupt() {
    let mut bytes = vec![0x00, 0x00, 0x00, 0x0C, 0x6A, 0x50, 0x20, 0x20, 0x0D, 0x0A, 0x87, 0x0A];
    bytes.extend_from_slice(&20u32.to_be_bytes());
    bytes.extend_from_slice(b"ftypjp2 \0\0\0\0jp2 ");

    let err = open_err(bytes, "empty.jp2").await;
    assert!(matches!(err, SlideError::CorruptPyramid { .. }), "{:?}", err);
}

#[tokio::test]
async fn test_non_increasing_levels_corrupt() {
    let bytes = TiffBuilder::new(256, 256, 64).levels(&[1, 2, 2]).build();
    let err = open_err(bytes, "dup.tif").await;
    assert!(matches!(err, SlideError::CorruptPyramid { .. }), "{:?}", err);
}

// =============================================================================
// Byte Order and Sample Types
// =============================================================================

#[tokio::test]
async fn test_byte_orders_decode_identically() {
    let little = TiffBuilder::new(100, 70, 32).u16_samples();
    let big = TiffBuilder::new(100, 70, 32)
        .u16_samples()
        .byte_order(ByteOrderType::BigEndian);

    let a = read_full(&little, "le.tif").await;
    let b = read_full(&big, "be.tif").await;
    assert_eq!(a.sample_type, SampleType::U16);
    assert_eq!(a, b);

    let sample = |buf: &wsi_reader::PixelBuffer, y: usize, x: usize| {
        let bytes = buf.pixel(y, x).unwrap();
        u16::from_ne_bytes([bytes[0], bytes[1]])
    };
    assert_eq!(sample(&a, 0, 0), little.expected(0, 0, 0));
    assert_eq!(sample(&a, 69, 99), little.expected(69, 99, 0));
    assert_eq!(sample(&b, 33, 64), little.expected(33, 64, 0));
}

#[tokio::test]
async fn test_u16_fill_value_saturates() {
    let (_dir, path) = TiffBuilder::new(32, 32, 32).u16_samples().write("fill.tif");
    let options = wsi_reader::SlideOptions {
        fill_value: 1e9,
        ..Default::default()
    };
    let slide = Slide::open_with(&path, options).await.unwrap();
    let out = slide
        .read(AxisSlice::range(-1, 0), AxisSlice::range(0, 1))
        .await
        .unwrap();
    assert_eq!(out.as_bytes(), &u16::MAX.to_ne_bytes());
}

// =============================================================================
// Compression
// =============================================================================

#[tokio::test]
async fn test_deflate_matches_uncompressed() {
    let raw = TiffBuilder::new(150, 90, 64).channels(3);
    let deflate = TiffBuilder::new(150, 90, 64)
        .channels(3)
        .compression(TileCompression::Deflate);
    let predicted = TiffBuilder::new(150, 90, 64)
        .channels(3)
        .compression(TileCompression::Deflate)
        .predictor();

    let expected = read_full(&raw, "raw.tif").await;
    assert_eq!(read_full(&deflate, "deflate.tif").await, expected);
    assert_eq!(read_full(&predicted, "predicted.tif").await, expected);
}

#[tokio::test]
async fn test_lzw_matches_uncompressed() {
    let raw = TiffBuilder::new(150, 90, 64).channels(3);
    let lzw = TiffBuilder::new(150, 90, 64)
        .channels(3)
        .compression(TileCompression::Lzw);
    let predicted = TiffBuilder::new(150, 90, 64)
        .channels(3)
        .compression(TileCompression::Lzw)
        .predictor();

    let expected = read_full(&raw, "raw.tif").await;
    assert_eq!(read_full(&lzw, "lzw.tif").await, expected);
    assert_eq!(read_full(&predicted, "lzw_predicted.tif").await, expected);
}

#[tokio::test]
async fn test_lzw_predictor_u16_big_endian() {
    let raw = TiffBuilder::new(80, 80, 48).u16_samples();
    let predicted = TiffBuilder::new(80, 80, 48)
        .u16_samples()
        .byte_order(ByteOrderType::BigEndian)
        .compression(TileCompression::Lzw)
        .predictor();

    assert_eq!(
        read_full(&raw, "raw16.tif").await,
        read_full(&predicted, "lzw16.tif").await
    );
}

#[tokio::test]
async fn test_deflate_predictor_u16_big_endian() {
    let raw = TiffBuilder::new(80, 80, 48).u16_samples();
    let predicted = TiffBuilder::new(80, 80, 48)
        .u16_samples()
        .byte_order(ByteOrderType::BigEndian)
        .compression(TileCompression::Deflate)
        .predictor();

    assert_eq!(
        read_full(&raw, "raw16.tif").await,
        read_full(&predicted, "pred16.tif").await
    );
}

#[tokio::test]
async fn test_jpeg_tiles_decode_close_to_source() {
    let builder = TiffBuilder::new(256, 192, 128)
        .channels(3)
        .compression(TileCompression::Jpeg)
        .pattern(gradient);
    let out = read_full(&builder, "jpeg.tif").await;
    assert_eq!(out.shape(), (192, 256, 3));

    let mut total_error = 0u64;
    for y in 0..192u32 {
        for x in 0..256u32 {
            let pixel = out.pixel(y as usize, x as usize).unwrap();
            for c in 0..3u16 {
                let expected = builder.expected(y, x, c) as i64;
                total_error += (pixel[c as usize] as i64 - expected).unsigned_abs();
            }
        }
    }
    let mean_error = total_error as f64 / (192.0 * 256.0 * 3.0);
    assert!(mean_error < 4.0, "mean error {}", mean_error);
}

#[tokio::test]
async fn test_jpeg_gray_tiles() {
    let builder = TiffBuilder::new(128, 128, 64)
        .compression(TileCompression::Jpeg)
        .pattern(gradient);
    let out = read_full(&builder, "gray_jpeg.tif").await;
    assert_eq!(out.shape(), (128, 128, 1));
    let center = out.pixel(64, 64).unwrap()[0] as i32;
    assert!((center - builder.expected(64, 64, 0) as i32).abs() <= 6);
}

// =============================================================================
// Sparse and Corrupt Tiles
// =============================================================================

#[tokio::test]
async fn test_sparse_tile_reads_as_zero() {
    let builder = TiffBuilder::new(128, 128, 64).sparse_tile(0, 1, 0);
    let out = read_full(&builder, "sparse.tif").await;

    assert_eq!(out.pixel(10, 70), Some(&[0u8][..]));
    assert_eq!(out.pixel(10, 10), Some(&[builder.expected(10, 10, 0) as u8][..]));
}

#[tokio::test]
async fn test_corrupt_tile_fails_only_reads_touching_it() {
    for compression in [
        TileCompression::None,
        TileCompression::Lzw,
        TileCompression::Deflate,
        TileCompression::Jpeg,
    ] {
        let builder = TiffBuilder::new(128, 128, 64)
            .compression(compression)
            .pattern(gradient)
            .corrupt_tile(0, 0, 1);
        let (_dir, path) = builder.write("corrupt.tif");
        let slide = Slide::open(&path).await.unwrap();

        assert!(slide
            .read(AxisSlice::range(0, 64), AxisSlice::full())
            .await
            .is_ok());

        let err = slide
            .read(AxisSlice::range(60, 70), AxisSlice::range(0, 10))
            .await
            .unwrap_err();
        assert!(
            matches!(err, SlideError::Decode { level: 0, col: 0, row: 1, .. }),
            "{:?}: {:?}",
            compression,
            err
        );
    }
}
