//! EXIF Integration Tests
//!
//! JPEG fixtures carry a real APP1 block written with kamadak-exif.

use std::io::Cursor;
use std::path::Path;

use chrono::{TimeZone, Utc};
use exif::experimental::Writer;
use exif::{Field, In, Tag, Value};
use image::codecs::jpeg::JpegEncoder;
use mediacat::adapters::UnavailableProbe;
use mediacat::media::{analyze, extract_workflow, MediaSettings, WorkflowSource};
use mediacat::{MediaKind, WorkflowFormat};
use tempfile::TempDir;

fn ascii(tag: Tag, text: &str) -> Field {
    Field {
        tag,
        ifd_num: In::PRIMARY,
        value: Value::Ascii(vec![text.as_bytes().to_vec()]),
    }
}

/// Small JPEG with the given fields in its EXIF block
fn jpeg_with_exif(path: &Path, fields: &[Field]) {
    let image = image::RgbImage::from_pixel(12, 8, image::Rgb([90, 90, 90]));
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, 80)
        .encode_image(&image)
        .unwrap();

    let mut writer = Writer::new();
    for field in fields {
        writer.push_field(field);
    }
    let mut tiff = Cursor::new(Vec::new());
    writer.write(&mut tiff, false).unwrap();
    let tiff = tiff.into_inner();

    // APP1 goes right after SOI
    let mut out = jpeg[..2].to_vec();
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&((2 + 6 + tiff.len()) as u16).to_be_bytes());
    out.extend_from_slice(b"Exif\0\0");
    out.extend_from_slice(&tiff);
    out.extend_from_slice(&jpeg[2..]);
    std::fs::write(path, out).unwrap();
}

#[tokio::test]
async fn test_workflow_behind_exif_marker() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("marked.jpg");
    jpeg_with_exif(
        &path,
        &[ascii(
            Tag::Make,
            r#"workflow:{"nodes":[{"id":3,"type":"KSampler","mode":0}]}"#,
        )],
    );

    let found = extract_workflow(&path, MediaKind::Image, None).await.unwrap();
    assert_eq!(found.source, WorkflowSource::ExifMarker);
    assert_eq!(found.format(), WorkflowFormat::Ui);
}

#[tokio::test]
async fn test_workflow_found_by_exif_scan() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("described.jpg");
    jpeg_with_exif(
        &path,
        &[
            ascii(Tag::Make, "Studio"),
            ascii(
                Tag::ImageDescription,
                r#"{"nodes":[{"id":1,"type":"SaveImage"}],"links":[]}"#,
            ),
        ],
    );

    let found = extract_workflow(&path, MediaKind::Image, None).await.unwrap();
    assert_eq!(found.source, WorkflowSource::ExifScan);
    assert_eq!(found.format(), WorkflowFormat::Ui);
}

#[tokio::test]
async fn test_marker_without_a_workflow_finds_nothing() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("odd.jpg");
    jpeg_with_exif(&path, &[ascii(Tag::Make, r#"workflow:{"status":"draft"}"#)]);

    assert!(extract_workflow(&path, MediaKind::Image, None).await.is_none());
}

#[tokio::test]
async fn test_capture_time_from_date_time_original() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("shot.jpg");
    jpeg_with_exif(
        &path,
        &[
            ascii(Tag::DateTime, "2024:01:01 00:00:00"),
            ascii(Tag::DateTimeOriginal, "2023:07:14 09:30:05"),
        ],
    );

    let info = analyze(&path, &MediaSettings::default(), &UnavailableProbe).await;

    assert_eq!(info.kind, MediaKind::Image);
    assert_eq!(info.dimensions, "12x8");
    assert_eq!(
        info.media_created_at,
        Some(Utc.with_ymd_and_hms(2023, 7, 14, 9, 30, 5).unwrap())
    );
}

#[tokio::test]
async fn test_no_exif_means_no_capture_time() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("bare.png");
    image::RgbImage::new(4, 4).save(&path).unwrap();

    let info = analyze(&path, &MediaSettings::default(), &UnavailableProbe).await;
    assert!(info.media_created_at.is_none());
}
