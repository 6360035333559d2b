//! Thumbnail Cache Integration Tests

use std::path::Path;

use chrono::Utc;
use image::codecs::gif::{GifEncoder, Repeat};
use image::{AnimationDecoder, Delay, Frame, RgbaImage};
use mediacat::adapters::UnavailableProbe;
use mediacat::domain::ContentHash;
use mediacat::media::{RenderOutcome, ThumbnailCache, ThumbnailFormat, ThumbnailSettings};
use mediacat::{FileId, FileRecord, MediaKind};
use tempfile::TempDir;

fn cache(dir: &Path, format: ThumbnailFormat) -> ThumbnailCache {
    ThumbnailCache::new(
        dir.join("thumbnails"),
        ThumbnailSettings {
            width: 64,
            format,
            quality: format.default_quality(),
        },
    )
}

fn write_gif(path: &Path, frames: usize) {
    let file = std::fs::File::create(path).unwrap();
    let mut encoder = GifEncoder::new(file);
    encoder.set_repeat(Repeat::Infinite).unwrap();
    for i in 0..frames {
        let buffer = RgbaImage::from_pixel(200, 100, image::Rgba([i as u8 * 60, 40, 90, 255]));
        encoder
            .encode_frame(Frame::from_parts(
                buffer,
                0,
                0,
                Delay::from_numer_denom_ms(80, 1),
            ))
            .unwrap();
    }
}

#[test]
fn test_content_hash_follows_path_and_mtime() {
    let path = Path::new("/library/render/0001.png");
    let a = ContentHash::new(path, 1_700_000_000.0);
    let b = ContentHash::new(path, 1_700_000_000.0);
    let c = ContentHash::new(path, 1_700_000_001.0);
    let d = ContentHash::new(Path::new("/library/render/0002.png"), 1_700_000_000.0);

    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_ne!(a, d);
    assert_eq!(a.as_str().len(), 16);
}

#[tokio::test]
async fn test_render_once_then_reuse() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("wide.png");
    image::RgbImage::from_pixel(400, 100, image::Rgb([1, 2, 3]))
        .save(&source)
        .unwrap();

    let cache = cache(temp.path(), ThumbnailFormat::Webp);
    let hash = ContentHash::new(&source, 1_700_000_000.0);

    let first = cache
        .render(&source, &hash, MediaKind::Image, &UnavailableProbe)
        .await
        .unwrap();
    let RenderOutcome::Rendered(path) = first else {
        panic!("expected a fresh render, got {:?}", first);
    };
    assert_eq!(path, cache.dir().join(format!("{}.webp", hash)));
    assert_eq!(cache.lookup(&hash), Some(path.clone()));

    let second = cache
        .render(&source, &hash, MediaKind::Image, &UnavailableProbe)
        .await
        .unwrap();
    assert_eq!(second, RenderOutcome::Existing(path));
}

#[tokio::test]
async fn test_jpeg_output_and_bounds() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("tall.png");
    image::RgbImage::from_pixel(100, 400, image::Rgb([200, 10, 10]))
        .save(&source)
        .unwrap();

    let cache = cache(temp.path(), ThumbnailFormat::Jpeg);
    let hash = ContentHash::new(&source, 42.0);
    let outcome = cache
        .render(&source, &hash, MediaKind::Image, &UnavailableProbe)
        .await
        .unwrap();

    let path = outcome.path().unwrap();
    assert_eq!(path.extension().unwrap(), "jpeg");

    // 64 wide box allows 128 tall
    let thumb = image::open(path).unwrap();
    assert_eq!((thumb.width(), thumb.height()), (32, 128));
}

#[tokio::test]
async fn test_animated_gif_keeps_frames() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("loop.gif");
    write_gif(&source, 3);

    let cache = cache(temp.path(), ThumbnailFormat::Webp);
    let hash = ContentHash::new(&source, 7.0);
    let outcome = cache
        .render(&source, &hash, MediaKind::AnimatedImage, &UnavailableProbe)
        .await
        .unwrap();

    let path = outcome.path().unwrap();
    assert_eq!(path.extension().unwrap(), "gif");

    let file = std::io::BufReader::new(std::fs::File::open(path).unwrap());
    let frames = image::codecs::gif::GifDecoder::new(file)
        .unwrap()
        .into_frames()
        .collect_frames()
        .unwrap();
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0].buffer().width(), 64);
}

#[tokio::test]
async fn test_video_without_tools_is_skipped() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("clip.mp4");
    std::fs::write(&source, b"not really a video").unwrap();

    let cache = cache(temp.path(), ThumbnailFormat::Webp);
    let hash = ContentHash::new(&source, 1.0);
    let outcome = cache
        .render(&source, &hash, MediaKind::Video, &UnavailableProbe)
        .await
        .unwrap();

    assert_eq!(outcome, RenderOutcome::Skipped);
    assert!(cache.lookup(&hash).is_none());
}

#[tokio::test]
async fn test_ensure_renders_lazily_for_a_record() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("lazy.png");
    image::RgbImage::new(10, 10).save(&source).unwrap();

    let record = FileRecord {
        id: FileId::from_path(&source),
        path: source.clone(),
        mtime: 1_700_000_000.0,
        name: "lazy.png".to_string(),
        kind: MediaKind::Image,
        duration: String::new(),
        dimensions: "10x10".to_string(),
        has_workflow: false,
        size: 0,
        last_scanned: Utc::now(),
        models: vec![],
        loras: vec![],
        input_files: vec![],
        media_created_at: None,
    };

    let cache = cache(temp.path(), ThumbnailFormat::Webp);
    assert!(cache.lookup(&record.content_hash()).is_none());

    let path = cache.ensure(&record, &UnavailableProbe).await.unwrap();
    assert!(path.exists());
    assert_eq!(cache.ensure(&record, &UnavailableProbe).await, Some(path));

    let audio = FileRecord {
        kind: MediaKind::Audio,
        ..record
    };
    assert!(cache.ensure(&audio, &UnavailableProbe).await.is_none());
}
