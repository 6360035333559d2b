//! Thumbnail renderer and cache.
//!
//! Artifacts live flat in one directory as `{content_hash}.{ext}`. A write
//! goes to a temp file in the same directory and is renamed into place
//! without clobbering, so a reader sees either nothing or a whole file.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use image::codecs::gif::{GifEncoder, Repeat};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, Frame, ImageReader};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use super::frames::{self, Container};
use super::MediaError;
use crate::adapters::MediaProbe;
use crate::config::DEFAULT_THUMBNAIL_WIDTH;
use crate::domain::{ContentHash, FileRecord, MediaKind};

/// Output format for static thumbnails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThumbnailFormat {
    Webp,
    Jpeg,
}

impl ThumbnailFormat {
    /// Anything other than jpeg/jpg falls back to webp
    pub fn parse_lossy(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => ThumbnailFormat::Jpeg,
            _ => ThumbnailFormat::Webp,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ThumbnailFormat::Webp => "webp",
            ThumbnailFormat::Jpeg => "jpeg",
        }
    }

    pub fn default_quality(self) -> u8 {
        match self {
            ThumbnailFormat::Webp => 70,
            ThumbnailFormat::Jpeg => 80,
        }
    }
}

/// Extension used for animated thumbnails
pub const ANIMATED_EXTENSION: &str = "gif";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThumbnailSettings {
    /// Bounding box is `width x 2*width`
    pub width: u32,
    pub format: ThumbnailFormat,
    pub quality: u8,
}

impl Default for ThumbnailSettings {
    fn default() -> Self {
        Self {
            width: DEFAULT_THUMBNAIL_WIDTH,
            format: ThumbnailFormat::Webp,
            quality: ThumbnailFormat::Webp.default_quality(),
        }
    }
}

impl ThumbnailSettings {
    fn bounds(&self) -> (u32, u32) {
        (self.width.max(1), self.width.max(1).saturating_mul(2))
    }
}

/// What a render call did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    /// An artifact for this hash was already present
    Existing(PathBuf),

    /// A new artifact was written
    Rendered(PathBuf),

    /// Nothing to render (unsupported kind, no frames, unreadable video)
    Skipped,
}

impl RenderOutcome {
    pub fn path(&self) -> Option<&Path> {
        match self {
            RenderOutcome::Existing(p) | RenderOutcome::Rendered(p) => Some(p),
            RenderOutcome::Skipped => None,
        }
    }
}

struct Encoded {
    bytes: Vec<u8>,
    extension: &'static str,
}

/// Content-addressed thumbnail directory
#[derive(Debug, Clone)]
pub struct ThumbnailCache {
    dir: PathBuf,
    settings: ThumbnailSettings,
}

impl ThumbnailCache {
    pub fn new(dir: impl Into<PathBuf>, settings: ThumbnailSettings) -> Self {
        Self {
            dir: dir.into(),
            settings,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn settings(&self) -> &ThumbnailSettings {
        &self.settings
    }

    /// Existing artifact for a hash, whatever its extension
    pub fn lookup(&self, hash: &ContentHash) -> Option<PathBuf> {
        let dir = glob::Pattern::escape(self.dir.to_str()?);
        let pattern = format!("{}/{}.*", dir.trim_end_matches('/'), hash);
        glob::glob(&pattern).ok()?.filter_map(Result::ok).next()
    }

    /// Render the artifact for `hash` unless one already exists
    pub async fn render(
        &self,
        path: &Path,
        hash: &ContentHash,
        kind: MediaKind,
        probe: &dyn MediaProbe,
    ) -> Result<RenderOutcome, MediaError> {
        if let Some(existing) = self.lookup(hash) {
            return Ok(RenderOutcome::Existing(existing));
        }

        let settings = self.settings;
        let encoded = match kind {
            MediaKind::Image | MediaKind::AnimatedImage => {
                let source = path.to_path_buf();
                tokio::task::spawn_blocking(move || encode_image_file(&source, kind, &settings))
                    .await??
            }
            MediaKind::Video => match probe.first_frame(path).await {
                Ok(png) => {
                    tokio::task::spawn_blocking(move || encode_video_frame(&png, &settings))
                        .await??
                }
                Err(e) => {
                    tracing::debug!("No video frame for {}: {}", path.display(), e);
                    None
                }
            },
            MediaKind::Audio | MediaKind::Unknown => None,
        };

        let Some(encoded) = encoded else {
            return Ok(RenderOutcome::Skipped);
        };

        let target = self.dir.join(format!("{}.{}", hash, encoded.extension));
        let dir = self.dir.clone();
        let outcome =
            tokio::task::spawn_blocking(move || persist(&dir, &target, &encoded.bytes)).await??;

        Ok(outcome)
    }

    /// Artifact for a catalog row, rendered on demand. `None` when it
    /// cannot be produced.
    pub async fn ensure(&self, record: &FileRecord, probe: &dyn MediaProbe) -> Option<PathBuf> {
        let hash = record.content_hash();
        match self.render(&record.path, &hash, record.kind, probe).await {
            Ok(outcome) => outcome.path().map(Path::to_path_buf),
            Err(e) => {
                tracing::debug!("Thumbnail unavailable for {}: {}", record.path.display(), e);
                None
            }
        }
    }
}

/// Write-then-rename into the cache directory
fn persist(dir: &Path, target: &Path, bytes: &[u8]) -> Result<RenderOutcome, MediaError> {
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;

    match tmp.persist_noclobber(target) {
        Ok(_) => Ok(RenderOutcome::Rendered(target.to_path_buf())),
        // Another task finished the same hash first
        Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
            Ok(RenderOutcome::Existing(target.to_path_buf()))
        }
        Err(e) => Err(MediaError::Io(e.error)),
    }
}

/// Largest size within `bounds` keeping the aspect ratio, never upscaling
pub fn fit_within(width: u32, height: u32, bounds: (u32, u32)) -> (u32, u32) {
    let (max_w, max_h) = bounds;
    if width <= max_w && height <= max_h {
        return (width, height);
    }

    let scale = f64::min(
        f64::from(max_w) / f64::from(width),
        f64::from(max_h) / f64::from(height),
    );
    let w = ((f64::from(width) * scale).round() as u32).clamp(1, max_w);
    let h = ((f64::from(height) * scale).round() as u32).clamp(1, max_h);
    (w, h)
}

fn encode_image_file(
    path: &Path,
    kind: MediaKind,
    settings: &ThumbnailSettings,
) -> Result<Option<Encoded>, MediaError> {
    let bytes = std::fs::read(path)?;

    if kind == MediaKind::AnimatedImage {
        if let Some(container) = Container::of(path) {
            let decoded = frames::decode_frames_from_bytes(&bytes, container)?;
            if decoded.len() > 1 {
                let repeat = match frames::loop_count(&bytes, container) {
                    Some(0) | None => Repeat::Infinite,
                    Some(n) => Repeat::Finite(n),
                };
                return encode_animation(decoded, repeat, settings);
            }
        }
    }

    let image = ImageReader::new(Cursor::new(&bytes))
        .with_guessed_format()?
        .decode()?;
    encode_static(image, settings).map(Some)
}

fn encode_video_frame(png: &[u8], settings: &ThumbnailSettings) -> Result<Option<Encoded>, MediaError> {
    let image = image::load_from_memory(png)?;
    encode_static(image, settings).map(Some)
}

fn encode_static(image: DynamicImage, settings: &ThumbnailSettings) -> Result<Encoded, MediaError> {
    let (w, h) = fit_within(image.width(), image.height(), settings.bounds());
    let image = if (w, h) == (image.width(), image.height()) {
        image
    } else {
        image.resize_exact(w, h, FilterType::Lanczos3)
    };
    let rgb = image.to_rgb8();

    let bytes = match settings.format {
        ThumbnailFormat::Webp => {
            let encoded = webp::Encoder::from_rgb(rgb.as_raw(), rgb.width(), rgb.height())
                .encode(f32::from(settings.quality));
            encoded.to_vec()
        }
        ThumbnailFormat::Jpeg => {
            let mut out = Vec::new();
            JpegEncoder::new_with_quality(&mut out, settings.quality)
                .encode_image(&rgb)
                .map_err(|e| MediaError::Encode(e.to_string()))?;
            out
        }
    };

    Ok(Encoded {
        bytes,
        extension: settings.format.extension(),
    })
}

/// Resize every frame and re-encode as GIF, keeping delays and loop count
fn encode_animation(
    decoded: Vec<Frame>,
    repeat: Repeat,
    settings: &ThumbnailSettings,
) -> Result<Option<Encoded>, MediaError> {
    let resized: Vec<Frame> = decoded
        .into_iter()
        .filter_map(|frame| {
            let delay = frame.delay();
            let buffer = frame.into_buffer();
            let (w, h) = fit_within(buffer.width(), buffer.height(), settings.bounds());
            if w == 0 || h == 0 {
                return None;
            }
            let buffer = if (w, h) == buffer.dimensions() {
                buffer
            } else {
                image::imageops::resize(&buffer, w, h, FilterType::Lanczos3)
            };
            Some(Frame::from_parts(buffer, 0, 0, delay))
        })
        .collect();

    if resized.is_empty() {
        return Ok(None);
    }

    let mut out = Vec::new();
    {
        let mut encoder = GifEncoder::new_with_speed(&mut out, 10);
        encoder
            .set_repeat(repeat)
            .map_err(|e| MediaError::Encode(e.to_string()))?;
        encoder
            .encode_frames(resized)
            .map_err(|e| MediaError::Encode(e.to_string()))?;
    }

    Ok(Some(Encoded {
        bytes: out,
        extension: ANIMATED_EXTENSION,
    }))
}
