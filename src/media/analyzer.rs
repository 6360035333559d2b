//! Metadata analyzer: kind, dimensions, duration and capture time.
//!
//! Every field degrades to its default on failure. A corrupt file still
//! produces a [`MediaInfo`].

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use exif::{In, Tag};
use image::ImageReader;

use super::frames::{self, Container};
use super::MediaError;
use crate::adapters::{MediaProbe, ProbeMetadata};
use crate::config::DEFAULT_WEBP_FPS;
use crate::domain::{format_duration, KindHint, MediaKind};

/// EXIF tags holding capture time, most specific first
const CAPTURE_TIME_TAGS: [Tag; 3] = [Tag::DateTimeOriginal, Tag::DateTimeDigitized, Tag::DateTime];

/// Container tags holding creation time, most common first
const CREATION_TIME_TAGS: [&str; 3] = ["creation_time", "date", "com.apple.quicktime.creationdate"];

/// Analyzer settings
#[derive(Debug, Clone, Copy)]
pub struct MediaSettings {
    /// Frame rate assumed for animated WebP, which stores no usable delays
    pub webp_fps: f64,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            webp_fps: DEFAULT_WEBP_FPS,
        }
    }
}

/// Derived fields for one file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaInfo {
    pub kind: MediaKind,
    /// `WxH` or empty
    pub dimensions: String,
    /// `MM:SS` / `H:MM:SS` or empty
    pub duration: String,
    pub media_created_at: Option<DateTime<Utc>>,
    /// Container metadata, kept for the workflow search when the probe ran
    pub container: Option<ProbeMetadata>,
}

impl MediaInfo {
    fn of_kind(kind: MediaKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }
}

/// Analyze a file. Never fails; unknown fields stay empty.
pub async fn analyze(path: &Path, settings: &MediaSettings, probe: &dyn MediaProbe) -> MediaInfo {
    match MediaKind::hint_for_path(path) {
        KindHint::Known(MediaKind::Video) => analyze_video(path, probe).await,
        KindHint::Known(kind @ (MediaKind::Audio | MediaKind::Unknown)) => MediaInfo::of_kind(kind),
        hint => {
            let owned: PathBuf = path.to_path_buf();
            let settings = *settings;
            match tokio::task::spawn_blocking(move || analyze_image(&owned, hint, &settings)).await {
                Ok(info) => info,
                Err(e) => {
                    tracing::warn!("Image analysis task failed for {}: {}", path.display(), e);
                    MediaInfo::of_kind(fallback_kind(hint))
                }
            }
        }
    }
}

fn fallback_kind(hint: KindHint) -> MediaKind {
    match hint {
        KindHint::Known(kind) => kind,
        KindHint::NeedsFrameCheck => MediaKind::Image,
    }
}

/// Blocking image analysis
pub fn analyze_image(path: &Path, hint: KindHint, settings: &MediaSettings) -> MediaInfo {
    let kind = match hint {
        KindHint::Known(kind) => kind,
        KindHint::NeedsFrameCheck => match frames::is_animated_webp(path) {
            Ok(true) => MediaKind::AnimatedImage,
            Ok(false) => MediaKind::Image,
            Err(e) => {
                tracing::debug!("Could not check animation for {}: {}", path.display(), e);
                MediaKind::Image
            }
        },
    };

    let mut info = MediaInfo::of_kind(kind);

    match image_dimensions(path) {
        Ok((w, h)) => info.dimensions = format!("{}x{}", w, h),
        Err(e) => tracing::debug!("No dimensions for {}: {}", path.display(), e),
    }

    if kind == MediaKind::AnimatedImage {
        match animation_seconds(path, settings) {
            Ok(Some(secs)) => info.duration = format_duration(secs),
            Ok(None) => {}
            Err(e) => tracing::debug!("No duration for {}: {}", path.display(), e),
        }
    }

    info.media_created_at = exif_capture_time(path);
    info
}

fn image_dimensions(path: &Path) -> Result<(u32, u32), MediaError> {
    let dims = ImageReader::open(path)?
        .with_guessed_format()?
        .into_dimensions()?;
    Ok(dims)
}

/// Sum of frame delays for GIF, frame count over the assumed rate for WebP.
/// Single-frame files have no duration.
fn animation_seconds(path: &Path, settings: &MediaSettings) -> Result<Option<f64>, MediaError> {
    let Some(container) = Container::of(path) else {
        return Ok(None);
    };

    let reader = BufReader::new(File::open(path)?);
    let decoded = frames::decode_frames(reader, container)?;
    if decoded.len() < 2 {
        return Ok(None);
    }

    let secs = match container {
        Container::Gif => {
            let total_ms: u64 = decoded.iter().map(|f| u64::from(frames::frame_delay_ms(f))).sum();
            total_ms as f64 / 1000.0
        }
        Container::WebP => decoded.len() as f64 / settings.webp_fps,
    };

    Ok(Some(secs))
}

/// First populated EXIF capture-time tag, as `YYYY:MM:DD HH:MM:SS`
fn exif_capture_time(path: &Path) -> Option<DateTime<Utc>> {
    let file = File::open(path).ok()?;
    let exif = exif::Reader::new()
        .read_from_container(&mut BufReader::new(file))
        .ok()?;

    CAPTURE_TIME_TAGS.iter().find_map(|tag| {
        let field = exif.get_field(*tag, In::PRIMARY)?;
        match &field.value {
            exif::Value::Ascii(parts) => parts
                .iter()
                .filter_map(|p| std::str::from_utf8(p).ok())
                .find_map(parse_exif_datetime),
            _ => None,
        }
    })
}

pub fn parse_exif_datetime(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw.trim(), "%Y:%m:%d %H:%M:%S")
        .ok()
        .map(|dt| dt.and_utc())
}

/// Parse a container creation tag.
///
/// Offset and fractional seconds are dropped before trying the fixed
/// patterns; an RFC 3339 parse of the untouched value is the last resort.
pub fn parse_container_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    let base = raw.split('+').next().unwrap_or(raw);
    let base = base.split('.').next().unwrap_or(base);

    for pattern in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(base, pattern) {
            return Some(dt.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(base, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }

    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

async fn analyze_video(path: &Path, probe: &dyn MediaProbe) -> MediaInfo {
    let mut info = MediaInfo::of_kind(MediaKind::Video);

    match probe.probe(path).await {
        Ok(meta) => {
            apply_video_metadata(&mut info, &meta);
            info.container = Some(meta);
        }
        Err(e) if e.is_unavailable() => {}
        Err(e) => tracing::debug!("Probe failed for {}: {}", path.display(), e),
    }

    info
}

fn apply_video_metadata(info: &mut MediaInfo, meta: &ProbeMetadata) {
    if let (Some(w), Some(h)) = (meta.width, meta.height) {
        info.dimensions = format!("{}x{}", w, h);
    }

    info.duration = meta.duration_secs().map(format_duration).unwrap_or_default();

    info.media_created_at = CREATION_TIME_TAGS
        .iter()
        .filter_map(|key| meta.tags.get(*key))
        .find_map(|raw| parse_container_datetime(raw));
}
