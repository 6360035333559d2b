//! Catalog rows and the identities derived from them.
//!
//! A [`FileRecord`] is keyed by a [`FileId`] (digest of the absolute path),
//! while its thumbnail is keyed by a [`ContentHash`] (digest of path + mtime).

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Row identity: SHA256(path)[0:16], hex encoded.
///
/// Only changes when the file is renamed or moved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(String);

impl FileId {
    /// Derive the id for an absolute path
    pub fn from_path(path: &Path) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(path.to_string_lossy().as_bytes());
        let result = hasher.finalize();
        Self(hex::encode(&result[..16]))
    }

    /// Wrap an id read back from the catalog
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Thumbnail cache key: SHA256(path + mtime)[0:16], hex encoded.
///
/// This is not a hash of file bytes. Any mtime change yields a new key,
/// which is what invalidates stale thumbnails.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn new(path: &Path, mtime: f64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(path.to_string_lossy().as_bytes());
        hasher.update(mtime.to_string().as_bytes());
        let result = hasher.finalize();
        Self(hex::encode(&result[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Media kind of a catalogued file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    AnimatedImage,
    Video,
    Audio,
    #[default]
    Unknown,
}

/// What the extension alone says about a file's kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindHint {
    /// The extension decides the kind
    Known(MediaKind),

    /// Container may be static or animated; the file must be opened
    NeedsFrameCheck,
}

impl MediaKind {
    /// Classify by extension (case-insensitive, without the leading dot)
    pub fn hint_for_extension(ext: &str) -> KindHint {
        match ext.to_ascii_lowercase().as_str() {
            "png" | "jpg" | "jpeg" | "jfif" | "bmp" | "tif" | "tiff" => {
                KindHint::Known(MediaKind::Image)
            }
            "gif" => KindHint::Known(MediaKind::AnimatedImage),
            "webp" => KindHint::NeedsFrameCheck,
            "mp4" | "webm" | "mov" | "mkv" | "avi" | "m4v" => KindHint::Known(MediaKind::Video),
            "mp3" | "wav" | "ogg" | "flac" | "m4a" | "aac" => KindHint::Known(MediaKind::Audio),
            _ => KindHint::Known(MediaKind::Unknown),
        }
    }

    /// Classify a path by its extension
    pub fn hint_for_path(path: &Path) -> KindHint {
        path.extension()
            .and_then(|e| e.to_str())
            .map(Self::hint_for_extension)
            .unwrap_or(KindHint::Known(MediaKind::Unknown))
    }

    /// Still or animated image
    pub fn is_image(self) -> bool {
        matches!(self, MediaKind::Image | MediaKind::AnimatedImage)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::AnimatedImage => "animated_image",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MediaKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "image" => Ok(MediaKind::Image),
            "animated_image" => Ok(MediaKind::AnimatedImage),
            "video" => Ok(MediaKind::Video),
            "audio" => Ok(MediaKind::Audio),
            "unknown" | "" => Ok(MediaKind::Unknown),
            _ => anyhow::bail!("Unknown media kind: {}", s),
        }
    }
}

/// One catalogued asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// SHA256(path)[0:16]
    pub id: FileId,

    /// Absolute path (unique)
    pub path: PathBuf,

    /// Last observed modification time, seconds since the epoch
    pub mtime: f64,

    /// File name only
    pub name: String,

    pub kind: MediaKind,

    /// `MM:SS` or `H:MM:SS`, empty when unknown
    pub duration: String,

    /// `WxH`, empty when unknown
    pub dimensions: String,

    pub has_workflow: bool,

    /// Size in bytes
    pub size: u64,

    /// When the pipeline last ran successfully for this path
    pub last_scanned: DateTime<Utc>,

    /// Checkpoint names referenced by the embedded workflow
    #[serde(default)]
    pub models: Vec<String>,

    /// LoRA names referenced by the embedded workflow
    #[serde(default)]
    pub loras: Vec<String>,

    /// Media file names the workflow consumed
    #[serde(default)]
    pub input_files: Vec<String>,

    /// Capture time from embedded tags (distinct from mtime)
    pub media_created_at: Option<DateTime<Utc>>,
}

impl FileRecord {
    /// Cache key for this row's thumbnail
    pub fn content_hash(&self) -> ContentHash {
        ContentHash::new(&self.path, self.mtime)
    }
}

/// Format a duration in seconds the way the catalog stores it
pub fn format_duration(seconds: f64) -> String {
    if !seconds.is_finite() || seconds <= 0.0 {
        return String::new();
    }

    let total = seconds as u64;
    let (h, rem) = (total / 3600, total % 3600);
    let (m, s) = (rem / 60, rem % 60);

    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{:02}:{:02}", m, s)
    }
}
