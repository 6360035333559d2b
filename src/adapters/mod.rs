//! Adapter interfaces for external media tools.
//!
//! The probe adapter wraps a media-inspection tool and a transcoding tool.
//! Absence of either is a soft failure: callers get
//! [`ProbeError::Unavailable`] and degrade.

pub mod ffmpeg;

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use ffmpeg::FfmpegToolkit;

/// Errors from probe invocations
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("{0} is not available")]
    Unavailable(&'static str),

    #[error("{tool} timed out after {after:?}")]
    Timeout { tool: &'static str, after: Duration },

    #[error("{tool} failed with exit code {code}: {stderr}")]
    Failed {
        tool: &'static str,
        code: i32,
        stderr: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse probe output: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ProbeError {
    /// True when the tool itself is missing, as opposed to failing on this file
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ProbeError::Unavailable(_))
    }
}

/// Container-level metadata for a video file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeMetadata {
    /// Container tags (`format.tags`), e.g. `creation_time`, `comment`
    pub tags: BTreeMap<String, String>,

    /// First video stream width
    pub width: Option<u32>,

    /// First video stream height
    pub height: Option<u32>,

    /// Frame count as reported by the container
    pub frame_count: Option<u64>,

    /// Frames per second
    pub frame_rate: Option<f64>,
}

impl ProbeMetadata {
    /// Duration in seconds from frame count and frame rate
    pub fn duration_secs(&self) -> Option<f64> {
        match (self.frame_count, self.frame_rate) {
            (Some(frames), Some(fps)) if frames > 0 && fps > 0.0 => Some(frames as f64 / fps),
            _ => None,
        }
    }
}

/// Media probe abstraction
#[async_trait]
pub trait MediaProbe: Send + Sync {
    /// Human-readable probe name
    fn name(&self) -> &str;

    /// Read container metadata
    async fn probe(&self, path: &Path) -> Result<ProbeMetadata, ProbeError>;

    /// Decode the first video frame and return it PNG-encoded
    async fn first_frame(&self, path: &Path) -> Result<Vec<u8>, ProbeError>;
}

/// Probe that always reports the tools as missing
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableProbe;

#[async_trait]
impl MediaProbe for UnavailableProbe {
    fn name(&self) -> &str {
        "unavailable"
    }

    async fn probe(&self, _path: &Path) -> Result<ProbeMetadata, ProbeError> {
        Err(ProbeError::Unavailable("ffprobe"))
    }

    async fn first_frame(&self, _path: &Path) -> Result<Vec<u8>, ProbeError> {
        Err(ProbeError::Unavailable("ffmpeg"))
    }
}
