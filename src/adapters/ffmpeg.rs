//! ffprobe/ffmpeg adapter.
//!
//! Executables are located once by [`FfmpegToolkit::discover`]: the
//! configured path is tried first, then the bare command name on `PATH`.
//! Every invocation runs under a timeout and is killed when it expires.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tokio::time::timeout;

use super::{MediaProbe, ProbeError, ProbeMetadata};

const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Probe backed by the ffprobe and ffmpeg executables
#[derive(Debug, Clone)]
pub struct FfmpegToolkit {
    ffprobe: Option<PathBuf>,
    ffmpeg: Option<PathBuf>,
    call_timeout: Duration,
}

impl FfmpegToolkit {
    /// Locate both tools, testing each candidate with `-version`
    pub async fn discover(ffprobe: &Path, ffmpeg: &Path, call_timeout: Duration) -> Self {
        let ffprobe = locate(ffprobe, "ffprobe").await;
        let ffmpeg = locate(ffmpeg, "ffmpeg").await;

        match (&ffprobe, &ffmpeg) {
            (Some(p), Some(m)) => {
                tracing::debug!("Using ffprobe at {} and ffmpeg at {}", p.display(), m.display())
            }
            _ => tracing::warn!(
                "Media tools incomplete (ffprobe: {}, ffmpeg: {}); video metadata and thumbnails are disabled",
                ffprobe.is_some(),
                ffmpeg.is_some()
            ),
        }

        Self {
            ffprobe,
            ffmpeg,
            call_timeout,
        }
    }

    /// Build a toolkit from already-resolved locations
    pub fn with_paths(
        ffprobe: Option<PathBuf>,
        ffmpeg: Option<PathBuf>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            ffprobe,
            ffmpeg,
            call_timeout,
        }
    }

    pub fn ffprobe_path(&self) -> Option<&Path> {
        self.ffprobe.as_deref()
    }

    pub fn ffmpeg_path(&self) -> Option<&Path> {
        self.ffmpeg.as_deref()
    }

    /// Run a tool to completion and return stdout
    async fn run<I, S>(
        &self,
        tool: &'static str,
        program: &Path,
        args: I,
    ) -> Result<Vec<u8>, ProbeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = timeout(self.call_timeout, child.wait_with_output())
            .await
            .map_err(|_| ProbeError::Timeout {
                tool,
                after: self.call_timeout,
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProbeError::Failed {
                tool,
                code: output.status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl MediaProbe for FfmpegToolkit {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn probe(&self, path: &Path) -> Result<ProbeMetadata, ProbeError> {
        let program = self
            .ffprobe
            .as_deref()
            .ok_or(ProbeError::Unavailable("ffprobe"))?;

        let args: [&OsStr; 10] = [
            OsStr::new("-v"),
            OsStr::new("error"),
            OsStr::new("-print_format"),
            OsStr::new("json"),
            OsStr::new("-show_format"),
            OsStr::new("-show_streams"),
            OsStr::new("-select_streams"),
            OsStr::new("v:0"),
            OsStr::new("--"),
            path.as_os_str(),
        ];

        let stdout = self.run("ffprobe", program, args).await?;
        let report: ProbeReport = serde_json::from_slice(&stdout)?;
        Ok(report.into_metadata())
    }

    async fn first_frame(&self, path: &Path) -> Result<Vec<u8>, ProbeError> {
        let program = self
            .ffmpeg
            .as_deref()
            .ok_or(ProbeError::Unavailable("ffmpeg"))?;

        // Minimal buffering and a single frame bound the work on malformed streams
        let args: [&OsStr; 16] = [
            OsStr::new("-nostdin"),
            OsStr::new("-v"),
            OsStr::new("error"),
            OsStr::new("-fflags"),
            OsStr::new("nobuffer"),
            OsStr::new("-i"),
            path.as_os_str(),
            OsStr::new("-frames:v"),
            OsStr::new("1"),
            OsStr::new("-pix_fmt"),
            OsStr::new("rgb24"),
            OsStr::new("-f"),
            OsStr::new("image2pipe"),
            OsStr::new("-c:v"),
            OsStr::new("png"),
            OsStr::new("-"),
        ];

        let frame = self.run("ffmpeg", program, args).await?;
        if frame.is_empty() {
            return Err(ProbeError::Failed {
                tool: "ffmpeg",
                code: 0,
                stderr: "no decodable frame".to_string(),
            });
        }

        Ok(frame)
    }
}

/// Try the configured location, then the bare command name
async fn locate(configured: &Path, fallback: &str) -> Option<PathBuf> {
    for candidate in [configured.to_path_buf(), PathBuf::from(fallback)] {
        if responds_to_version(&candidate).await {
            return Some(candidate);
        }
    }
    None
}

async fn responds_to_version(program: &Path) -> bool {
    let status = Command::new(program)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status();

    matches!(timeout(DISCOVERY_TIMEOUT, status).await, Ok(Ok(s)) if s.success())
}

#[derive(Debug, Default, Deserialize)]
struct ProbeReport {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: ProbeFormat,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    nb_frames: Option<String>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
    #[serde(default)]
    tags: BTreeMap<String, serde_json::Value>,
}

impl ProbeReport {
    fn into_metadata(self) -> ProbeMetadata {
        let container_duration = self.format.duration;
        let tags = self
            .format
            .tags
            .into_iter()
            .map(|(k, v)| match v {
                serde_json::Value::String(s) => (k, s),
                other => (k, other.to_string()),
            })
            .collect();

        let stream = self.streams.into_iter().next().unwrap_or_default();
        let frame_rate = stream
            .avg_frame_rate
            .as_deref()
            .and_then(parse_rate)
            .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rate));

        // Matroska and WebM omit nb_frames; estimate from the duration
        let frame_count = stream
            .nb_frames
            .as_deref()
            .and_then(|n| n.trim().parse::<u64>().ok())
            .filter(|n| *n > 0)
            .or_else(|| {
                let secs = stream
                    .duration
                    .as_deref()
                    .and_then(parse_seconds)
                    .or_else(|| container_duration.as_deref().and_then(parse_seconds))?;
                let frames = (secs * frame_rate?).round();
                (frames >= 1.0).then_some(frames as u64)
            });

        ProbeMetadata {
            tags,
            width: stream.width.filter(|w| *w > 0),
            height: stream.height.filter(|h| *h > 0),
            frame_count,
            frame_rate,
        }
    }
}

fn parse_seconds(raw: &str) -> Option<f64> {
    let secs: f64 = raw.trim().parse().ok()?;
    (secs.is_finite() && secs > 0.0).then_some(secs)
}

/// Parse `30000/1001` or `25`
fn parse_rate(raw: &str) -> Option<f64> {
    let rate = match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => raw.trim().parse().ok()?,
    };

    (rate.is_finite() && rate > 0.0).then_some(rate)
}
