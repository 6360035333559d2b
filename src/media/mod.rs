//! Per-file media work: metadata analysis, workflow extraction and
//! thumbnail rendering.
//!
//! Everything here is a leaf of the sync pipeline. Failures are reported
//! as [`MediaError`] and the pipeline decides what to leave at defaults.

pub mod analyzer;
pub mod extractor;
pub mod frames;
pub mod scanner;
pub mod thumbnail;

use thiserror::Error;

use crate::adapters::ProbeError;

pub use analyzer::{analyze, MediaInfo, MediaSettings};
pub use extractor::{extract_workflow, ExtractedWorkflow, WorkflowSource};
pub use scanner::{scan_bytes, JsonCandidates};
pub use thumbnail::{RenderOutcome, ThumbnailCache, ThumbnailFormat, ThumbnailSettings};

/// Errors from media decoding and encoding
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),

    #[error("Blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
