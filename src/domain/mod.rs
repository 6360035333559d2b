//! Domain types for the media catalog.
//!
//! This module contains the core data structures:
//! - Record: catalog rows, file ids, content hashes, media kinds
//! - Workflow: classified embedded workflow documents
//! - Projection: models, LoRAs, input files and node summaries
//! - Progress: sync pass progress events

pub mod progress;
pub mod projection;
pub mod record;
pub mod workflow;

// Re-export commonly used types
pub use progress::{ProgressEvent, ProgressSink, ProgressStatus};
pub use record::{format_duration, ContentHash, FileId, FileRecord, KindHint, MediaKind};
pub use workflow::{classify, WorkflowDocument, WorkflowFormat};
