//! Sync orchestration.
//!
//! This module contains:
//! - Diff: disk vs. catalog comparison
//! - Dispatcher: bounded worker pool
//! - Pipeline: analyze, extract, render for one file
//! - Engine: sync and rescan passes
//! - Lock: one pass at a time per catalog

pub mod context;
pub mod diff;
pub mod dispatcher;
pub mod engine;
pub mod lock;
pub mod pipeline;

use std::path::PathBuf;

use thiserror::Error;

use crate::library::CatalogError;

// Re-export commonly used types
pub use context::MediaContext;
pub use diff::SyncDiff;
pub use dispatcher::{Dispatched, Dispatcher};
pub use engine::{RescanMode, SyncEngine, SyncOutcome, SyncReport};
pub use lock::SyncLock;
pub use pipeline::{process_file, ProcessedFile};

/// Errors that abort a whole pass
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Failed to take sync lock: {0}")]
    Lock(#[source] std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of one file; the dispatcher turns these into skips
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Cannot stat {}: {source}", .path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
