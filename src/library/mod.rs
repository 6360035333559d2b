//! Persistent catalog of media files.
//!
//! # Storage Layout
//!
//! ```text
//! ~/.mediacat/
//! ├── catalog.sqlite            # files + file_move_history
//! ├── sync.lock                 # held while a sync pass runs
//! └── thumbnails/
//!     └── <content_hash>.<ext>  # SHA256(path + mtime)[0:16]
//! ```

pub mod catalog;

use std::path::PathBuf;

use thiserror::Error;

pub use catalog::{Catalog, MoveRecord, WriteSummary, SCHEMA_VERSION};

/// Errors from catalog access
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not in catalog: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Path already catalogued: {}", .0.display())]
    PathTaken(PathBuf),
}
