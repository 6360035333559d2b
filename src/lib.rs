//! mediacat - Media catalog with embedded workflow recovery
//!
//! Keeps a SQLite catalog in step with an ordinary directory tree of
//! generated images and videos, recovers the workflow documents that
//! authoring tools hide inside those files, and caches thumbnails keyed
//! by path and mtime.
//!
//! # Architecture
//!
//! A sync pass is diff → dispatch → write:
//! - The diff compares disk mtimes with recorded mtimes (no content read)
//! - A bounded worker pool runs analyze → extract → render per file
//! - The catalog takes deletions first, then chunked upserts
//!
//! # Modules
//!
//! - `adapters`: External media tools (ffprobe, ffmpeg)
//! - `core`: Sync engine, diff, dispatcher, per-file pipeline, lock
//! - `domain`: Data structures (FileRecord, WorkflowDocument, progress)
//! - `media`: Analyzer, workflow extractor, scanner, thumbnails
//! - `library`: SQLite catalog
//! - `ingest`: Directory walker feeding sync passes
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Sync the whole library
//! mediacat sync
//!
//! # Sync one folder
//! mediacat sync --folder ~/ComfyUI/output/portraits
//!
//! # Show what is embedded in a file
//! mediacat inspect image.png
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod ingest;
pub mod library;
pub mod media;

// Re-export main types at crate root for convenience
pub use crate::core::{MediaContext, RescanMode, SyncEngine, SyncOutcome, SyncReport};
pub use domain::{FileId, FileRecord, MediaKind, WorkflowDocument, WorkflowFormat};
pub use library::Catalog;
