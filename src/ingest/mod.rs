//! Candidate file enumeration for sync passes.
//!
//! ```text
//! library root → walker → path→mtime map → SyncEngine
//! ```

pub mod walker;

pub use walker::{walk_folder, walk_library};
