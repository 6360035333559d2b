//! Candidate enumeration: path → mtime for files under a root.
//!
//! The sync core never walks directories itself; the CLI feeds it what
//! this module finds.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use walkdir::{DirEntry, WalkDir};

use crate::domain::{KindHint, MediaKind};

/// Extensions never catalogued by a full walk
const IGNORED_EXTENSIONS: [&str; 2] = ["json", "sqlite"];

/// Recursive walk of a library root.
///
/// Hidden directories and `state_dir` are not entered; `.json` and
/// `.sqlite` files are left out, as are paths that are not valid UTF-8
/// (the catalog stores paths as text).
pub fn walk_library(root: &Path, state_dir: Option<&Path>) -> HashMap<PathBuf, f64> {
    let walker = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !skip_dir(entry, state_dir));

    let mut found = HashMap::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!("Walk error under {}: {}", root.display(), e);
                continue;
            }
        };

        if !entry.file_type().is_file() || has_ignored_extension(entry.path()) {
            continue;
        }
        if entry.path().to_str().is_none() {
            tracing::warn!("Skipping non-UTF-8 path {}", entry.path().display());
            continue;
        }

        if let Some(mtime) = mtime_of(&entry) {
            found.insert(entry.into_path(), mtime);
        }
    }

    found
}

/// Direct children of one folder with a known media extension
pub fn walk_folder(folder: &Path) -> HashMap<PathBuf, f64> {
    let walker = WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok());

    walker
        .filter(|entry| entry.file_type().is_file() && is_media(entry.path()))
        .filter(|entry| {
            let utf8 = entry.path().to_str().is_some();
            if !utf8 {
                tracing::warn!("Skipping non-UTF-8 path {}", entry.path().display());
            }
            utf8
        })
        .filter_map(|entry| mtime_of(&entry).map(|mtime| (entry.into_path(), mtime)))
        .collect()
}

fn skip_dir(entry: &DirEntry, state_dir: Option<&Path>) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let hidden = entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.'));
    hidden || state_dir.is_some_and(|state| entry.path() == state)
}

fn has_ignored_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| IGNORED_EXTENSIONS.iter().any(|i| i.eq_ignore_ascii_case(ext)))
}

fn is_media(path: &Path) -> bool {
    MediaKind::hint_for_path(path) != KindHint::Known(MediaKind::Unknown)
}

fn mtime_of(entry: &DirEntry) -> Option<f64> {
    let modified = entry.metadata().ok()?.modified().ok()?;
    Some(modified.duration_since(UNIX_EPOCH).ok()?.as_secs_f64())
}
