//! Disk vs. catalog reconciliation.
//!
//! Works on stat metadata only; no file content is read.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

/// Three disjoint path sets produced by one comparison
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncDiff {
    /// On disk, not in the catalog
    pub to_add: BTreeSet<PathBuf>,
    /// In both, disk mtime newer at whole-second granularity
    pub to_update: BTreeSet<PathBuf>,
    /// In the catalog, gone from disk
    pub to_delete: BTreeSet<PathBuf>,
}

impl SyncDiff {
    pub fn compute(on_disk: &HashMap<PathBuf, f64>, recorded: &HashMap<PathBuf, f64>) -> Self {
        let mut diff = Self::default();

        for (path, disk_mtime) in on_disk {
            match recorded.get(path) {
                None => {
                    diff.to_add.insert(path.clone());
                }
                Some(recorded_mtime) if whole_seconds(*disk_mtime) > whole_seconds(*recorded_mtime) => {
                    diff.to_update.insert(path.clone());
                }
                Some(_) => {}
            }
        }

        for path in recorded.keys() {
            if !on_disk.contains_key(path) {
                diff.to_delete.insert(path.clone());
            }
        }

        diff
    }

    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }

    /// Paths that need the pipeline: additions then updates
    pub fn work_list(&self) -> Vec<PathBuf> {
        self.to_add
            .iter()
            .chain(self.to_update.iter())
            .cloned()
            .collect()
    }

    pub fn deletions(&self) -> Vec<PathBuf> {
        self.to_delete.iter().cloned().collect()
    }
}

/// Sub-second differences are ignored. A change within the same second as
/// the recorded mtime is not detected.
fn whole_seconds(mtime: f64) -> i64 {
    mtime.trunc() as i64
}
