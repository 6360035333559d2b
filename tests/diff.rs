//! Sync Diff Integration Tests
//!
//! Partitioning of disk and catalog state into add/update/delete sets.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use mediacat::core::SyncDiff;
use mediacat::library::Catalog;
use mediacat::domain::{FileId, FileRecord, MediaKind};

fn set(paths: &[&str]) -> BTreeSet<PathBuf> {
    paths.iter().map(PathBuf::from).collect()
}

fn record(path: &str, mtime: f64) -> FileRecord {
    let path = PathBuf::from(path);
    FileRecord {
        id: FileId::from_path(&path),
        name: path.file_name().unwrap().to_string_lossy().into_owned(),
        path,
        mtime,
        kind: MediaKind::Image,
        duration: String::new(),
        dimensions: String::new(),
        has_workflow: false,
        size: 0,
        last_scanned: chrono::Utc::now(),
        models: vec![],
        loras: vec![],
        input_files: vec![],
        media_created_at: None,
    }
}

#[test]
fn test_partitions_are_exact_and_disjoint() {
    // A: disk only, B: catalog only, C: newer on disk, D: unchanged
    let on_disk: HashMap<PathBuf, f64> = [
        ("/lib/a1.png", 10.0),
        ("/lib/a2.mp4", 11.0),
        ("/lib/c1.png", 200.0),
        ("/lib/c2.gif", 301.2),
        ("/lib/d1.png", 50.0),
        ("/lib/d2.png", 60.7),
    ]
    .into_iter()
    .map(|(p, m)| (PathBuf::from(p), m))
    .collect();

    let recorded: HashMap<PathBuf, f64> = [
        ("/lib/b1.png", 1.0),
        ("/lib/b2.webp", 2.0),
        ("/lib/c1.png", 100.0),
        ("/lib/c2.gif", 300.9),
        ("/lib/d1.png", 50.0),
        ("/lib/d2.png", 60.1),
    ]
    .into_iter()
    .map(|(p, m)| (PathBuf::from(p), m))
    .collect();

    let diff = SyncDiff::compute(&on_disk, &recorded);

    assert_eq!(diff.to_add, set(&["/lib/a1.png", "/lib/a2.mp4"]));
    assert_eq!(diff.to_delete, set(&["/lib/b1.png", "/lib/b2.webp"]));
    assert_eq!(diff.to_update, set(&["/lib/c1.png", "/lib/c2.gif"]));

    for unchanged in ["/lib/d1.png", "/lib/d2.png"] {
        let p = PathBuf::from(unchanged);
        assert!(!diff.to_add.contains(&p));
        assert!(!diff.to_update.contains(&p));
        assert!(!diff.to_delete.contains(&p));
    }

    assert_eq!(diff.work_list().len(), 4);
}

#[test]
fn test_diff_against_catalog_state() {
    let mut catalog = Catalog::open_in_memory().unwrap();
    catalog
        .apply(
            &[],
            &[record("/lib/keep.png", 5.0), record("/lib/gone.png", 5.0)],
            500,
        )
        .unwrap();

    let on_disk: HashMap<PathBuf, f64> = [
        (PathBuf::from("/lib/keep.png"), 5.4),
        (PathBuf::from("/lib/new.png"), 9.0),
    ]
    .into_iter()
    .collect();

    let diff = SyncDiff::compute(&on_disk, &catalog.recorded_mtimes(None).unwrap());

    assert_eq!(diff.to_add, set(&["/lib/new.png"]));
    assert_eq!(diff.to_delete, set(&["/lib/gone.png"]));
    assert!(diff.to_update.is_empty());
}
