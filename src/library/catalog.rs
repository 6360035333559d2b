//! SQLite catalog: one row per live path.
//!
//! Rows are keyed by [`FileId`]. Writes are upserts, so a row's move
//! history survives a rescan.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::CatalogError;
use crate::domain::{FileId, FileRecord, MediaKind};

/// Current `PRAGMA user_version`
pub const SCHEMA_VERSION: i64 = 2;

/// Columns added after the first schema, with their definitions
const ADDED_COLUMNS: [(&str, &str); 5] = [
    ("last_scanned", "REAL"),
    ("models", "TEXT NOT NULL DEFAULT '[]'"),
    ("loras", "TEXT NOT NULL DEFAULT '[]'"),
    ("input_files", "TEXT NOT NULL DEFAULT '[]'"),
    ("media_created_at", "REAL"),
];

const RECORD_COLUMNS: &str = "id, path, mtime, name, kind, duration, dimensions, has_workflow, \
     size, last_scanned, models, loras, input_files, media_created_at";

/// Rows touched by one [`Catalog::apply`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub deleted: usize,
    pub upserted: usize,
}

impl WriteSummary {
    pub fn is_empty(&self) -> bool {
        self.deleted == 0 && self.upserted == 0
    }
}

/// One rename/move recorded against a row
#[derive(Debug, Clone, PartialEq)]
pub struct MoveRecord {
    pub file_id: FileId,
    pub from_path: PathBuf,
    pub to_path: PathBuf,
    pub moved_at: DateTime<Utc>,
}

/// Handle on the catalog database
pub struct Catalog {
    conn: Connection,
    db_path: Option<PathBuf>,
}

impl Catalog {
    /// Open or create the catalog at `path`
    pub fn open(path: &Path) -> Result<Self, CatalogError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let mut catalog = Self {
            conn,
            db_path: Some(path.to_path_buf()),
        };
        catalog.init_schema()?;

        tracing::debug!("Catalog opened at {}", path.display());
        Ok(catalog)
    }

    /// Catalog that lives only as long as the handle
    pub fn open_in_memory() -> Result<Self, CatalogError> {
        let mut catalog = Self {
            conn: Connection::open_in_memory()?,
            db_path: None,
        };
        catalog.init_schema()?;
        Ok(catalog)
    }

    /// Database file, `None` for in-memory catalogs
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn init_schema(&mut self) -> Result<(), CatalogError> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let version: i64 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?;

        let tx = self.conn.transaction()?;

        tx.execute_batch(
            "CREATE TABLE IF NOT EXISTS files (
                id              TEXT PRIMARY KEY,
                path            TEXT NOT NULL UNIQUE,
                mtime           REAL NOT NULL,
                name            TEXT NOT NULL,
                kind            TEXT NOT NULL DEFAULT 'unknown',
                duration        TEXT NOT NULL DEFAULT '',
                dimensions      TEXT NOT NULL DEFAULT '',
                has_workflow    INTEGER NOT NULL DEFAULT 0,
                size            INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_files_mtime ON files(mtime DESC);",
        )?;

        // Older catalogs keep their rows and gain the missing columns
        if version < SCHEMA_VERSION {
            let existing: Vec<String> = {
                let mut stmt = tx.prepare("SELECT name FROM pragma_table_info('files')")?;
                let names = stmt.query_map([], |row| row.get(0))?;
                names.collect::<Result<_, _>>()?
            };

            for (column, definition) in ADDED_COLUMNS {
                if !existing.iter().any(|c| c == column) {
                    tx.execute_batch(&format!(
                        "ALTER TABLE files ADD COLUMN {} {}",
                        column, definition
                    ))?;
                    if version > 0 {
                        tracing::info!("Catalog migrated: added column {}", column);
                    }
                }
            }
        }

        tx.execute_batch(
            "CREATE TABLE IF NOT EXISTS file_move_history (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                file_id         TEXT NOT NULL
                                REFERENCES files(id) ON UPDATE CASCADE ON DELETE CASCADE,
                from_path       TEXT NOT NULL,
                to_path         TEXT NOT NULL,
                moved_at        REAL NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_move_history_file ON file_move_history(file_id);",
        )?;

        tx.execute_batch(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))?;
        tx.commit()?;

        Ok(())
    }

    /// Recorded path → mtime. With a scope, only direct children of that
    /// folder are returned.
    pub fn recorded_mtimes(&self, scope: Option<&Path>) -> Result<HashMap<PathBuf, f64>, CatalogError> {
        let mut stmt = self.conn.prepare("SELECT path, mtime FROM files")?;
        let rows = stmt.query_map([], |row| {
            Ok((PathBuf::from(row.get::<_, String>(0)?), row.get::<_, f64>(1)?))
        })?;

        let mut recorded = HashMap::new();
        for row in rows {
            let (path, mtime) = row?;
            if in_scope(&path, scope) {
                recorded.insert(path, mtime);
            }
        }

        Ok(recorded)
    }

    /// Delete by path, then upsert by id.
    ///
    /// Deletions commit in one transaction before any upsert. Upserts commit
    /// in chunks of `batch_size`, so an interrupted pass leaves whole chunks.
    pub fn apply(
        &mut self,
        deletes: &[PathBuf],
        upserts: &[FileRecord],
        batch_size: usize,
    ) -> Result<WriteSummary, CatalogError> {
        let mut summary = WriteSummary::default();

        if !deletes.is_empty() {
            let tx = self.conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached("DELETE FROM files WHERE path = ?1")?;
                for path in deletes {
                    summary.deleted += stmt.execute(params![path_text(path)])?;
                }
            }
            tx.commit()?;
        }

        let mut sorted: Vec<&FileRecord> = upserts.iter().collect();
        sorted.sort_by(|a, b| a.path.cmp(&b.path));

        for chunk in sorted.chunks(batch_size.max(1)) {
            let tx = self.conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT INTO files (id, path, mtime, name, kind, duration, dimensions,
                         has_workflow, size, last_scanned, models, loras, input_files, media_created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                     ON CONFLICT(id) DO UPDATE SET
                         path = excluded.path,
                         mtime = excluded.mtime,
                         name = excluded.name,
                         kind = excluded.kind,
                         duration = excluded.duration,
                         dimensions = excluded.dimensions,
                         has_workflow = excluded.has_workflow,
                         size = excluded.size,
                         last_scanned = excluded.last_scanned,
                         models = excluded.models,
                         loras = excluded.loras,
                         input_files = excluded.input_files,
                         media_created_at = excluded.media_created_at",
                )?;

                for record in chunk {
                    stmt.execute(params![
                        record.id.as_str(),
                        path_text(&record.path),
                        record.mtime,
                        record.name,
                        record.kind.as_str(),
                        record.duration,
                        record.dimensions,
                        record.has_workflow,
                        record.size as i64,
                        to_epoch(record.last_scanned),
                        serde_json::to_string(&record.models)?,
                        serde_json::to_string(&record.loras)?,
                        serde_json::to_string(&record.input_files)?,
                        record.media_created_at.map(to_epoch),
                    ])?;
                    summary.upserted += 1;
                }
            }
            tx.commit()?;
        }

        Ok(summary)
    }

    /// Move a row to a new path: new id, new name, one history entry.
    pub fn relocate(&mut self, old: &Path, new: &Path) -> Result<FileRecord, CatalogError> {
        let old_id = FileId::from_path(old);
        let new_id = FileId::from_path(new);
        let name = file_name(new);

        let tx = self.conn.transaction()?;

        let exists: Option<String> = tx
            .query_row("SELECT id FROM files WHERE id = ?1", params![old_id.as_str()], |row| {
                row.get(0)
            })
            .optional()?;
        if exists.is_none() {
            return Err(CatalogError::NotFound(old.to_path_buf()));
        }

        let taken: Option<String> = tx
            .query_row("SELECT id FROM files WHERE path = ?1", params![path_text(new)], |row| {
                row.get(0)
            })
            .optional()?;
        if taken.is_some() {
            return Err(CatalogError::PathTaken(new.to_path_buf()));
        }

        // History rows follow the id through ON UPDATE CASCADE
        tx.execute(
            "UPDATE files SET id = ?1, path = ?2, name = ?3 WHERE id = ?4",
            params![new_id.as_str(), path_text(new), name, old_id.as_str()],
        )?;
        tx.execute(
            "INSERT INTO file_move_history (file_id, from_path, to_path, moved_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![new_id.as_str(), path_text(old), path_text(new), to_epoch(Utc::now())],
        )?;

        tx.commit()?;

        tracing::debug!("Relocated {} -> {}", old.display(), new.display());

        self.get(&new_id)?
            .ok_or_else(|| CatalogError::NotFound(new.to_path_buf()))
    }

    /// Moves recorded for a row, oldest first
    pub fn move_history(&self, id: &FileId) -> Result<Vec<MoveRecord>, CatalogError> {
        let mut stmt = self.conn.prepare(
            "SELECT file_id, from_path, to_path, moved_at FROM file_move_history
             WHERE file_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![id.as_str()], |row| {
            Ok(MoveRecord {
                file_id: FileId::from_raw(row.get::<_, String>(0)?),
                from_path: PathBuf::from(row.get::<_, String>(1)?),
                to_path: PathBuf::from(row.get::<_, String>(2)?),
                moved_at: from_epoch(row.get(3)?).unwrap_or_default(),
            })
        })?;

        Ok(rows.collect::<Result<_, _>>()?)
    }

    pub fn get(&self, id: &FileId) -> Result<Option<FileRecord>, CatalogError> {
        let sql = format!("SELECT {} FROM files WHERE id = ?1", RECORD_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![id.as_str()], read_record)
            .optional()?)
    }

    pub fn get_by_path(&self, path: &Path) -> Result<Option<FileRecord>, CatalogError> {
        let sql = format!("SELECT {} FROM files WHERE path = ?1", RECORD_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![path_text(path)], read_record)
            .optional()?)
    }

    /// Rows, most recently modified first
    pub fn list(&self, limit: Option<usize>) -> Result<Vec<FileRecord>, CatalogError> {
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let sql = format!(
            "SELECT {} FROM files ORDER BY mtime DESC, path LIMIT ?1",
            RECORD_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit], read_record)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Every row, optionally limited to direct children of a folder
    pub fn records(&self, scope: Option<&Path>) -> Result<Vec<FileRecord>, CatalogError> {
        let sql = format!("SELECT {} FROM files ORDER BY path", RECORD_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], read_record)?;

        let mut records = Vec::new();
        for row in rows {
            let record = row?;
            if in_scope(&record.path, scope) {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Rows never scanned, or last scanned before `cutoff`
    pub fn scanned_before(
        &self,
        cutoff: DateTime<Utc>,
        scope: Option<&Path>,
    ) -> Result<Vec<FileRecord>, CatalogError> {
        let sql = format!(
            "SELECT {} FROM files WHERE last_scanned IS NULL OR last_scanned < ?1 ORDER BY path",
            RECORD_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![to_epoch(cutoff)], read_record)?;

        let mut records = Vec::new();
        for row in rows {
            let record = row?;
            if in_scope(&record.path, scope) {
                records.push(record);
            }
        }
        Ok(records)
    }

    pub fn count(&self) -> Result<usize, CatalogError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool, CatalogError> {
        Ok(self.count()? == 0)
    }
}

fn in_scope(path: &Path, scope: Option<&Path>) -> bool {
    match scope {
        Some(dir) => path.parent() == Some(dir),
        None => true,
    }
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn to_epoch(dt: DateTime<Utc>) -> f64 {
    dt.timestamp_micros() as f64 / 1_000_000.0
}

fn from_epoch(secs: f64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_micros((secs * 1_000_000.0).round() as i64)
}

/// Lists that fail to decode read back empty
fn string_list(raw: Option<String>) -> Vec<String> {
    raw.and_then(|s| serde_json::from_str(&s).ok()).unwrap_or_default()
}

fn read_record(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    let kind: String = row.get(4)?;
    let last_scanned: Option<f64> = row.get(9)?;
    let media_created_at: Option<f64> = row.get(13)?;

    Ok(FileRecord {
        id: FileId::from_raw(row.get::<_, String>(0)?),
        path: PathBuf::from(row.get::<_, String>(1)?),
        mtime: row.get(2)?,
        name: row.get(3)?,
        kind: kind.parse().unwrap_or(MediaKind::Unknown),
        duration: row.get(5)?,
        dimensions: row.get(6)?,
        has_workflow: row.get(7)?,
        size: row.get::<_, i64>(8)?.max(0) as u64,
        last_scanned: last_scanned.and_then(from_epoch).unwrap_or_default(),
        models: string_list(row.get(10)?),
        loras: string_list(row.get(11)?),
        input_files: string_list(row.get(12)?),
        media_created_at: media_created_at.and_then(from_epoch),
    })
}
