//! Per-file pipeline: analyze, extract, render.
//!
//! Only a failed stat fails a file. Everything after that degrades to
//! defaults so the row is still written.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use chrono::Utc;

use super::context::MediaContext;
use super::PipelineError;
use crate::domain::workflow::{input_files, models_and_loras};
use crate::domain::{ContentHash, FileId, FileRecord};
use crate::media::{analyze, extract_workflow, RenderOutcome};

/// Result of running the pipeline on one path
#[derive(Debug, Clone)]
pub struct ProcessedFile {
    pub record: FileRecord,
    /// A thumbnail was written during this run
    pub rendered: bool,
}

/// Size and mtime (seconds since the epoch) of a file
pub async fn stat(path: &Path) -> Result<(u64, f64), PipelineError> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|source| PipelineError::Stat {
            path: path.to_path_buf(),
            source,
        })?;

    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or_default();

    Ok((meta.len(), mtime))
}

/// Run the full pipeline for one path
pub async fn process_file(path: PathBuf, ctx: &MediaContext) -> Result<ProcessedFile, PipelineError> {
    let (size, mtime) = stat(&path).await?;
    let probe = ctx.probe.as_ref();

    let info = analyze(&path, &ctx.media, probe).await;

    let mut record = FileRecord {
        id: FileId::from_path(&path),
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        path: path.clone(),
        mtime,
        kind: info.kind,
        duration: info.duration,
        dimensions: info.dimensions,
        has_workflow: false,
        size,
        last_scanned: Utc::now(),
        models: Vec::new(),
        loras: Vec::new(),
        input_files: Vec::new(),
        media_created_at: info.media_created_at,
    };

    if let Some(found) = extract_workflow(&path, record.kind, info.container.as_ref()).await {
        let (models, loras) = models_and_loras(&found.document);
        record.has_workflow = true;
        record.models = models;
        record.loras = loras;
        record.input_files = input_files(&found.document);
        tracing::debug!("{} workflow in {}", found.format(), path.display());
    }

    let hash = ContentHash::new(&path, mtime);
    let rendered = match ctx.thumbnails.render(&path, &hash, record.kind, probe).await {
        Ok(RenderOutcome::Rendered(_)) => true,
        Ok(_) => false,
        Err(e) => {
            tracing::debug!("Thumbnail failed for {}: {}", path.display(), e);
            false
        }
    };

    tracing::debug!("Processed {}", path.display());
    Ok(ProcessedFile { record, rendered })
}
