//! Sync and rescan passes.
//!
//! A pass is diff → deletions → dispatch → upserts. The catalog is only
//! touched before and after the parallel phase, and only by the task
//! holding the sync lock.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::context::MediaContext;
use super::diff::SyncDiff;
use super::dispatcher::Dispatcher;
use super::lock::SyncLock;
use super::pipeline::process_file;
use super::SyncError;
use crate::config::SyncSettings;
use crate::domain::{MediaKind, ProgressEvent, ProgressSink, ProgressStatus};
use crate::library::Catalog;

/// Which catalogued files a rescan revisits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescanMode {
    /// Every row
    All,
    /// Rows whose last scan is older than the cutoff
    Recent { older_than: Duration },
    /// Files missing from the catalog, or rows missing their thumbnail
    Missing,
}

impl RescanMode {
    /// `Recent` with the default one-hour cutoff
    pub fn recent() -> Self {
        RescanMode::Recent {
            older_than: Duration::hours(1),
        }
    }
}

/// Counters for one pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub pass_id: Uuid,
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Rows written by the pass
    pub processed: usize,
    /// Files the pipeline gave up on
    pub skipped: usize,
    pub thumbnails_rendered: usize,
}

/// How a pass ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nothing to do
    UpToDate(SyncReport),
    Completed(SyncReport),
    /// Another pass holds the lock
    AlreadyRunning,
}

impl SyncOutcome {
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            SyncOutcome::UpToDate(report) | SyncOutcome::Completed(report) => Some(report),
            SyncOutcome::AlreadyRunning => None,
        }
    }
}

/// Owns the catalog handle and runs passes against it
pub struct SyncEngine {
    ctx: Arc<MediaContext>,
    catalog: Catalog,
    lock_path: PathBuf,
    dispatcher: Dispatcher,
    batch_size: usize,
}

impl SyncEngine {
    pub fn new(
        ctx: Arc<MediaContext>,
        catalog: Catalog,
        lock_path: impl Into<PathBuf>,
        settings: &SyncSettings,
    ) -> Self {
        Self {
            ctx,
            catalog,
            lock_path: lock_path.into(),
            dispatcher: Dispatcher::new(settings.workers),
            batch_size: settings.batch_size.max(1),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut Catalog {
        &mut self.catalog
    }

    pub fn context(&self) -> &Arc<MediaContext> {
        &self.ctx
    }

    /// Full sync of the catalog against `on_disk` (path → mtime)
    pub async fn sync(
        &mut self,
        on_disk: HashMap<PathBuf, f64>,
        progress: &ProgressSink,
    ) -> Result<SyncOutcome, SyncError> {
        self.locked_sync(None, on_disk, progress).await
    }

    /// Sync one folder: only its direct children on both sides of the diff
    pub async fn sync_folder(
        &mut self,
        folder: &Path,
        on_disk: HashMap<PathBuf, f64>,
        progress: &ProgressSink,
    ) -> Result<SyncOutcome, SyncError> {
        self.locked_sync(Some(folder), on_disk, progress).await
    }

    /// Re-run the pipeline over catalogued files regardless of mtime.
    /// `on_disk` is consulted by [`RescanMode::Missing`] only.
    pub async fn rescan(
        &mut self,
        mode: RescanMode,
        scope: Option<&Path>,
        on_disk: &HashMap<PathBuf, f64>,
        progress: &ProgressSink,
    ) -> Result<SyncOutcome, SyncError> {
        let Some(_lock) = self.acquire(progress)? else {
            return Ok(SyncOutcome::AlreadyRunning);
        };

        let pass_id = Uuid::new_v4();
        let result = self.rescan_pass(pass_id, mode, scope, on_disk, progress).await;
        report_failure(&result, progress);
        result
    }

    async fn locked_sync(
        &mut self,
        scope: Option<&Path>,
        on_disk: HashMap<PathBuf, f64>,
        progress: &ProgressSink,
    ) -> Result<SyncOutcome, SyncError> {
        let Some(_lock) = self.acquire(progress)? else {
            return Ok(SyncOutcome::AlreadyRunning);
        };

        let pass_id = Uuid::new_v4();
        let result = self.sync_pass(pass_id, scope, on_disk, progress).await;
        report_failure(&result, progress);
        result
    }

    fn acquire(&self, progress: &ProgressSink) -> Result<Option<SyncLock>, SyncError> {
        match SyncLock::try_acquire(&self.lock_path).map_err(SyncError::Lock)? {
            Some(lock) => Ok(Some(lock)),
            None => {
                info!("Another sync pass is already running");
                progress.emit(
                    ProgressEvent::new("Sync already in progress", 0, 0)
                        .with_status(ProgressStatus::AlreadyRunning),
                );
                Ok(None)
            }
        }
    }

    #[instrument(skip_all, fields(pass_id = %pass_id, scope = %scope_label(scope)))]
    async fn sync_pass(
        &mut self,
        pass_id: Uuid,
        scope: Option<&Path>,
        mut on_disk: HashMap<PathBuf, f64>,
        progress: &ProgressSink,
    ) -> Result<SyncOutcome, SyncError> {
        progress.emit(ProgressEvent::new("Checking for changes", 0, 0));

        on_disk.retain(|path, _| storable(path));
        if let Some(folder) = scope {
            on_disk.retain(|path, _| path.parent() == Some(folder));
        }
        let recorded = self.catalog.recorded_mtimes(scope)?;
        let diff = SyncDiff::compute(&on_disk, &recorded);

        let mut report = SyncReport {
            pass_id,
            added: diff.to_add.len(),
            updated: diff.to_update.len(),
            ..Default::default()
        };

        if diff.is_empty() {
            info!("Already up to date");
            progress.emit(
                ProgressEvent::new("Already up to date", 0, 0).with_status(ProgressStatus::NoChanges),
            );
            return Ok(SyncOutcome::UpToDate(report));
        }

        // Deletions land before any new work so a freed path cannot collide
        if !diff.to_delete.is_empty() {
            let written = self.catalog.apply(&diff.deletions(), &[], self.batch_size)?;
            report.deleted = written.deleted;
        }

        self.process_and_write(diff.work_list(), progress, &mut report)
            .await?;

        info!(
            added = report.added,
            updated = report.updated,
            deleted = report.deleted,
            skipped = report.skipped,
            "Sync complete"
        );
        let total = report.added + report.updated;
        progress.emit(
            ProgressEvent::new("Sync complete", total, total).with_status(ProgressStatus::Complete),
        );

        Ok(SyncOutcome::Completed(report))
    }

    #[instrument(skip_all, fields(pass_id = %pass_id, scope = %scope_label(scope), mode = ?mode))]
    async fn rescan_pass(
        &mut self,
        pass_id: Uuid,
        mode: RescanMode,
        scope: Option<&Path>,
        on_disk: &HashMap<PathBuf, f64>,
        progress: &ProgressSink,
    ) -> Result<SyncOutcome, SyncError> {
        progress.emit(ProgressEvent::new("Collecting files to rescan", 0, 0));

        let mut report = SyncReport {
            pass_id,
            ..Default::default()
        };

        let work: Vec<PathBuf> = match mode {
            RescanMode::All => paths_of(self.catalog.records(scope)?),
            RescanMode::Recent { older_than } => {
                paths_of(self.catalog.scanned_before(Utc::now() - older_than, scope)?)
            }
            RescanMode::Missing => {
                let recorded = self.catalog.records(scope)?;
                let known: HashMap<&Path, ()> =
                    recorded.iter().map(|r| (r.path.as_path(), ())).collect();

                let mut absent: Vec<PathBuf> = on_disk
                    .keys()
                    .filter(|p| scope.map_or(true, |folder| p.parent() == Some(folder)))
                    .filter(|p| !known.contains_key(p.as_path()) && storable(p))
                    .cloned()
                    .collect();
                absent.sort();
                report.added = absent.len();

                let unrendered: Vec<PathBuf> = recorded
                    .iter()
                    .filter(|r| {
                        matches!(
                            r.kind,
                            MediaKind::Image | MediaKind::AnimatedImage | MediaKind::Video
                        )
                    })
                    .filter(|r| self.ctx.thumbnails.lookup(&r.content_hash()).is_none())
                    .map(|r| r.path.clone())
                    .collect();

                absent.into_iter().chain(unrendered).collect()
            }
        };

        report.updated = work.len().saturating_sub(report.added);

        if work.is_empty() {
            info!("Nothing to rescan");
            progress.emit(
                ProgressEvent::new("Nothing to rescan", 0, 0).with_status(ProgressStatus::NoChanges),
            );
            return Ok(SyncOutcome::UpToDate(report));
        }

        let total = work.len();
        self.process_and_write(work, progress, &mut report).await?;

        info!(
            processed = report.processed,
            skipped = report.skipped,
            "Rescan complete"
        );
        progress.emit(
            ProgressEvent::new("Rescan complete", total, total).with_status(ProgressStatus::Complete),
        );

        Ok(SyncOutcome::Completed(report))
    }

    async fn process_and_write(
        &mut self,
        work: Vec<PathBuf>,
        progress: &ProgressSink,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        debug!(
            files = work.len(),
            workers = self.dispatcher.workers(),
            "Dispatching pipeline"
        );
        let ctx = self.ctx.clone();
        let dispatched = self
            .dispatcher
            .run(work, progress, move |path| {
                let ctx = ctx.clone();
                async move { process_file(path, &ctx).await }
            })
            .await;

        report.skipped = dispatched.failures();
        report.thumbnails_rendered = dispatched.completed.iter().filter(|p| p.rendered).count();

        let records: Vec<_> = dispatched.completed.into_iter().map(|p| p.record).collect();
        let written = self.catalog.apply(&[], &records, self.batch_size)?;
        report.processed = written.upserted;

        Ok(())
    }
}

fn paths_of(records: Vec<crate::domain::FileRecord>) -> Vec<PathBuf> {
    records.into_iter().map(|r| r.path).collect()
}

/// Catalog paths are stored as UTF-8 text
fn storable(path: &Path) -> bool {
    if path.to_str().is_some() {
        return true;
    }
    warn!("Not cataloguing non-UTF-8 path {}", path.display());
    false
}

fn scope_label(scope: Option<&Path>) -> String {
    scope
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "library".to_string())
}

fn report_failure(result: &Result<SyncOutcome, SyncError>, progress: &ProgressSink) {
    if let Err(e) = result {
        tracing::error!("Sync pass failed: {}", e);
        progress.emit(
            ProgressEvent::new(format!("Sync failed: {}", e), 0, 0).with_status(ProgressStatus::Error),
        );
    }
}
