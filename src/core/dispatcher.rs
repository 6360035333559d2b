//! Bounded worker pool for the per-file pipeline.
//!
//! At most `workers` tasks are in flight. Results come back in completion
//! order; a failed or panicked task is logged and skipped.

use std::future::Future;
use std::path::PathBuf;

use tokio::task::JoinSet;

use super::PipelineError;
use crate::domain::{ProgressEvent, ProgressSink};

/// What came back from one dispatch
#[derive(Debug)]
pub struct Dispatched<T> {
    pub completed: Vec<T>,
    pub skipped: Vec<PathBuf>,
    /// Tasks that panicked or were cancelled; their path is unknown
    pub lost: usize,
}

impl<T> Dispatched<T> {
    pub fn failures(&self) -> usize {
        self.skipped.len() + self.lost
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Dispatcher {
    workers: usize,
}

impl Dispatcher {
    /// `workers = 1` runs strictly one file at a time
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `worker` over every path
    pub async fn run<T, F, Fut>(
        &self,
        paths: Vec<PathBuf>,
        progress: &ProgressSink,
        worker: F,
    ) -> Dispatched<T>
    where
        T: Send + 'static,
        F: Fn(PathBuf) -> Fut,
        Fut: Future<Output = Result<T, PipelineError>> + Send + 'static,
    {
        let total = paths.len();
        let mut pending = paths.into_iter();
        let mut tasks = JoinSet::new();
        let mut out = Dispatched {
            completed: Vec::with_capacity(total),
            skipped: Vec::new(),
            lost: 0,
        };
        let mut done = 0;

        loop {
            while tasks.len() < self.workers {
                let Some(path) = pending.next() else { break };
                let job = worker(path.clone());
                tasks.spawn(async move { (path, job.await) });
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };
            done += 1;

            match joined {
                Ok((path, Ok(result))) => {
                    progress.emit(ProgressEvent::new(
                        format!("Processed {}", display_name(&path)),
                        done,
                        total,
                    ));
                    out.completed.push(result);
                }
                Ok((path, Err(e))) => {
                    tracing::warn!("Skipping {}: {}", path.display(), e);
                    progress.emit(ProgressEvent::new(
                        format!("Skipped {}", display_name(&path)),
                        done,
                        total,
                    ));
                    out.skipped.push(path);
                }
                Err(e) => {
                    tracing::warn!("Worker task failed: {}", e);
                    progress.emit(ProgressEvent::new("Worker task failed", done, total));
                    out.lost += 1;
                }
            }
        }

        out
    }
}

fn display_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
