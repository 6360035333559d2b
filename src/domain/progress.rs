//! Progress events emitted during a sync pass.
//!
//! Purely observational: dropping the receiver never affects the pass.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// One `{message, current, total}` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub message: String,
    pub current: usize,
    pub total: usize,

    /// Terminal marker, absent while the pass is running
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ProgressStatus>,
}

/// How a pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    NoChanges,
    Complete,
    AlreadyRunning,
    Error,
}

impl ProgressEvent {
    pub fn new(message: impl Into<String>, current: usize, total: usize) -> Self {
        Self {
            message: message.into(),
            current,
            total,
            status: None,
        }
    }

    pub fn with_status(mut self, status: ProgressStatus) -> Self {
        self.status = Some(status);
        self
    }
}

/// Sending half handed to the engine; `None` means nobody is listening
#[derive(Debug, Clone, Default)]
pub struct ProgressSink(Option<mpsc::UnboundedSender<ProgressEvent>>);

impl ProgressSink {
    /// A sink plus the receiver a caller can stream from
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(Some(tx)), rx)
    }

    pub fn none() -> Self {
        Self(None)
    }

    /// Emit an event; a closed receiver is ignored
    pub fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.0 {
            let _ = tx.send(event);
        }
    }
}
