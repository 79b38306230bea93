//! Progress event broadcasting.
//!
//! An indexing run emits lifecycle events into a [`ProgressChannel`];
//! any number of observers subscribe and receive them in emission
//! order. Emission never blocks: an observer that falls behind by more
//! than the channel capacity loses the oldest events instead of
//! stalling the run.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Phase names carried by `indexing_status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Starting,
    Checking,
    Initializing,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Starting => "starting",
            RunStatus::Checking => "checking",
            RunStatus::Initializing => "initializing",
        }
    }
}

/// Events of one indexing run
///
/// Serialized as `{"event": "<name>", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ProgressEvent {
    IndexingStarted {
        directory: String,
        recursive: bool,
    },
    IndexingStatus {
        status: RunStatus,
        message: String,
    },
    IndexingProgress {
        current: usize,
        total: usize,
        percentage: f64,
        file_path: String,
        chunks_indexed: usize,
    },
    IndexingWarning {
        file_path: String,
        warning: String,
    },
    IndexingCompleted {
        total_files: usize,
        total_chunks: usize,
        skipped_files: usize,
        error_files: usize,
    },
    /// File-scoped when `file_path` is set, otherwise run-scoped and terminal
    IndexingError {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_path: Option<String>,
        error: String,
    },
}

impl ProgressEvent {
    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            ProgressEvent::IndexingStarted { .. } => "indexing_started",
            ProgressEvent::IndexingStatus { .. } => "indexing_status",
            ProgressEvent::IndexingProgress { .. } => "indexing_progress",
            ProgressEvent::IndexingWarning { .. } => "indexing_warning",
            ProgressEvent::IndexingCompleted { .. } => "indexing_completed",
            ProgressEvent::IndexingError { .. } => "indexing_error",
        }
    }

    /// Whether the event closes a run's sequence
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::IndexingCompleted { .. }
                | ProgressEvent::IndexingError {
                    file_path: None,
                    ..
                }
        )
    }

    pub fn status(status: RunStatus, message: impl Into<String>) -> Self {
        ProgressEvent::IndexingStatus {
            status,
            message: message.into(),
        }
    }

    pub fn file_error(file_path: impl Into<String>, error: impl Into<String>) -> Self {
        ProgressEvent::IndexingError {
            file_path: Some(file_path.into()),
            error: error.into(),
        }
    }

    pub fn run_error(error: impl Into<String>) -> Self {
        ProgressEvent::IndexingError {
            file_path: None,
            error: error.into(),
        }
    }
}

/// Fan-out channel for progress events
#[derive(Debug, Clone)]
pub struct ProgressChannel {
    sender: broadcast::Sender<ProgressEvent>,
}

impl ProgressChannel {
    /// Create a channel buffering `capacity` events per observer
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Send an event to all current observers
    pub fn emit(&self, event: ProgressEvent) {
        match self.sender.send(event) {
            Ok(count) => {
                tracing::trace!("progress event sent to {} observers", count);
            }
            Err(broadcast::error::SendError(event)) => {
                // No observers, this is fine
                tracing::trace!("no observers for {}", event.name());
            }
        }
    }

    /// Subscribe to events emitted from now on
    pub fn subscribe(&self) -> ProgressObserver {
        ProgressObserver {
            receiver: self.sender.subscribe(),
        }
    }
}

/// Receiving end of a [`ProgressChannel`]
#[derive(Debug)]
pub struct ProgressObserver {
    receiver: broadcast::Receiver<ProgressEvent>,
}

impl ProgressObserver {
    /// Next event, or `None` once every channel handle is dropped
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Progress observer lagged, {} events dropped", n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next already-buffered event, without waiting
    pub fn try_recv(&mut self) -> Option<ProgressEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::warn!("Progress observer lagged, {} events dropped", n);
                }
                Err(_) => return None,
            }
        }
    }

    /// Collect events up to and including the next terminal event
    pub async fn until_terminal(&mut self) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.recv().await {
            let terminal = event.is_terminal();
            events.push(event);
            if terminal {
                break;
            }
        }
        events
    }
}
