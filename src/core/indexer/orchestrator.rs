//! Indexing run orchestration.
//!
//! The orchestrator drives one run at a time per collection: validate
//! the root, ensure the collection schema, enumerate files, push each
//! file through the [`FilePipeline`], and report every step on the
//! run's own progress channel. Runs execute on a spawned task and are
//! observed through a [`RunHandle`].

use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::error::{DocaError, Result};
use crate::core::indexer::{FilePipeline, FileWalker};
use crate::core::progress::{ProgressChannel, ProgressEvent, ProgressObserver, RunStatus};
use crate::core::types::{DocumentRef, RunPhase, RunState, RunSummary};

/// Collections with an active run, process-wide
static ACTIVE_RUNS: Lazy<Mutex<HashSet<String>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Holds a collection's slot in [`ACTIVE_RUNS`] until dropped
#[derive(Debug)]
struct ActiveRunGuard {
    collection: String,
}

impl ActiveRunGuard {
    fn acquire(collection: &str) -> Result<Self> {
        let mut active = ACTIVE_RUNS
            .lock()
            .map_err(|_| DocaError::StorageError("run registry lock poisoned".to_string()))?;
        if !active.insert(collection.to_string()) {
            return Err(DocaError::AlreadyRunning(collection.to_string()));
        }
        Ok(Self {
            collection: collection.to_string(),
        })
    }
}

impl Drop for ActiveRunGuard {
    fn drop(&mut self) {
        if let Ok(mut active) = ACTIVE_RUNS.lock() {
            active.remove(&self.collection);
        }
    }
}

/// Parameters of one run
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub directory: PathBuf,
    pub recursive: bool,
    /// Drop the collection before indexing into it
    pub recreate: bool,
}

impl StartRequest {
    pub fn new(directory: impl Into<PathBuf>, recursive: bool) -> Self {
        Self {
            directory: directory.into(),
            recursive,
            recreate: false,
        }
    }

    pub fn with_recreate(mut self, recreate: bool) -> Self {
        self.recreate = recreate;
        self
    }
}

/// Handle to a spawned run
#[derive(Debug)]
pub struct RunHandle {
    cancel: CancellationToken,
    progress: ProgressChannel,
    events: Option<ProgressObserver>,
    task: JoinHandle<Result<RunSummary>>,
}

impl RunHandle {
    /// Request cancellation; takes effect before the next file
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this run, for use after `wait` took the handle
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Observer of this run's events, starting with `indexing_started`
    ///
    /// Only the first call sees the whole sequence; later calls get
    /// a fresh subscription.
    pub fn events(&mut self) -> ProgressObserver {
        self.events
            .take()
            .unwrap_or_else(|| self.progress.subscribe())
    }

    /// Observer of this run's events from now on
    pub fn subscribe(&self) -> ProgressObserver {
        self.progress.subscribe()
    }

    /// Wait for the run to finish
    pub async fn wait(self) -> Result<RunSummary> {
        self.task
            .await
            .map_err(|e| DocaError::TaskFailed(e.to_string()))?
    }
}

struct Inner {
    walker: FileWalker,
    pipeline: FilePipeline,
    progress_capacity: usize,
    phase: RwLock<RunPhase>,
    state: RwLock<RunState>,
}

/// Ends a run that stopped without reaching a final phase
///
/// Dropped when the run task finishes, panics or is aborted. The
/// collection's slot in [`ACTIVE_RUNS`] is released last.
struct RunGuard {
    inner: Arc<Inner>,
    progress: ProgressChannel,
    _slot: ActiveRunGuard,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if self.inner.current_phase() == RunPhase::Running {
            tracing::error!(
                "Indexing into '{}' stopped unexpectedly",
                self.inner.collection()
            );
            self.progress
                .emit(ProgressEvent::run_error("Indexing task stopped unexpectedly"));
            self.inner.set_phase(RunPhase::Failed);
        }
    }
}

/// Drives indexing runs into one collection
#[derive(Clone)]
pub struct IndexingOrchestrator {
    inner: Arc<Inner>,
}

impl IndexingOrchestrator {
    /// Orchestrator for the pipeline's collection
    ///
    /// Each run gets its own progress channel buffering
    /// `progress_capacity` events per observer.
    pub fn new(walker: FileWalker, pipeline: FilePipeline, progress_capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                walker,
                pipeline,
                progress_capacity,
                phase: RwLock::new(RunPhase::Idle),
                state: RwLock::new(RunState::default()),
            }),
        }
    }

    pub fn collection(&self) -> &str {
        self.inner.collection()
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> RunPhase {
        self.inner.current_phase()
    }

    /// Snapshot of the current (or last) run's state
    pub fn run_state(&self) -> RunState {
        self.inner.run_state_snapshot()
    }

    /// Start a run on a spawned task
    ///
    /// Fails with `AlreadyRunning` while another run targets the same
    /// collection; the active run's state is left untouched.
    pub fn start(&self, request: StartRequest) -> Result<RunHandle> {
        let slot = ActiveRunGuard::acquire(self.inner.collection())?;

        self.inner.set_state(RunState::default());
        self.inner.set_phase(RunPhase::Running);

        let progress = ProgressChannel::new(self.inner.progress_capacity);
        let events = progress.subscribe();
        let cancel = CancellationToken::new();

        let guard = RunGuard {
            inner: Arc::clone(&self.inner),
            progress: progress.clone(),
            _slot: slot,
        };
        let token = cancel.clone();
        let run_progress = progress.clone();

        let task = tokio::spawn(async move {
            let inner = Arc::clone(&guard.inner);
            let result = inner.run(request, token, &run_progress).await;
            drop(guard);
            result
        });

        Ok(RunHandle {
            cancel,
            progress,
            events: Some(events),
            task,
        })
    }

    /// Start a run and wait for it
    pub async fn run(&self, request: StartRequest) -> Result<RunSummary> {
        self.start(request)?.wait().await
    }
}

impl Inner {
    fn collection(&self) -> &str {
        self.pipeline.collection()
    }

    fn current_phase(&self) -> RunPhase {
        self.phase.read().map(|p| *p).unwrap_or(RunPhase::Failed)
    }

    fn set_phase(&self, phase: RunPhase) {
        if let Ok(mut current) = self.phase.write() {
            *current = phase;
        }
    }

    fn set_state(&self, state: RunState) {
        if let Ok(mut current) = self.state.write() {
            *current = state;
        }
    }

    fn update_state(&self, f: impl FnOnce(&mut RunState)) -> RunState {
        match self.state.write() {
            Ok(mut state) => {
                f(&mut state);
                state.clone()
            }
            Err(_) => RunState::default(),
        }
    }

    fn run_state_snapshot(&self) -> RunState {
        self.state.read().map(|s| s.clone()).unwrap_or_default()
    }

    /// End the run with a run-scope error
    fn fail(&self, progress: &ProgressChannel, error: DocaError) -> Result<RunSummary> {
        tracing::error!("Indexing into '{}' failed: {}", self.collection(), error);
        progress.emit(ProgressEvent::run_error(error.to_string()));
        self.set_phase(RunPhase::Failed);
        Err(error)
    }

    /// Drop the collection when asked to, then create or verify it
    async fn prepare_collection(&self, recreate: bool) -> Result<()> {
        let writer = self.pipeline.writer();
        if recreate && writer.drop_collection(self.collection()).await? {
            tracing::info!("Recreating collection '{}'", self.collection());
        }
        writer
            .ensure_schema(self.collection(), self.pipeline.engine().dimension())
            .await
    }

    async fn run(
        &self,
        request: StartRequest,
        cancel: CancellationToken,
        progress: &ProgressChannel,
    ) -> Result<RunSummary> {
        let started = Instant::now();
        let directory = request.directory.display().to_string();

        progress.emit(ProgressEvent::IndexingStarted {
            directory: directory.clone(),
            recursive: request.recursive,
        });
        progress.emit(ProgressEvent::status(
            RunStatus::Starting,
            format!("Starting indexing of {directory}"),
        ));
        tracing::info!(
            "Indexing {} into '{}' (recursive: {})",
            directory,
            self.collection(),
            request.recursive
        );

        if let Err(e) = FileWalker::validate_root(&request.directory) {
            return self.fail(progress, e);
        }

        progress.emit(ProgressEvent::status(
            RunStatus::Checking,
            format!("Checking collection '{}'", self.collection()),
        ));
        if let Err(e) = self.prepare_collection(request.recreate).await {
            return self.fail(progress, e);
        }

        progress.emit(ProgressEvent::status(
            RunStatus::Initializing,
            "Enumerating files".to_string(),
        ));
        let candidates: Vec<DocumentRef> =
            match self.walker.walk(&request.directory, request.recursive) {
                Ok(walk) => walk.collect(),
                Err(e) => return self.fail(progress, e),
            };

        let mut files = Vec::with_capacity(candidates.len());
        let mut skipped = 0;
        for doc in candidates {
            if self.walker.is_oversize(&doc) {
                skipped += 1;
                tracing::warn!("Skipping oversize file {:?} ({} bytes)", doc.path, doc.size_bytes);
                progress.emit(ProgressEvent::IndexingWarning {
                    file_path: doc.document_id.clone(),
                    warning: format!(
                        "File too large ({} bytes, limit {} bytes). Skipping.",
                        doc.size_bytes,
                        self.walker.max_file_size_bytes()
                    ),
                });
            } else {
                files.push(doc);
            }
        }

        let total = files.len();
        self.update_state(|s| {
            s.total_files = total;
            s.skipped_files = skipped;
        });
        tracing::info!("Found {} files to index ({} skipped)", total, skipped);

        for (idx, doc) in files.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::warn!(
                    "Indexing into '{}' cancelled after {} files",
                    self.collection(),
                    idx
                );
                return self.fail(progress, DocaError::Cancelled);
            }

            tracing::debug!("Processing {}/{}: {:?}", idx + 1, total, doc.path);

            match self.pipeline.process(doc).await {
                Ok(Ok(outcome)) => {
                    for warning in &outcome.warnings {
                        tracing::warn!("{}: {}", outcome.file_path, warning);
                        progress.emit(ProgressEvent::IndexingWarning {
                            file_path: outcome.file_path.clone(),
                            warning: warning.clone(),
                        });
                    }

                    let state = self.update_state(|s| {
                        s.current_file = idx + 1;
                        s.total_chunks += outcome.chunks_indexed;
                    });
                    progress.emit(ProgressEvent::IndexingProgress {
                        current: state.current_file,
                        total,
                        percentage: state.percentage(),
                        file_path: outcome.file_path,
                        chunks_indexed: outcome.chunks_indexed,
                    });
                }
                Ok(Err(failure)) => {
                    tracing::warn!("Failed to index {}: {}", failure.file_path, failure.error);
                    progress.emit(ProgressEvent::file_error(
                        failure.file_path.clone(),
                        failure.error.clone(),
                    ));
                    self.update_state(|s| {
                        s.current_file = idx + 1;
                        s.failures.push(failure);
                    });
                }
                Err(e) => return self.fail(progress, e),
            }
        }

        let state = self.run_state_snapshot();
        progress.emit(ProgressEvent::IndexingCompleted {
            total_files: state.total_files,
            total_chunks: state.total_chunks,
            skipped_files: state.skipped_files,
            error_files: state.error_files(),
        });
        self.set_phase(RunPhase::Completed);

        let summary =
            RunSummary::from_state(self.collection(), &directory, &state, started.elapsed());
        tracing::info!(
            "Indexing complete: {} files, {} chunks, {} skipped, {} errors in {}ms",
            summary.total_files,
            summary.total_chunks,
            summary.skipped_files,
            summary.error_files,
            summary.duration_ms
        );

        Ok(summary)
    }
}
