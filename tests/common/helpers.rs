// Test helper functions

use async_trait::async_trait;
use doca::core::config::Config;
use doca::core::embedding::{Embedder, EmbeddingEngine, HashEmbedder};
use doca::core::error::{DocaError, Result};
use doca::core::indexer::{IndexingOrchestrator, StartRequest};
use doca::core::progress::ProgressEvent;
use doca::core::services::Services;
use doca::core::storage::{CollectionWriter, MemoryCollection};
use doca::core::types::{BatchResult, EmbeddingVector, IndexRecord, RunSummary};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Dimension of the hashing embedder used throughout the tests
#[allow(dead_code)]
pub const TEST_DIMENSION: usize = 16;

/// Collection name no other test in this binary uses
///
/// Active runs are tracked per collection across the whole process.
#[allow(dead_code)] // Used in integration tests
pub fn unique_collection(prefix: &str) -> String {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    format!("{prefix}_{}", COUNTER.fetch_add(1, Ordering::SeqCst))
}

/// Small chunks so short fixtures still produce several of them
#[allow(dead_code)] // Used in integration tests
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.indexing.chunk_size = 64;
    config.indexing.chunk_overlap = 16;
    config.indexing.batch_size = 4;
    config.embedding.model_name = format!("hash-{TEST_DIMENSION}");
    config.embedding.memory_limit = 1.0;
    config.limits.operation_timeout_secs = 10;
    config
}

/// Services over an in-memory collection
#[allow(dead_code)] // Used in integration tests
pub fn memory_services(
    config: Config,
    embedder: Arc<dyn Embedder>,
) -> (Services, Arc<MemoryCollection>) {
    let memory_limit = config.embedding.memory_limit;
    let collection = Arc::new(MemoryCollection::default());
    let engine = EmbeddingEngine::new(embedder, memory_limit);
    let services = Services::with_components(config, engine, collection.clone());
    (services, collection)
}

#[allow(dead_code)] // Used in integration tests
pub fn hash_embedder() -> Arc<dyn Embedder> {
    Arc::new(HashEmbedder::new(TEST_DIMENSION).unwrap())
}

/// Fails every batch containing `marker`
#[allow(dead_code)]
pub struct MarkerFailEmbedder {
    inner: HashEmbedder,
    marker: String,
    pub calls: AtomicUsize,
}

impl MarkerFailEmbedder {
    #[allow(dead_code)]
    pub fn new(marker: &str) -> Self {
        Self {
            inner: HashEmbedder::new(TEST_DIMENSION).unwrap(),
            marker: marker.to_string(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Embedder for MarkerFailEmbedder {
    fn model_name(&self) -> &str {
        "marker-fail"
    }

    fn dimension(&self) -> usize {
        TEST_DIMENSION
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if texts.iter().any(|t| t.contains(&self.marker)) {
            return Err(DocaError::EmbeddingFailed("model rejected input".to_string()));
        }
        self.inner.embed(texts).await
    }
}

/// Blocks calls until the test hands out a permit
#[allow(dead_code)]
pub struct GatedEmbedder {
    inner: HashEmbedder,
    marker: Option<String>,
    pub gate: Arc<Semaphore>,
}

impl GatedEmbedder {
    /// Gates every call
    #[allow(dead_code)]
    pub fn new() -> Self {
        Self {
            inner: HashEmbedder::new(TEST_DIMENSION).unwrap(),
            marker: None,
            gate: Arc::new(Semaphore::new(0)),
        }
    }

    /// Gates only batches containing `marker`
    #[allow(dead_code)]
    pub fn for_marker(marker: &str) -> Self {
        Self {
            marker: Some(marker.to_string()),
            ..Self::new()
        }
    }
}

#[async_trait]
impl Embedder for GatedEmbedder {
    fn model_name(&self) -> &str {
        "gated"
    }

    fn dimension(&self) -> usize {
        TEST_DIMENSION
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        let gated = match &self.marker {
            Some(marker) => texts.iter().any(|t| t.contains(marker)),
            None => true,
        };
        if !gated {
            return self.inner.embed(texts).await;
        }

        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| DocaError::EmbeddingFailed("gate closed".to_string()))?;
        permit.forget();
        self.inner.embed(texts).await
    }
}

/// Sleeps on every batch containing `marker`
#[allow(dead_code)]
pub struct SlowMarkerEmbedder {
    inner: HashEmbedder,
    marker: String,
    delay: Duration,
}

impl SlowMarkerEmbedder {
    #[allow(dead_code)]
    pub fn new(marker: &str, delay: Duration) -> Self {
        Self {
            inner: HashEmbedder::new(TEST_DIMENSION).unwrap(),
            marker: marker.to_string(),
            delay,
        }
    }
}

#[async_trait]
impl Embedder for SlowMarkerEmbedder {
    fn model_name(&self) -> &str {
        "slow-marker"
    }

    fn dimension(&self) -> usize {
        TEST_DIMENSION
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        if texts.iter().any(|t| t.contains(&self.marker)) {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.embed(texts).await
    }
}

/// Panics on every batch containing `marker`
#[allow(dead_code)]
pub struct PanickingEmbedder {
    inner: HashEmbedder,
    marker: String,
}

impl PanickingEmbedder {
    #[allow(dead_code)]
    pub fn new(marker: &str) -> Self {
        Self {
            inner: HashEmbedder::new(TEST_DIMENSION).unwrap(),
            marker: marker.to_string(),
        }
    }
}

#[async_trait]
impl Embedder for PanickingEmbedder {
    fn model_name(&self) -> &str {
        "panicking"
    }

    fn dimension(&self) -> usize {
        TEST_DIMENSION
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        if texts.iter().any(|t| t.contains(&self.marker)) {
            panic!("embedder crashed on {}", self.marker);
        }
        self.inner.embed(texts).await
    }
}

/// Reports records whose text contains `marker` as rejected
#[allow(dead_code)]
pub struct MarkerRejectWriter {
    pub inner: MemoryCollection,
    marker: String,
}

impl MarkerRejectWriter {
    #[allow(dead_code)]
    pub fn new(marker: &str) -> Self {
        Self {
            inner: MemoryCollection::default(),
            marker: marker.to_string(),
        }
    }
}

#[async_trait]
impl CollectionWriter for MarkerRejectWriter {
    async fn ensure_schema(&self, collection_name: &str, dimension: usize) -> Result<()> {
        self.inner.ensure_schema(collection_name, dimension).await
    }

    async fn upsert_batch(
        &self,
        collection_name: &str,
        records: Vec<IndexRecord>,
    ) -> Result<BatchResult> {
        let (rejected, kept): (Vec<_>, Vec<_>) = records
            .into_iter()
            .partition(|r| r.text.contains(&self.marker));
        let mut result = self.inner.upsert_batch(collection_name, kept).await?;
        result.rejected.extend(
            rejected
                .into_iter()
                .map(|r| (r.id, "write quota exceeded".to_string())),
        );
        Ok(result)
    }

    async fn drop_collection(&self, collection_name: &str) -> Result<bool> {
        self.inner.drop_collection(collection_name).await
    }

    fn max_batch_size(&self) -> usize {
        self.inner.max_batch_size()
    }
}

/// Run to the end and collect that run's events
#[allow(dead_code)] // Used in integration tests
pub async fn run_with_events(
    orchestrator: &IndexingOrchestrator,
    request: StartRequest,
) -> (Result<RunSummary>, Vec<ProgressEvent>) {
    let mut handle = match orchestrator.start(request) {
        Ok(handle) => handle,
        Err(e) => return (Err(e), Vec::new()),
    };
    let mut events = handle.events();
    let result = handle.wait().await;
    (result, events.until_terminal().await)
}

/// Event names in order
#[allow(dead_code)] // Used in integration tests
pub fn event_names(events: &[ProgressEvent]) -> Vec<&'static str> {
    events.iter().map(|e| e.name()).collect()
}

/// Number of events with the given name
#[allow(dead_code)] // Used in integration tests
pub fn count_events(events: &[ProgressEvent], name: &str) -> usize {
    events.iter().filter(|e| e.name() == name).count()
}
