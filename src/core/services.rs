//! Unified service container for Doca
//!
//! Provides shared access to all core services. The embedding model is
//! loaded once here and shared by every run.

use crate::core::config::{validate_collection_name, Config};
use crate::core::embedding::EmbeddingEngine;
use crate::core::error::{DocaError, Result};
use crate::core::indexer::{Chunker, FilePipeline, FileWalker, IndexingOrchestrator};
use crate::core::storage::{CollectionWriter, TantivyCollection};
use crate::core::xdg::XdgDirs;
use std::sync::Arc;
use std::time::Duration;

/// Unified services container
#[derive(Clone)]
pub struct Services {
    /// Application configuration
    pub config: Arc<Config>,

    /// Memory-budgeted embedding engine
    pub engine: EmbeddingEngine,

    /// Destination collection storage, shared by every collection
    pub writer: Arc<dyn CollectionWriter>,
}

impl Services {
    /// Create services from configuration
    ///
    /// Loads the embedding model (downloading it into the XDG cache on
    /// first use) and opens collection storage under the data dir.
    pub async fn load(config: Config, xdg: &XdgDirs) -> Result<Self> {
        let embedding = config.embedding.clone();
        let models_dir = xdg.models_dir();

        let engine = tokio::task::spawn_blocking(move || {
            EmbeddingEngine::from_config(&embedding, &models_dir)
        })
        .await
        .map_err(|e| DocaError::ModelLoad(format!("model loading task failed: {e}")))??;

        let writer = Arc::new(TantivyCollection::new(config.storage.collections_dir()));

        Ok(Self::with_components(config, engine, writer))
    }

    /// Assemble services from already-built parts
    pub fn with_components(
        config: Config,
        engine: EmbeddingEngine,
        writer: Arc<dyn CollectionWriter>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            engine,
            writer,
        }
    }

    /// Create an orchestrator writing into `collection`
    ///
    /// Falls back to the configured collection name.
    pub fn orchestrator(&self, collection: Option<&str>) -> Result<IndexingOrchestrator> {
        let indexing = &self.config.indexing;
        let collection = collection.unwrap_or(&self.config.storage.collection_name);
        validate_collection_name(collection)?;

        let walker = FileWalker::new(
            indexing.extensions.clone(),
            indexing.exclude_patterns.clone(),
            indexing.max_file_size_mb,
        )?;
        let chunker = Chunker::new(
            indexing.chunk_size,
            indexing.chunk_overlap,
            indexing.max_content_length,
            indexing.max_chunks_per_file,
        )?;
        let pipeline = FilePipeline::new(
            collection,
            chunker,
            self.engine.clone(),
            Arc::clone(&self.writer),
            indexing.batch_size,
            Duration::from_secs(self.config.limits.operation_timeout_secs),
        )?;

        Ok(IndexingOrchestrator::new(
            walker,
            pipeline,
            self.config.limits.progress_capacity,
        ))
    }
}
