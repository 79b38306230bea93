//! fastembed (ONNX Runtime) backend.

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::Embedder;
use crate::core::error::{DocaError, Result};
use crate::core::types::EmbeddingVector;

/// Sentence embedding model run on the CPU through fastembed
///
/// The model is loaded once and shared. Inference holds a lock and
/// runs on the blocking pool.
pub struct FastEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
    model_name: String,
    dimension: usize,
}

/// Map a configured model name to a fastembed model
pub fn parse_model_name(name: &str) -> Option<EmbeddingModel> {
    let short = name.rsplit('/').next().unwrap_or(name);
    match short.to_lowercase().as_str() {
        "paraphrase-multilingual-minilm-l12-v2" => Some(EmbeddingModel::ParaphraseMLMiniLML12V2),
        "all-minilm-l6-v2" => Some(EmbeddingModel::AllMiniLML6V2),
        "all-minilm-l12-v2" => Some(EmbeddingModel::AllMiniLML12V2),
        "bge-small-en-v1.5" => Some(EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Some(EmbeddingModel::BGEBaseENV15),
        "multilingual-e5-small" => Some(EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Some(EmbeddingModel::MultilingualE5Base),
        _ => None,
    }
}

impl FastEmbedder {
    /// Load (downloading on first use) the named model
    pub fn load(model_name: &str, cache_dir: &Path) -> Result<Self> {
        let model = parse_model_name(model_name).ok_or_else(|| {
            DocaError::ModelLoad(format!("Unknown embedding model '{model_name}'"))
        })?;

        tracing::info!("Loading embedding model {} from {:?}", model_name, cache_dir);

        let mut text_model = TextEmbedding::try_new(
            InitOptions::new(model)
                .with_cache_dir(cache_dir.to_path_buf())
                .with_show_download_progress(true),
        )
        .map_err(|e| DocaError::ModelLoad(format!("{model_name}: {e}")))?;

        // Get dimension by generating a test embedding
        let sample = text_model
            .embed(vec!["test"], None)
            .map_err(|e| DocaError::ModelLoad(format!("{model_name}: {e}")))?;
        let dimension = sample
            .first()
            .map(|v| v.len())
            .ok_or_else(|| DocaError::ModelLoad(format!("{model_name}: empty sample embedding")))?;

        Ok(Self {
            model: Arc::new(Mutex::new(text_model)),
            model_name: model_name.to_string(),
            dimension,
        })
    }
}

#[async_trait]
impl Embedder for FastEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = Arc::clone(&self.model);
        let batch = texts.to_vec();
        let batch_len = batch.len();

        let embeddings = tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| DocaError::EmbeddingFailed("model lock poisoned".to_string()))?;
            model
                .embed(batch, Some(batch_len))
                .map_err(|e| DocaError::EmbeddingFailed(e.to_string()))
        })
        .await
        .map_err(|e| DocaError::EmbeddingFailed(format!("embedding task failed: {e}")))??;

        Ok(embeddings.into_iter().map(EmbeddingVector).collect())
    }
}
