//! Embedding generation under a memory budget.
//!
//! The [`Embedder`] trait is the seam to the model. The
//! [`EmbeddingEngine`] wraps one backend and refuses batches whose
//! estimated in-flight memory exceeds the configured budget, so the
//! caller decides how to split work instead of the process running out
//! of memory.

mod onnx;
mod hash;

pub use self::onnx::FastEmbedder;
pub use self::hash::HashEmbedder;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use crate::core::config::{Device, EmbeddingConfig};
use crate::core::error::{DocaError, Result};
use crate::core::types::EmbeddingVector;

/// Bytes of activation memory assumed per input character
pub const DEFAULT_ACTIVATION_BYTES_PER_CHAR: u64 = 32 * 1024;

/// A text embedding model
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier of the loaded model
    fn model_name(&self) -> &str;

    /// Length of every vector the model produces
    fn dimension(&self) -> usize;

    /// Memory estimate used by the engine's budget check
    fn activation_bytes_per_char(&self) -> u64 {
        DEFAULT_ACTIVATION_BYTES_PER_CHAR
    }

    /// Embed `texts`, returning one vector per input in order
    async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>>;
}

/// Memory-budgeted front end over an [`Embedder`]
#[derive(Clone)]
pub struct EmbeddingEngine {
    backend: Arc<dyn Embedder>,
    memory_limit_bytes: u64,
}

impl std::fmt::Debug for EmbeddingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingEngine")
            .field("model", &self.backend.model_name())
            .field("dimension", &self.backend.dimension())
            .field("memory_limit_bytes", &self.memory_limit_bytes)
            .finish()
    }
}

impl EmbeddingEngine {
    /// Wrap `backend` with a budget of `memory_limit_gb` gigabytes
    pub fn new(backend: Arc<dyn Embedder>, memory_limit_gb: f64) -> Self {
        Self {
            backend,
            memory_limit_bytes: (memory_limit_gb * 1024.0 * 1024.0 * 1024.0) as u64,
        }
    }

    /// Build the backend named in `config` and wrap it
    ///
    /// Loading a fastembed model may download files into `models_dir`
    /// and is blocking; call it from the blocking pool.
    pub fn from_config(config: &EmbeddingConfig, models_dir: &Path) -> Result<Self> {
        if config.device == Device::Cuda {
            tracing::warn!(
                "CUDA inference requested but this build only ships CPU inference; using CPU"
            );
        }

        let backend: Arc<dyn Embedder> = if HashEmbedder::handles(&config.model_name) {
            Arc::new(HashEmbedder::from_model_name(&config.model_name)?)
        } else {
            Arc::new(FastEmbedder::load(&config.model_name, models_dir)?)
        };

        tracing::info!(
            "Embedding model ready: {} ({} dimensions)",
            backend.model_name(),
            backend.dimension()
        );

        Ok(Self::new(backend, config.memory_limit))
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    pub fn dimension(&self) -> usize {
        self.backend.dimension()
    }

    pub fn memory_limit_bytes(&self) -> u64 {
        self.memory_limit_bytes
    }

    /// Estimated peak bytes needed to embed `texts` in one call
    pub fn estimate_bytes(&self, texts: &[String]) -> u64 {
        let chars: u64 = texts.iter().map(|t| t.chars().count() as u64).sum();
        let activations = chars.saturating_mul(self.backend.activation_bytes_per_char());
        let outputs = (texts.len() as u64) * (self.dimension() as u64) * 4;
        activations.saturating_add(outputs)
    }

    /// Embed a batch of texts
    ///
    /// The batch is never split here. Over-budget batches fail with
    /// `ResourceExhausted` before the backend is called.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let required = self.estimate_bytes(texts);
        if required > self.memory_limit_bytes {
            return Err(DocaError::ResourceExhausted {
                required,
                budget: self.memory_limit_bytes,
            });
        }

        let vectors = self.backend.embed(texts).await?;

        if vectors.len() != texts.len() {
            return Err(DocaError::EmbeddingFailed(format!(
                "model returned {} vectors for {} inputs",
                vectors.len(),
                texts.len()
            )));
        }
        let dimension = self.dimension();
        if let Some(bad) = vectors.iter().find(|v| v.dimension() != dimension) {
            return Err(DocaError::EmbeddingFailed(format!(
                "model returned a vector of dimension {}, expected {}",
                bad.dimension(),
                dimension
            )));
        }

        Ok(vectors)
    }
}
