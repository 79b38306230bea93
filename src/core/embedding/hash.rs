//! Deterministic feature-hashing embedder.
//!
//! Maps lower-cased character trigrams into a fixed number of signed
//! buckets and L2-normalizes the result. It needs no model files, so
//! offline runs and tests can index without downloading anything.

use async_trait::async_trait;

use super::Embedder;
use crate::core::error::{DocaError, Result};
use crate::core::types::EmbeddingVector;

const DEFAULT_DIMENSION: usize = 384;
const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

#[derive(Debug, Clone)]
pub struct HashEmbedder {
    model_name: String,
    dimension: usize,
}

impl HashEmbedder {
    /// Embedder producing `dimension`-wide vectors; zero is rejected
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(DocaError::ConfigError(
                "Hash embedding dimension must be non-zero".to_string(),
            ));
        }
        Ok(Self {
            model_name: format!("hash-{dimension}"),
            dimension,
        })
    }

    /// Whether `name` selects this backend (`hash` or `hash-<dim>`)
    pub fn handles(name: &str) -> bool {
        name == "hash" || name.starts_with("hash-")
    }

    pub fn from_model_name(name: &str) -> Result<Self> {
        if name == "hash" {
            return Ok(Self {
                model_name: name.to_string(),
                dimension: DEFAULT_DIMENSION,
            });
        }

        let dimension = name
            .strip_prefix("hash-")
            .and_then(|d| d.parse::<usize>().ok())
            .filter(|d| *d > 0)
            .ok_or_else(|| {
                DocaError::ModelLoad(format!(
                    "Invalid hash model '{name}', expected 'hash' or 'hash-<dimension>'"
                ))
            })?;

        Self::new(dimension)
    }

    fn embed_one(&self, text: &str) -> EmbeddingVector {
        let mut values = vec![0.0f32; self.dimension];

        let padded: Vec<char> = std::iter::once(' ')
            .chain(text.chars().flat_map(char::to_lowercase))
            .chain(std::iter::once(' '))
            .collect();

        for window in padded.windows(3) {
            let hash = fnv1a(window);
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            values[bucket] += sign;
        }

        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut values {
                *v /= norm;
            }
        }

        EmbeddingVector(values)
    }
}

fn fnv1a(chars: &[char]) -> u64 {
    let mut hash = FNV_OFFSET;
    for c in chars {
        let mut buf = [0u8; 4];
        for byte in c.encode_utf8(&mut buf).bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
    }
    hash
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn activation_bytes_per_char(&self) -> u64 {
        64
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}
