//! Error types and error handling for the Doca indexing pipeline.
//!
//! This module defines the error taxonomy used throughout the
//! application. An error raised while a file is processed only fails
//! that file unless [`DocaError::is_run_fatal`] says otherwise.

use thiserror::Error;

/// Result type alias for Doca operations
pub type Result<T> = std::result::Result<T, DocaError>;

/// Main error type for the Doca pipeline
#[derive(Error, Debug)]
pub enum DocaError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Embedding batch needs ~{required} bytes, memory budget is {budget} bytes")]
    ResourceExhausted { required: u64, budget: u64 },

    #[error(
        "Collection '{collection}' has vector dimension {found}, model produces {expected}"
    )]
    SchemaMismatch {
        collection: String,
        expected: usize,
        found: usize,
    },

    #[error("Batch of {size} records exceeds the limit of {max}")]
    BatchTooLarge { size: usize, max: usize },

    #[error("Indexing is already running for collection '{0}'")]
    AlreadyRunning(String),

    #[error("Failed to load embedding model: {0}")]
    ModelLoad(String),

    #[error("Embedding failed: {0}")]
    EmbeddingFailed(String),

    #[error("Text extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    #[error("Indexing cancelled")]
    Cancelled,

    #[error("Indexing task failed: {0}")]
    TaskFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),
}

impl DocaError {
    /// Check if this error ends the whole run rather than one file
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            DocaError::ConfigError(_)
                | DocaError::NotFound(_)
                | DocaError::NotADirectory(_)
                | DocaError::SchemaMismatch { .. }
                | DocaError::ModelLoad(_)
                | DocaError::Cancelled
                | DocaError::TaskFailed(_)
        )
    }

    /// Check if the failed call can be retried with a smaller batch
    pub fn is_retryable_with_smaller_batch(&self) -> bool {
        matches!(self, DocaError::ResourceExhausted { .. })
    }
}
