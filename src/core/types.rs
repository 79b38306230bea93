//! Core data types for the Doca indexing pipeline.
//!
//! This module defines the data structures that flow between the
//! walker, chunker, embedding engine and collection writer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// A candidate document found by the walker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Absolute or root-relative path on disk
    pub path: PathBuf,

    /// Stable identifier (the path string)
    pub document_id: String,

    /// Lower-case file extension
    pub file_type: String,

    /// File size in bytes at enumeration time
    pub size_bytes: u64,
}

impl DocumentRef {
    /// File name component, or the whole path if it has none
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.document_id.clone())
    }
}

/// A single text chunk from a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Owning document identifier
    pub document_id: String,

    /// Sequential chunk number within the document
    pub chunk_index: usize,

    /// The actual text content
    pub text: String,

    /// Byte offset where chunk starts in the extracted text
    pub start_offset: usize,

    /// Byte offset where chunk ends in the extracted text
    pub end_offset: usize,
}

impl Chunk {
    /// Record id the chunk is stored under
    pub fn record_id(&self) -> String {
        record_id(&self.document_id, self.chunk_index)
    }
}

/// Deterministic record id, so re-indexing a document overwrites it
pub fn record_id(document_id: &str, chunk_index: usize) -> String {
    format!("{document_id}#{chunk_index}")
}

/// Result of chunking one document
#[derive(Debug, Clone, Default)]
pub struct ChunkOutput {
    pub chunks: Vec<Chunk>,

    /// Text was cut at `max_content_length` before chunking
    pub content_truncated: bool,

    /// Chunking stopped at `max_chunks_per_file` with text remaining
    pub chunks_truncated: bool,
}

/// A dense embedding produced by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmbeddingVector(pub Vec<f32>);

impl EmbeddingVector {
    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }

    /// Little-endian byte encoding used for storage
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.0.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    /// Decode a little-endian byte encoding; `None` if misaligned
    pub fn from_le_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() % 4 != 0 {
            return None;
        }
        let values = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        Some(Self(values))
    }
}

impl From<Vec<f32>> for EmbeddingVector {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

/// Per-record metadata stored next to the vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub file_name: String,
    pub file_type: String,
    pub file_path: String,
    pub indexed_at: DateTime<Utc>,
}

/// One chunk plus its vector, ready to be written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: String,
    pub document_id: String,
    pub text: String,
    pub chunk_index: usize,
    pub vector: EmbeddingVector,
    pub metadata: RecordMetadata,
}

impl IndexRecord {
    /// Build the record for a chunk of `document`
    pub fn from_chunk(
        document: &DocumentRef,
        chunk: Chunk,
        vector: EmbeddingVector,
        indexed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: chunk.record_id(),
            document_id: chunk.document_id,
            text: chunk.text,
            chunk_index: chunk.chunk_index,
            vector,
            metadata: RecordMetadata {
                file_name: document.file_name(),
                file_type: document.file_type.clone(),
                file_path: document.path.to_string_lossy().into_owned(),
                indexed_at,
            },
        }
    }
}

/// Outcome of one collection write
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub accepted: usize,

    /// `(record_id, reason)` for every record that was not written
    pub rejected: Vec<(String, String)>,
}

impl BatchResult {
    pub fn is_complete(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Lifecycle phase of the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunPhase {
    Idle,
    Running,
    Completed,
    Failed,
}

/// A file that could not be indexed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub file_path: String,
    pub error: String,
}

/// A file that was indexed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOutcome {
    pub file_path: String,
    pub chunks_indexed: usize,
    pub warnings: Vec<String>,
}

/// Mutable progress of the active run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    /// 1-based index of the file being processed (0 before the first)
    pub current_file: usize,
    pub total_files: usize,
    pub total_chunks: usize,
    pub skipped_files: usize,
    pub failures: Vec<FileFailure>,
}

impl RunState {
    pub fn error_files(&self) -> usize {
        self.failures.len()
    }

    pub fn percentage(&self) -> f64 {
        if self.total_files == 0 {
            return 100.0;
        }
        (self.current_file as f64 / self.total_files as f64) * 100.0
    }
}

/// Final figures of a completed run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub collection: String,
    pub directory: String,
    pub total_files: usize,
    pub total_chunks: usize,
    pub skipped_files: usize,
    pub error_files: usize,
    pub failures: Vec<FileFailure>,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn from_state(
        collection: &str,
        directory: &str,
        state: &RunState,
        duration: Duration,
    ) -> Self {
        Self {
            collection: collection.to_string(),
            directory: directory.to_string(),
            total_files: state.total_files,
            total_chunks: state.total_chunks,
            skipped_files: state.skipped_files,
            error_files: state.error_files(),
            failures: state.failures.clone(),
            duration_ms: duration.as_millis() as u64,
        }
    }
}
