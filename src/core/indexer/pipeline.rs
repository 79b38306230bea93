//! Per-file indexing pipeline.
//!
//! Takes one document through the full path:
//! 1. Read bytes and decode (UTF-8, latin-1 fallback)
//! 2. Extract plain text
//! 3. Chunk text
//! 4. Embed and upsert chunks in batches of `batch_size`
//!
//! Failures are scoped to the file unless the error is run-fatal.
//! Batches written before a failure stay in the collection, and
//! re-indexing overwrites them by id.

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::core::embedding::EmbeddingEngine;
use crate::core::error::{DocaError, Result};
use crate::core::indexer::extract;
use crate::core::indexer::Chunker;
use crate::core::storage::CollectionWriter;
use crate::core::types::{Chunk, DocumentRef, EmbeddingVector, FileFailure, FileOutcome, IndexRecord};

/// Reads, chunks, embeds and writes single documents
#[derive(Clone)]
pub struct FilePipeline {
    collection: String,
    chunker: Chunker,
    engine: EmbeddingEngine,
    writer: Arc<dyn CollectionWriter>,
    batch_size: usize,
    operation_timeout: Duration,
}

impl FilePipeline {
    pub fn new(
        collection: impl Into<String>,
        chunker: Chunker,
        engine: EmbeddingEngine,
        writer: Arc<dyn CollectionWriter>,
        batch_size: usize,
        operation_timeout: Duration,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(DocaError::ConfigError(
                "Batch size must be non-zero".to_string(),
            ));
        }
        if batch_size > writer.max_batch_size() {
            tracing::warn!(
                "Batch size {} exceeds the collection limit of {}; every write will fail",
                batch_size,
                writer.max_batch_size()
            );
        }

        Ok(Self {
            collection: collection.into(),
            chunker,
            engine,
            writer,
            batch_size,
            operation_timeout,
        })
    }

    /// Collection every record is written to
    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn engine(&self) -> &EmbeddingEngine {
        &self.engine
    }

    pub fn writer(&self) -> &Arc<dyn CollectionWriter> {
        &self.writer
    }

    /// Index one document
    ///
    /// The inner result is the file's own outcome. Only errors for which
    /// [`DocaError::is_run_fatal`] holds escape as the outer error.
    pub async fn process(
        &self,
        doc: &DocumentRef,
    ) -> Result<std::result::Result<FileOutcome, FileFailure>> {
        match self.process_inner(doc).await {
            Ok(outcome) => Ok(Ok(outcome)),
            Err(e) if e.is_run_fatal() => Err(e),
            Err(e) => Ok(Err(FileFailure {
                file_path: doc.document_id.clone(),
                error: e.to_string(),
            })),
        }
    }

    async fn process_inner(&self, doc: &DocumentRef) -> Result<FileOutcome> {
        let bytes = tokio::fs::read(&doc.path).await?;
        let content = extract::decode(&bytes);
        let text = extract::extract(&content, &doc.file_type)?;

        let output = self.chunker.chunk(&text, &doc.document_id);

        let mut warnings = Vec::new();
        if output.content_truncated {
            warnings.push(format!(
                "Content truncated to {} characters",
                self.chunker.max_content_length()
            ));
        }
        if output.chunks_truncated {
            warnings.push(format!(
                "Chunk limit reached, only the first {} chunks were indexed",
                self.chunker.max_chunks()
            ));
        }

        let mut chunks_indexed = 0;
        for batch in output.chunks.chunks(self.batch_size) {
            self.index_batch(doc, batch).await?;
            chunks_indexed += batch.len();
            tracing::debug!(
                "Flushed {} chunks of {} ({} so far)",
                batch.len(),
                doc.document_id,
                chunks_indexed
            );
        }

        Ok(FileOutcome {
            file_path: doc.document_id.clone(),
            chunks_indexed,
            warnings,
        })
    }

    async fn index_batch(&self, doc: &DocumentRef, batch: &[Chunk]) -> Result<()> {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embed_with_split(&texts).await?;

        let indexed_at = Utc::now();
        let records: Vec<IndexRecord> = batch
            .iter()
            .cloned()
            .zip(vectors)
            .map(|(chunk, vector)| IndexRecord::from_chunk(doc, chunk, vector, indexed_at))
            .collect();

        let result = self
            .with_timeout(
                "collection write",
                self.writer.upsert_batch(&self.collection, records),
            )
            .await?;

        if !result.rejected.is_empty() {
            let reasons: Vec<String> = result
                .rejected
                .iter()
                .map(|(id, reason)| format!("{id}: {reason}"))
                .collect();
            return Err(DocaError::StorageError(format!(
                "{} of {} records rejected ({})",
                result.rejected.len(),
                batch.len(),
                reasons.join("; ")
            )));
        }

        Ok(())
    }

    /// Embed a batch; when over the memory budget, retry once as two halves
    async fn embed_with_split(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        match self.with_timeout("embedding", self.engine.embed(texts)).await {
            Err(e) if e.is_retryable_with_smaller_batch() && texts.len() > 1 => {
                tracing::warn!(
                    "Embedding batch of {} over memory budget, retrying as two halves: {}",
                    texts.len(),
                    e
                );
                let (left, right) = texts.split_at(texts.len() / 2);
                let mut vectors = self.with_timeout("embedding", self.engine.embed(left)).await?;
                vectors.extend(self.with_timeout("embedding", self.engine.embed(right)).await?);
                Ok(vectors)
            }
            other => other,
        }
    }

    async fn with_timeout<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.operation_timeout, fut)
            .await
            .map_err(|_| DocaError::Timeout {
                operation: operation.to_string(),
                secs: self.operation_timeout.as_secs(),
            })?
    }
}
