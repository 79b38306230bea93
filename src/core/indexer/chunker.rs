//! Overlapping character windows over extracted text.
//!
//! Sizes count characters, never bytes. All chunk boundaries are taken from
//! `char_indices()`, so byte offsets always fall on character
//! boundaries.
//!
//! Two lossy limits apply and are reported through [`ChunkOutput`]
//! flags rather than errors: text beyond `max_content_length`
//! characters is dropped before chunking, and chunking stops after
//! `max_chunks` chunks.
//!
//! # Example
//!
//! ```
//! use doca::core::indexer::Chunker;
//!
//! let chunker = Chunker::new(512, 128, 100_000, 50).unwrap();
//! let text = "x".repeat(1000);
//! let output = chunker.chunk(&text, "notes.md");
//!
//! let starts: Vec<usize> = output.chunks.iter().map(|c| c.start_offset).collect();
//! assert_eq!(starts, vec![0, 384, 768]);
//! ```

use crate::core::error::{DocaError, Result};
use crate::core::types::{Chunk, ChunkOutput};

/// Fixed-width chunker with overlap, measured in characters
#[derive(Debug, Clone)]
pub struct Chunker {
    /// Window width
    chunk_size: usize,

    /// Number of characters shared by consecutive chunks
    overlap: usize,

    /// Characters kept from the input before chunking
    max_content_length: usize,

    /// Chunks produced per document at most
    max_chunks: usize,
}

impl Chunker {
    /// Build a chunker, validating the window and limits.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `chunk_size` is 0, if
    /// `overlap >= chunk_size`, or if either limit is 0.
    pub fn new(
        chunk_size: usize,
        overlap: usize,
        max_content_length: usize,
        max_chunks: usize,
    ) -> Result<Self> {
        if chunk_size == 0 {
            return Err(DocaError::ConfigError(
                "chunk_size must be > 0".to_string(),
            ));
        }
        if overlap >= chunk_size {
            return Err(DocaError::ConfigError(format!(
                "overlap ({overlap}) must be < chunk_size ({chunk_size})"
            )));
        }
        if max_content_length == 0 {
            return Err(DocaError::ConfigError(
                "max_content_length must be > 0".to_string(),
            ));
        }
        if max_chunks == 0 {
            return Err(DocaError::ConfigError(
                "max_chunks must be > 0".to_string(),
            ));
        }

        Ok(Self {
            chunk_size,
            overlap,
            max_content_length,
            max_chunks,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    pub fn max_chunks(&self) -> usize {
        self.max_chunks
    }

    pub fn max_content_length(&self) -> usize {
        self.max_content_length
    }

    /// Split `text` into windows tagged with `document_id`.
    ///
    /// Chunk `i` starts at character `i * (chunk_size - overlap)`.
    /// Iteration ends once a chunk reaches the end of the text, or
    /// when `max_chunks` chunks have been produced. Text no longer
    /// than the overlap still yields one chunk holding all of it.
    pub fn chunk(&self, text: &str, document_id: &str) -> ChunkOutput {
        // Collect character indices (byte offset, char) for the kept
        // prefix; one extra entry tells us whether anything was cut
        let mut char_indices: Vec<(usize, char)> = text
            .char_indices()
            .take(self.max_content_length + 1)
            .collect();

        let content_truncated = char_indices.len() > self.max_content_length;
        let text_end = if content_truncated {
            let cut = char_indices[self.max_content_length].0;
            char_indices.truncate(self.max_content_length);
            cut
        } else {
            text.len()
        };

        let total_chars = char_indices.len();
        if total_chars == 0 {
            return ChunkOutput {
                content_truncated,
                ..Default::default()
            };
        }

        let step = self.chunk_size - self.overlap;
        let mut chunks = Vec::new();
        let mut char_start_idx = 0;
        let mut reached_end = false;

        while chunks.len() < self.max_chunks {
            let char_end_idx = (char_start_idx + self.chunk_size).min(total_chars);

            let byte_start = char_indices[char_start_idx].0;
            let byte_end = if char_end_idx < total_chars {
                char_indices[char_end_idx].0
            } else {
                text_end
            };

            chunks.push(Chunk {
                document_id: document_id.to_string(),
                chunk_index: chunks.len(),
                text: text[byte_start..byte_end].to_string(),
                start_offset: byte_start,
                end_offset: byte_end,
            });

            if char_end_idx == total_chars {
                reached_end = true;
                break;
            }
            char_start_idx += step;
        }

        if !reached_end {
            tracing::debug!(
                "Chunk limit {} reached for {}, remaining text dropped",
                self.max_chunks,
                document_id
            );
        }

        ChunkOutput {
            chunks,
            content_truncated,
            chunks_truncated: !reached_end,
        }
    }

    /// Number of chunks `chunk` produces for text of `chars` characters
    pub fn expected_chunks(&self, chars: usize) -> usize {
        let len = chars.min(self.max_content_length);
        let count = if len == 0 {
            0
        } else if len <= self.overlap {
            1
        } else {
            (len - self.overlap).div_ceil(self.chunk_size - self.overlap)
        };
        count.min(self.max_chunks)
    }
}
