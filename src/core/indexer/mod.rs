//! Document indexing module.
//!
//! Handles everything between a directory on disk and records in a
//! collection:
//!
//! - File system walking with extension and pattern filtering
//! - Plain-text extraction (markdown stripping, latin-1 fallback)
//! - UTF-8 safe character-based chunking with overlap and limits
//! - Per-file embed-and-upsert pipeline
//! - Run orchestration with progress events and cancellation
//!
//! # Safety
//!
//! The chunker uses character-based slicing via `char_indices()`
//! to ensure UTF-8 safety. This prevents panics when processing
//! files containing emojis, multi-byte characters, or other
//! special Unicode sequences.

pub mod chunker;
pub mod extract;
pub mod orchestrator;
pub mod pipeline;
pub mod walker;

pub use chunker::Chunker;
pub use orchestrator::{IndexingOrchestrator, RunHandle, StartRequest};
pub use pipeline::FilePipeline;
pub use walker::{FileWalk, FileWalker};
