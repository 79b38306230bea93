//! Doca - Document Indexing Pipeline
//!
//! Walks a tree of text documents, splits them into overlapping
//! chunks, embeds each chunk and upserts the vectors into a
//! collection, streaming progress events to observers as it goes.
//!
//! # Architecture
//!
//! The codebase is organized into two modules:
//!
//! - **core**: Domain logic (transport-agnostic)
//!   - config, error, types, xdg
//!   - indexer (walking, extraction, chunking, orchestration)
//!   - embedding (fastembed and hashing backends, memory budget)
//!   - storage (Tantivy and in-memory collections)
//!   - progress (broadcast progress events)
//!   - services (unified service container)
//!
//! - **cli**: Command-line adapter (depends on core)
//!
//! # Key Features
//!
//! - UTF-8 safe chunking (character-based, never panics)
//! - Deterministic record ids, so re-indexing overwrites
//! - Per-file failure isolation with a live event stream
//! - One active run per collection, cancellable between files

// Core domain logic (transport-agnostic)
pub mod core;

// CLI adapter
pub mod cli;

// Re-export commonly used types for convenience
pub use core::config::Config;
pub use core::error::{DocaError, Result};
pub use core::services::Services;
pub use core::types::*;
