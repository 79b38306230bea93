//! Core domain logic (transport-agnostic)
//!
//! This module contains all indexing logic that is independent
//! of how a run is triggered or observed.
//!
//! # Architecture
//!
//! - **config**: Configuration loading (TOML + environment)
//! - **error**: Error types and Result alias
//! - **types**: Domain data structures
//! - **xdg**: XDG directory handling
//! - **indexer**: File walking, extraction, chunking, run orchestration
//! - **embedding**: Embedding models behind a memory budget
//! - **storage**: Collection writers (Tantivy, in-memory)
//! - **progress**: Progress event broadcasting
//! - **services**: Unified service container

pub mod config;
pub mod embedding;
pub mod error;
pub mod indexer;
pub mod progress;
pub mod services;
pub mod storage;
pub mod types;
pub mod xdg;

// Re-export key types for convenience
pub use config::Config;
pub use error::{DocaError, Result};
pub use services::Services;
