//! Indexer layer tests
//!
//! File discovery rules and UTF-8 safety of extraction and chunking.
