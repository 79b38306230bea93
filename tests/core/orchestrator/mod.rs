//! Orchestrator tests
//!
//! Full runs against the in-memory collection with a hashing embedder,
//! checking summaries, run state and the progress event stream.

mod test_lifecycle;
