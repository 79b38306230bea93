// Common test utilities and fixtures

pub mod helpers;

// Re-export commonly used items
// Note: These may appear unused in some test binaries
#[allow(unused_imports)]
pub use fixtures::{words, TestDocs, MULTIBYTE_SAMPLES};
#[allow(unused_imports)]
pub use helpers::{
    count_events, event_names, hash_embedder, memory_services, run_with_events, test_config,
    unique_collection, GatedEmbedder, MarkerFailEmbedder, MarkerRejectWriter, PanickingEmbedder,
    SlowMarkerEmbedder, TEST_DIMENSION,
};
