//! Collection storage for embedded chunks.
//!
//! The [`CollectionWriter`] trait is the seam between the indexing
//! pipeline and wherever records end up. Two implementations ship:
//!
//! - **TantivyCollection**: persistent, one Tantivy index per collection
//! - **MemoryCollection**: in-process map, for tests and dry runs
//!
//! # Collection Storage Structure
//!
//! ```text
//! {data_dir}/collections/
//! ├── {collection-1}/
//! │   ├── meta.json           # Collection metadata
//! │   └── tantivy/            # Tantivy index
//! │       ├── meta.json
//! │       └── [segment files]
//! ```

mod memory;
mod tantivy;

pub use memory::MemoryCollection;
pub use tantivy::{CollectionMetadata, TantivyCollection, SCHEMA_VERSION};

use async_trait::async_trait;

use crate::core::error::Result;
use crate::core::types::{BatchResult, IndexRecord};

/// Default upper bound on records per `upsert_batch` call
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// Destination for index records
///
/// One writer serves any number of collections at once. Every call
/// names the collection it targets.
#[async_trait]
pub trait CollectionWriter: Send + Sync {
    /// Create the collection if absent, or verify its vector dimension
    async fn ensure_schema(&self, collection_name: &str, dimension: usize) -> Result<()>;

    /// Insert or fully replace records by id
    ///
    /// Fails with `BatchTooLarge` above [`max_batch_size`], and with
    /// `StorageError` if `ensure_schema` was never called for the
    /// collection. Invalid records are reported in
    /// `BatchResult::rejected`, the rest are written.
    ///
    /// [`max_batch_size`]: CollectionWriter::max_batch_size
    async fn upsert_batch(
        &self,
        collection_name: &str,
        records: Vec<IndexRecord>,
    ) -> Result<BatchResult>;

    /// Delete the collection and all of its records
    ///
    /// Returns whether anything existed. The next `ensure_schema`
    /// starts from an empty collection.
    async fn drop_collection(&self, collection_name: &str) -> Result<bool>;

    /// Largest batch `upsert_batch` accepts
    fn max_batch_size(&self) -> usize;
}

/// Split records into writable ones and `(id, reason)` rejections
pub(crate) fn partition_records(
    records: Vec<IndexRecord>,
    dimension: usize,
) -> (Vec<IndexRecord>, Vec<(String, String)>) {
    let mut valid = Vec::with_capacity(records.len());
    let mut rejected = Vec::new();

    for record in records {
        if record.id.is_empty() {
            rejected.push((record.id, "empty record id".to_string()));
        } else if record.vector.dimension() != dimension {
            let reason = format!(
                "vector dimension {} does not match collection dimension {}",
                record.vector.dimension(),
                dimension
            );
            rejected.push((record.id, reason));
        } else if !record.vector.is_finite() {
            rejected.push((record.id, "vector contains NaN or infinite values".to_string()));
        } else {
            valid.push(record);
        }
    }

    (valid, rejected)
}
