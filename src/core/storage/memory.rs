//! In-memory collections.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use super::{partition_records, CollectionWriter, DEFAULT_MAX_BATCH_SIZE};
use crate::core::error::{DocaError, Result};
use crate::core::types::{BatchResult, IndexRecord};

#[derive(Debug, Default)]
struct MemoryState {
    dimension: usize,
    records: BTreeMap<String, IndexRecord>,
}

/// Collections held in maps, keyed by name and then by record id
#[derive(Debug)]
pub struct MemoryCollection {
    max_batch_size: usize,
    collections: RwLock<HashMap<String, MemoryState>>,
}

impl Default for MemoryCollection {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BATCH_SIZE)
    }
}

impl MemoryCollection {
    pub fn new(max_batch_size: usize) -> Self {
        Self {
            max_batch_size,
            collections: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, MemoryState>>> {
        self.collections
            .read()
            .map_err(|_| DocaError::StorageError("memory collection lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, MemoryState>>> {
        self.collections
            .write()
            .map_err(|_| DocaError::StorageError("memory collection lock poisoned".to_string()))
    }

    /// Record by id, searching every collection
    pub fn get(&self, id: &str) -> Option<IndexRecord> {
        self.read()
            .ok()?
            .values()
            .find_map(|c| c.records.get(id).cloned())
    }

    /// Records across every collection
    pub fn len(&self) -> usize {
        self.read()
            .map(|c| c.values().map(|s| s.records.len()).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All record ids in sorted order, across every collection
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .read()
            .map(|c| {
                c.values()
                    .flat_map(|s| s.records.keys().cloned())
                    .collect()
            })
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Record ids of one collection, empty if it does not exist
    pub fn collection_ids(&self, collection_name: &str) -> Vec<String> {
        self.read()
            .ok()
            .and_then(|c| {
                c.get(collection_name)
                    .map(|s| s.records.keys().cloned().collect())
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl CollectionWriter for MemoryCollection {
    async fn ensure_schema(&self, collection_name: &str, dimension: usize) -> Result<()> {
        let mut collections = self.write()?;

        match collections.get(collection_name) {
            Some(state) if state.dimension != dimension => Err(DocaError::SchemaMismatch {
                collection: collection_name.to_string(),
                expected: dimension,
                found: state.dimension,
            }),
            Some(_) => Ok(()),
            None => {
                collections.insert(
                    collection_name.to_string(),
                    MemoryState {
                        dimension,
                        records: BTreeMap::new(),
                    },
                );
                Ok(())
            }
        }
    }

    async fn upsert_batch(
        &self,
        collection_name: &str,
        records: Vec<IndexRecord>,
    ) -> Result<BatchResult> {
        if records.len() > self.max_batch_size {
            return Err(DocaError::BatchTooLarge {
                size: records.len(),
                max: self.max_batch_size,
            });
        }

        let mut collections = self.write()?;
        let state = collections.get_mut(collection_name).ok_or_else(|| {
            DocaError::StorageError(format!(
                "upsert into '{collection_name}' before ensure_schema"
            ))
        })?;

        let (valid, rejected) = partition_records(records, state.dimension);
        let accepted = valid.len();
        for record in valid {
            state.records.insert(record.id.clone(), record);
        }

        Ok(BatchResult { accepted, rejected })
    }

    async fn drop_collection(&self, collection_name: &str) -> Result<bool> {
        Ok(self.write()?.remove(collection_name).is_some())
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
}
