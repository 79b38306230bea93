//! Tantivy-backed persistent collection.
//!
//! Each collection lives in its own directory with a `meta.json`
//! describing the vector dimension, and a Tantivy index holding the
//! chunk text, metadata and the raw vector bytes. Record ids are
//! indexed as raw terms so an upsert is delete-by-term plus add.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tantivy::collector::TopDocs;
use tantivy::query::TermQuery;
use tantivy::schema::*;
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};

use super::{partition_records, CollectionWriter, DEFAULT_MAX_BATCH_SIZE};
use crate::core::config::validate_collection_name;
use crate::core::error::{DocaError, Result};
use crate::core::types::{BatchResult, EmbeddingVector, IndexRecord, RecordMetadata};

/// Current schema version
/// Version 1: chunk text, metadata and little-endian f32 vector bytes
pub const SCHEMA_VERSION: u32 = 1;

const WRITER_HEAP_BYTES: usize = 50_000_000;

/// Collection metadata stored in `meta.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionMetadata {
    pub name: String,
    pub dimension: usize,
    pub schema_version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub record_count: u64,
}

/// Create the Tantivy schema for collection records
///
/// Fields:
/// - id: Record id, `{document_id}#{chunk_index}` (STRING | STORED)
/// - document_id: Owning document (STRING | STORED)
/// - file_path, file_name, file_type: Metadata (STRING | STORED)
/// - content: Chunk text (TEXT | STORED)
/// - chunk_index: Sequential chunk number (i64 | INDEXED | STORED)
/// - vector: Little-endian f32 bytes (bytes | STORED)
/// - indexed_at: Timestamp (Date | STORED)
pub fn create_schema() -> Schema {
    let mut builder = Schema::builder();

    builder.add_text_field("id", STRING | STORED);
    builder.add_text_field("document_id", STRING | STORED);
    builder.add_text_field("file_path", STRING | STORED);
    builder.add_text_field("file_name", STRING | STORED);
    builder.add_text_field("file_type", STRING | STORED);

    builder.add_text_field("content", TEXT | STORED);
    builder.add_i64_field("chunk_index", INDEXED | STORED);
    builder.add_bytes_field("vector", STORED);

    builder.add_date_field("indexed_at", STORED);

    builder.build()
}

#[derive(Debug, Clone, Copy)]
struct Fields {
    id: Field,
    document_id: Field,
    file_path: Field,
    file_name: Field,
    file_type: Field,
    content: Field,
    chunk_index: Field,
    vector: Field,
    indexed_at: Field,
}

impl Fields {
    fn resolve(schema: &Schema) -> Result<Self> {
        let get = |name: &str| {
            schema
                .get_field(name)
                .map_err(|e| DocaError::StorageError(format!("Missing {name} field: {e}")))
        };

        Ok(Self {
            id: get("id")?,
            document_id: get("document_id")?,
            file_path: get("file_path")?,
            file_name: get("file_name")?,
            file_type: get("file_type")?,
            content: get("content")?,
            chunk_index: get("chunk_index")?,
            vector: get("vector")?,
            indexed_at: get("indexed_at")?,
        })
    }
}

/// An opened collection: index, writer and cached metadata
struct OpenCollection {
    dir: PathBuf,
    reader: IndexReader,
    writer: IndexWriter,
    fields: Fields,
    metadata: CollectionMetadata,
}

impl OpenCollection {
    fn metadata_path(dir: &Path) -> PathBuf {
        dir.join("meta.json")
    }

    fn tantivy_dir(dir: &Path) -> PathBuf {
        dir.join("tantivy")
    }

    fn read_metadata(dir: &Path) -> Result<CollectionMetadata> {
        let contents = fs::read_to_string(Self::metadata_path(dir))?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn write_metadata(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.metadata)?;
        fs::write(Self::metadata_path(&self.dir), json)?;
        Ok(())
    }

    /// Open the collection at `dir`, creating it when absent
    fn open_or_create(dir: PathBuf, name: &str, dimension: usize) -> Result<Self> {
        let tantivy_dir = Self::tantivy_dir(&dir);

        let (index, metadata, created) = if Self::metadata_path(&dir).exists() {
            let metadata = Self::read_metadata(&dir)?;

            if metadata.dimension != dimension {
                return Err(DocaError::SchemaMismatch {
                    collection: name.to_string(),
                    expected: dimension,
                    found: metadata.dimension,
                });
            }
            if metadata.schema_version != SCHEMA_VERSION {
                return Err(DocaError::StorageError(format!(
                    "Collection '{}' uses schema version {} (current: v{}). \
                     Re-index with --recreate.",
                    name, metadata.schema_version, SCHEMA_VERSION
                )));
            }

            let index = Index::open_in_dir(&tantivy_dir)
                .map_err(|e| DocaError::StorageError(format!("Failed to open index: {e}")))?;
            (index, metadata, false)
        } else {
            fs::create_dir_all(&tantivy_dir)?;
            let index = Index::create_in_dir(&tantivy_dir, create_schema())
                .map_err(|e| DocaError::StorageError(format!("Failed to create index: {e}")))?;

            let now = Utc::now();
            let metadata = CollectionMetadata {
                name: name.to_string(),
                dimension,
                schema_version: SCHEMA_VERSION,
                created_at: now,
                updated_at: now,
                record_count: 0,
            };
            (index, metadata, true)
        };

        let fields = Fields::resolve(&index.schema())?;

        let writer = index
            .writer(WRITER_HEAP_BYTES)
            .map_err(|e| DocaError::StorageError(format!("Failed to create writer: {e}")))?;

        let reader: IndexReader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e| DocaError::StorageError(format!("Failed to create reader: {e}")))?;

        let collection = Self {
            dir,
            reader,
            writer,
            fields,
            metadata,
        };

        if created {
            collection.write_metadata()?;
            tracing::info!(
                "Created collection '{}' ({} dimensions)",
                name,
                dimension
            );
        } else {
            tracing::debug!(
                "Opened collection '{}' ({} records)",
                name,
                collection.metadata.record_count
            );
        }

        Ok(collection)
    }

    fn to_document(&self, record: &IndexRecord) -> TantivyDocument {
        let f = &self.fields;
        doc!(
            f.id => record.id.as_str(),
            f.document_id => record.document_id.as_str(),
            f.file_path => record.metadata.file_path.as_str(),
            f.file_name => record.metadata.file_name.as_str(),
            f.file_type => record.metadata.file_type.as_str(),
            f.content => record.text.as_str(),
            f.chunk_index => record.chunk_index as i64,
            f.vector => record.vector.to_le_bytes(),
            f.indexed_at => tantivy::DateTime::from_timestamp_secs(
                record.metadata.indexed_at.timestamp()
            ),
        )
    }

    fn to_record(&self, doc: &TantivyDocument) -> Result<IndexRecord> {
        let f = &self.fields;
        let text = |field: Field| -> String {
            doc.get_first(field)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };

        let vector = doc
            .get_first(f.vector)
            .and_then(|v| v.as_bytes())
            .and_then(EmbeddingVector::from_le_bytes)
            .ok_or_else(|| DocaError::StorageError("stored vector is malformed".to_string()))?;

        let indexed_at = doc
            .get_first(f.indexed_at)
            .and_then(|v| v.as_datetime())
            .and_then(|d| DateTime::from_timestamp(d.into_timestamp_secs(), 0))
            .unwrap_or_default();

        Ok(IndexRecord {
            id: text(f.id),
            document_id: text(f.document_id),
            text: text(f.content),
            chunk_index: doc
                .get_first(f.chunk_index)
                .and_then(|v| v.as_i64())
                .unwrap_or_default() as usize,
            vector,
            metadata: RecordMetadata {
                file_name: text(f.file_name),
                file_type: text(f.file_type),
                file_path: text(f.file_path),
                indexed_at,
            },
        })
    }

    /// Replace-by-id, then commit and refresh the record count
    fn upsert(&mut self, records: &[IndexRecord]) -> Result<()> {
        for record in records {
            self.writer
                .delete_term(Term::from_field_text(self.fields.id, &record.id));
            self.writer
                .add_document(self.to_document(record))
                .map_err(|e| DocaError::StorageError(format!("Failed to add document: {e}")))?;
        }

        self.writer
            .commit()
            .map_err(|e| DocaError::StorageError(format!("Failed to commit: {e}")))?;
        self.reader
            .reload()
            .map_err(|e| DocaError::StorageError(format!("Failed to reload reader: {e}")))?;

        self.metadata.record_count = self.reader.searcher().num_docs();
        self.metadata.updated_at = Utc::now();
        self.write_metadata()
    }

    fn get(&self, id: &str) -> Result<Option<IndexRecord>> {
        let searcher = self.reader.searcher();
        let query = TermQuery::new(
            Term::from_field_text(self.fields.id, id),
            IndexRecordOption::Basic,
        );

        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(1))
            .map_err(|e| DocaError::StorageError(format!("Lookup failed: {e}")))?;

        match top_docs.first() {
            Some((_, address)) => {
                let doc: TantivyDocument = searcher
                    .doc(*address)
                    .map_err(|e| DocaError::StorageError(format!("Failed to load doc: {e}")))?;
                Ok(Some(self.to_record(&doc)?))
            }
            None => Ok(None),
        }
    }
}

/// Persistent collection writer backed by Tantivy
///
/// Collections are opened on first `ensure_schema` and stay open,
/// each with its own Tantivy writer, until dropped.
pub struct TantivyCollection {
    /// Root directory for all collections
    collections_dir: PathBuf,

    max_batch_size: usize,

    open: RwLock<HashMap<String, Arc<Mutex<OpenCollection>>>>,

    /// Serializes opening and dropping, which take the Tantivy writer lock
    lifecycle: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for TantivyCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TantivyCollection")
            .field("collections_dir", &self.collections_dir)
            .field("max_batch_size", &self.max_batch_size)
            .finish()
    }
}

impl TantivyCollection {
    /// Create a writer storing collections under `collections_dir`
    pub fn new(collections_dir: PathBuf) -> Self {
        Self::with_max_batch_size(collections_dir, DEFAULT_MAX_BATCH_SIZE)
    }

    pub fn with_max_batch_size(collections_dir: PathBuf, max_batch_size: usize) -> Self {
        Self {
            collections_dir,
            max_batch_size,
            open: RwLock::new(HashMap::new()),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    /// Directory of the named collection
    pub fn collection_dir(&self, name: &str) -> PathBuf {
        self.collections_dir.join(name)
    }

    /// Read a collection's metadata without opening its index
    pub fn read_metadata(&self, name: &str) -> Result<CollectionMetadata> {
        let dir = self.collection_dir(name);
        if !OpenCollection::metadata_path(&dir).exists() {
            return Err(DocaError::NotFound(format!("collection '{name}'")));
        }
        OpenCollection::read_metadata(&dir)
    }

    fn lookup(&self, name: &str) -> Result<Option<Arc<Mutex<OpenCollection>>>> {
        Ok(self
            .open
            .read()
            .map_err(|_| DocaError::StorageError("collection map lock poisoned".to_string()))?
            .get(name)
            .cloned())
    }

    fn opened(&self, name: &str) -> Result<Arc<Mutex<OpenCollection>>> {
        self.lookup(name)?.ok_or_else(|| {
            DocaError::StorageError(format!("upsert into '{name}' before ensure_schema"))
        })
    }

    async fn with_collection<T, F>(&self, name: &str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut OpenCollection) -> Result<T> + Send + 'static,
    {
        let collection = self.opened(name)?;
        tokio::task::spawn_blocking(move || {
            let mut guard = collection
                .lock()
                .map_err(|_| DocaError::StorageError("collection lock poisoned".to_string()))?;
            op(&mut guard)
        })
        .await
        .map_err(|e| DocaError::StorageError(format!("storage task failed: {e}")))?
    }

    /// Look up one record by id
    pub async fn get(&self, collection_name: &str, id: &str) -> Result<Option<IndexRecord>> {
        let id = id.to_string();
        self.with_collection(collection_name, move |c| c.get(&id))
            .await
    }

    /// Number of records in an open collection
    pub async fn count(&self, collection_name: &str) -> Result<u64> {
        self.with_collection(collection_name, |c| Ok(c.reader.searcher().num_docs()))
            .await
    }

    /// Metadata of an open collection
    pub async fn metadata(&self, collection_name: &str) -> Result<CollectionMetadata> {
        self.with_collection(collection_name, |c| Ok(c.metadata.clone()))
            .await
    }
}

#[async_trait]
impl CollectionWriter for TantivyCollection {
    async fn ensure_schema(&self, collection_name: &str, dimension: usize) -> Result<()> {
        validate_collection_name(collection_name)?;
        let _lifecycle = self.lifecycle.lock().await;

        if let Some(open) = self.lookup(collection_name)? {
            let found = open
                .lock()
                .map_err(|_| DocaError::StorageError("collection lock poisoned".to_string()))?
                .metadata
                .dimension;
            if found != dimension {
                return Err(DocaError::SchemaMismatch {
                    collection: collection_name.to_string(),
                    expected: dimension,
                    found,
                });
            }
            return Ok(());
        }

        let dir = self.collection_dir(collection_name);
        let name = collection_name.to_string();
        let opened = tokio::task::spawn_blocking(move || {
            OpenCollection::open_or_create(dir, &name, dimension)
        })
        .await
        .map_err(|e| DocaError::StorageError(format!("storage task failed: {e}")))??;

        self.open
            .write()
            .map_err(|_| DocaError::StorageError("collection map lock poisoned".to_string()))?
            .insert(collection_name.to_string(), Arc::new(Mutex::new(opened)));

        Ok(())
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

        self.with_collection(collection_name, move |collection| {
            let (valid, rejected) = partition_records(records, collection.metadata.dimension);
            if !valid.is_empty() {
                collection.upsert(&valid)?;
            }
            Ok(BatchResult {
                accepted: valid.len(),
                rejected,
            })
        })
        .await
    }

    async fn drop_collection(&self, collection_name: &str) -> Result<bool> {
        validate_collection_name(collection_name)?;
        let _lifecycle = self.lifecycle.lock().await;

        // Closing the index releases its writer lock before the files go
        let was_open = self
            .open
            .write()
            .map_err(|_| DocaError::StorageError("collection map lock poisoned".to_string()))?
            .remove(collection_name)
            .is_some();

        let dir = self.collection_dir(collection_name);
        let removed = tokio::task::spawn_blocking(move || -> Result<bool> {
            if !dir.exists() {
                return Ok(false);
            }
            fs::remove_dir_all(&dir)?;
            Ok(true)
        })
        .await
        .map_err(|e| DocaError::StorageError(format!("storage task failed: {e}")))??;

        if removed {
            tracing::info!("Dropped collection '{}'", collection_name);
        }
        Ok(removed || was_open)
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
}
