// Tantivy-backed collections: persistence, idempotent re-runs and
// schema checks across writer instances

use crate::common::{
    hash_embedder, test_config, unique_collection, GatedEmbedder, TestDocs, TEST_DIMENSION,
};
use doca::core::embedding::EmbeddingEngine;
use doca::core::indexer::StartRequest;
use doca::core::services::Services;
use doca::core::storage::{CollectionWriter, TantivyCollection};
use doca::core::types::record_id;
use doca::DocaError;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn tantivy_services(data_dir: &TempDir) -> (Services, Arc<TantivyCollection>) {
    tantivy_services_with(data_dir, hash_embedder())
}

fn tantivy_services_with(
    data_dir: &TempDir,
    embedder: Arc<dyn doca::core::embedding::Embedder>,
) -> (Services, Arc<TantivyCollection>) {
    let mut config = test_config();
    config.storage.data_dir = data_dir.path().to_path_buf();

    let writer = Arc::new(TantivyCollection::new(config.storage.collections_dir()));
    let engine = EmbeddingEngine::new(embedder, config.embedding.memory_limit);
    let services = Services::with_components(config, engine, writer.clone());
    (services, writer)
}

#[tokio::test]
async fn test_run_into_tantivy_collection() {
    let docs = TestDocs::handbook();
    let data_dir = TempDir::new().unwrap();
    let (services, writer) = tantivy_services(&data_dir);
    let name = unique_collection("tantivy_run");

    let summary = services
        .orchestrator(Some(&name))
        .unwrap()
        .run(StartRequest::new(docs.path(), true))
        .await
        .unwrap();

    assert_eq!(summary.total_files, 4);
    assert_eq!(writer.count(&name).await.unwrap(), summary.total_chunks as u64);

    let record = writer
        .get(&name, &record_id(&docs.document_id("intro.md"), 0))
        .await
        .unwrap()
        .expect("intro.md chunk 0 stored");
    assert!(record.text.starts_with("Welcome"));
    assert_eq!(record.vector.dimension(), TEST_DIMENSION);

    let metadata = writer.metadata(&name).await.unwrap();
    assert_eq!(metadata.name, name);
    assert_eq!(metadata.dimension, TEST_DIMENSION);
    assert_eq!(metadata.record_count, summary.total_chunks as u64);
}

#[tokio::test]
async fn test_rerun_overwrites_instead_of_duplicating() {
    let docs = TestDocs::handbook();
    let data_dir = TempDir::new().unwrap();
    let (services, writer) = tantivy_services(&data_dir);
    let name = unique_collection("tantivy_rerun");
    let orchestrator = services.orchestrator(Some(&name)).unwrap();

    let first = orchestrator
        .run(StartRequest::new(docs.path(), true))
        .await
        .unwrap();
    let count_after_first = writer.count(&name).await.unwrap();

    docs.write("intro.md", "# Welcome back\n\nThe onboarding process changed.");
    let second = orchestrator
        .run(StartRequest::new(docs.path(), true))
        .await
        .unwrap();

    assert_eq!(first.total_chunks, second.total_chunks);
    assert_eq!(writer.count(&name).await.unwrap(), count_after_first);

    let record = writer
        .get(&name, &record_id(&docs.document_id("intro.md"), 0))
        .await
        .unwrap()
        .unwrap();
    assert!(record.text.starts_with("Welcome back"));
}

#[tokio::test]
async fn test_collection_survives_reopen() {
    let docs = TestDocs::handbook();
    let data_dir = TempDir::new().unwrap();
    let name = unique_collection("tantivy_reopen");

    let total_chunks = {
        let (services, _writer) = tantivy_services(&data_dir);
        services
            .orchestrator(Some(&name))
            .unwrap()
            .run(StartRequest::new(docs.path(), true))
            .await
            .unwrap()
            .total_chunks
    };

    let collections_dir = data_dir.path().join("collections");
    let reopened = TantivyCollection::new(collections_dir.clone());

    let metadata = reopened.read_metadata(&name).unwrap();
    assert_eq!(metadata.record_count, total_chunks as u64);

    reopened.ensure_schema(&name, TEST_DIMENSION).await.unwrap();
    assert_eq!(reopened.count(&name).await.unwrap(), total_chunks as u64);
    drop(reopened);

    // A different embedding dimension is refused
    let mismatched = TantivyCollection::new(collections_dir);
    let result = mismatched.ensure_schema(&name, TEST_DIMENSION * 2).await;
    assert!(matches!(
        result,
        Err(DocaError::SchemaMismatch { expected, found, .. })
            if expected == TEST_DIMENSION * 2 && found == TEST_DIMENSION
    ));
}

#[tokio::test]
async fn test_missing_collection_metadata() {
    let data_dir = TempDir::new().unwrap();
    let writer = TantivyCollection::new(data_dir.path().to_path_buf());

    assert!(matches!(
        writer.read_metadata("never_created"),
        Err(DocaError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_writer_limit_below_batch_size_fails_files() {
    let docs = TestDocs::with_files(&[("long.md", &crate::common::words(300))]);
    let data_dir = TempDir::new().unwrap();

    let mut config = test_config();
    config.storage.data_dir = data_dir.path().to_path_buf();
    let writer = Arc::new(TantivyCollection::with_max_batch_size(
        config.storage.collections_dir(),
        2,
    ));
    let engine = EmbeddingEngine::new(hash_embedder(), config.embedding.memory_limit);
    let services = Services::with_components(config, engine, writer.clone());
    let name = unique_collection("tantivy_limit");

    let summary = services
        .orchestrator(Some(&name))
        .unwrap()
        .run(StartRequest::new(docs.path(), true))
        .await
        .unwrap();

    assert_eq!(summary.error_files, 1);
    assert!(summary.failures[0].error.contains("exceeds"));
    assert_eq!(writer.count(&name).await.unwrap(), 0);
}

#[tokio::test]
async fn test_concurrent_runs_share_one_writer() {
    let held = TestDocs::with_files(&[("held.md", "HOLD until released")]);
    let free = TestDocs::with_files(&[("free.md", "indexed straight away")]);
    let data_dir = TempDir::new().unwrap();

    let embedder = Arc::new(GatedEmbedder::for_marker("HOLD"));
    let gate = embedder.gate.clone();
    let (services, writer) = tantivy_services_with(&data_dir, embedder);

    let held_name = unique_collection("tantivy_held");
    let free_name = unique_collection("tantivy_free");
    let held_run = services.orchestrator(Some(&held_name)).unwrap();
    let free_run = services.orchestrator(Some(&free_name)).unwrap();

    let handle = held_run
        .start(StartRequest::new(held.path(), true))
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while held_run.run_state().total_files != 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("held run did not enumerate files in time");

    // Opens a second collection while the first is mid-run
    free_run
        .run(StartRequest::new(free.path(), true))
        .await
        .unwrap();

    gate.add_permits(16);
    let summary = handle.wait().await.unwrap();
    assert_eq!(summary.error_files, 0);

    assert_eq!(writer.count(&held_name).await.unwrap(), 1);
    assert_eq!(writer.count(&free_name).await.unwrap(), 1);
    assert!(writer
        .get(&held_name, &record_id(&held.document_id("held.md"), 0))
        .await
        .unwrap()
        .is_some());
    assert!(writer
        .get(&held_name, &record_id(&free.document_id("free.md"), 0))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_recreate_drops_previous_records() {
    let docs = TestDocs::handbook();
    let data_dir = TempDir::new().unwrap();
    let (services, writer) = tantivy_services(&data_dir);
    let name = unique_collection("tantivy_recreate");
    let orchestrator = services.orchestrator(Some(&name)).unwrap();

    orchestrator
        .run(StartRequest::new(docs.path(), true))
        .await
        .unwrap();

    let single = TestDocs::with_files(&[("only.md", "the only file left")]);
    let summary = orchestrator
        .run(StartRequest::new(single.path(), true).with_recreate(true))
        .await
        .unwrap();

    assert_eq!(summary.total_chunks, 1);
    assert_eq!(writer.count(&name).await.unwrap(), 1);
    assert_eq!(writer.read_metadata(&name).unwrap().record_count, 1);
}
