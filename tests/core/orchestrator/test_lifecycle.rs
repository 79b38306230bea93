// Run lifecycle: single active run per collection and cancellation

use crate::common::{
    count_events, hash_embedder, memory_services, run_with_events, test_config,
    unique_collection, GatedEmbedder, PanickingEmbedder, TestDocs,
};
use doca::core::indexer::{IndexingOrchestrator, StartRequest};
use doca::core::progress::ProgressEvent;
use doca::core::types::RunPhase;
use doca::DocaError;
use std::sync::Arc;
use std::time::Duration;

/// Wait until the run has enumerated its files and is blocked on the gate
async fn wait_for_enumeration(orchestrator: &IndexingOrchestrator, files: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while orchestrator.run_state().total_files != files {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("run did not enumerate files in time");
}

#[tokio::test]
async fn test_second_start_fails_while_running() {
    let docs = TestDocs::with_files(&[("a.md", "first"), ("b.md", "second")]);
    let embedder = Arc::new(GatedEmbedder::new());
    let gate = embedder.gate.clone();

    let (services, _collection) = memory_services(test_config(), embedder);
    let name = unique_collection("busy");
    let orchestrator = services.orchestrator(Some(&name)).unwrap();

    let handle = orchestrator
        .start(StartRequest::new(docs.path(), true))
        .unwrap();
    wait_for_enumeration(&orchestrator, 2).await;
    let before = orchestrator.run_state();

    let second = orchestrator.start(StartRequest::new(docs.path(), false));
    assert!(matches!(second, Err(DocaError::AlreadyRunning(ref c)) if *c == name));

    // Another orchestrator over the same collection is refused too
    let other = services.orchestrator(Some(&name)).unwrap();
    assert!(matches!(
        other.start(StartRequest::new(docs.path(), true)),
        Err(DocaError::AlreadyRunning(_))
    ));

    // The active run is untouched
    assert_eq!(orchestrator.phase(), RunPhase::Running);
    assert_eq!(orchestrator.run_state(), before);

    gate.add_permits(16);
    let summary = handle.wait().await.unwrap();
    assert_eq!(summary.total_files, 2);
    assert_eq!(summary.error_files, 0);

    // The slot is free again once the run ends
    other
        .run(StartRequest::new(docs.path(), true))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_runs_on_different_collections_are_independent() {
    let docs = TestDocs::with_files(&[("a.md", "first")]);
    let embedder = Arc::new(GatedEmbedder::new());
    let gate = embedder.gate.clone();

    let (blocked_services, _collection) = memory_services(test_config(), embedder);
    let blocked = blocked_services
        .orchestrator(Some(&unique_collection("blocked")))
        .unwrap();
    let handle = blocked
        .start(StartRequest::new(docs.path(), true))
        .unwrap();
    wait_for_enumeration(&blocked, 1).await;

    let (free_services, free_collection) = memory_services(test_config(), hash_embedder());
    let free = free_services
        .orchestrator(Some(&unique_collection("free")))
        .unwrap();
    let summary = free
        .run(StartRequest::new(docs.path(), true))
        .await
        .unwrap();
    assert_eq!(summary.total_chunks, 1);
    assert_eq!(free_collection.len(), 1);
    assert_eq!(blocked.phase(), RunPhase::Running);

    gate.add_permits(16);
    handle.wait().await.unwrap();
    assert_eq!(blocked.phase(), RunPhase::Completed);
}

#[tokio::test]
async fn test_cancel_stops_before_next_file() {
    let docs = TestDocs::with_files(&[("a.md", "first"), ("b.md", "second"), ("c.md", "third")]);
    let embedder = Arc::new(GatedEmbedder::new());
    let gate = embedder.gate.clone();

    let (services, collection) = memory_services(test_config(), embedder);
    let orchestrator = services
        .orchestrator(Some(&unique_collection("cancel")))
        .unwrap();

    let mut handle = orchestrator
        .start(StartRequest::new(docs.path(), true))
        .unwrap();
    let mut observer = handle.events();
    wait_for_enumeration(&orchestrator, 3).await;

    // The first file is blocked inside the embedder; it finishes, then the run stops
    handle.cancel();
    gate.add_permits(16);

    let result = handle.wait().await;
    let events = observer.until_terminal().await;

    assert!(matches!(result, Err(DocaError::Cancelled)));
    assert_eq!(orchestrator.phase(), RunPhase::Failed);
    assert_eq!(count_events(&events, "indexing_progress"), 1);
    assert_eq!(collection.len(), 1);
    assert!(matches!(
        events.last(),
        Some(ProgressEvent::IndexingError { file_path: None, .. })
    ));
    assert_eq!(orchestrator.run_state().current_file, 1);
}

#[tokio::test]
async fn test_late_observer_sees_only_later_events() {
    let docs = TestDocs::with_files(&[("a.md", "first"), ("b.md", "second")]);
    let embedder = Arc::new(GatedEmbedder::new());
    let gate = embedder.gate.clone();

    let (services, _collection) = memory_services(test_config(), embedder);
    let orchestrator = services
        .orchestrator(Some(&unique_collection("late")))
        .unwrap();

    let handle = orchestrator
        .start(StartRequest::new(docs.path(), true))
        .unwrap();
    wait_for_enumeration(&orchestrator, 2).await;

    let mut late = handle.subscribe();
    gate.add_permits(16);
    handle.wait().await.unwrap();

    let events = late.until_terminal().await;
    assert_eq!(count_events(&events, "indexing_started"), 0);
    assert_eq!(count_events(&events, "indexing_progress"), 2);
    assert_eq!(events.last().map(|e| e.name()), Some("indexing_completed"));
}

#[tokio::test]
async fn test_concurrent_collections_on_one_services() {
    let held = TestDocs::with_files(&[("held.md", "HOLD until released")]);
    let free = TestDocs::with_files(&[("free.md", "indexed straight away")]);
    let embedder = Arc::new(GatedEmbedder::for_marker("HOLD"));
    let gate = embedder.gate.clone();

    let (services, collection) = memory_services(test_config(), embedder);
    let held_name = unique_collection("held");
    let free_name = unique_collection("free");
    let held_run = services.orchestrator(Some(&held_name)).unwrap();
    let free_run = services.orchestrator(Some(&free_name)).unwrap();

    let mut handle = held_run
        .start(StartRequest::new(held.path(), true))
        .unwrap();
    let mut held_events = handle.events();
    wait_for_enumeration(&held_run, 1).await;

    let (result, free_events) =
        run_with_events(&free_run, StartRequest::new(free.path(), true)).await;
    assert_eq!(result.unwrap().total_chunks, 1);

    gate.add_permits(16);
    assert_eq!(handle.wait().await.unwrap().total_chunks, 1);
    let held_events = held_events.until_terminal().await;

    assert_eq!(
        collection.collection_ids(&held_name),
        vec![format!("{}#0", held.document_id("held.md"))]
    );
    assert_eq!(
        collection.collection_ids(&free_name),
        vec![format!("{}#0", free.document_id("free.md"))]
    );

    // Each observer sees only its own run
    for (events, docs) in [(&held_events, &held), (&free_events, &free)] {
        assert_eq!(count_events(events, "indexing_started"), 1);
        assert_eq!(count_events(events, "indexing_progress"), 1);
        assert!(matches!(
            events.first(),
            Some(ProgressEvent::IndexingStarted { directory, .. })
                if *directory == docs.path().display().to_string()
        ));
        assert_eq!(events.last().map(|e| e.name()), Some("indexing_completed"));
    }
}

#[tokio::test]
async fn test_panicking_run_ends_failed() {
    let docs = TestDocs::with_files(&[("a.md", "CRASH right here")]);
    let name = unique_collection("panic");

    let (services, _collection) =
        memory_services(test_config(), Arc::new(PanickingEmbedder::new("CRASH")));
    let orchestrator = services.orchestrator(Some(&name)).unwrap();

    let (result, events) =
        run_with_events(&orchestrator, StartRequest::new(docs.path(), true)).await;

    assert!(matches!(result, Err(DocaError::TaskFailed(_))));
    assert_eq!(orchestrator.phase(), RunPhase::Failed);
    assert!(matches!(
        events.last(),
        Some(ProgressEvent::IndexingError { file_path: None, .. })
    ));

    // The collection's slot was released
    let (services, collection) = memory_services(test_config(), hash_embedder());
    services
        .orchestrator(Some(&name))
        .unwrap()
        .run(StartRequest::new(docs.path(), true))
        .await
        .unwrap();
    assert_eq!(collection.len(), 1);
}

#[tokio::test]
async fn test_events_after_taking_the_initial_observer() {
    let docs = TestDocs::with_files(&[("a.md", "first")]);
    let (services, _collection) = memory_services(test_config(), hash_embedder());
    let orchestrator = services
        .orchestrator(Some(&unique_collection("observers")))
        .unwrap();

    let mut handle = orchestrator
        .start(StartRequest::new(docs.path(), true))
        .unwrap();
    let mut first = handle.events();
    let mut second = handle.events();
    handle.wait().await.unwrap();

    let events = first.until_terminal().await;
    assert_eq!(events.first().map(|e| e.name()), Some("indexing_started"));
    assert_eq!(events.last().map(|e| e.name()), Some("indexing_completed"));

    // A later subscription only sees the tail of the run
    let later = second.until_terminal().await;
    assert_eq!(&events[events.len() - later.len()..], later.as_slice());
}

#[tokio::test]
async fn test_recreate_starts_from_an_empty_collection() {
    let docs = TestDocs::with_files(&[("a.md", "first"), ("b.md", "second")]);
    let (services, collection) = memory_services(test_config(), hash_embedder());
    let name = unique_collection("recreate");
    let orchestrator = services.orchestrator(Some(&name)).unwrap();

    orchestrator
        .run(StartRequest::new(docs.path(), true))
        .await
        .unwrap();
    assert_eq!(collection.collection_ids(&name).len(), 2);

    let single = TestDocs::with_files(&[("c.md", "third")]);
    orchestrator
        .run(StartRequest::new(single.path(), true).with_recreate(true))
        .await
        .unwrap();

    assert_eq!(
        collection.collection_ids(&name),
        vec![format!("{}#0", single.document_id("c.md"))]
    );
}
