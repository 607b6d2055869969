//! A full run leaves nothing to claim

use minirank::common::{DampingFactor, Error};
use minirank::engine::WorkerSettings;
use minirank::store::{CoordinationStore, MemoryStore};
use minirank::{Graph, Orchestrator};
use std::sync::Arc;

fn damping() -> DampingFactor {
    DampingFactor::from_f64(0.85).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_all_iterations_complete() {
    let store = Arc::new(MemoryStore::new());
    let graph = Arc::new(Graph::from_edges([(1, 2), (2, 1), (2, 3)]));
    Orchestrator::new(store.clone(), graph, 5, damping())
        .with_settings(WorkerSettings::fast())
        .run()
        .await
        .unwrap();

    assert!(store.all_mapped().await.unwrap());
    assert!(store.all_reduced().await.unwrap());
    assert_eq!(store.next_ready().await.unwrap(), None);
    assert_eq!(store.next_mapped().await.unwrap(), None);

    let states = store.list_iterations().await.unwrap();
    assert_eq!(states.len(), 5);
    assert!(states.iter().all(|s| s.ready && s.mapped && s.reduced));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_flags_never_revert() {
    let store = Arc::new(MemoryStore::new());
    let graph = Arc::new(Graph::from_edges([(1, 2), (2, 1)]));
    Orchestrator::new(store.clone(), graph, 2, damping())
        .with_settings(WorkerSettings::fast())
        .run()
        .await
        .unwrap();

    for iteration in 1..=2 {
        assert!(!store.set_ready(iteration).await.unwrap());
        assert!(!store.set_mapped(iteration).await.unwrap());
        assert!(!store.set_reduced(iteration).await.unwrap());
        assert!(store.is_mapped(iteration).await.unwrap());
        assert!(store.is_reduced(iteration).await.unwrap());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_late_worker_finds_no_work() {
    let store = Arc::new(MemoryStore::new());
    let graph = Arc::new(Graph::from_edges([(1, 2), (2, 1)]));
    Orchestrator::new(store.clone(), graph.clone(), 1, damping())
        .with_settings(WorkerSettings::fast())
        .run()
        .await
        .unwrap();

    let late = Orchestrator::new(store, graph, 1, damping()).with_settings(WorkerSettings::fast());
    assert!(matches!(late.run().await, Err(Error::NoWorkLeft)));
}
