//! RocksDB-backed runs survive restarts

use minirank::common::{DampingFactor, Error, Iteration, RoleConfig};
use minirank::engine::WorkerSettings;
use minirank::store::{CoordinationStore, MemoryStore, RocksStore};
use minirank::{Graph, Orchestrator};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const ITERATIONS: Iteration = 4;

fn graph() -> Arc<Graph> {
    Arc::new(Graph::from_edges([(1, 2), (1, 3), (2, 3), (3, 1), (3, 4)]))
}

fn damping() -> DampingFactor {
    DampingFactor::from_f64(0.85).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_completed_run_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store");

    {
        let store = Arc::new(RocksStore::open(&path).unwrap());
        Orchestrator::new(store.clone(), graph(), ITERATIONS, damping())
            .with_settings(WorkerSettings::fast())
            .run()
            .await
            .unwrap();
        store.flush().unwrap();
    }

    let store = Arc::new(RocksStore::open(&path).unwrap());
    assert!(store.all_reduced().await.unwrap());
    assert_eq!(store.count_rank_rows(ITERATIONS).await.unwrap(), 4);

    let again = Orchestrator::new(store, graph(), ITERATIONS, damping())
        .with_settings(WorkerSettings::fast());
    assert!(matches!(again.run().await, Err(Error::NoWorkLeft)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_interrupted_run_resumes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store");

    // A mapper-only process maps iteration 1, then waits forever for a reducer.
    {
        let store = Arc::new(RocksStore::open(&path).unwrap());
        let mapper_only = Orchestrator::new(store.clone(), graph(), ITERATIONS, damping())
            .with_roles(RoleConfig {
                mapper: true,
                reducer: false,
            })
            .with_settings(WorkerSettings::fast());
        let interrupted = tokio::time::timeout(Duration::from_millis(200), mapper_only.run()).await;
        assert!(interrupted.is_err());
        assert!(store.is_mapped(1).await.unwrap());
        assert!(!store.is_reduced(1).await.unwrap());
    }

    let store = Arc::new(RocksStore::open(&path).unwrap());
    Orchestrator::new(store.clone(), graph(), ITERATIONS, damping())
        .with_settings(WorkerSettings::fast())
        .run()
        .await
        .unwrap();

    let reference = Arc::new(MemoryStore::new());
    Orchestrator::new(reference.clone(), graph(), ITERATIONS, damping())
        .with_settings(WorkerSettings::fast())
        .run()
        .await
        .unwrap();

    for iteration in 0..=ITERATIONS {
        let mut resumed = store.get_ranks(iteration).await.unwrap();
        let mut expected = reference.get_ranks(iteration).await.unwrap();
        resumed.sort_by_key(|r| r.vertex);
        expected.sort_by_key(|r| r.vertex);
        assert_eq!(resumed, expected, "iteration {}", iteration);
    }
}

#[tokio::test]
async fn test_read_only_inspection() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store");
    let writer = RocksStore::open(&path).unwrap();
    writer.insert_iteration_slots(3).await.unwrap();
    writer.set_ready(1).await.unwrap();
    writer.flush().unwrap();

    let reader = RocksStore::open_read_only(&path).unwrap();
    assert_eq!(reader.count_iteration_rows().await.unwrap(), 3);
    assert_eq!(reader.next_ready().await.unwrap(), Some(1));
}
