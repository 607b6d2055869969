//! Larger random graph with concurrent workers

#![cfg(feature = "heavy-tests")]

use minirank::common::DampingFactor;
use minirank::engine::{Initializer, Mapper, Reducer, WorkerSettings};
use minirank::ops::verify_store;
use minirank::store::{CoordinationStore, MemoryStore};
use minirank::Graph;
use rand::Rng;
use std::sync::Arc;
use std::time::Instant;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn heavy_random_graph() {
    let mut rng = rand::thread_rng();
    let vertices = 2_000i64;
    let mut graph = Graph::new();
    for vertex in 0..vertices {
        graph.add_vertex(vertex);
        for _ in 0..rng.gen_range(0..8) {
            graph.add_edge(vertex, rng.gen_range(0..vertices));
        }
    }
    let graph = Arc::new(graph);
    let damping = DampingFactor::from_f64(0.85).unwrap();

    let store = Arc::new(MemoryStore::new());
    Initializer::new(store.clone(), 5).init(&graph).await.unwrap();

    let start = Instant::now();
    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..3 {
        let mapper = Mapper::new(store.clone(), graph.clone(), WorkerSettings::fast());
        tasks.spawn(async move { mapper.run().await });
        let reducer = Reducer::new(store.clone(), graph.clone(), damping.clone(), WorkerSettings::fast());
        tasks.spawn(async move { reducer.run().await });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap().unwrap();
    }
    println!("5 iterations over {} vertices in {:?}", vertices, start.elapsed());

    assert!(store.all_reduced().await.unwrap());
    let report = verify_store(store.as_ref()).await.unwrap();
    assert!(report.is_healthy(), "{:?}", report);
}
