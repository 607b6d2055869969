//! Map phase: split each vertex's previous rank across its outbound edges.

use crate::common::{Iteration, Result, Role, WorkerMetrics};
use crate::engine::recheck::Recheck;
use crate::engine::WorkerSettings;
use crate::graph::Graph;
use crate::store::{CoordinationStore, RankRecord};
use rand::seq::SliceRandom;
use std::sync::Arc;
use tracing::{debug, info};

pub struct Mapper {
    store: Arc<dyn CoordinationStore>,
    graph: Arc<Graph>,
    settings: WorkerSettings,
    metrics: Arc<WorkerMetrics>,
}

impl Mapper {
    pub fn new(store: Arc<dyn CoordinationStore>, graph: Arc<Graph>, settings: WorkerSettings) -> Self {
        Self {
            store,
            graph,
            settings,
            metrics: Arc::new(WorkerMetrics::new(Role::Mapper)),
        }
    }

    pub fn metrics(&self) -> Arc<WorkerMetrics> {
        self.metrics.clone()
    }

    /// Map iterations as they become ready until every iteration is mapped.
    pub async fn run(&self) -> Result<()> {
        info!("A mapper is ready");
        while !self.store.all_mapped().await? {
            let Some(iteration) = self.store.next_ready().await? else {
                debug!("A mapper is waiting for an iteration to be ready");
                tokio::time::sleep(self.settings.poll_interval).await;
                continue;
            };
            self.map(iteration).await?;
        }
        info!("A mapper finished normally");
        Ok(())
    }

    pub(crate) async fn map(&self, iteration: Iteration) -> Result<()> {
        info!("Start of mapping iteration # {}", iteration);
        let mut ranks = self.store.get_ranks(iteration - 1).await?;
        ranks.shuffle(&mut rand::thread_rng());

        let mut already_mapped = self.store.get_vote_sources(iteration).await?;
        let mut recheck = Recheck::new(self.settings.recheck_interval);

        for rank in &ranks {
            if recheck.due() {
                if self.store.is_mapped(iteration).await? {
                    info!("Iteration # {} was mapped by another worker", iteration);
                    self.metrics.record_iteration_abandoned();
                    return Ok(());
                }
                already_mapped = self.store.get_vote_sources(iteration).await?;
            }

            if already_mapped.contains(&rank.vertex) {
                self.metrics.record_skipped();
                continue;
            }
            self.map_vertex(iteration, rank).await?;
        }

        if self.store.set_mapped(iteration).await? {
            info!("Iteration # {} was marked as mapped", iteration);
        }
        self.metrics.record_iteration_completed();
        info!("End of mapping iteration # {}", iteration);
        Ok(())
    }

    async fn map_vertex(&self, iteration: Iteration, rank: &RankRecord) -> Result<()> {
        let targets = self.graph.successors(rank.vertex);
        if targets.is_empty() {
            self.metrics.record_sink();
            return Ok(());
        }

        let vote = rank.value.div_truncate(targets.len() as u64);
        match self
            .store
            .insert_votes(rank.vertex, &targets, iteration, &vote)
            .await
        {
            Ok(()) => self.metrics.record_written(targets.len() as u64),
            Err(e) if e.is_already_exists() => self.metrics.record_collision(),
            Err(e) => return Err(e),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Probability;
    use crate::engine::Initializer;
    use crate::store::MemoryStore;
    use std::collections::HashMap;
    use std::time::Duration;

    async fn seeded(graph: &Graph, limit: Iteration) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        Initializer::new(store.clone(), limit)
            .init(graph)
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_votes_split_rank_evenly() {
        let graph = Arc::new(Graph::from_edges([(1, 2), (1, 3), (2, 3), (3, 1)]));
        let store = seeded(&graph, 1).await;
        let mapper = Mapper::new(store.clone(), graph, WorkerSettings::fast());

        mapper.map(1).await.unwrap();

        let votes = store.get_votes(1).await.unwrap();
        assert_eq!(votes.len(), 4);
        let third = Probability::uniform(3);
        for vote in &votes {
            let expected = if vote.source == 1 {
                third.div_truncate(2)
            } else {
                third.clone()
            };
            assert_eq!(vote.value, expected, "vote {} -> {}", vote.source, vote.target);
        }
        assert!(store.is_mapped(1).await.unwrap());
        assert_eq!(mapper.metrics().snapshot().records_written, 4);
    }

    #[tokio::test]
    async fn test_sinks_cast_no_votes() {
        let mut graph = Graph::from_edges([(1, 2), (2, 1)]);
        graph.add_vertex(4);
        let graph = Arc::new(graph);
        let store = seeded(&graph, 1).await;
        let mapper = Mapper::new(store.clone(), graph, WorkerSettings::fast());

        mapper.map(1).await.unwrap();

        assert!(!store.get_vote_sources(1).await.unwrap().contains(&4));
        assert_eq!(mapper.metrics().snapshot().sinks, 1);
    }

    #[tokio::test]
    async fn test_vote_mass_is_conserved() {
        let graph = Arc::new(Graph::from_edges([
            (1, 2),
            (1, 3),
            (1, 4),
            (2, 3),
            (3, 1),
            (4, 1),
            (4, 2),
        ]));
        let store = seeded(&graph, 1).await;
        Mapper::new(store.clone(), graph.clone(), WorkerSettings::fast())
            .map(1)
            .await
            .unwrap();

        let mut sent: HashMap<i64, Vec<Probability>> = HashMap::new();
        for vote in store.get_votes(1).await.unwrap() {
            sent.entry(vote.source).or_default().push(vote.value);
        }
        for rank in store.get_ranks(0).await.unwrap() {
            let votes = &sent[&rank.vertex];
            let total: Probability = votes.iter().sum();
            let slack = Probability::ulp().mul_truncate(&(votes.len() as u64).into());
            assert!(total <= rank.value);
            assert!(rank.value.clone() <= total + slack);
        }
    }

    #[tokio::test]
    async fn test_peer_votes_are_skipped() {
        let graph = Arc::new(Graph::from_edges([(1, 2), (2, 1)]));
        let store = seeded(&graph, 1).await;
        let peer_vote = "0.1".parse::<Probability>().unwrap();
        store.insert_votes(1, &[2], 1, &peer_vote).await.unwrap();

        let mapper = Mapper::new(store.clone(), graph, WorkerSettings::fast());
        mapper.map(1).await.unwrap();

        let votes = store.get_votes(1).await.unwrap();
        let from_one: Vec<_> = votes.iter().filter(|v| v.source == 1).collect();
        assert_eq!(from_one.len(), 1);
        assert_eq!(from_one[0].value, peer_vote);
        assert_eq!(mapper.metrics().snapshot().vertices_skipped, 1);
    }

    #[tokio::test]
    async fn test_abandons_iteration_mapped_by_peer() {
        let graph = Arc::new(Graph::from_edges([(1, 2), (2, 3), (3, 1)]));
        let store = seeded(&graph, 2).await;
        assert!(store.set_mapped(1).await.unwrap());

        let settings = WorkerSettings {
            recheck_interval: Duration::ZERO,
            ..WorkerSettings::fast()
        };
        let mapper = Mapper::new(store.clone(), graph, settings);
        mapper.map(1).await.unwrap();

        assert!(store.get_votes(1).await.unwrap().is_empty());
        let snapshot = mapper.metrics().snapshot();
        assert_eq!(snapshot.iterations_abandoned, 1);
        assert_eq!(snapshot.iterations_completed, 0);
        assert_eq!(snapshot.records_written, 0);
    }

    #[tokio::test]
    async fn test_run_stops_when_everything_is_mapped() {
        let graph = Arc::new(Graph::from_edges([(1, 2), (2, 1)]));
        let store = seeded(&graph, 1).await;
        let mapper = Mapper::new(store.clone(), graph, WorkerSettings::fast());

        mapper.run().await.unwrap();
        assert!(store.all_mapped().await.unwrap());
        assert_eq!(mapper.metrics().snapshot().iterations_completed, 1);
    }
}
