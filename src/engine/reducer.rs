//! Reduce phase: fold inbound votes into new ranks and unlock the next round.

use crate::common::{DampingFactor, Iteration, Probability, Result, Role, Vertex, WorkerMetrics};
use crate::engine::recheck::Recheck;
use crate::engine::WorkerSettings;
use crate::graph::Graph;
use crate::store::CoordinationStore;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

pub struct Reducer {
    store: Arc<dyn CoordinationStore>,
    graph: Arc<Graph>,
    damping: DampingFactor,
    settings: WorkerSettings,
    metrics: Arc<WorkerMetrics>,
}

impl Reducer {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        graph: Arc<Graph>,
        damping: DampingFactor,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            store,
            graph,
            damping,
            settings,
            metrics: Arc::new(WorkerMetrics::new(Role::Reducer)),
        }
    }

    pub fn metrics(&self) -> Arc<WorkerMetrics> {
        self.metrics.clone()
    }

    /// Reduce iterations as they get mapped until every iteration is reduced.
    pub async fn run(&self) -> Result<()> {
        let sink_probability = self.damping.sink_probability(self.graph.vertex_count());
        info!("A reducer is ready, sink probability {}", sink_probability);

        while !self.store.all_reduced().await? {
            let Some(iteration) = self.store.next_mapped().await? else {
                debug!("A reducer is waiting for an iteration to be mapped");
                tokio::time::sleep(self.settings.poll_interval).await;
                continue;
            };
            self.reduce(iteration, &sink_probability).await?;
        }
        info!("A reducer finished normally");
        Ok(())
    }

    async fn reduce(&self, iteration: Iteration, sink_probability: &Probability) -> Result<()> {
        info!("Start of reducing iteration # {}", iteration);
        let mut vertices: Vec<Vertex> = self.graph.vertices().collect();
        vertices.shuffle(&mut rand::thread_rng());

        let inbound = self.inbound_votes(iteration).await?;
        let mut already_reduced = self.store.get_ranked_vertices(iteration).await?;
        let mut recheck = Recheck::new(self.settings.recheck_interval);
        let no_votes = Probability::zero();

        for vertex in vertices {
            if recheck.due() {
                if self.store.is_reduced(iteration).await? {
                    info!("Iteration # {} was reduced by another worker", iteration);
                    self.metrics.record_iteration_abandoned();
                    return Ok(());
                }
                already_reduced = self.store.get_ranked_vertices(iteration).await?;
            }

            if already_reduced.contains(&vertex) {
                self.metrics.record_skipped();
                continue;
            }

            let votes = inbound.get(&vertex).unwrap_or(&no_votes);
            let rank = self.damping.apply(votes, sink_probability);
            match self.store.insert_rank(vertex, iteration, &rank).await {
                Ok(()) => self.metrics.record_written(1),
                Err(e) if e.is_already_exists() => self.metrics.record_collision(),
                Err(e) => return Err(e),
            }
        }

        if self.store.set_reduced(iteration).await? {
            info!("Iteration # {} was marked as reduced", iteration);
        }
        if let Some(next) = next_iteration(iteration) {
            if self.store.set_ready(next).await? {
                info!("Iteration # {} was marked as ready", next);
            }
        }
        self.metrics.record_iteration_completed();
        info!("End of reducing iteration # {}", iteration);
        Ok(())
    }

    /// Sum of vote values per target vertex
    async fn inbound_votes(&self, iteration: Iteration) -> Result<HashMap<Vertex, Probability>> {
        let mut inbound: HashMap<Vertex, Probability> = HashMap::new();
        for vote in self.store.get_votes(iteration).await? {
            let total = inbound.entry(vote.target).or_default();
            *total = std::mem::take(total) + vote.value;
        }
        Ok(inbound)
    }
}

fn next_iteration(iteration: Iteration) -> Option<Iteration> {
    iteration.checked_add(1)
}
