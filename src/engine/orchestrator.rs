//! Per-process entry point: seed the store, then host the configured roles.

use crate::common::{
    Config, DampingFactor, Error, Iteration, MetricsSnapshot, Result, RoleConfig,
};
use crate::engine::{Initializer, Mapper, Reducer, WorkerSettings};
use crate::graph::Graph;
use crate::store::CoordinationStore;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

/// Outcome of a successful run in this process
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub worker_id: String,
    pub mapper: Option<MetricsSnapshot>,
    pub reducer: Option<MetricsSnapshot>,
}

pub struct Orchestrator {
    store: Arc<dyn CoordinationStore>,
    graph: Arc<Graph>,
    iteration_limit: Iteration,
    damping: DampingFactor,
    roles: RoleConfig,
    settings: WorkerSettings,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        graph: Arc<Graph>,
        iteration_limit: Iteration,
        damping: DampingFactor,
    ) -> Self {
        Self {
            store,
            graph,
            iteration_limit,
            damping,
            roles: RoleConfig::default(),
            settings: WorkerSettings::default(),
        }
    }

    pub fn from_config(
        store: Arc<dyn CoordinationStore>,
        graph: Arc<Graph>,
        config: &Config,
    ) -> Result<Self> {
        Ok(
            Self::new(store, graph, config.graph.iteration_limit, config.damping_factor()?)
                .with_roles(config.roles)
                .with_settings(WorkerSettings::from(&config.worker)),
        )
    }

    pub fn with_roles(mut self, roles: RoleConfig) -> Self {
        self.roles = roles;
        self
    }

    pub fn with_settings(mut self, settings: WorkerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Initialize the store and run the enabled roles to completion.
    pub async fn run(&self) -> Result<RunSummary> {
        let worker_id = Uuid::new_v4().to_string();
        let span = info_span!("worker", id = %worker_id);
        self.run_roles(worker_id).instrument(span).await
    }

    async fn run_roles(&self, worker_id: String) -> Result<RunSummary> {
        info!(
            "Starting with {} vertices, {} edges, {} iterations",
            self.graph.vertex_count(),
            self.graph.edge_count(),
            self.iteration_limit
        );
        Initializer::new(self.store.clone(), self.iteration_limit)
            .init(&self.graph)
            .await?;

        let mapper = self
            .roles
            .mapper
            .then(|| Mapper::new(self.store.clone(), self.graph.clone(), self.settings));
        let reducer = self.roles.reducer.then(|| {
            Reducer::new(
                self.store.clone(),
                self.graph.clone(),
                self.damping.clone(),
                self.settings,
            )
        });
        let mapper_metrics = mapper.as_ref().map(Mapper::metrics);
        let reducer_metrics = reducer.as_ref().map(Reducer::metrics);

        match (mapper, reducer) {
            (Some(mapper), Some(reducer)) => {
                let mapper = tokio::spawn(
                    async move { mapper.run().await }.instrument(info_span!("mapper")),
                );
                let reducer = tokio::spawn(
                    async move { reducer.run().await }.instrument(info_span!("reducer")),
                );
                race(mapper, reducer).await?;
            }
            (Some(mapper), None) => mapper.run().instrument(info_span!("mapper")).await?,
            (None, Some(reducer)) => reducer.run().instrument(info_span!("reducer")).await?,
            (None, None) => {
                error!("Neither mapper nor reducer is enabled");
                return Err(Error::NoRoleEnabled);
            }
        }

        let summary = RunSummary {
            worker_id,
            mapper: mapper_metrics.map(|m| m.snapshot()),
            reducer: reducer_metrics.map(|m| m.snapshot()),
        };
        for snapshot in summary.mapper.iter().chain(summary.reducer.iter()) {
            snapshot.log();
        }
        info!("All roles finished normally");
        Ok(summary)
    }
}

fn outcome(joined: std::result::Result<Result<()>, JoinError>) -> Result<()> {
    joined?
}

/// Wait on both roles. The first failure cancels the sibling; a reducer that
/// finishes while the mapper is still running is a protocol violation.
pub(crate) async fn race(
    mut mapper: JoinHandle<Result<()>>,
    mut reducer: JoinHandle<Result<()>>,
) -> Result<()> {
    tokio::select! {
        biased;
        joined = &mut mapper => match outcome(joined) {
            Ok(()) => {
                info!("Mapper finished, waiting for the reducer");
                outcome(reducer.await)
            }
            Err(e) => {
                error!("Mapper failed, cancelling the reducer: {}", e);
                reducer.abort();
                Err(e)
            }
        },
        joined = &mut reducer => {
            mapper.abort();
            match outcome(joined) {
                Ok(()) => {
                    error!("Reducer finished before the mapper");
                    Err(Error::ReducerOutpacedMapper)
                }
                Err(e) => {
                    error!("Reducer failed, cancelling the mapper: {}", e);
                    Err(e)
                }
            }
        }
    }
}
