//! Store seeding
//!
//! Safe to run from any number of processes at once: every step is either
//! guarded by a count check or absorbed by write-once semantics.

use crate::common::{Error, Iteration, Probability, Result};
use crate::graph::Graph;
use crate::store::CoordinationStore;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct Initializer {
    store: Arc<dyn CoordinationStore>,
    iteration_limit: Iteration,
}

impl Initializer {
    pub fn new(store: Arc<dyn CoordinationStore>, iteration_limit: Iteration) -> Self {
        Self {
            store,
            iteration_limit,
        }
    }

    /// Create iteration slots, seed the uniform ranks and unlock iteration 1.
    pub async fn init(&self, graph: &Graph) -> Result<()> {
        if self.store.count_iteration_rows().await? == 0 {
            let inserted = self
                .store
                .insert_iteration_slots(self.iteration_limit)
                .await?;
            if inserted != u64::from(self.iteration_limit) {
                warn!(
                    "Mismatch between inserted iteration rows ({}) and limit ({})",
                    inserted, self.iteration_limit
                );
            }
        } else if self.store.all_reduced().await? {
            return Err(Error::NoWorkLeft);
        }

        if self.store.count_rank_rows(0).await? == 0 {
            self.seed_ranks(graph).await?;
        }

        if self.store.set_ready(1).await? {
            info!("Iteration # 1 was marked as ready");
        }
        Ok(())
    }

    async fn seed_ranks(&self, graph: &Graph) -> Result<()> {
        let cardinality = graph.vertex_count();
        let value = Probability::uniform(cardinality);
        if value.is_zero() {
            error!("Initial page rank is zero, graph cardinality: {}", cardinality);
            return Err(Error::ZeroInitialRank { cardinality });
        }

        let vertices: Vec<_> = graph.vertices().collect();
        match self.store.insert_initial_ranks(&vertices, &value).await {
            Ok(inserted) if inserted == cardinality as u64 => {
                info!("Seeded {} initial ranks of {}", inserted, value);
            }
            Ok(0) => debug!("Initial ranks were seeded by another worker"),
            Ok(inserted) => warn!(
                "Mismatch between inserted initial ranks ({}) and vertices ({})",
                inserted, cardinality
            ),
            Err(e) if e.is_already_exists() => {
                debug!("Initial ranks were seeded by another worker")
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }
}
