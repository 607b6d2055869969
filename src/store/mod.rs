//! Coordination store
//!
//! The store is the only channel between workers. Three record sets live in it:
//!
//! ```text
//! iteration  (iteration PK)              ready / mapped / reduced flags
//! vote       (source, target, iteration) outbound rank share
//! rank       (vertex, iteration)         rank after reducing an iteration
//! ```
//!
//! Every mutating primitive is a single atomic operation: a conditional flag
//! update, a unique-key insert or a unique-key batch insert. Write-once
//! collisions surface as [`Error::AlreadyExists`](crate::Error::AlreadyExists)
//! and never as a generic failure.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod rocks;

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;
pub use rocks::RocksStore;

use crate::common::{Error, Iteration, Probability, Result, StoreConfig, Vertex};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// One row of the iteration table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationState {
    pub iteration: Iteration,
    pub ready: bool,
    pub mapped: bool,
    pub reduced: bool,
}

impl IterationState {
    pub fn new(iteration: Iteration) -> Self {
        Self {
            iteration,
            ready: false,
            mapped: false,
            reduced: false,
        }
    }

    /// Claimable by a mapper
    pub fn is_map_ready(&self) -> bool {
        self.ready && !self.mapped && !self.reduced
    }

    /// Claimable by a reducer
    pub fn is_reduce_ready(&self) -> bool {
        self.ready && self.mapped && !self.reduced
    }
}

/// Rank of one vertex at one iteration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankRecord {
    pub vertex: Vertex,
    pub value: Probability,
}

/// Share of a source's rank sent to one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub source: Vertex,
    pub target: Vertex,
    pub value: Probability,
}

/// Flag of the iteration state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    Ready,
    Mapped,
    Reduced,
}

impl Flag {
    pub fn get(self, state: &IterationState) -> bool {
        match self {
            Flag::Ready => state.ready,
            Flag::Mapped => state.mapped,
            Flag::Reduced => state.reduced,
        }
    }

    /// Set the flag, returning whether it changed.
    pub fn set(self, state: &mut IterationState) -> bool {
        let slot = match self {
            Flag::Ready => &mut state.ready,
            Flag::Mapped => &mut state.mapped,
            Flag::Reduced => &mut state.reduced,
        };
        let transitioned = !*slot;
        *slot = true;
        transitioned
    }
}

#[async_trait]
pub trait CoordinationStore: Send + Sync {
    // === Iteration table ===

    async fn count_iteration_rows(&self) -> Result<u64>;

    /// Create rows `1..=limit` with all flags false, skipping existing rows.
    /// Returns the number of rows this call created.
    async fn insert_iteration_slots(&self, limit: Iteration) -> Result<u64>;

    /// `ready: false -> true`. True iff this call made the transition; false
    /// if the flag was already set or the row does not exist.
    async fn set_ready(&self, iteration: Iteration) -> Result<bool>;

    async fn set_mapped(&self, iteration: Iteration) -> Result<bool>;

    async fn set_reduced(&self, iteration: Iteration) -> Result<bool>;

    async fn is_mapped(&self, iteration: Iteration) -> Result<bool>;

    async fn is_reduced(&self, iteration: Iteration) -> Result<bool>;

    /// No row has `mapped = false`
    async fn all_mapped(&self) -> Result<bool>;

    /// No row has `reduced = false`
    async fn all_reduced(&self) -> Result<bool>;

    /// Lowest iteration with `ready && !mapped && !reduced`
    async fn next_ready(&self) -> Result<Option<Iteration>>;

    /// Lowest iteration with `ready && mapped && !reduced`
    async fn next_mapped(&self) -> Result<Option<Iteration>>;

    async fn list_iterations(&self) -> Result<Vec<IterationState>>;

    // === Rank table ===

    async fn count_rank_rows(&self, iteration: Iteration) -> Result<u64>;

    /// Seed iteration 0 with `value` for every vertex, skipping existing rows.
    /// Returns the number of rows this call created.
    async fn insert_initial_ranks(&self, vertices: &[Vertex], value: &Probability) -> Result<u64>;

    async fn get_ranks(&self, iteration: Iteration) -> Result<Vec<RankRecord>>;

    async fn get_ranked_vertices(&self, iteration: Iteration) -> Result<HashSet<Vertex>>;

    /// Write-once insert; `AlreadyExists` if a peer wrote it first.
    async fn insert_rank(&self, vertex: Vertex, iteration: Iteration, value: &Probability)
        -> Result<()>;

    // === Vote table ===

    async fn get_votes(&self, iteration: Iteration) -> Result<Vec<VoteRecord>>;

    async fn get_vote_sources(&self, iteration: Iteration) -> Result<HashSet<Vertex>>;

    /// All-or-nothing insert of one vote per target; `AlreadyExists` if any
    /// row of the batch is already present.
    async fn insert_votes(
        &self,
        source: Vertex,
        targets: &[Vertex],
        iteration: Iteration,
        value: &Probability,
    ) -> Result<()>;
}

/// Open the store described by `config`.
pub async fn open(config: &StoreConfig) -> Result<Arc<dyn CoordinationStore>> {
    match config {
        StoreConfig::Memory => {
            tracing::warn!("Using the in-memory store: state is lost on exit and not shared");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreConfig::Rocksdb { path } => {
            tracing::info!("Opening RocksDB store at {}", path.display());
            Ok(Arc::new(RocksStore::open(path)?))
        }
        #[cfg(feature = "postgres")]
        StoreConfig::Postgres {
            url,
            max_connections,
        } => {
            tracing::info!("Connecting to PostgreSQL store");
            Ok(Arc::new(PostgresStore::connect(url, *max_connections).await?))
        }
        #[cfg(not(feature = "postgres"))]
        StoreConfig::Postgres { .. } => Err(Error::InvalidConfig(
            "minirank was built without the `postgres` feature".into(),
        )),
    }
}

/// Open the store for inspection only. RocksDB is opened read-only so it
/// can be inspected while a worker holds the database lock.
pub async fn open_for_inspection(config: &StoreConfig) -> Result<Arc<dyn CoordinationStore>> {
    match config {
        StoreConfig::Rocksdb { path } => Ok(Arc::new(RocksStore::open_read_only(path)?)),
        StoreConfig::Memory => Err(Error::InvalidConfig(
            "the in-memory store cannot be inspected from another process".into(),
        )),
        other => open(other).await,
    }
}
