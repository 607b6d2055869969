//! In-memory coordination store
//!
//! One lock per table, held for the whole primitive, gives the same
//! atomicity as a single SQL statement. Only shared within one process.

use crate::common::{Error, Iteration, Probability, Result, Vertex};
use crate::store::{CoordinationStore, Flag, IterationState, RankRecord, VoteRecord};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

pub struct MemoryStore {
    iterations: Mutex<BTreeMap<Iteration, IterationState>>,
    ranks: Mutex<BTreeMap<(Iteration, Vertex), Probability>>,
    votes: Mutex<BTreeMap<(Iteration, Vertex, Vertex), Probability>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            iterations: Mutex::new(BTreeMap::new()),
            ranks: Mutex::new(BTreeMap::new()),
            votes: Mutex::new(BTreeMap::new()),
        }
    }

    fn lock<T>(table: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
        table
            .lock()
            .map_err(|_| Error::Internal("memory store lock poisoned".into()))
    }

    fn set_flag(&self, iteration: Iteration, flag: Flag) -> Result<bool> {
        let mut iterations = Self::lock(&self.iterations)?;
        Ok(iterations
            .get_mut(&iteration)
            .map(|state| flag.set(state))
            .unwrap_or(false))
    }

    fn get_flag(&self, iteration: Iteration, flag: Flag) -> Result<bool> {
        let iterations = Self::lock(&self.iterations)?;
        iterations
            .get(&iteration)
            .map(|state| flag.get(state))
            .ok_or(Error::UnknownIteration(iteration))
    }

    fn first_where(&self, predicate: impl Fn(&IterationState) -> bool) -> Result<Option<Iteration>> {
        let iterations = Self::lock(&self.iterations)?;
        Ok(iterations
            .values()
            .find(|state| predicate(*state))
            .map(|state| state.iteration))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn count_iteration_rows(&self) -> Result<u64> {
        Ok(Self::lock(&self.iterations)?.len() as u64)
    }

    async fn insert_iteration_slots(&self, limit: Iteration) -> Result<u64> {
        let mut iterations = Self::lock(&self.iterations)?;
        let mut inserted = 0;
        for iteration in 1..=limit {
            if !iterations.contains_key(&iteration) {
                iterations.insert(iteration, IterationState::new(iteration));
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn set_ready(&self, iteration: Iteration) -> Result<bool> {
        self.set_flag(iteration, Flag::Ready)
    }

    async fn set_mapped(&self, iteration: Iteration) -> Result<bool> {
        self.set_flag(iteration, Flag::Mapped)
    }

    async fn set_reduced(&self, iteration: Iteration) -> Result<bool> {
        self.set_flag(iteration, Flag::Reduced)
    }

    async fn is_mapped(&self, iteration: Iteration) -> Result<bool> {
        self.get_flag(iteration, Flag::Mapped)
    }

    async fn is_reduced(&self, iteration: Iteration) -> Result<bool> {
        self.get_flag(iteration, Flag::Reduced)
    }

    async fn all_mapped(&self) -> Result<bool> {
        Ok(Self::lock(&self.iterations)?.values().all(|s| s.mapped))
    }

    async fn all_reduced(&self) -> Result<bool> {
        Ok(Self::lock(&self.iterations)?.values().all(|s| s.reduced))
    }

    async fn next_ready(&self) -> Result<Option<Iteration>> {
        self.first_where(IterationState::is_map_ready)
    }

    async fn next_mapped(&self) -> Result<Option<Iteration>> {
        self.first_where(IterationState::is_reduce_ready)
    }

    async fn list_iterations(&self) -> Result<Vec<IterationState>> {
        Ok(Self::lock(&self.iterations)?.values().copied().collect())
    }

    async fn count_rank_rows(&self, iteration: Iteration) -> Result<u64> {
        let ranks = Self::lock(&self.ranks)?;
        Ok(ranks
            .range((iteration, Vertex::MIN)..=(iteration, Vertex::MAX))
            .count() as u64)
    }

    async fn insert_initial_ranks(&self, vertices: &[Vertex], value: &Probability) -> Result<u64> {
        let mut ranks = Self::lock(&self.ranks)?;
        let mut inserted = 0;
        for &vertex in vertices {
            if !ranks.contains_key(&(0, vertex)) {
                ranks.insert((0, vertex), value.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn get_ranks(&self, iteration: Iteration) -> Result<Vec<RankRecord>> {
        let ranks = Self::lock(&self.ranks)?;
        Ok(ranks
            .range((iteration, Vertex::MIN)..=(iteration, Vertex::MAX))
            .map(|(&(_, vertex), value)| RankRecord {
                vertex,
                value: value.clone(),
            })
            .collect())
    }

    async fn get_ranked_vertices(&self, iteration: Iteration) -> Result<HashSet<Vertex>> {
        let ranks = Self::lock(&self.ranks)?;
        Ok(ranks
            .range((iteration, Vertex::MIN)..=(iteration, Vertex::MAX))
            .map(|(&(_, vertex), _)| vertex)
            .collect())
    }

    async fn insert_rank(
        &self,
        vertex: Vertex,
        iteration: Iteration,
        value: &Probability,
    ) -> Result<()> {
        let mut ranks = Self::lock(&self.ranks)?;
        if ranks.contains_key(&(iteration, vertex)) {
            return Err(Error::AlreadyExists(format!(
                "rank of vertex {} at iteration {}",
                vertex, iteration
            )));
        }
        ranks.insert((iteration, vertex), value.clone());
        Ok(())
    }

    async fn get_votes(&self, iteration: Iteration) -> Result<Vec<VoteRecord>> {
        let votes = Self::lock(&self.votes)?;
        Ok(votes
            .range((iteration, Vertex::MIN, Vertex::MIN)..=(iteration, Vertex::MAX, Vertex::MAX))
            .map(|(&(_, source, target), value)| VoteRecord {
                source,
                target,
                value: value.clone(),
            })
            .collect())
    }

    async fn get_vote_sources(&self, iteration: Iteration) -> Result<HashSet<Vertex>> {
        let votes = Self::lock(&self.votes)?;
        Ok(votes
            .range((iteration, Vertex::MIN, Vertex::MIN)..=(iteration, Vertex::MAX, Vertex::MAX))
            .map(|(&(_, source, _), _)| source)
            .collect())
    }

    async fn insert_votes(
        &self,
        source: Vertex,
        targets: &[Vertex],
        iteration: Iteration,
        value: &Probability,
    ) -> Result<()> {
        let mut votes = Self::lock(&self.votes)?;
        if let Some(target) = targets
            .iter()
            .find(|&&target| votes.contains_key(&(iteration, source, target)))
        {
            return Err(Error::AlreadyExists(format!(
                "vote {} -> {} at iteration {}",
                source, target, iteration
            )));
        }
        for &target in targets {
            votes.insert((iteration, source, target), value.clone());
        }
        Ok(())
    }
}
