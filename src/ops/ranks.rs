//! Highest ranks of an iteration

use crate::common::{Error, Iteration, Result};
use crate::store::{CoordinationStore, RankRecord};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct RanksReport {
    pub iteration: Iteration,
    /// Rank rows present for the iteration
    pub total: usize,
    /// Highest ranks first, ties broken by vertex id
    pub ranks: Vec<RankRecord>,
}

/// Top `limit` ranks of `iteration`, or of the highest reduced iteration when
/// none is given (iteration 0 before anything was reduced).
pub async fn top_ranks(
    store: &dyn CoordinationStore,
    iteration: Option<Iteration>,
    limit: usize,
) -> Result<RanksReport> {
    let iteration = match iteration {
        Some(iteration) => iteration,
        None => latest_reduced(store).await?,
    };

    let mut ranks = store.get_ranks(iteration).await?;
    if ranks.is_empty() {
        return Err(Error::Other(format!(
            "no ranks stored for iteration {}",
            iteration
        )));
    }
    let total = ranks.len();
    ranks.sort_by(|a, b| b.value.cmp(&a.value).then(a.vertex.cmp(&b.vertex)));
    ranks.truncate(limit);

    Ok(RanksReport {
        iteration,
        total,
        ranks,
    })
}

async fn latest_reduced(store: &dyn CoordinationStore) -> Result<Iteration> {
    Ok(store
        .list_iterations()
        .await?
        .iter()
        .filter(|state| state.reduced)
        .map(|state| state.iteration)
        .max()
        .unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Probability;
    use crate::store::MemoryStore;

    fn p(value: &str) -> Probability {
        value.parse().unwrap()
    }

    #[tokio::test]
    async fn test_defaults_to_latest_reduced_iteration() {
        let store = MemoryStore::new();
        store.insert_iteration_slots(2).await.unwrap();
        store.insert_initial_ranks(&[1, 2, 3], &p("0.3")).await.unwrap();
        store.set_ready(1).await.unwrap();
        store.set_mapped(1).await.unwrap();
        store.set_reduced(1).await.unwrap();
        store.insert_rank(1, 1, &p("0.2")).await.unwrap();
        store.insert_rank(2, 1, &p("0.5")).await.unwrap();
        store.insert_rank(3, 1, &p("0.2")).await.unwrap();

        let report = top_ranks(&store, None, 2).await.unwrap();
        assert_eq!(report.iteration, 1);
        assert_eq!(report.total, 3);
        let vertices: Vec<_> = report.ranks.iter().map(|r| r.vertex).collect();
        assert_eq!(vertices, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_seed_before_any_reduction() {
        let store = MemoryStore::new();
        store.insert_iteration_slots(1).await.unwrap();
        store.insert_initial_ranks(&[7], &p("1")).await.unwrap();

        let report = top_ranks(&store, None, 10).await.unwrap();
        assert_eq!(report.iteration, 0);
        assert_eq!(report.ranks.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_iteration() {
        let store = MemoryStore::new();
        assert!(top_ranks(&store, Some(4), 10).await.is_err());
    }
}
