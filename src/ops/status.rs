//! Progress of a run as seen by the store

use crate::common::{Iteration, Result};
use crate::store::{CoordinationStore, IterationState};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub iterations: Vec<IterationState>,
    /// Rank rows of iteration 0, i.e. the number of seeded vertices
    pub seeded_vertices: u64,
    pub next_ready: Option<Iteration>,
    pub next_mapped: Option<Iteration>,
    pub all_mapped: bool,
    pub all_reduced: bool,
}

impl StatusReport {
    /// Store was never initialized
    pub fn is_empty(&self) -> bool {
        self.iterations.is_empty()
    }

    pub fn reduced_count(&self) -> usize {
        self.iterations.iter().filter(|s| s.reduced).count()
    }
}

pub async fn collect_status(store: &dyn CoordinationStore) -> Result<StatusReport> {
    tracing::debug!("Collecting run status");

    let iterations = store.list_iterations().await?;
    let seeded_vertices = store.count_rank_rows(0).await?;
    let (all_mapped, all_reduced) = if iterations.is_empty() {
        (false, false)
    } else {
        (store.all_mapped().await?, store.all_reduced().await?)
    };

    Ok(StatusReport {
        next_ready: store.next_ready().await?,
        next_mapped: store.next_mapped().await?,
        iterations,
        seeded_vertices,
        all_mapped,
        all_reduced,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_empty_store() {
        let store = MemoryStore::new();
        let status = collect_status(&store).await.unwrap();
        assert!(status.is_empty());
        assert!(!status.all_reduced);
        assert_eq!(status.next_ready, None);
    }

    #[tokio::test]
    async fn test_partial_progress() {
        let store = MemoryStore::new();
        store.insert_iteration_slots(3).await.unwrap();
        store.set_ready(1).await.unwrap();
        store.set_mapped(1).await.unwrap();
        store.set_reduced(1).await.unwrap();
        store.set_ready(2).await.unwrap();

        let status = collect_status(&store).await.unwrap();
        assert_eq!(status.iterations.len(), 3);
        assert_eq!(status.reduced_count(), 1);
        assert_eq!(status.next_ready, Some(2));
        assert_eq!(status.next_mapped, None);
        assert!(!status.all_mapped);
    }
}
