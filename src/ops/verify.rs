//! Audit the persisted state of a run

use crate::common::{Iteration, Probability, Result, Vertex};
use crate::store::{CoordinationStore, IterationState};
use bigdecimal::BigDecimal;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub iterations_checked: usize,
    pub vertices: u64,
    /// Broken `ready -> mapped -> reduced` ordering
    pub flag_violations: Vec<String>,
    /// Reduced iterations missing rank rows
    pub incomplete_iterations: Vec<Iteration>,
    /// Sources whose votes do not add up to their prior rank
    pub conservation_violations: Vec<String>,
    pub mass: Vec<IterationMass>,
}

/// Sum of all ranks of one iteration
#[derive(Debug, Clone, Serialize)]
pub struct IterationMass {
    pub iteration: Iteration,
    pub ranks: usize,
    pub total: Probability,
}

impl VerifyReport {
    pub fn is_healthy(&self) -> bool {
        self.flag_violations.is_empty()
            && self.incomplete_iterations.is_empty()
            && self.conservation_violations.is_empty()
    }
}

pub async fn verify_store(store: &dyn CoordinationStore) -> Result<VerifyReport> {
    tracing::info!("Starting store verification");

    let iterations = store.list_iterations().await?;
    let vertices = store.count_rank_rows(0).await?;

    let mut report = VerifyReport {
        iterations_checked: iterations.len(),
        vertices,
        flag_violations: flag_violations(&iterations),
        incomplete_iterations: Vec::new(),
        conservation_violations: Vec::new(),
        mass: Vec::new(),
    };

    report.mass.push(mass_of(store, 0).await?);
    for state in &iterations {
        if state.reduced && store.count_rank_rows(state.iteration).await? != vertices {
            report.incomplete_iterations.push(state.iteration);
        }
        if state.ready {
            report
                .conservation_violations
                .extend(check_conservation(store, state.iteration).await?);
        }
        if state.reduced {
            report.mass.push(mass_of(store, state.iteration).await?);
        }
    }

    if report.is_healthy() {
        tracing::info!("Verification passed for {} iterations", report.iterations_checked);
    } else {
        tracing::warn!(
            "Verification found {} flag, {} completeness and {} conservation problems",
            report.flag_violations.len(),
            report.incomplete_iterations.len(),
            report.conservation_violations.len()
        );
    }
    Ok(report)
}

fn flag_violations(iterations: &[IterationState]) -> Vec<String> {
    let mut violations = Vec::new();
    for state in iterations {
        if state.mapped && !state.ready {
            violations.push(format!("iteration {} is mapped but not ready", state.iteration));
        }
        if state.reduced && !state.mapped {
            violations.push(format!("iteration {} is reduced but not mapped", state.iteration));
        }
    }
    for pair in iterations.windows(2) {
        let (previous, next) = (&pair[0], &pair[1]);
        if next.ready && !previous.reduced {
            violations.push(format!(
                "iteration {} is ready before iteration {} was reduced",
                next.iteration, previous.iteration
            ));
        }
    }
    violations
}

/// Each source's votes at `iteration` must add up to its rank at
/// `iteration - 1`, short by less than one unit in the last place per vote.
async fn check_conservation(
    store: &dyn CoordinationStore,
    iteration: Iteration,
) -> Result<Vec<String>> {
    let prior: HashMap<Vertex, Probability> = store
        .get_ranks(iteration - 1)
        .await?
        .into_iter()
        .map(|rank| (rank.vertex, rank.value))
        .collect();

    let mut sent: HashMap<Vertex, (Probability, u64)> = HashMap::new();
    for vote in store.get_votes(iteration).await? {
        let (total, count) = sent.entry(vote.source).or_default();
        *total = std::mem::take(total) + vote.value;
        *count += 1;
    }

    let mut violations = Vec::new();
    for (source, (total, count)) in sent {
        let Some(rank) = prior.get(&source) else {
            violations.push(format!(
                "vertex {} voted in iteration {} without a prior rank",
                source, iteration
            ));
            continue;
        };
        let slack = Probability::ulp().mul_truncate(&BigDecimal::from(count));
        if total > *rank || *rank >= total.clone() + slack {
            violations.push(format!(
                "vertex {} sent {} in iteration {} but held {}",
                source, total, iteration, rank
            ));
        }
    }
    Ok(violations)
}

async fn mass_of(store: &dyn CoordinationStore, iteration: Iteration) -> Result<IterationMass> {
    let ranks = store.get_ranks(iteration).await?;
    Ok(IterationMass {
        iteration,
        ranks: ranks.len(),
        total: ranks.into_iter().map(|rank| rank.value).sum(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn p(value: &str) -> Probability {
        value.parse().unwrap()
    }

    async fn one_iteration(store: &MemoryStore) {
        store.insert_iteration_slots(2).await.unwrap();
        store.insert_initial_ranks(&[1, 2], &p("0.5")).await.unwrap();
        store.set_ready(1).await.unwrap();
        store.set_mapped(1).await.unwrap();
        store.set_reduced(1).await.unwrap();
    }

    #[tokio::test]
    async fn test_healthy_store() {
        let store = MemoryStore::new();
        one_iteration(&store).await;
        store.insert_votes(1, &[2], 1, &p("0.5")).await.unwrap();
        store.insert_votes(2, &[1], 1, &p("0.5")).await.unwrap();
        store.insert_rank(1, 1, &p("0.5")).await.unwrap();
        store.insert_rank(2, 1, &p("0.5")).await.unwrap();

        let report = verify_store(&store).await.unwrap();
        assert!(report.is_healthy(), "{:?}", report);
        assert_eq!(report.vertices, 2);
        assert_eq!(report.mass.len(), 2);
        assert_eq!(report.mass[1].total, Probability::one());
    }

    #[tokio::test]
    async fn test_detects_missing_ranks_and_lost_votes() {
        let store = MemoryStore::new();
        one_iteration(&store).await;
        store.insert_votes(1, &[2], 1, &p("0.4")).await.unwrap();
        store.insert_rank(1, 1, &p("0.5")).await.unwrap();

        let report = verify_store(&store).await.unwrap();
        assert!(!report.is_healthy());
        assert_eq!(report.incomplete_iterations, vec![1]);
        assert_eq!(report.conservation_violations.len(), 1);
    }

    #[test]
    fn test_flag_ordering() {
        let mut first = IterationState::new(1);
        first.ready = true;
        let mut second = IterationState::new(2);
        second.ready = true;
        second.reduced = true;

        let violations = flag_violations(&[first, second]);
        assert_eq!(violations.len(), 2);
    }
}
