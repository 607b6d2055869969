//! Worker counters
//!
//! Each mapper or reducer owns one [`WorkerMetrics`] behind an `Arc`, so the
//! orchestrator can still report progress after cancelling the task.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Worker role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Mapper,
    Reducer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Mapper => write!(f, "mapper"),
            Role::Reducer => write!(f, "reducer"),
        }
    }
}

/// Live counters of one worker
#[derive(Debug)]
pub struct WorkerMetrics {
    role: Role,
    iterations_completed: AtomicU64,
    iterations_abandoned: AtomicU64,
    /// Vote rows for a mapper, rank rows for a reducer
    records_written: AtomicU64,
    collisions: AtomicU64,
    vertices_skipped: AtomicU64,
    sinks: AtomicU64,
}

impl WorkerMetrics {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            iterations_completed: AtomicU64::new(0),
            iterations_abandoned: AtomicU64::new(0),
            records_written: AtomicU64::new(0),
            collisions: AtomicU64::new(0),
            vertices_skipped: AtomicU64::new(0),
            sinks: AtomicU64::new(0),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn record_iteration_completed(&self) {
        self.iterations_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_iteration_abandoned(&self) {
        self.iterations_abandoned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_written(&self, rows: u64) {
        self.records_written.fetch_add(rows, Ordering::Relaxed);
    }

    pub fn record_collision(&self) {
        self.collisions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.vertices_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sink(&self) {
        self.sinks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            role: self.role,
            iterations_completed: self.iterations_completed.load(Ordering::Relaxed),
            iterations_abandoned: self.iterations_abandoned.load(Ordering::Relaxed),
            records_written: self.records_written.load(Ordering::Relaxed),
            collisions: self.collisions.load(Ordering::Relaxed),
            vertices_skipped: self.vertices_skipped.load(Ordering::Relaxed),
            sinks: self.sinks.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`WorkerMetrics`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub role: Role,
    pub iterations_completed: u64,
    pub iterations_abandoned: u64,
    pub records_written: u64,
    pub collisions: u64,
    pub vertices_skipped: u64,
    pub sinks: u64,
}

impl MetricsSnapshot {
    /// Emit the snapshot as one structured log line.
    pub fn log(&self) {
        tracing::info!(
            role = %self.role,
            completed = self.iterations_completed,
            abandoned = self.iterations_abandoned,
            written = self.records_written,
            collisions = self.collisions,
            skipped = self.vertices_skipped,
            sinks = self.sinks,
            "worker summary"
        );
    }
}
