//! Leaderless map-reduce engine
//!
//! Workers never talk to each other. Each iteration moves through
//! `ready -> mapped -> reduced` in the coordination store, and any worker may
//! pick up any claimable iteration; duplicated work is absorbed by the
//! store's write-once tables.

mod initializer;
mod mapper;
mod orchestrator;
pub(crate) mod recheck;
mod reducer;

pub use initializer::Initializer;
pub use mapper::Mapper;
pub use orchestrator::{Orchestrator, RunSummary};
pub use reducer::Reducer;

use crate::common::WorkerConfig;
use std::time::Duration;

/// Timing knobs shared by mappers and reducers
#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    pub poll_interval: Duration,
    pub recheck_interval: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self::from(&WorkerConfig::default())
    }
}

impl From<&WorkerConfig> for WorkerSettings {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            recheck_interval: config.recheck_interval(),
        }
    }
}

impl WorkerSettings {
    /// Millisecond cadence for tests and single-process runs
    pub fn fast() -> Self {
        Self {
            poll_interval: Duration::from_millis(5),
            recheck_interval: Duration::from_millis(5),
        }
    }
}
