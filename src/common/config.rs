//! Configuration for minirank workers

use crate::common::{DampingFactor, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default file looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "minirank";

/// Prefix of environment overrides, e.g. `MINIRANK_GRAPH__ITERATION_LIMIT=20`
pub const ENV_PREFIX: &str = "MINIRANK";

/// Largest iteration limit; iteration numbers must fit a PostgreSQL `INTEGER`
pub const MAX_ITERATION_LIMIT: u32 = i32::MAX as u32;

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub graph: GraphConfig,

    #[serde(default)]
    pub roles: RoleConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub worker: WorkerConfig,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// What to rank and how
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// URL or filesystem path of the DOT graph description
    pub source: String,

    /// Total map-reduce rounds to run
    #[serde(default = "default_iteration_limit")]
    pub iteration_limit: u32,

    /// Random-surfer continuation probability
    #[serde(default = "default_damping_factor")]
    pub damping_factor: f64,
}

fn default_iteration_limit() -> u32 {
    10
}
fn default_damping_factor() -> f64 {
    0.85
}

/// Which worker roles this process hosts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleConfig {
    #[serde(default = "default_true")]
    pub mapper: bool,

    #[serde(default = "default_true")]
    pub reducer: bool,
}

fn default_true() -> bool {
    true
}

impl Default for RoleConfig {
    fn default() -> Self {
        Self {
            mapper: true,
            reducer: true,
        }
    }
}

/// Coordination store backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
    /// Process-local, lost on exit
    Memory,

    /// Durable, single process
    Rocksdb { path: PathBuf },

    /// Shared between processes (requires the `postgres` feature)
    Postgres {
        url: String,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
}

fn default_max_connections() -> u32 {
    8
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Rocksdb {
            path: PathBuf::from("./minirank-data"),
        }
    }
}

/// Polling cadence of mapper and reducer loops
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Sleep when no iteration is claimable
    #[serde(default = "default_interval_ms")]
    pub poll_interval_ms: u64,

    /// Maximum staleness of the "already handled" sets during a scan
    #[serde(default = "default_interval_ms")]
    pub recheck_interval_ms: u64,
}

fn default_interval_ms() -> u64 {
    1000
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_interval_ms(),
            recheck_interval_ms: default_interval_ms(),
        }
    }
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn recheck_interval(&self) -> Duration {
        Duration::from_millis(self.recheck_interval_ms)
    }
}

impl Config {
    /// Load from an optional TOML file, then `MINIRANK_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        builder = match path {
            Some(path) => builder.add_source(config::File::from(path)),
            None => builder.add_source(config::File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the protocol cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.graph.source.trim().is_empty() {
            return Err(Error::InvalidConfig("graph.source is empty".into()));
        }
        if self.graph.iteration_limit == 0 {
            return Err(Error::InvalidConfig(
                "graph.iteration_limit must be at least 1".into(),
            ));
        }
        if self.graph.iteration_limit > MAX_ITERATION_LIMIT {
            return Err(Error::InvalidConfig(format!(
                "graph.iteration_limit must not exceed {}",
                MAX_ITERATION_LIMIT
            )));
        }
        self.damping_factor()?;
        if self.worker.poll_interval_ms == 0 || self.worker.recheck_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "worker intervals must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn damping_factor(&self) -> Result<DampingFactor> {
        DampingFactor::from_f64(self.graph.damping_factor)
    }
}
