//! Common utilities and types shared across minirank

pub mod config;
pub mod decimal;
pub mod error;
pub mod metrics;

pub use config::{Config, GraphConfig, RoleConfig, StoreConfig, WorkerConfig};
pub use decimal::{DampingFactor, Probability, SCALE};
pub use error::{Error, Result};
pub use metrics::{MetricsSnapshot, Role, WorkerMetrics};

/// Graph vertex identifier
pub type Vertex = i64;

/// Map-reduce round number; ranks of round 0 are the uniform seed
pub type Iteration = u32;
