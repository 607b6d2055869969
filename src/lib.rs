//! # minirank
//!
//! Leaderless map-reduce PageRank:
//! - Any number of mapper and reducer workers, in any number of processes
//! - No worker ever talks to another; the coordination store is the only channel
//! - Work is claimed with conditional flag updates and write-once inserts
//! - Fixed-point probabilities with 30 fractional digits
//!
//! ## Architecture

#![allow(clippy::result_large_err)]
//!
//! ```text
//! ┌──────────────┐  ┌──────────────┐  ┌──────────────┐
//! │  Process A   │  │  Process B   │  │  Process C   │
//! │ mapper       │  │ mapper       │  │ reducer      │
//! │ reducer      │  │              │  │              │
//! └──────┬───────┘  └──────┬───────┘  └──────┬───────┘
//!        │ claim / vote    │ claim / vote    │ claim / rank
//!   ┌────▼─────────────────▼─────────────────▼────┐
//!   │            Coordination Store               │
//!   │  iteration (ready, mapped, reduced)         │
//!   │  vote      (source, target, iteration)      │
//!   │  rank      (vertex, iteration)              │
//!   └─────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ### Start a worker hosting both roles
//! ```bash
//! minirank-worker --config minirank.toml
//! ```
//!
//! ### Add a mapper-only peer
//! ```bash
//! minirank-worker --config minirank.toml --role mapper
//! ```
//!
//! ### Inspect a run
//! ```bash
//! minirank --config minirank.toml status
//! minirank --config minirank.toml ranks --limit 20
//! minirank --config minirank.toml verify --json
//! ```

pub mod common;
pub mod engine;
pub mod graph;
pub mod ops;
pub mod store;

// Re-export commonly used types
pub use common::{Config, Error, Result};
pub use engine::{Orchestrator, RunSummary};
pub use graph::Graph;
pub use store::CoordinationStore;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
