//! Worker binary: hosts a mapper, a reducer or both against a shared store

use anyhow::Context;
use clap::{Parser, ValueEnum};
use minirank::common::RoleConfig;
use minirank::graph::{parse_dot, provider_for};
use minirank::{store, Config, Error, Orchestrator, RunSummary};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "minirank-worker")]
#[command(about = "minirank worker - leaderless map-reduce PageRank")]
#[command(version)]
struct Args {
    /// Configuration file (defaults to ./minirank.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Roles hosted by this process, overrides [roles]
    #[arg(long, value_enum)]
    role: Option<RoleArg>,

    /// Number of map-reduce rounds, overrides graph.iteration_limit
    #[arg(long)]
    iterations: Option<u32>,

    /// Log level (trace, debug, info, warn, error), overrides log_level
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RoleArg {
    Mapper,
    Reducer,
    Both,
}

impl From<RoleArg> for RoleConfig {
    fn from(role: RoleArg) -> Self {
        RoleConfig {
            mapper: matches!(role, RoleArg::Mapper | RoleArg::Both),
            reducer: matches!(role, RoleArg::Reducer | RoleArg::Both),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("minirank-worker: {}", e);
            return ExitCode::from(2);
        }
    };

    let log_level = args.log_level.clone().unwrap_or(config.log_level.clone());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting minirank worker {}", minirank::BUILD_INFO);
    match run(config).await {
        Ok(summary) => {
            tracing::info!("Worker {} finished normally", summary.worker_id);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Worker failed: {:#}", e);
            match e.downcast_ref::<Error>() {
                Some(e) if e.is_configuration() => ExitCode::from(2),
                _ => ExitCode::FAILURE,
            }
        }
    }
}

fn load_config(args: &Args) -> minirank::Result<Config> {
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(role) = args.role {
        config.roles = role.into();
    }
    if let Some(iterations) = args.iterations {
        config.graph.iteration_limit = iterations;
    }
    config.validate()?;
    Ok(config)
}

async fn run(config: Config) -> anyhow::Result<RunSummary> {
    let store = store::open(&config.store)
        .await
        .context("opening the coordination store")?;

    let provider = provider_for(&config.graph.source);
    let data = provider
        .provide()
        .await
        .with_context(|| format!("fetching the graph from {}", provider.location()))?;
    let graph = parse_dot(&data)?;
    tracing::info!(
        "Graph loaded: {} vertices, {} edges",
        graph.vertex_count(),
        graph.edge_count()
    );

    let orchestrator = Orchestrator::from_config(store, Arc::new(graph), &config)?;
    Ok(orchestrator.run().await?)
}
