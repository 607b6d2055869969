//! CLI for inspecting a run

use anyhow::bail;
use clap::{Parser, Subcommand};
use minirank::common::StoreConfig;
use minirank::ops::{collect_status, top_ranks, verify_store};
use minirank::{store, Config};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "minirank")]
#[command(about = "minirank run inspection CLI")]
#[command(version)]
struct Cli {
    /// Worker configuration file, used for its [store] section
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// RocksDB directory, overrides the configured store
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Print reports as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show iteration progress
    Status,

    /// Show the highest ranks of an iteration
    Ranks {
        /// Iteration (latest reduced if omitted)
        #[arg(long)]
        iteration: Option<u32>,

        /// Number of vertices to show
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Audit flags, rank completeness and vote conservation
    Verify,
}

fn print_json<T: Serialize>(report: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let store_config = match &cli.db {
        Some(path) => StoreConfig::Rocksdb { path: path.clone() },
        None => Config::load(cli.config.as_deref())?.store,
    };
    let store = store::open_for_inspection(&store_config).await?;

    match cli.command {
        Commands::Status => {
            let report = collect_status(store.as_ref()).await?;
            if cli.json {
                return print_json(&report);
            }
            if report.is_empty() {
                println!("Store is not initialized");
                return Ok(());
            }
            println!("Status report:");
            println!("  Seeded vertices: {}", report.seeded_vertices);
            println!(
                "  Reduced: {}/{}",
                report.reduced_count(),
                report.iterations.len()
            );
            for state in &report.iterations {
                println!(
                    "  #{:<4} ready={:<5} mapped={:<5} reduced={}",
                    state.iteration, state.ready, state.mapped, state.reduced
                );
            }
            let show = |next: Option<u32>| next.map_or("-".to_string(), |i| i.to_string());
            println!("  Next ready: {}", show(report.next_ready));
            println!("  Next mapped: {}", show(report.next_mapped));
        }

        Commands::Ranks { iteration, limit } => {
            let report = top_ranks(store.as_ref(), iteration, limit).await?;
            if cli.json {
                return print_json(&report);
            }
            println!(
                "Top {} of {} ranks at iteration {}:",
                report.ranks.len(),
                report.total,
                report.iteration
            );
            for rank in &report.ranks {
                println!("  {:>12}  {}", rank.vertex, rank.value);
            }
        }

        Commands::Verify => {
            let report = verify_store(store.as_ref()).await?;
            if cli.json {
                print_json(&report)?;
            } else {
                println!("Verification report:");
                println!("  Iterations checked: {}", report.iterations_checked);
                println!("  Vertices: {}", report.vertices);
                for problem in report
                    .flag_violations
                    .iter()
                    .chain(&report.conservation_violations)
                {
                    println!("  ! {}", problem);
                }
                for iteration in &report.incomplete_iterations {
                    println!("  ! iteration {} is missing ranks", iteration);
                }
                for mass in &report.mass {
                    println!(
                        "  Mass at #{}: {} over {} ranks",
                        mass.iteration, mass.total, mass.ranks
                    );
                }
            }
            if !report.is_healthy() {
                bail!("verification failed");
            }
        }
    }

    Ok(())
}
