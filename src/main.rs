//! Lead harvester
//! Paginated engagement collection, enrichment and scoring for one
//! subject account on the remote graph service.
//!
//! Features:
//! - Cursor-driven pagination across posts, comments, likers, followers
//! - Exponential backoff with jitter for transient failures
//! - Semaphore-based concurrency limiting and per-minute rate limiting
//! - Atomic shared item budgets per collection type
//! - Multi-source deduplicated candidate aggregation with a hard cap
//! - Parallel batched profile enrichment with partial-failure isolation
//! - Deterministic composite scoring and ranked CSV/JSON output
//! - Resumable per-subject artifacts with seed-list fallbacks
//! - Correlation IDs for tracing a run end to end

mod aggregate;
mod artifacts;
mod budget;
mod collector;
mod config;
mod enrich;
mod error;
mod fetcher;
mod http_client;
mod rank;
mod runner;
mod sink;
mod sources;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::artifacts::ArtifactPaths;
use crate::config::Config;
use crate::runner::Harvest;

/// Lead harvester - engagement collection and lead scoring
#[derive(Parser, Debug)]
#[command(name = "leadharvest")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Collects engagement around a subject account and ranks the leads")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, default_value = "false", global = true)]
    json_logs: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the full pipeline for a subject account
    Run {
        /// Subject account username
        username: String,
    },

    /// Re-rank previously enriched leads without touching the network
    Rank {
        /// Subject account username
        username: String,
    },

    /// Show which artifacts exist for a subject
    Status {
        /// Subject account username
        username: String,
    },
}

/// Sets up structured logging with tracing
fn setup_logging(log_level: &str, json_output: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    if json_output {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli.log_level, cli.json_logs);

    let correlation_id = uuid::Uuid::new_v4().to_string();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        correlation_id = %correlation_id,
        "Starting lead harvester"
    );

    let config = Config::load()?;
    info!(
        api = %config.api_base_url,
        output = %config.output_dir.display(),
        authenticated = config.has_session(),
        "Configuration loaded"
    );

    match cli.command {
        Commands::Run { username } => {
            if !config.has_session() {
                warn!("No session cookie configured; the remote service may reject collection");
            }
            let harvest = Harvest::over_http(config)?;
            // Artifacts flush incrementally, so an interrupt loses at
            // most the record in flight and the run resumes from the
            // persisted phases.
            tokio::select! {
                result = harvest.run(&username) => {
                    let summary = result?;
                    println!("{}", summary);
                }
                _ = tokio::signal::ctrl_c() => {
                    info!(subject = %username, "Interrupted; partial artifacts are preserved");
                }
            }
        }

        Commands::Rank { username } => {
            let harvest = Harvest::over_http(config)?;
            let ranked = harvest.rank_only(&username).await?;
            println!("Ranked {} leads for '{}'", ranked, username);
        }

        Commands::Status { username } => {
            show_status(&config, &username).await;
        }
    }

    Ok(())
}

/// Lists each artifact for the subject with its record count.
async fn show_status(config: &Config, username: &str) {
    let paths = ArtifactPaths::new(&config.output_dir, username);

    println!("Artifacts for '{}' in {}:", username, config.output_dir.display());
    for path in paths.all() {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match tokio::fs::try_exists(&path).await {
            Ok(true) => {
                let count = if name.ends_with(".json") {
                    artifacts::read_json_records::<serde_json::Value>(&path)
                        .await
                        .len()
                } else if name.ends_with(".csv") {
                    artifacts::read_lines(&path).await.len().saturating_sub(1)
                } else {
                    artifacts::read_lines(&path).await.len()
                };
                println!("  {:<28} {} records", name, count);
            }
            _ => println!("  {:<28} missing", name),
        }
    }
}
