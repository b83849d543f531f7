pub mod config;

pub use config::FlowtrackConfig;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::api;
use crate::engine::manager::ExecutionManager;
use crate::engine::monitor::StatusMonitor;
use crate::engine::runner::SimulatedStepRunner;
use crate::storage::ExecutionStore;
use crate::storage::sqlite_store::SqliteExecutionStore;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DATABASE_URL: &str = "sqlite://data/executions.db";
const DEFAULT_MONITOR_INTERVAL_MS: u64 = 5000;
const DEFAULT_STEP_DELAY_MS: u64 = 800;

#[derive(Parser)]
#[command(name = "flowtrack", version, about = "Workflow execution tracker")]
pub struct Cli {
    /// Path to a .env file to load (default: auto-detect .env in cwd)
    #[arg(long, global = true)]
    dotenv: Option<PathBuf>,

    /// Path to a flowtrack.yaml config file (default: auto-detect in cwd)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the tracker: REST + WebSocket API and status monitor
    Serve {
        /// Host to bind to
        #[arg(long, env = "HOST")]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long, env = "PORT")]
        port: Option<u16>,

        /// SQLite database URL for execution history
        #[arg(long, env = "DATABASE_URL")]
        db: Option<String>,

        /// Aggregate snapshot period in milliseconds
        #[arg(long, env = "MONITOR_INTERVAL_MS")]
        monitor_interval_ms: Option<u64>,

        /// Simulated delay between step checkpoints in milliseconds
        #[arg(long, env = "STEP_DELAY_MS")]
        step_delay_ms: Option<u64>,
    },

    /// List persisted execution history, most recent first
    List {
        /// Maximum number of rows
        #[arg(short, long, default_value = "50")]
        limit: u32,

        /// SQLite database URL
        #[arg(long, env = "DATABASE_URL")]
        db: Option<String>,

        /// Output format (table, json)
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Inspect a single persisted execution
    Inspect {
        /// Execution ID
        execution_id: String,

        /// SQLite database URL
        #[arg(long, env = "DATABASE_URL")]
        db: Option<String>,
    },

    /// Show aggregate execution counters
    Stats {
        /// SQLite database URL
        #[arg(long, env = "DATABASE_URL")]
        db: Option<String>,
    },
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    // Load .env file
    load_dotenv(cli.dotenv.as_deref());

    let config = FlowtrackConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve {
            host,
            port,
            db,
            monitor_interval_ms,
            step_delay_ms,
        } => {
            cmd_serve(
                host.or(config.host).unwrap_or_else(|| DEFAULT_HOST.to_string()),
                port.or(config.port).unwrap_or(DEFAULT_PORT),
                db.or(config.database_url)
                    .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
                monitor_interval_ms
                    .or(config.monitor_interval_ms)
                    .unwrap_or(DEFAULT_MONITOR_INTERVAL_MS),
                step_delay_ms
                    .or(config.step_delay_ms)
                    .unwrap_or(DEFAULT_STEP_DELAY_MS),
            )
            .await
        }
        Commands::List { limit, db, format } => {
            cmd_list(
                limit,
                db.or(config.database_url)
                    .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
                format,
            )
            .await
        }
        Commands::Inspect { execution_id, db } => {
            cmd_inspect(
                execution_id,
                db.or(config.database_url)
                    .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            )
            .await
        }
        Commands::Stats { db } => {
            cmd_stats(
                db.or(config.database_url)
                    .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            )
            .await
        }
    }
}

/// Load environment variables from a .env file.
/// If an explicit path is given, load from that path (error if missing).
/// Otherwise, auto-detect .env in the current working directory (silently skip if absent).
fn load_dotenv(explicit_path: Option<&std::path::Path>) {
    match explicit_path {
        Some(path) => match dotenvy::from_path(path) {
            Ok(()) => info!("Loaded env from {}", path.display()),
            Err(e) => {
                eprintln!(
                    "Warning: Failed to load dotenv file '{}': {}",
                    path.display(),
                    e
                );
            }
        },
        None => match dotenvy::dotenv() {
            Ok(path) => info!("Loaded env from {}", path.display()),
            Err(dotenvy::Error::Io(_)) => {
                // No .env file found — that's fine, silently skip
            }
            Err(e) => {
                eprintln!("Warning: Failed to parse .env file: {}", e);
            }
        },
    }
}

async fn cmd_serve(
    host: String,
    port: u16,
    db: String,
    monitor_interval_ms: u64,
    step_delay_ms: u64,
) -> Result<()> {
    let store: Arc<dyn ExecutionStore> = Arc::new(SqliteExecutionStore::connect(&db).await?);
    let runner = Arc::new(SimulatedStepRunner::with_step_delay(Duration::from_millis(
        step_delay_ms,
    )));

    let manager = ExecutionManager::new(store, runner);

    let monitor = StatusMonitor::new(
        Arc::clone(&manager),
        Duration::from_millis(monitor_interval_ms),
    );
    monitor.start();

    api::serve(&host, port, manager).await
}

async fn cmd_list(limit: u32, db: String, format: String) -> Result<()> {
    let store = SqliteExecutionStore::connect(&db).await?;
    let executions = store.history(limit).await?;

    if executions.is_empty() {
        println!("No executions found.");
        return Ok(());
    }

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&executions)?);
        return Ok(());
    }

    // Table format
    println!(
        "{:<38} {:<24} {:<10} {:>8}  {:<24}",
        "EXECUTION ID", "WORKFLOW", "STATUS", "PROGRESS", "STARTED"
    );
    println!("{}", "-".repeat(110));

    for execution in &executions {
        println!(
            "{:<38} {:<24} {:<10} {:>7}%  {:<24}",
            execution.id,
            execution.workflow_name,
            execution.status,
            execution.progress,
            execution.started_at.format("%Y-%m-%d %H:%M:%S"),
        );
    }

    println!("\nTotal: {} execution(s)", executions.len());
    Ok(())
}

async fn cmd_inspect(execution_id: String, db: String) -> Result<()> {
    let store = SqliteExecutionStore::connect(&db).await?;

    let execution = store
        .fetch(&execution_id)
        .await?
        .with_context(|| format!("Execution '{}' not found", execution_id))?;

    println!("{}", serde_json::to_string_pretty(&execution)?);

    Ok(())
}

async fn cmd_stats(db: String) -> Result<()> {
    let store = SqliteExecutionStore::connect(&db).await?;
    let stats = store.stats().await?;

    println!("Total:      {}", stats.total);
    println!("Running:    {}", stats.running);
    println!("Succeeded:  {}", stats.succeeded);
    println!("Failed:     {}", stats.failed);
    println!("Cancelled:  {}", stats.cancelled);
    println!("Avg. duration: {:.2}s", stats.average_duration_seconds);

    Ok(())
}
