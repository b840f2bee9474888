//! Command-line interface for staged-load
//!
//! # Usage Examples
//!
//! ## Checks and Runs
//! ```bash
//! # Report what would block a load, without changing anything
//! staged-load check --recipe clinical.yaml
//!
//! # Run a load, applying proposed fixes (missing columns, archive triggers)
//! staged-load run --recipe clinical.yaml --accept-fixes --log-dir /var/log/staged-load
//! ```
//!
//! ## Archive Triggers
//! ```bash
//! staged-load trigger status --recipe clinical.yaml --table People
//! staged-load trigger create --recipe clinical.yaml --table People --timeout 2m
//! staged-load trigger drop --recipe clinical.yaml --table People
//! ```
//!
//! ## History
//! ```bash
//! staged-load history --log-dir /var/log/staged-load
//! staged-load history --log-dir /var/log/staged-load --job 42
//! ```
//!
//! Ctrl-C once stops the job after the current table; twice aborts after the current row.
//! Exit status: 0 success, 2 nothing to load, 1 error.

use anyhow::Context;
use clap::{Parser, Subcommand};
use staged_load::config::duration::parse_timeout;
use staged_load::trigger::TriggerImplementer;
use staged_load::{
    connect_servers, DataLoadOrchestrator, ExitCode, FilesystemLogStore,
    LoadLogStore, RecipeOpts, TracingNotifier,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "staged-load")]
#[command(about = "Load data into LIVE tables through RAW and STAGING copies")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pre-flight checks of a recipe
    Check {
        #[command(flatten)]
        recipe: RecipeOpts,

        /// Directory holding the execution log
        #[arg(long, env = "STAGED_LOAD_LOG_DIR", default_value = ".staged-load-log")]
        log_dir: PathBuf,
    },

    /// Run a load job
    Run {
        #[command(flatten)]
        recipe: RecipeOpts,

        /// Directory holding the execution log
        #[arg(long, env = "STAGED_LOAD_LOG_DIR", default_value = ".staged-load-log")]
        log_dir: PathBuf,
    },

    /// Inspect or manage the archive trigger of one LIVE table
    Trigger {
        #[command(subcommand)]
        action: TriggerAction,
    },

    /// Show past jobs
    History {
        /// Directory holding the execution log
        #[arg(long, env = "STAGED_LOAD_LOG_DIR", default_value = ".staged-load-log")]
        log_dir: PathBuf,

        /// Show one job in full
        #[arg(long)]
        job: Option<i64>,
    },
}

#[derive(Subcommand)]
enum TriggerAction {
    /// Report whether the trigger is missing, valid or stale
    Status {
        #[command(flatten)]
        target: TriggerTarget,
    },
    /// Create the archive table and trigger, replacing a stale trigger
    Create {
        #[command(flatten)]
        target: TriggerTarget,

        /// Give up after this long, e.g. "30s" or "2m" (default: recipe's trigger_timeout)
        #[arg(long)]
        timeout: Option<String>,
    },
    /// Drop the trigger; the archive table is kept
    Drop {
        #[command(flatten)]
        target: TriggerTarget,
    },
}

#[derive(clap::Args)]
struct TriggerTarget {
    #[command(flatten)]
    recipe: RecipeOpts,

    /// LIVE table named in the recipe
    #[arg(long)]
    table: String,
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(ExitCode::Error.process_code());
        }
    }
}

async fn run() -> anyhow::Result<i32> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check { recipe, log_dir } => {
            let load = recipe.load()?;
            let notifier = TracingNotifier::new(load.accept_fixes);
            let (live, staging) = connect_servers(&load).await?;
            let log = Arc::new(FilesystemLogStore::new(log_dir));
            let orchestrator = DataLoadOrchestrator::new(load, live, staging, log);
            let passed = orchestrator.check(&notifier).await?;
            if passed {
                println!("All checks passed");
                Ok(0)
            } else {
                println!("Checks failed");
                Ok(ExitCode::Error.process_code())
            }
        }
        Commands::Run { recipe, log_dir } => {
            let load = recipe.load()?;
            let notifier = TracingNotifier::new(load.accept_fixes);
            let (live, staging) = connect_servers(&load).await?;
            let log = Arc::new(FilesystemLogStore::new(log_dir));
            let orchestrator = DataLoadOrchestrator::new(load, live, staging, log);

            let stop = CancellationToken::new();
            let abort = CancellationToken::new();
            spawn_signal_handler(stop.clone(), abort.clone());

            let report = orchestrator.run(&notifier, stop, abort).await?;
            for table in &report.tables {
                println!(
                    "{}: {} inserted, {} updated, {} unchanged",
                    table.table, table.inserts, table.updates, table.unchanged
                );
            }
            for error in &report.errors {
                eprintln!("{error}");
            }
            match report.job_id {
                Some(job_id) => println!("Job {job_id}: {} ({})", report.exit_code, report.state),
                None => println!("{} ({})", report.exit_code, report.state),
            }
            Ok(report.exit_code.process_code())
        }
        Commands::Trigger { action } => run_trigger(action).await,
        Commands::History { log_dir, job } => {
            let log = FilesystemLogStore::new(log_dir);
            match job {
                Some(job_id) => {
                    let job = log
                        .read_job(job_id)
                        .await?
                        .with_context(|| format!("No job {job_id} in {}", log.dir().display()))?;
                    println!("{}", serde_json::to_string_pretty(&job)?);
                }
                None => {
                    for job in log.list_jobs().await? {
                        println!(
                            "{:>6}  {}  {:<24} {:<14} {:<22} +{} ~{}",
                            job.job_id,
                            job.started.format("%Y-%m-%d %H:%M:%S"),
                            job.load_name,
                            job.state.as_deref().unwrap_or("running"),
                            job.exit_code.map(|c| c.to_string()).unwrap_or_default(),
                            job.total_inserts(),
                            job.total_updates()
                        );
                    }
                }
            }
            Ok(0)
        }
    }
}

async fn run_trigger(action: TriggerAction) -> anyhow::Result<i32> {
    let (target, timeout) = match &action {
        TriggerAction::Status { target } | TriggerAction::Drop { target } => (target, None),
        TriggerAction::Create { target, timeout } => (target, timeout.as_deref()),
    };
    let load = target.recipe.load()?;
    let table = load
        .find_table(&target.table)
        .with_context(|| format!("Table {} is not part of load {}", target.table, load.name))?;
    let live_ref = table.live_ref();
    let (live, _) = connect_servers(&load).await?;
    let definition = live
        .describe_table(&live_ref)
        .await
        .with_context(|| format!("Failed to describe {live_ref}"))?;
    let trigger = TriggerImplementer::new(live.as_ref(), live_ref.clone(), definition);

    match &action {
        TriggerAction::Status { .. } => {
            let status = trigger.get_trigger_status().await?;
            println!("{live_ref}: {status}");
        }
        TriggerAction::Create { .. } => {
            let timeout = match timeout {
                Some(s) => parse_timeout(s)?,
                None => load.trigger_timeout()?,
            };
            let status = trigger.create_trigger(timeout).await?;
            info!("Archive table {}", trigger.archive_table());
            println!("{live_ref}: {status}");
        }
        TriggerAction::Drop { .. } => {
            let report = trigger.drop_trigger().await;
            println!("{}", report.drop_message);
            println!("{}", report.residual_message);
            if !report.dropped {
                return Ok(ExitCode::OperationNotRequired.process_code());
            }
        }
    }
    Ok(0)
}

/// First Ctrl-C stops between tables, the second aborts between rows.
fn spawn_signal_handler(stop: CancellationToken, abort: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Stopping after the current table; press Ctrl-C again to abort");
        stop.cancel();
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Aborting after the current row");
        abort.cancel();
    });
}
