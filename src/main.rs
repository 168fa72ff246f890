//! CLI entry point: `run` starts a swarm, the hidden `worker` subcommand is
//! only ever invoked by the supervisor re-exec'ing itself, and `status`
//! reports queue counters for an existing database.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use codeswarm::domain::ports::TaskStore;
use codeswarm::infrastructure::database::{self, SqliteTaskStore};
use codeswarm::infrastructure::Config;
use codeswarm::{infrastructure, supervisor};
use comfy_table::{presets::UTF8_FULL, Table};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "codeswarm")]
#[command(about = "Autonomous multi-agent code-generation swarm", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan and execute a project specification end to end.
    Run {
        /// Project specification text, given inline.
        spec: Option<String>,

        /// Read the specification from a file instead of the positional arg.
        #[arg(long)]
        spec_path: Option<PathBuf>,
    },

    /// Run one worker's claim loop against an existing queue. Only ever
    /// invoked by the supervisor's own re-exec, never directly by a user.
    #[command(hide = true)]
    Worker {
        #[arg(long)]
        worker_id: String,
        #[arg(long)]
        db_path: PathBuf,
        #[arg(long)]
        workspace_dir: PathBuf,
        #[arg(long)]
        logs_dir: PathBuf,
        #[arg(long)]
        outputs_dir: PathBuf,
    },

    /// Print queue counters for an existing database.
    Status {
        #[arg(long)]
        db_path: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { spec, spec_path } => {
            let config = Config::load().context("loading configuration")?;
            let _guard = infrastructure::logging::init(&config.logs_dir, &config.log_level, &config.log_format)?;

            let spec_content = match (spec, spec_path) {
                (_, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("reading spec file {}", path.display()))?,
                (Some(text), None) => text,
                (None, None) => anyhow::bail!("provide a specification, either inline or via --spec-path"),
            };

            let outcome = supervisor::run(&config, &spec_content).await?;
            println!(
                "PROJECT COMPLETE — output: {} (done: {}, failed: {}, workers: {})",
                outcome.archive_path.display(),
                outcome.tasks_done,
                outcome.tasks_failed,
                outcome.workers_spawned,
            );
            if outcome.tasks_failed > 0 {
                std::process::exit(1);
            }
        }

        Commands::Worker { worker_id, db_path, workspace_dir, logs_dir, outputs_dir } => {
            let completed = supervisor::run_worker(worker_id, &db_path, workspace_dir, logs_dir, outputs_dir).await?;
            println!("worker completed {completed} tasks, no more ready, exiting");
        }

        Commands::Status { db_path, json } => {
            let pool = database::connect(&db_path.to_string_lossy()).await?;
            let store = SqliteTaskStore::new(pool);
            let stats = store.stats().await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                let mut table = Table::new();
                table.load_preset(UTF8_FULL);
                table.set_header(vec!["status", "count"]);
                table.add_row(vec!["pending", &stats.pending.to_string()]);
                table.add_row(vec!["running", &stats.running.to_string()]);
                table.add_row(vec!["done", &stats.done.to_string()]);
                table.add_row(vec!["failed", &stats.failed.to_string()]);
                table.add_row(vec!["fix_needed", &stats.fix_needed.to_string()]);
                table.add_row(vec!["replaced", &stats.replaced.to_string()]);
                table.add_row(vec!["total", &stats.total.to_string()]);
                println!("{table}");
            }
        }
    }

    Ok(())
}
