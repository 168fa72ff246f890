//! Top-level scheduler (C7): sets up the workspace, runs the planner, then
//! drives the spawn/harvest loop until the queue drains, grounded on
//! `main.main`'s phase-1/phase-2 structure. Workers are independent OS
//! processes — this re-execs the running binary with a hidden `worker`
//! subcommand, the same child-process pattern as the teacher's
//! `McpProcessManager::start` spawning companion binaries.

use crate::application::{LlmClient, Planner};
use crate::domain::models::RunMeta;
use crate::infrastructure::{Config, FileRateLimiter};
use crate::reconciler::Reconciler;
use crate::services::TaskQueue;
use crate::{application::archive, infrastructure::database};
use anyhow::{Context, Result};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{info, warn};

pub struct SupervisorOutcome {
    pub archive_path: std::path::PathBuf,
    pub tasks_done: u64,
    pub tasks_failed: u64,
    pub workers_spawned: u32,
}

/// Run one full swarm invocation: plan, spawn workers up to `max_workers`
/// until the queue drains, reconcile, and package the final delivery.
pub async fn run(config: &Config, spec_content: &str) -> Result<SupervisorOutcome> {
    let pool = database::connect(&config.db_path.to_string_lossy()).await?;
    database::Migrator::new(pool.clone()).run_embedded_migrations().await?;
    let store = Arc::new(database::SqliteTaskStore::new(pool));
    let queue = Arc::new(TaskQueue::new(store, config.logs_dir.clone(), config.max_retries));

    let started_at = chrono::Utc::now();
    let run_id = RunMeta::new_run_id(started_at);
    let run = RunMeta {
        run_id: run_id.clone(),
        project_name: RunMeta::safe_project_name(spec_content),
        spec: spec_content.to_string(),
        total_tasks: 0,
        completed_tasks: 0,
        failed_tasks: 0,
        started_at,
        status: "running".to_string(),
    };
    queue.insert_run_meta(&run).await?;

    info!("PHASE 1: PLANNING");
    let rate_limiter = FileRateLimiter::new(&config.logs_dir, config.api_rate_limit_rpm);
    let llm = LlmClient::new(config.llm_base_url.clone(), config.llm_api_key.clone(), rate_limiter, Duration::from_secs(120));
    let planner = Planner::new(llm, config.llm_model.clone());
    let task_count = planner.run(&queue, &config.workspace_dir, spec_content).await?;
    info!(task_count, "planning complete");

    let reconciler = Arc::new(Reconciler::new(
        queue.clone(),
        config.workspace_dir.clone(),
        Duration::from_secs(config.worker_timeout),
    ));
    let reconciler_handle = reconciler.clone().spawn_background(Duration::from_secs(config.reconciler_interval));

    info!("PHASE 2: EXECUTION");
    let workers_spawned = drive_execution_loop(config, &queue).await?;

    reconciler_handle.abort();
    info!("FINAL: reconciliation");
    reconciler.run_once().await?;

    let stats = queue.stats().await?;
    queue
        .update_run_meta_counters(&run_id, stats.total as i64, stats.done as i64, stats.failed as i64, "complete")
        .await?;

    let end_time = chrono::Utc::now();
    let delivery_stats = archive::DeliveryStats { total: stats.total, done: stats.done, failed: stats.failed };
    let archive_path = archive::package_final_delivery(
        &config.workspace_dir,
        &config.outputs_dir,
        &run,
        &delivery_stats,
        end_time,
        workers_spawned,
    )?;

    info!(archive = %archive_path.display(), "project complete");
    Ok(SupervisorOutcome { archive_path, tasks_done: stats.done, tasks_failed: stats.failed, workers_spawned })
}

/// Spawn workers up to `max_workers` while the queue has pending tasks,
/// harvest finished ones, and poll every 5 seconds — `main.main`'s
/// `running_workers` dict loop translated to `Child` handles.
async fn drive_execution_loop(config: &Config, queue: &Arc<TaskQueue>) -> Result<u32> {
    let mut running: Vec<Child> = Vec::new();
    let mut total_spawned: u32 = 0;

    loop {
        let stats = queue.stats().await?;
        if stats.pending == 0 && stats.running == 0 {
            break;
        }

        let slots = config.max_workers.saturating_sub(running.len());
        let to_spawn = slots.min(stats.pending as usize);
        for _ in 0..to_spawn {
            total_spawned += 1;
            let worker_id = format!("worker-{total_spawned}");
            match spawn_worker_process(config, &worker_id) {
                Ok(child) => running.push(child),
                Err(err) => warn!(%err, worker_id, "failed to spawn worker"),
            }
        }

        running.retain_mut(|child| !matches!(child.try_wait(), Ok(Some(_))));

        let stats = queue.stats().await?;
        info!(workers = running.len(), done = stats.done, pending = stats.pending, "swarm progress");
        tokio::time::sleep(Duration::from_secs(5)).await;
    }

    for mut child in running {
        let _ = child.wait().await;
    }

    Ok(total_spawned)
}

/// Entry point for the hidden `worker` subcommand: run one worker's
/// claim-until-drained loop against the given paths and exit.
pub async fn run_worker(
    worker_id: String,
    db_path: &std::path::Path,
    workspace_dir: std::path::PathBuf,
    logs_dir: std::path::PathBuf,
    outputs_dir: std::path::PathBuf,
) -> Result<u32> {
    let config = Config::load()?;
    let pool = database::connect(&db_path.to_string_lossy()).await?;
    let store = Arc::new(database::SqliteTaskStore::new(pool));
    let queue = TaskQueue::new(store, logs_dir.clone(), config.max_retries);

    let rate_limiter = FileRateLimiter::new(&logs_dir, config.api_rate_limit_rpm);
    let llm = LlmClient::new(config.llm_base_url.clone(), config.llm_api_key.clone(), rate_limiter, Duration::from_secs(300));
    let workspace = crate::infrastructure::GitWorkspace::new(workspace_dir);

    let worker = crate::application::Worker::new(worker_id, llm, config.llm_model.clone(), workspace, outputs_dir);
    let completed = worker.run(&queue).await?;
    Ok(completed)
}

/// Re-exec this same binary with the hidden `worker` subcommand, passing
/// the resolved paths explicitly rather than relying on the child
/// inheriting environment variables.
fn spawn_worker_process(config: &Config, worker_id: &str) -> Result<Child> {
    let exe = std::env::current_exe().context("resolving current executable path")?;
    Command::new(exe)
        .arg("worker")
        .arg("--worker-id")
        .arg(worker_id)
        .arg("--db-path")
        .arg(&config.db_path)
        .arg("--workspace-dir")
        .arg(&config.workspace_dir)
        .arg("--logs-dir")
        .arg(&config.logs_dir)
        .arg("--outputs-dir")
        .arg(&config.outputs_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .context("spawning worker process")
}
