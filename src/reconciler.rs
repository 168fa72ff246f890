//! Reconciliation loop (C6): background health sweep over the queue,
//! grounded on `ReconcilerAgent.run_once`/`background_loop`. Translated as
//! a `tokio::task` rather than a `threading.Thread` — the original's
//! thread-per-background-job pattern has no OS-thread equivalent need once
//! everything already runs on the async runtime (spec.md's design notes on
//! singletons/threads).

use crate::application::syntax_check;
use crate::domain::models::kind;
use crate::services::TaskQueue;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct Reconciler {
    queue: Arc<TaskQueue>,
    workspace: PathBuf,
    worker_timeout: Duration,
}

#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub syntax_ok: bool,
    pub stalled_reset: u32,
    pub fixes_created: u32,
}

impl Reconciler {
    pub fn new(queue: Arc<TaskQueue>, workspace: PathBuf, worker_timeout: Duration) -> Self {
        Self { queue, workspace, worker_timeout }
    }

    /// Run every check once: syntax sweep, stalled-worker detection, and
    /// rework promotion for `fix_needed` tasks.
    pub async fn run_once(&self) -> anyhow::Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        let syntax = syntax_check::check_workspace(&self.workspace).await;
        report.syntax_ok = syntax.ok;
        if !syntax.ok {
            warn!(output = %truncate(&syntax.output, 200), "workspace syntax check failed");
            self.queue
                .add_task("Fix Python syntax errors", &format!("Fix syntax errors: {}", truncate(&syntax.output, 500)), 1)
                .await?;
            self.queue.log_event("reconciler", "syntax", kind::ERROR, &truncate(&syntax.output, 200), 0).await?;
        }

        report.stalled_reset = self.reset_stalled_workers().await?;
        report.fixes_created = self.promote_fix_needed_tasks().await?;

        Ok(report)
    }

    async fn reset_stalled_workers(&self) -> anyhow::Result<u32> {
        let now = Utc::now();
        let mut reset = 0;
        for task in self.queue.list_running().await? {
            let Some(started_at) = task.started_at else { continue };
            let elapsed = now.signed_duration_since(started_at);
            if elapsed.num_seconds() as u64 > self.worker_timeout.as_secs() {
                warn!(task_id = %task.task_id, elapsed_secs = elapsed.num_seconds(), "worker stalled");
                self.queue
                    .log_event("reconciler", &task.task_id, kind::STALLED, &format!("stalled after {}s", elapsed.num_seconds()), 0)
                    .await?;
                self.queue.fail(&task.task_id, &format!("Stalled after {}s", elapsed.num_seconds())).await?;
                reset += 1;
            }
        }
        Ok(reset)
    }

    /// For every task waiting on rework, synthesize a `Fix: <title>` task at
    /// top priority and promote the original to `Replaced` — the rework
    /// handoff `ReconcilerAgent.handle_fix_needed` performs.
    async fn promote_fix_needed_tasks(&self) -> anyhow::Result<u32> {
        let mut fixed = 0;
        for task in self.queue.list_fix_needed().await? {
            let fix_title = format!("Fix: {}", task.title);
            let fix_description = format!("Fix the issue: {}", task.error.clone().unwrap_or_default());
            let new_task_id = self.queue.add_task(&fix_title, &fix_description, 1).await?;

            self.queue
                .complete(&task.task_id, Some(format!("Replaced by {new_task_id}")), crate::domain::models::TaskStatus::Replaced)
                .await?;
            self.queue
                .log_event("reconciler", &task.task_id, kind::FIX_CREATED, &format!("Created {new_task_id} to fix"), 0)
                .await?;
            fixed += 1;
        }
        Ok(fixed)
    }

    /// Spawn the periodic background sweep as a detached task, returning a
    /// handle the caller can abort on shutdown.
    pub fn spawn_background(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "reconciler starting");
            loop {
                if let Err(err) = self.run_once().await {
                    warn!(%err, "reconciler sweep failed");
                }
                tokio::time::sleep(interval).await;
            }
        })
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::{connect, Migrator, SqliteTaskStore};
    use tempfile::tempdir;

    async fn setup() -> (Reconciler, tempfile::TempDir) {
        let pool = connect("sqlite::memory:").await.unwrap();
        Migrator::new(pool.clone()).run_embedded_migrations().await.unwrap();
        let store = Arc::new(SqliteTaskStore::new(pool));
        let dir = tempdir().unwrap();
        let queue = Arc::new(TaskQueue::new(store, dir.path().to_path_buf(), 3));
        (Reconciler::new(queue, dir.path().to_path_buf(), Duration::from_secs(300)), dir)
    }

    #[tokio::test]
    async fn fix_needed_task_is_replaced_by_a_new_fix_task() {
        let (reconciler, _dir) = setup().await;
        let task_id = reconciler.queue.add_task("broken", "will be marked fix_needed", 5).await.unwrap();
        reconciler.queue.claim_task("worker-a").await.unwrap();
        reconciler.queue.mark_fix_needed(&task_id, "syntax error").await.unwrap();

        let fixed = reconciler.promote_fix_needed_tasks().await.unwrap();
        assert_eq!(fixed, 1);

        let original = reconciler.queue.get(&task_id).await.unwrap().unwrap();
        assert_eq!(original.status, crate::domain::models::TaskStatus::Replaced);

        let stats = reconciler.queue.stats().await.unwrap();
        assert_eq!(stats.pending, 1);
    }

    #[tokio::test]
    async fn a_running_task_past_timeout_is_reset_to_pending() {
        let pool = connect("sqlite::memory:").await.unwrap();
        Migrator::new(pool.clone()).run_embedded_migrations().await.unwrap();
        let store = Arc::new(SqliteTaskStore::new(pool));
        let dir = tempdir().unwrap();
        let queue = Arc::new(TaskQueue::new(store, dir.path().to_path_buf(), 3));
        let reconciler = Reconciler::new(queue.clone(), dir.path().to_path_buf(), Duration::from_secs(0));

        let task_id = queue.add_task("slow", "never finishes", 5).await.unwrap();
        queue.claim_task("worker-a").await.unwrap();

        let reset = reconciler.reset_stalled_workers().await.unwrap();
        assert_eq!(reset, 1);
        let task = queue.get(&task_id).await.unwrap().unwrap();
        assert_eq!(task.status, crate::domain::models::TaskStatus::Pending);
        assert_eq!(task.retries, 1);
    }
}
