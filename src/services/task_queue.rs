//! The task queue (C2): all scheduling and retry policy sits here, on top
//! of the low-level `TaskStore` primitives, grounded on the teacher's
//! `services::task_queue_service::TaskQueueService`.

use crate::domain::models::{AgentLogEvent, NewTask, RunMeta, Task, TaskStatus};
use crate::domain::ports::{Stats, StoreError, TaskStore};
use anyhow::{Context, Result};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Task queue service: dependency gating, atomic claim, and the
/// retry-vs-fix_needed policy decision on failure.
pub struct TaskQueue {
    store: Arc<dyn TaskStore>,
    logs_dir: PathBuf,
    max_retries: u32,
}

impl TaskQueue {
    pub fn new(store: Arc<dyn TaskStore>, logs_dir: PathBuf, max_retries: u32) -> Self {
        Self { store, logs_dir, max_retries }
    }

    #[instrument(skip(self, description), err)]
    pub async fn add_task(&self, title: &str, description: &str, priority: i64) -> Result<String> {
        let task = Task {
            task_id: Task::new_id(),
            title: title.to_string(),
            description: description.to_string(),
            priority,
            retries: 0,
            depends_on: Default::default(),
            status: TaskStatus::Pending,
            assigned_worker: None,
            branch_name: None,
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        self.store.insert(&task).await.context("inserting task")?;
        Ok(task.task_id)
    }

    /// Insert a batch of planner-produced tasks, ignoring id collisions the
    /// way the original implementation's `INSERT OR IGNORE` does.
    #[instrument(skip(self, tasks), err)]
    pub async fn add_tasks_batch(&self, tasks: Vec<NewTask>) -> Result<usize> {
        let rows: Vec<Task> = tasks
            .into_iter()
            .map(|new_task| Task {
                task_id: new_task.task_id.unwrap_or_else(Task::new_id),
                title: new_task.title,
                description: new_task.description,
                priority: new_task.priority,
                retries: 0,
                depends_on: new_task.depends_on,
                status: TaskStatus::Pending,
                assigned_worker: None,
                branch_name: None,
                result: None,
                error: None,
                created_at: Utc::now(),
                started_at: None,
                completed_at: None,
            })
            .collect();
        self.store.insert_batch(&rows).await.context("inserting task batch")
    }

    /// All pending tasks whose dependencies are entirely `Done`.
    #[instrument(skip(self), err)]
    pub async fn get_ready_tasks(&self) -> Result<Vec<Task>> {
        let pending = self.store.list_pending_ordered().await.context("listing pending tasks")?;
        let mut ready = Vec::new();
        for task in pending {
            if self.dependencies_satisfied(&task).await? {
                ready.push(task);
            }
        }
        Ok(ready)
    }

    async fn dependencies_satisfied(&self, task: &Task) -> Result<bool> {
        for dep_id in &task.depends_on {
            match self.store.get(dep_id).await.context("checking dependency status")? {
                Some(dep) if dep.status.satisfies_dependency() => {}
                _ => return Ok(false),
            }
        }
        Ok(true)
    }

    /// Walk ready candidates in `(priority, created_at)` order, attempting
    /// the atomic claim on each until one succeeds. Returns `None` only once
    /// every candidate has been tried and lost its race or none were ready
    /// to begin with (spec.md §4.2, §8 scenario: two workers, one task).
    #[instrument(skip(self), err)]
    pub async fn claim_task(&self, worker_id: &str) -> Result<Option<Task>> {
        let ready = self.get_ready_tasks().await?;
        for candidate in ready {
            let branch_name = Task::branch_name_for(&candidate.task_id);
            let claimed = self
                .store
                .try_claim(&candidate.task_id, worker_id, &branch_name, Utc::now())
                .await
                .context("claiming task")?;

            if claimed {
                return self.store.get(&candidate.task_id).await.context("reloading claimed task");
            }
        }
        Ok(None)
    }

    /// Mark a task done (or, from the reconciler's rework sweep, replaced).
    /// CAS'd on the state the caller should be transitioning from, so a
    /// stale completion after a stall-reset is silently ignored (spec.md §8
    /// idempotence property).
    #[instrument(skip(self, result), err)]
    pub async fn complete(&self, task_id: &str, result: Option<String>, status: TaskStatus) -> Result<bool> {
        let from = match status {
            TaskStatus::Done => TaskStatus::Running,
            TaskStatus::Replaced => TaskStatus::FixNeeded,
            other => anyhow::bail!("complete() cannot target status {other}"),
        };
        let applied = self
            .store
            .try_complete(task_id, from, status, result, Utc::now())
            .await
            .context("completing task")?;
        if applied {
            info!(task_id, %status, "task completed");
        }
        Ok(applied)
    }

    /// Fail a running task. Below the retry cap this re-opens it as
    /// `Pending` with `retries` incremented; once another attempt would
    /// exceed `max_retries` it goes straight to `fix_needed` instead of
    /// looping forever (the Open Question this crate resolves in favor of
    /// the queue owning the cap, rather than pending indefinitely).
    #[instrument(skip(self, error), err)]
    pub async fn fail(&self, task_id: &str, error: &str) -> Result<()> {
        let task = self
            .store
            .get(task_id)
            .await
            .context("loading task to fail")?
            .ok_or_else(|| StoreError::NotFound(task_id.to_string()))?;

        if task.retries + 1 >= i64::from(self.max_retries) {
            warn!(task_id, retries = task.retries, "retry cap reached, routing to fix_needed");
            self.store
                .try_mark_fix_needed(task_id, error, Utc::now())
                .await
                .context("marking task fix_needed after retry cap")?;
        } else {
            self.store
                .try_reopen_as_pending(task_id, error)
                .await
                .context("reopening failed task as pending")?;
        }
        Ok(())
    }

    /// Explicitly route a task to `fix_needed`, used by the reconciler when
    /// a post-hoc syntax check on a completed task fails.
    #[instrument(skip(self, error), err)]
    pub async fn mark_fix_needed(&self, task_id: &str, error: &str) -> Result<bool> {
        self.store
            .try_mark_fix_needed(task_id, error, Utc::now())
            .await
            .context("marking task fix_needed")
    }

    pub async fn get(&self, task_id: &str) -> Result<Option<Task>> {
        self.store.get(task_id).await.context("fetching task")
    }

    pub async fn list_running(&self) -> Result<Vec<Task>> {
        self.store.list_running().await.context("listing running tasks")
    }

    pub async fn list_fix_needed(&self) -> Result<Vec<Task>> {
        self.store.list_fix_needed().await.context("listing fix_needed tasks")
    }

    pub async fn stats(&self) -> Result<Stats> {
        self.store.stats().await.context("computing queue stats")
    }

    pub async fn insert_run_meta(&self, run: &RunMeta) -> Result<()> {
        self.store.insert_run_meta(run).await.context("inserting run metadata")
    }

    pub async fn update_run_meta_counters(
        &self,
        run_id: &str,
        total_tasks: i64,
        completed_tasks: i64,
        failed_tasks: i64,
        status: &str,
    ) -> Result<()> {
        self.store
            .update_run_meta_counters(run_id, total_tasks, completed_tasks, failed_tasks, status)
            .await
            .context("updating run metadata")
    }

    /// Record an event both in the durable `agent_log` table and as a line
    /// in a per-task sidecar file under `logs_dir`, matching the original
    /// implementation's dual-write in `log_event` (SPEC_FULL.md §10).
    #[instrument(skip(self, message), err)]
    pub async fn log_event(
        &self,
        worker_id: &str,
        task_id: &str,
        event: &str,
        message: &str,
        tokens_used: i64,
    ) -> Result<()> {
        let record = AgentLogEvent {
            worker_id: worker_id.to_string(),
            task_id: task_id.to_string(),
            event: event.to_string(),
            message: message.to_string(),
            tokens_used,
            timestamp: Utc::now(),
        };
        self.store.append_event(&record).await.context("appending agent log event")?;
        self.write_sidecar_log(task_id, event, message).context("writing sidecar log")?;
        Ok(())
    }

    fn write_sidecar_log(&self, task_id: &str, event: &str, message: &str) -> Result<()> {
        use std::io::Write;
        std::fs::create_dir_all(&self.logs_dir)?;
        let path = self.logs_dir.join(format!("{task_id}.log"));
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "[{}] {event}: {message}", Utc::now().to_rfc3339())?;
        Ok(())
    }
}
