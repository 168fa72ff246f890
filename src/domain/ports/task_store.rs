//! The task store port (C1): durable persistence primitives only. All retry
//! caps, rework synthesis, and other policy live in `services::task_queue`
//! (C2), which is the sole consumer of this trait.

use super::errors::StoreError;
use crate::domain::models::{AgentLogEvent, RunMeta, Task, TaskStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Snapshot of queue counters, spec.md §4.2 `stats()`.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct Stats {
    pub pending: u64,
    pub running: u64,
    pub done: u64,
    pub failed: u64,
    pub fix_needed: u64,
    pub replaced: u64,
    pub total: u64,
}

/// Durable storage for tasks, the event log, and run metadata.
///
/// Every mutator here is a single conditional UPDATE or INSERT — no method
/// spans more than one statement against the store, so no transaction is
/// ever held open across other I/O (spec.md §4.1).
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a task in `Pending` status. Idempotent on `task_id` collision
    /// — returns `false` without error if a row with this id already exists.
    async fn insert(&self, task: &Task) -> Result<bool, StoreError>;

    /// Insert many tasks; conflicts on individual ids are ignored the same
    /// way as `insert`. Returns the number actually inserted.
    async fn insert_batch(&self, tasks: &[Task]) -> Result<usize, StoreError>;

    async fn get(&self, task_id: &str) -> Result<Option<Task>, StoreError>;

    /// All `Pending` tasks ordered `(priority ASC, created_at ASC)`. The
    /// caller (the queue) filters this down to the claimable subset.
    async fn list_pending_ordered(&self) -> Result<Vec<Task>, StoreError>;

    async fn list_running(&self) -> Result<Vec<Task>, StoreError>;

    async fn list_fix_needed(&self) -> Result<Vec<Task>, StoreError>;

    /// `UPDATE tasks SET status='running', assigned_worker=?, branch_name=?,
    /// started_at=? WHERE task_id=? AND status='pending'`. Returns whether
    /// the row was affected — the sole synchronization primitive between
    /// competing workers (spec.md §4.2).
    async fn try_claim(
        &self,
        task_id: &str,
        worker_id: &str,
        branch_name: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Conditional transition `from` -> `to`, setting `result`/`completed_at`.
    /// Used both for the worker's `Running` -> `Done` completion and the
    /// reconciler's `FixNeeded` -> `Replaced` rework-promotion, each CAS'd on
    /// the appropriate source state so a stale caller's write is a no-op.
    async fn try_complete(
        &self,
        task_id: &str,
        from: TaskStatus,
        to: TaskStatus,
        result: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// `Running` -> `Pending`, `retries += 1`, `started_at` cleared. CAS'd on
    /// `status='running'` so a late stall-reset doesn't race a fresh claim.
    async fn try_reopen_as_pending(&self, task_id: &str, error: &str) -> Result<bool, StoreError>;

    /// `Running` -> `FixNeeded`, sets `error`/`completed_at`.
    async fn try_mark_fix_needed(
        &self,
        task_id: &str,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn stats(&self) -> Result<Stats, StoreError>;

    async fn append_event(&self, event: &AgentLogEvent) -> Result<(), StoreError>;

    async fn insert_run_meta(&self, run: &RunMeta) -> Result<(), StoreError>;

    async fn update_run_meta_counters(
        &self,
        run_id: &str,
        total_tasks: i64,
        completed_tasks: i64,
        failed_tasks: i64,
        status: &str,
    ) -> Result<(), StoreError>;
}
