//! SQLite implementation of the `TaskStore` port, grounded on the teacher's
//! `adapters::sqlite::task_repository::SqliteTaskRepository` — the row
//! shape and the `rows_affected() == 0` CAS idiom are carried over directly.

use crate::domain::models::{AgentLogEvent, RunMeta, Task, TaskStatus};
use crate::domain::ports::errors::StoreError;
use crate::domain::ports::task_store::{Stats, TaskStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::BTreeSet;

#[derive(Clone)]
pub struct SqliteTaskStore {
    pool: SqlitePool,
}

impl SqliteTaskStore {
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    task_id: String,
    title: String,
    description: String,
    priority: i64,
    retries: i64,
    depends_on: String,
    status: String,
    assigned_worker: Option<String>,
    branch_name: Option<String>,
    result: Option<String>,
    error: Option<String>,
    created_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
}

impl TryFrom<TaskRow> for Task {
    type Error = StoreError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let status = TaskStatus::from_str(&row.status)
            .ok_or_else(|| StoreError::Migration(format!("invalid status in row: {}", row.status)))?;
        let depends_on: BTreeSet<String> = serde_json::from_str(&row.depends_on).unwrap_or_default();
        Ok(Self {
            task_id: row.task_id,
            title: row.title,
            description: row.description,
            priority: row.priority,
            retries: row.retries,
            depends_on,
            status,
            assigned_worker: row.assigned_worker,
            branch_name: row.branch_name,
            result: row.result,
            error: row.error,
            created_at: parse_dt(&row.created_at),
            started_at: row.started_at.as_deref().map(parse_dt),
            completed_at: row.completed_at.as_deref().map(parse_dt),
        })
    }
}

fn parse_dt(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn insert(&self, task: &Task) -> Result<bool, StoreError> {
        let depends_on = serde_json::to_string(&task.depends_on).unwrap_or_else(|_| "[]".to_string());
        let result = sqlx::query(
            "INSERT OR IGNORE INTO tasks
                (task_id, title, description, priority, retries, depends_on, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&task.task_id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.priority)
        .bind(task.retries)
        .bind(&depends_on)
        .bind(task.status.as_str())
        .bind(task.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn insert_batch(&self, tasks: &[Task]) -> Result<usize, StoreError> {
        let mut inserted = 0;
        for task in tasks {
            if self.insert(task).await? {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn get(&self, task_id: &str) -> Result<Option<Task>, StoreError> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE task_id = ?")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Task::try_from).transpose()
    }

    async fn list_pending_ordered(&self) -> Result<Vec<Task>, StoreError> {
        self.list_by_status_ordered("pending").await
    }

    async fn list_running(&self) -> Result<Vec<Task>, StoreError> {
        self.list_by_status_ordered("running").await
    }

    async fn list_fix_needed(&self) -> Result<Vec<Task>, StoreError> {
        self.list_by_status_ordered("fix_needed").await
    }

    async fn try_claim(
        &self,
        task_id: &str,
        worker_id: &str,
        branch_name: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE tasks SET status = 'running', assigned_worker = ?, branch_name = ?, started_at = ?
             WHERE task_id = ? AND status = 'pending'",
        )
        .bind(worker_id)
        .bind(branch_name)
        .bind(now.to_rfc3339())
        .bind(task_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn try_complete(
        &self,
        task_id: &str,
        from: TaskStatus,
        to: TaskStatus,
        result: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let row = sqlx::query(
            "UPDATE tasks SET status = ?, result = ?, completed_at = ?
             WHERE task_id = ? AND status = ?",
        )
        .bind(to.as_str())
        .bind(result)
        .bind(now.to_rfc3339())
        .bind(task_id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        Ok(row.rows_affected() == 1)
    }

    async fn try_reopen_as_pending(&self, task_id: &str, error: &str) -> Result<bool, StoreError> {
        let row = sqlx::query(
            "UPDATE tasks SET status = 'pending', error = ?, retries = retries + 1, started_at = NULL
             WHERE task_id = ? AND status = 'running'",
        )
        .bind(error)
        .bind(task_id)
        .execute(&self.pool)
        .await?;

        Ok(row.rows_affected() == 1)
    }

    async fn try_mark_fix_needed(
        &self,
        task_id: &str,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let row = sqlx::query(
            "UPDATE tasks SET status = 'fix_needed', error = ?, completed_at = ?
             WHERE task_id = ? AND status = 'running'",
        )
        .bind(error)
        .bind(now.to_rfc3339())
        .bind(task_id)
        .execute(&self.pool)
        .await?;

        Ok(row.rows_affected() == 1)
    }

    async fn stats(&self) -> Result<Stats, StoreError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM tasks GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut stats = Stats::default();
        for (status, count) in rows {
            let count = count as u64;
            stats.total += count;
            match status.as_str() {
                "pending" => stats.pending = count,
                "running" => stats.running = count,
                "done" => stats.done = count,
                "failed" => stats.failed = count,
                "fix_needed" => stats.fix_needed = count,
                "replaced" => stats.replaced = count,
                _ => {}
            }
        }
        Ok(stats)
    }

    async fn append_event(&self, event: &AgentLogEvent) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO agent_log (worker_id, task_id, event, message, tokens_used, timestamp)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.worker_id)
        .bind(&event.task_id)
        .bind(&event.event)
        .bind(&event.message)
        .bind(event.tokens_used)
        .bind(event.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_run_meta(&self, run: &RunMeta) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO run_meta (run_id, project_name, spec, total_tasks, completed_tasks, failed_tasks, started_at, status)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&run.run_id)
        .bind(&run.project_name)
        .bind(&run.spec)
        .bind(run.total_tasks)
        .bind(run.completed_tasks)
        .bind(run.failed_tasks)
        .bind(run.started_at.to_rfc3339())
        .bind(&run.status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_run_meta_counters(
        &self,
        run_id: &str,
        total_tasks: i64,
        completed_tasks: i64,
        failed_tasks: i64,
        status: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE run_meta SET total_tasks = ?, completed_tasks = ?, failed_tasks = ?, status = ?
             WHERE run_id = ?",
        )
        .bind(total_tasks)
        .bind(completed_tasks)
        .bind(failed_tasks)
        .bind(status)
        .bind(run_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

impl SqliteTaskStore {
    async fn list_by_status_ordered(&self, status: &str) -> Result<Vec<Task>, StoreError> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT * FROM tasks WHERE status = ? ORDER BY priority ASC, created_at ASC",
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Task::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::connection::connect;
    use crate::infrastructure::database::migrations::Migrator;

    async fn setup() -> SqliteTaskStore {
        let pool = connect("sqlite::memory:").await.unwrap();
        Migrator::new(pool.clone())
            .run_embedded_migrations()
            .await
            .unwrap();
        SqliteTaskStore::new(pool)
    }

    fn sample_task(id: &str) -> Task {
        Task {
            task_id: id.to_string(),
            title: "Write hello world".to_string(),
            description: "Write a hello world program".to_string(),
            priority: 5,
            retries: 0,
            depends_on: BTreeSet::new(),
            status: TaskStatus::Pending,
            assigned_worker: None,
            branch_name: None,
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let store = setup().await;
        let task = sample_task("task-1");
        assert!(store.insert(&task).await.unwrap());
        let fetched = store.get("task-1").await.unwrap().unwrap();
        assert_eq!(fetched.title, task.title);
        assert_eq!(fetched.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn duplicate_insert_is_ignored() {
        let store = setup().await;
        let task = sample_task("task-1");
        assert!(store.insert(&task).await.unwrap());
        assert!(!store.insert(&task).await.unwrap());
    }

    #[tokio::test]
    async fn only_one_of_two_concurrent_claims_succeeds() {
        let store = setup().await;
        let task = sample_task("task-1");
        store.insert(&task).await.unwrap();

        let now = Utc::now();
        let first = store.try_claim("task-1", "worker-a", "agent-task-1", now).await.unwrap();
        let second = store.try_claim("task-1", "worker-b", "agent-task-1", now).await.unwrap();

        assert!(first);
        assert!(!second);
    }

    #[tokio::test]
    async fn complete_after_done_is_a_no_op() {
        let store = setup().await;
        let task = sample_task("task-1");
        store.insert(&task).await.unwrap();
        let now = Utc::now();
        store.try_claim("task-1", "worker-a", "agent-task-1", now).await.unwrap();

        let first = store
            .try_complete("task-1", TaskStatus::Running, TaskStatus::Done, Some("ok".into()), now)
            .await
            .unwrap();
        let second = store
            .try_complete("task-1", TaskStatus::Running, TaskStatus::Done, Some("ok".into()), now)
            .await
            .unwrap();

        assert!(first);
        assert!(!second);
        let fetched = store.get("task-1").await.unwrap().unwrap();
        assert_eq!(fetched.status, TaskStatus::Done);
    }

    #[tokio::test]
    async fn reopen_as_pending_increments_retries() {
        let store = setup().await;
        let task = sample_task("task-1");
        store.insert(&task).await.unwrap();
        let now = Utc::now();
        store.try_claim("task-1", "worker-a", "agent-task-1", now).await.unwrap();

        assert!(store.try_reopen_as_pending("task-1", "boom").await.unwrap());
        let fetched = store.get("task-1").await.unwrap().unwrap();
        assert_eq!(fetched.status, TaskStatus::Pending);
        assert_eq!(fetched.retries, 1);
        assert!(fetched.started_at.is_none());
    }
}
