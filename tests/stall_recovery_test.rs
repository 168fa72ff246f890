//! A worker that stalls past the configured timeout gets its task reset by
//! the reconciler, and a subsequent completion from the original worker is a
//! no-op — the idempotence property the stall-recovery scenario depends on.

use codeswarm::domain::models::TaskStatus;
use codeswarm::infrastructure::database::{connect, Migrator, SqliteTaskStore};
use codeswarm::reconciler::Reconciler;
use codeswarm::services::TaskQueue;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

#[tokio::test]
async fn stale_completion_after_a_stall_reset_is_a_no_op() {
    let pool = connect("sqlite::memory:").await.unwrap();
    Migrator::new(pool.clone()).run_embedded_migrations().await.unwrap();
    let store = Arc::new(SqliteTaskStore::new(pool));
    let dir = tempdir().unwrap();
    let queue = Arc::new(TaskQueue::new(store, dir.path().to_path_buf(), 3));
    let reconciler = Reconciler::new(queue.clone(), dir.path().to_path_buf(), Duration::from_secs(0));

    let task_id = queue.add_task("long runner", "a worker that never checks back in", 5).await.unwrap();
    queue.claim_task("worker-a").await.unwrap();

    let report = reconciler.run_once().await.unwrap();
    assert_eq!(report.stalled_reset, 1);

    let task = queue.get(&task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.retries, 1);

    // The original worker, unaware it was reset, tries to complete its
    // now-stale claim. The CAS on `status = running` matches no row.
    let applied = queue.complete(&task_id, Some("finished eventually".into()), TaskStatus::Done).await.unwrap();
    assert!(!applied, "a completion against a reopened task must be rejected");

    let task = queue.get(&task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
}
