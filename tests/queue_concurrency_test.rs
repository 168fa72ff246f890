//! Cross-process claim race and dependency gating, exercised against the
//! real `SqliteTaskStore` + `TaskQueue` stack rather than the in-module unit
//! tests' narrower setups.

use codeswarm::domain::models::{NewTask, TaskStatus};
use codeswarm::infrastructure::database::{connect, Migrator, SqliteTaskStore};
use codeswarm::services::TaskQueue;
use std::sync::Arc;
use tempfile::tempdir;

async fn setup() -> (Arc<TaskQueue>, tempfile::TempDir) {
    let pool = connect("sqlite::memory:").await.unwrap();
    Migrator::new(pool.clone()).run_embedded_migrations().await.unwrap();
    let store = Arc::new(SqliteTaskStore::new(pool));
    let dir = tempdir().unwrap();
    (Arc::new(TaskQueue::new(store, dir.path().to_path_buf(), 3)), dir)
}

#[tokio::test]
async fn two_workers_racing_for_one_task_only_one_wins() {
    let (queue, _dir) = setup().await;
    queue.add_task("solo", "only one task in the queue", 5).await.unwrap();

    let a = queue.clone();
    let b = queue.clone();
    let (claimed_a, claimed_b) = tokio::join!(
        async move { a.claim_task("worker-a").await.unwrap() },
        async move { b.claim_task("worker-b").await.unwrap() },
    );

    let winners = [claimed_a, claimed_b].into_iter().flatten().count();
    assert_eq!(winners, 1, "exactly one of the two racing claims should have won");

    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.running, 1);
    assert_eq!(stats.pending, 0);
}

#[tokio::test]
async fn a_chain_of_dependencies_unlocks_one_stage_at_a_time() {
    let (queue, _dir) = setup().await;
    let first = queue.add_task("stage one", "root of the chain", 5).await.unwrap();
    queue
        .add_tasks_batch(vec![NewTask {
            task_id: None,
            title: "stage two".into(),
            description: "depends on stage one".into(),
            priority: 5,
            depends_on: [first.clone()].into_iter().collect(),
        }])
        .await
        .unwrap();

    // Nothing but stage one is ready yet.
    let ready = queue.get_ready_tasks().await.unwrap();
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].task_id, first);

    queue.claim_task("worker-a").await.unwrap();
    queue.complete(&first, Some("ok".into()), TaskStatus::Done).await.unwrap();

    let ready = queue.get_ready_tasks().await.unwrap();
    assert_eq!(ready.len(), 1);
    assert_ne!(ready[0].task_id, first);
}
