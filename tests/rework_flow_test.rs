//! End-to-end rework handoff: a merge conflict routes a task to
//! `fix_needed`, the reconciler promotes it to `replaced` and spawns a fix
//! task, and the fix task is claimable and completable like any other.

use codeswarm::domain::models::TaskStatus;
use codeswarm::infrastructure::database::{connect, Migrator, SqliteTaskStore};
use codeswarm::infrastructure::GitWorkspace;
use codeswarm::reconciler::Reconciler;
use codeswarm::services::TaskQueue;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

#[tokio::test]
async fn a_merge_conflict_is_replaced_by_a_claimable_fix_task() {
    let pool = connect("sqlite::memory:").await.unwrap();
    Migrator::new(pool.clone()).run_embedded_migrations().await.unwrap();
    let store = Arc::new(SqliteTaskStore::new(pool));
    let dir = tempdir().unwrap();
    let queue = Arc::new(TaskQueue::new(store, dir.path().to_path_buf(), 3));
    let workspace = GitWorkspace::new(dir.path());
    workspace.init_if_needed().await.unwrap();

    let task_id = queue.add_task("touch shared file", "writes config.txt", 5).await.unwrap();
    let task = queue.claim_task("worker-a").await.unwrap().unwrap();
    let branch = task.branch_name.clone().unwrap();

    workspace.setup_branch(&branch).await.unwrap();
    std::fs::write(dir.path().join("config.txt"), "from the task branch\n").unwrap();
    let merged = workspace.commit_and_merge(&branch, "task: touch shared file").await.unwrap();
    assert!(merged, "first write to a clean workspace should merge cleanly");
    queue.complete(&task_id, Some("wrote config.txt".into()), TaskStatus::Done).await.unwrap();

    // A second task touches `main` directly (simulating a concurrent
    // writer) so the next branch's merge conflicts.
    std::fs::write(dir.path().join("config.txt"), "changed on main in the meantime\n").unwrap();
    let second_id = queue.add_task("touch shared file again", "also writes config.txt", 5).await.unwrap();
    let second_task = queue.claim_task("worker-b").await.unwrap().unwrap();
    let second_branch = second_task.branch_name.clone().unwrap();
    workspace.setup_branch(&second_branch).await.unwrap();
    std::fs::write(dir.path().join("config.txt"), "from the second task branch\n").unwrap();
    let merged = workspace.commit_and_merge(&second_branch, "task: touch shared file again").await.unwrap();
    assert!(!merged, "conflicting writes to the same file should fail to merge");
    queue.mark_fix_needed(&second_id, "merge conflict").await.unwrap();

    let reconciler = Reconciler::new(queue.clone(), dir.path().to_path_buf(), Duration::from_secs(300));
    let report = reconciler.run_once().await.unwrap();
    assert_eq!(report.fixes_created, 1);

    let original = queue.get(&second_id).await.unwrap().unwrap();
    assert_eq!(original.status, TaskStatus::Replaced);

    let ready = queue.get_ready_tasks().await.unwrap();
    assert_eq!(ready.len(), 1);
    assert!(ready[0].title.starts_with("Fix:"));

    let fix_task = queue.claim_task("worker-c").await.unwrap().unwrap();
    assert!(queue.complete(&fix_task.task_id, Some("resolved".into()), TaskStatus::Done).await.unwrap());
}
