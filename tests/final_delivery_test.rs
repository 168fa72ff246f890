//! A full queue drain followed by final archive packaging: every task
//! reaches a terminal state and the manifest inside the delivery archive
//! reports accurate counters.

use codeswarm::application::archive::{self, DeliveryStats};
use codeswarm::domain::models::{RunMeta, TaskStatus};
use codeswarm::infrastructure::database::{connect, Migrator, SqliteTaskStore};
use codeswarm::services::TaskQueue;
use std::io::Read;
use std::sync::Arc;
use tempfile::tempdir;

#[tokio::test]
async fn draining_the_queue_then_packaging_final_delivery_reports_accurate_counters() {
    let pool = connect("sqlite::memory:").await.unwrap();
    Migrator::new(pool.clone()).run_embedded_migrations().await.unwrap();
    let store = Arc::new(SqliteTaskStore::new(pool));
    let workspace = tempdir().unwrap();
    let outputs = tempdir().unwrap();
    let queue = TaskQueue::new(store, workspace.path().to_path_buf(), 3);
    std::fs::write(workspace.path().join("SPEC.md"), "demo spec").unwrap();

    let ok_id = queue.add_task("succeeds", "completes normally", 5).await.unwrap();
    let bad_id = queue.add_task("fails forever", "never completes", 5).await.unwrap();

    queue.claim_task("worker-a").await.unwrap();
    queue.complete(&ok_id, Some("done".into()), TaskStatus::Done).await.unwrap();

    for _ in 0..3 {
        queue.claim_task("worker-b").await.unwrap();
        queue.fail(&bad_id, "boom").await.unwrap();
    }
    let bad_task = queue.get(&bad_id).await.unwrap().unwrap();
    assert_eq!(bad_task.status, TaskStatus::FixNeeded);

    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.running, 0);
    assert_eq!(stats.done, 1);
    assert_eq!(stats.fix_needed, 1);

    let run = RunMeta {
        run_id: "20260101T000000Z".to_string(),
        project_name: "demo project".to_string(),
        spec: "demo spec".to_string(),
        total_tasks: stats.total as i64,
        completed_tasks: stats.done as i64,
        failed_tasks: stats.fix_needed as i64,
        started_at: chrono::Utc::now(),
        status: "complete".to_string(),
    };
    let delivery_stats = DeliveryStats { total: stats.total, done: stats.done, failed: stats.fix_needed };
    let archive_path = archive::package_final_delivery(
        workspace.path(),
        outputs.path(),
        &run,
        &delivery_stats,
        chrono::Utc::now(),
        2,
    )
    .unwrap();

    assert!(archive_path.exists());
    let manifest = read_manifest(&archive_path);
    assert!(manifest.contains("tasks_done: 1"));
    assert!(manifest.contains("tasks_failed: 1"));
    assert!(manifest.contains("workers_used: 2"));
}

fn read_manifest(archive_path: &std::path::Path) -> String {
    let file = std::fs::File::open(archive_path).unwrap();
    let decoder = flate2::read::GzDecoder::new(file);
    let mut archive = tar::Archive::new(decoder);
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        if entry.path().unwrap().to_str() == Some("manifest.txt") {
            let mut contents = String::new();
            entry.read_to_string(&mut contents).unwrap();
            return contents;
        }
    }
    panic!("manifest.txt not found in final delivery archive");
}
