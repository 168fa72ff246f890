//! `.tar.gz` archive packaging, grounded on `WorkerAgent.package_output`
//! (per-task deliverable) and `main.package_final_delivery` (whole-run
//! deliverable). Both read committed content rather than the live working
//! tree, so a concurrent branch checkout in another worker can't race a
//! read mid-archive.

use crate::domain::models::RunMeta;
use crate::infrastructure::GitWorkspace;
use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use std::path::{Path, PathBuf};
use tar::{Builder, Header};

/// Package one task's written files, read from `main` via `git show`, into
/// `outputs_dir/<first 8 of task_id>-<worker_id>-<timestamp>.tar.gz`.
pub async fn package_task_output(
    workspace: &GitWorkspace,
    outputs_dir: &Path,
    task_id: &str,
    worker_id: &str,
    written_files: &[String],
    timestamp: &str,
) -> Result<PathBuf> {
    std::fs::create_dir_all(outputs_dir)?;
    let short_id: String = task_id.chars().take(8).collect();
    let archive_path = outputs_dir.join(format!("{short_id}-{worker_id}-{timestamp}.tar.gz"));

    let file = std::fs::File::create(&archive_path)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = Builder::new(encoder);

    for relative_path in written_files {
        if let Some(content) = workspace.read_from_main(relative_path).await? {
            let mut header = Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, relative_path, content.as_slice())
                .with_context(|| format!("adding {relative_path} to task archive"))?;
        }
    }

    builder.into_inner()?.finish()?;
    Ok(archive_path)
}

/// Queue counters the manifest embeds alongside run metadata.
pub struct DeliveryStats {
    pub total: u64,
    pub done: u64,
    pub failed: u64,
}

/// Package the entire workspace (minus `.git`) as the final delivery
/// archive, with a `manifest.txt` embedded at the archive root, matching
/// `package_final_delivery`'s exact field list and filename algorithm.
pub fn package_final_delivery(
    workspace_root: &Path,
    outputs_dir: &Path,
    run: &RunMeta,
    stats: &DeliveryStats,
    end_time: chrono::DateTime<chrono::Utc>,
    total_workers_spawned: u32,
) -> Result<PathBuf> {
    std::fs::create_dir_all(outputs_dir)?;

    let timestamp = end_time.format("%Y%m%dT%H%M%SZ").to_string();
    let safe_name = RunMeta::safe_project_name(&run.project_name);
    let archive_path = outputs_dir.join(format!("{safe_name}-final-{timestamp}.tar.gz"));

    let duration_seconds = (end_time - run.started_at).num_seconds().max(0);
    let manifest = format!(
        "run_id: {}\n\
         project: {}\n\
         task_count: {}\n\
         tasks_done: {}\n\
         tasks_failed: {}\n\
         workers_used: {}\n\
         start_time: {}\n\
         end_time: {}\n\
         duration_seconds: {}\n",
        run.run_id,
        run.project_name,
        stats.total,
        stats.done,
        stats.failed,
        total_workers_spawned,
        run.started_at.to_rfc3339(),
        end_time.to_rfc3339(),
        duration_seconds,
    );

    let file = std::fs::File::create(&archive_path)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = Builder::new(encoder);

    let manifest_bytes = manifest.into_bytes();
    let mut header = Header::new_gnu();
    header.set_size(manifest_bytes.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, "manifest.txt", manifest_bytes.as_slice())?;

    append_directory(&mut builder, workspace_root, workspace_root)?;
    builder.into_inner()?.finish()?;

    Ok(archive_path)
}

fn append_directory<W: Write>(builder: &mut Builder<W>, root: &Path, dir: &Path) -> Result<()> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)?.filter_map(std::result::Result::ok).collect();
    entries.sort_by_key(std::fs::DirEntry::path);

    for entry in entries {
        let path = entry.path();
        if path.file_name().and_then(|n| n.to_str()) == Some(".git") {
            continue;
        }
        if path.is_dir() {
            append_directory(builder, root, &path)?;
        } else {
            let relative = path.strip_prefix(root)?;
            builder.append_path_with_name(&path, relative)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn final_delivery_archive_contains_a_manifest() {
        let workspace = tempdir().unwrap();
        std::fs::write(workspace.path().join("SPEC.md"), "spec").unwrap();
        let outputs = tempdir().unwrap();

        let run = RunMeta {
            run_id: "20260101T000000Z".to_string(),
            project_name: "demo project".to_string(),
            spec: "spec".to_string(),
            total_tasks: 1,
            completed_tasks: 1,
            failed_tasks: 0,
            started_at: chrono::Utc::now(),
            status: "done".to_string(),
        };
        let stats = DeliveryStats { total: 1, done: 1, failed: 0 };

        let archive = package_final_delivery(
            workspace.path(),
            outputs.path(),
            &run,
            &stats,
            chrono::Utc::now(),
            2,
        )
        .unwrap();

        assert!(archive.exists());
        assert!(archive.file_name().unwrap().to_string_lossy().starts_with("demo_project-final-"));
    }
}
