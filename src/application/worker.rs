//! Worker execution pipeline (C5): claim a task, generate its code via the
//! LLM, write and syntax-check the result, commit and merge, package
//! output. Grounded end-to-end on `WorkerAgent.execute_task`/`run`.

use crate::application::archive::package_task_output;
use crate::application::llm_client::LlmClient;
use crate::application::syntax_check;
use crate::domain::models::{kind, Task, TaskStatus};
use crate::domain::ports::errors::WorkspaceError;
use crate::infrastructure::GitWorkspace;
use crate::services::TaskQueue;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const SYSTEM_PROMPT: &str = "You are a software engineer completing one task in a larger \
project. Write complete, working code with no placeholders or TODOs. Respond with a single \
JSON object only.";

#[derive(Debug, Deserialize, Default)]
struct WorkerResponse {
    #[serde(default)]
    files: Vec<WrittenFile>,
    #[serde(default)]
    summary: String,
    #[serde(default = "default_tokens_estimate")]
    tokens_estimate: i64,
}

/// Fallback token estimate when the model's response can't be parsed as
/// structured JSON at all, matching the original's degenerate-parse fallback.
const fn default_tokens_estimate() -> i64 {
    500
}

#[derive(Debug, Deserialize)]
struct WrittenFile {
    path: String,
    #[serde(default)]
    content: String,
}

pub struct Worker {
    worker_id: String,
    llm: LlmClient,
    model: String,
    workspace: GitWorkspace,
    outputs_dir: PathBuf,
}

impl Worker {
    pub fn new(worker_id: String, llm: LlmClient, model: String, workspace: GitWorkspace, outputs_dir: PathBuf) -> Self {
        Self { worker_id, llm, model, workspace, outputs_dir }
    }

    /// Claim-and-execute loop: runs until no task is ready for this worker,
    /// matching `WorkerAgent.run`'s drain-to-completion behavior.
    pub async fn run(&self, queue: &TaskQueue) -> Result<u32> {
        let mut completed = 0;
        loop {
            let Some(task) = queue.claim_task(&self.worker_id).await? else {
                break;
            };
            self.execute_task(queue, &task).await?;
            completed += 1;
        }
        Ok(completed)
    }

    async fn execute_task(&self, queue: &TaskQueue, task: &Task) -> Result<()> {
        queue.log_event(&self.worker_id, &task.task_id, kind::STARTED, &format!("Task: {}", task.title), 0).await?;

        let branch_name = task.branch_name.clone().unwrap_or_else(|| Task::branch_name_for(&task.task_id));
        self.workspace.init_if_needed().await?;
        self.workspace.setup_branch(&branch_name).await?;

        match self.run_generation_and_merge(queue, task, &branch_name).await {
            Ok(()) => Ok(()),
            Err(err) => {
                let message = truncate(&err.to_string(), 500);
                queue.log_event(&self.worker_id, &task.task_id, kind::ERROR, &truncate(&err.to_string(), 200), 0).await?;
                queue.fail(&task.task_id, &message).await?;
                Ok(())
            }
        }
    }

    async fn run_generation_and_merge(&self, queue: &TaskQueue, task: &Task, branch_name: &str) -> Result<()> {
        let spec = std::fs::read_to_string(self.workspace.root().join("SPEC.md")).unwrap_or_default();
        let features = std::fs::read_to_string(self.workspace.root().join("FEATURES.json")).unwrap_or_else(|_| "[]".to_string());
        let tree = workspace_tree(self.workspace.root(), 2);

        let user_prompt = format!(
            "Task: {}\n\nDescription: {}\n\nProject Specification:\n{spec}\n\n\
             Current File Tree:\n{tree}\n\nAll Tasks (FEATURES.json):\n{features}\n\n\
             Execute this task. Write complete, working code. No placeholders or TODOs.\n\n\
             Output your response as a JSON object:\n\
             {{\"files\": [{{\"path\": \"relative/path\", \"content\": \"full file content\"}}], \
             \"summary\": \"one sentence of what was done\"}}\n\n\
             Only create files relevant to your task.",
            task.title, task.description,
        );

        let response = self.llm.complete(&self.model, SYSTEM_PROMPT, &user_prompt, 4000).await?;
        let parsed = parse_response(&response);

        let mut written = Vec::new();
        for file in &parsed.files {
            self.write_and_check_file(file).await?;
            written.push(file.path.clone());
        }

        let commit_message = format!("task: {}", task.title);
        let merged = self.workspace.commit_and_merge(branch_name, &commit_message).await?;

        if !merged {
            queue.log_event(&self.worker_id, &task.task_id, kind::CONFLICT, "Merge conflict", 0).await?;
            queue.mark_fix_needed(&task.task_id, "Merge conflict").await?;
            return Ok(());
        }

        let timestamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
        let archive = package_task_output(
            &self.workspace,
            &self.outputs_dir,
            &task.task_id,
            &self.worker_id,
            &written,
            &timestamp,
        )
        .await?;

        queue
            .log_event(&self.worker_id, &task.task_id, kind::DONE, &parsed.summary, parsed.tokens_estimate)
            .await?;
        let result_json = serde_json::json!({
            "files": written,
            "summary": parsed.summary,
            "tokens_estimate": parsed.tokens_estimate,
            "archive": archive.to_string_lossy(),
        })
        .to_string();
        queue.complete(&task.task_id, Some(result_json), TaskStatus::Done).await?;

        Ok(())
    }

    async fn write_and_check_file(&self, file: &WrittenFile) -> Result<()> {
        if file.path.is_empty() {
            return Ok(());
        }
        let relative = validate_relative_path(&file.path)?;
        let full_path = self.workspace.root().join(&relative);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&full_path, &file.content)?;

        syntax_check::check_file(self.workspace.root(), &file.path)
            .await
            .with_context(|| format!("syntax check failed for {}", file.path))?;
        Ok(())
    }
}

/// Reject any path that would escape the workspace root via `..` or an
/// absolute path (the original implementation trusts the model's output
/// unconditionally; this crate does not).
fn validate_relative_path(path: &str) -> Result<PathBuf, WorkspaceError> {
    let candidate = Path::new(path);
    if candidate.is_absolute() || candidate.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
        return Err(WorkspaceError::PathEscapesWorkspace(path.to_string()));
    }
    Ok(candidate.to_path_buf())
}

fn workspace_tree(root: &Path, max_depth: usize) -> String {
    let mut entries = Vec::new();
    collect_tree(root, root, max_depth, &mut entries);
    if entries.is_empty() {
        "(empty)".to_string()
    } else {
        entries.join("\n")
    }
}

fn collect_tree(root: &Path, dir: &Path, max_depth: usize, out: &mut Vec<String>) {
    let Ok(read_dir) = std::fs::read_dir(dir) else { return };
    for entry in read_dir.filter_map(std::result::Result::ok) {
        let path = entry.path();
        if path.file_name().and_then(|n| n.to_str()) == Some(".git") {
            continue;
        }
        if path.is_dir() {
            collect_tree(root, &path, max_depth, out);
        } else if let Ok(relative) = path.strip_prefix(root) {
            if relative.components().count() <= max_depth {
                out.push(relative.to_string_lossy().to_string());
            }
        }
    }
}

/// Parse the model's JSON response, tolerating markdown code fences and
/// stray prose the way `WorkerAgent.parse_response` does, falling back to a
/// files-less summary object rather than erroring.
fn parse_response(response: &str) -> WorkerResponse {
    let cleaned = response.trim();
    let without_fence = strip_code_fence(cleaned);

    let bracket = without_fence.find('[');
    let brace = without_fence.find('{');
    let start = match (bracket, brace) {
        (Some(b), Some(c)) => Some(b.min(c)),
        (Some(b), None) => Some(b),
        (None, Some(c)) => Some(c),
        (None, None) => None,
    };

    if let Some(start) = start {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&without_fence[start..]) {
            let object = if value.is_array() { value.get(0).cloned().unwrap_or(serde_json::Value::Null) } else { value };
            if let Ok(parsed) = serde_json::from_value::<WorkerResponse>(object) {
                return parsed;
            }
        }
    }

    WorkerResponse { files: Vec::new(), summary: truncate(cleaned, 500), tokens_estimate: default_tokens_estimate() }
}

fn strip_code_fence(text: &str) -> String {
    if let Some(start) = text.find("```") {
        let after = &text[start + 3..];
        let after = after.strip_prefix("json").unwrap_or(after);
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }
    text.to_string()
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
