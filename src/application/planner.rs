//! Planner (spec.md's upfront task decomposition step): turns a project
//! specification into an initial task batch via one LLM call, grounded on
//! `PlannerAgent.plan`/`PlannerAgent.run`.

use crate::application::llm_client::LlmClient;
use crate::domain::models::NewTask;
use crate::services::TaskQueue;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

const SYSTEM_PROMPT: &str = "You are a software project planner. Decompose the given \
specification into a flat list of small, independently completable coding tasks. \
Respond with a JSON array only, no prose.";

#[derive(Debug, Deserialize)]
struct PlannedTask {
    title: String,
    description: String,
    #[serde(default = "default_priority")]
    priority: i64,
    #[serde(default)]
    depends_on: Vec<String>,
}
const fn default_priority() -> i64 {
    5
}

const MAX_PLANNED_TASKS: usize = 20;

pub struct Planner {
    llm: LlmClient,
    model: String,
}

impl Planner {
    pub const fn new(llm: LlmClient, model: String) -> Self {
        Self { llm, model }
    }

    /// Write `SPEC.md` into the workspace, ask the model for a task list,
    /// write `FEATURES.json` alongside it, and enqueue the tasks.
    pub async fn run(&self, queue: &TaskQueue, workspace: &Path, spec_content: &str) -> Result<usize> {
        std::fs::create_dir_all(workspace)?;
        std::fs::write(workspace.join("SPEC.md"), spec_content).context("writing SPEC.md")?;

        let tasks = self.plan(spec_content).await?;
        let features_json = serde_json::to_string_pretty(&tasks).context("serializing FEATURES.json")?;
        std::fs::write(workspace.join("FEATURES.json"), features_json).context("writing FEATURES.json")?;

        let new_tasks: Vec<NewTask> = tasks
            .into_iter()
            .take(MAX_PLANNED_TASKS)
            .map(|t| NewTask {
                task_id: None,
                title: t.title,
                description: t.description,
                priority: t.priority,
                depends_on: t.depends_on.into_iter().collect(),
            })
            .collect();

        let count = new_tasks.len();
        queue.add_tasks_batch(new_tasks).await?;
        Ok(count)
    }

    async fn plan(&self, spec_content: &str) -> Result<Vec<PlannedTask>> {
        let user_prompt = format!(
            "Project specification:\n\n{spec_content}\n\nGenerate a task list that \
             implements this project. Output ONLY a JSON array of tasks, no other text.\n\n\
             Rules:\n- Maximum {MAX_PLANNED_TASKS} tasks\n- Each task completable in under 5 minutes\n\
             - priority 1 = first (structure, config), priority 9 = last (testing, integration)"
        );

        let response = self.llm.complete(&self.model, SYSTEM_PROMPT, &user_prompt, 4000).await?;
        parse_task_list(&response).context("parsing planner response")
    }
}

/// Extract the first top-level JSON array found in the response, the same
/// forgiving strategy as the original's regex-based extraction (models
/// sometimes wrap the array in commentary despite instructions).
fn parse_task_list(response: &str) -> Result<Vec<PlannedTask>> {
    let start = response.find('[').context("no JSON array found in planner response")?;
    let end = response.rfind(']').context("no JSON array found in planner response")?;
    anyhow::ensure!(end > start, "malformed JSON array in planner response");
    serde_json::from_str(&response[start..=end]).context("invalid JSON in planner response")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_array_from_response_with_surrounding_prose() {
        let response = "Sure, here you go:\n[{\"title\":\"a\",\"description\":\"b\"}]\nDone.";
        let tasks = parse_task_list(response).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "a");
        assert_eq!(tasks[0].priority, 5);
    }

    #[test]
    fn rejects_a_response_with_no_array() {
        assert!(parse_task_list("no json here").is_err());
    }
}
