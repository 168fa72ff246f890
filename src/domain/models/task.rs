//! Task domain model.
//!
//! A task is the unit of work the swarm dispatches to worker agents. Tasks
//! form a dependency DAG; the queue (`services::task_queue`) owns all status
//! transitions, this module only owns the shape and the closed status set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Status of a task in the execution pipeline.
///
/// `Done` and `Replaced` are terminal. `Failed` is transient: the queue
/// re-opens it as `Pending` with `retries` incremented, unless that would
/// push `retries` past `MAX_RETRIES`, in which case it is promoted straight
/// to `FixNeeded` (see `services::task_queue::TaskQueue::fail`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Done,
    Failed,
    FixNeeded,
    Replaced,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::FixNeeded => "fix_needed",
            Self::Replaced => "replaced",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            "fix_needed" => Some(Self::FixNeeded),
            "replaced" => Some(Self::Replaced),
            _ => None,
        }
    }

    /// Terminal statuses never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Replaced)
    }

    /// Only `Done` satisfies a dependency; `Failed`/`FixNeeded`/`Replaced`
    /// dependents remain unclaimable (spec.md §4.2 tie-breaking rules).
    pub fn satisfies_dependency(self) -> bool {
        matches!(self, Self::Done)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work tracked by the task store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub title: String,
    pub description: String,
    pub priority: i64,
    pub retries: i64,
    pub depends_on: BTreeSet<String>,
    pub status: TaskStatus,
    pub assigned_worker: Option<String>,
    pub branch_name: Option<String>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Generate a fresh `task-<8 hex>` id, matching the human-legible prefix
    /// convention the original implementation and spec.md both use.
    pub fn new_id() -> String {
        format!("task-{}", &uuid::Uuid::new_v4().simple().to_string()[..8])
    }

    /// Branch name deterministically derived from a task id
    /// (`agent-<first 8 chars of the id>`, spec.md §3).
    pub fn branch_name_for(task_id: &str) -> String {
        let prefix: String = task_id.chars().take(8).collect();
        format!("agent-{prefix}")
    }
}

/// A newly submitted task, prior to being assigned an id and timestamps by
/// the store. Used by `TaskQueue::add`/`add_batch`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTask {
    pub task_id: Option<String>,
    pub title: String,
    pub description: String,
    #[serde(default = "default_priority")]
    pub priority: i64,
    #[serde(default)]
    pub depends_on: BTreeSet<String>,
}

const fn default_priority() -> i64 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_name_derivation_is_deterministic() {
        let id = "task-deadbeef";
        assert_eq!(Task::branch_name_for(id), "agent-task-dea");
    }

    #[test]
    fn status_round_trips_through_str() {
        for s in [
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Done,
            TaskStatus::Failed,
            TaskStatus::FixNeeded,
            TaskStatus::Replaced,
        ] {
            assert_eq!(TaskStatus::from_str(s.as_str()), Some(s));
        }
    }

    #[test]
    fn only_done_satisfies_a_dependency() {
        assert!(TaskStatus::Done.satisfies_dependency());
        assert!(!TaskStatus::FixNeeded.satisfies_dependency());
        assert!(!TaskStatus::Failed.satisfies_dependency());
        assert!(!TaskStatus::Replaced.satisfies_dependency());
    }
}
