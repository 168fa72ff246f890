//! Event log record — the append-only audit trail (spec.md §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of the `agent_log` table. Never mutated after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLogEvent {
    pub worker_id: String,
    pub task_id: String,
    pub event: String,
    pub message: String,
    pub tokens_used: i64,
    pub timestamp: DateTime<Utc>,
}

/// Open vocabulary of event kinds a worker or the reconciler can log.
/// Not exhaustive — `log_event` accepts any string — but these are the
/// ones this crate itself emits, named here so call sites don't typo them.
pub mod kind {
    pub const STARTED: &str = "started";
    pub const DONE: &str = "done";
    pub const ERROR: &str = "error";
    pub const CONFLICT: &str = "conflict";
    pub const STALLED: &str = "stalled";
    pub const FIX_CREATED: &str = "fix_created";
    pub const FATAL: &str = "fatal";
}
