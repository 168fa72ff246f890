//! Run metadata — one row per swarm invocation (spec.md §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMeta {
    pub run_id: String,
    pub project_name: String,
    pub spec: String,
    pub total_tasks: i64,
    pub completed_tasks: i64,
    pub failed_tasks: i64,
    pub started_at: DateTime<Utc>,
    pub status: String,
}

impl RunMeta {
    /// Derive the run id the way the original implementation does: an
    /// ISO-Z timestamp taken at swarm start (SPEC_FULL.md §10).
    pub fn new_run_id(now: DateTime<Utc>) -> String {
        now.format("%Y%m%dT%H%M%SZ").to_string()
    }

    /// Truncate-and-sanitize a project name for use in a filename, matching
    /// the original implementation's `project_name[:30]` + path-unsafe
    /// character replacement (SPEC_FULL.md §10).
    pub fn safe_project_name(raw: &str) -> String {
        raw.chars()
            .take(30)
            .map(|c| if c == ' ' || c == '/' { '_' } else { c })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_project_name_truncates_and_sanitizes() {
        let raw = "Build a web scraper/CLI tool with lots of extra words past thirty chars";
        let safe = RunMeta::safe_project_name(raw);
        assert_eq!(safe.chars().count(), 30);
        assert!(!safe.contains(' '));
        assert!(!safe.contains('/'));
    }
}
