//! Leaf error enums for each component boundary, `thiserror`-derived per the
//! teacher's `domain::error` convention. Application call sites compose
//! these with `anyhow::Context`.

use thiserror::Error;

/// Errors from the task store (C1) and the queue policy layer (C2).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("task not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(String),
}

/// Errors from the cross-process rate limiter (C3).
#[derive(Debug, Error)]
pub enum RateLimiterError {
    #[error("failed to acquire advisory lock on {path}: {source}")]
    Lock {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read or write rate limiter state: {0}")]
    State(#[from] std::io::Error),
}

/// Errors from the workspace guard (C4).
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("git command failed: {command} — {stderr}")]
    GitFailed { command: String, stderr: String },

    #[error("failed to acquire workspace lock: {0}")]
    Lock(#[source] std::io::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("path escapes the workspace: {0}")]
    PathEscapesWorkspace(String),
}

/// Errors from the worker's syntax gate (C5 step 6).
#[derive(Debug, Error)]
pub enum SyntaxCheckError {
    #[error("syntax error in {path}: {detail}")]
    Invalid { path: String, detail: String },
}

/// Errors calling the external LLM endpoint.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("non-2xx response: {status} — {body}")]
    BadStatus {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("malformed response body: {0}")]
    MalformedResponse(String),
}

/// Errors loading/validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {value} — {reason}")]
    Invalid {
        field: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("failed to load configuration: {0}")]
    Load(#[from] figment::Error),
}
