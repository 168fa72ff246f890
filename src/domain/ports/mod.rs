//! Port traits: the boundaries `services`/`application` code against, with
//! concrete implementations living in `infrastructure`.

pub mod errors;
pub mod task_store;

pub use errors::{ConfigError, LlmError, RateLimiterError, StoreError, SyntaxCheckError, WorkspaceError};
pub use task_store::{Stats, TaskStore};
