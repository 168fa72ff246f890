//! Autonomous multi-agent code-generation swarm: a durable task queue, a
//! git-isolated worker pipeline, cross-process rate limiting, and a
//! reconciliation loop, composed as a single binary that re-execs itself
//! as worker subprocesses.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod reconciler;
pub mod services;
pub mod supervisor;
