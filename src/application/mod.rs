//! Use-case orchestration: the LLM client, planner, worker pipeline, syntax
//! gates, and archive packaging, all composed on top of `services`/`domain`.

pub mod archive;
pub mod llm_client;
pub mod planner;
pub mod syntax_check;
pub mod worker;

pub use llm_client::LlmClient;
pub use planner::Planner;
pub use worker::Worker;
