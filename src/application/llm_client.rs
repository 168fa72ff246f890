//! Thin client over the OpenAI-compatible chat completions endpoint shared
//! by the planner, worker, and reconciler roles, grounded on their
//! near-identical `call_api` methods.

use crate::domain::ports::errors::LlmError;
use crate::infrastructure::FileRateLimiter;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    rate_limiter: FileRateLimiter,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageOwned,
}

#[derive(Deserialize)]
struct ChatMessageOwned {
    content: String,
}

impl LlmClient {
    pub fn new(base_url: String, api_key: String, rate_limiter: FileRateLimiter, timeout: Duration) -> Self {
        let http = reqwest::Client::builder().timeout(timeout).build().expect("building http client");
        Self { http, base_url, api_key, rate_limiter }
    }

    /// Reserve a rate-limit slot, call the endpoint, and strip `<think>`
    /// reasoning tags the model includes inline in its response.
    pub async fn complete(&self, model: &str, system: &str, user: &str, max_tokens: u32) -> Result<String, LlmError> {
        self.rate_limiter.acquire().await.map_err(|e| LlmError::MalformedResponse(e.to_string()))?;

        let request = ChatRequest {
            model,
            max_tokens,
            messages: vec![ChatMessage { role: "system", content: system }, ChatMessage { role: "user", content: user }],
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::BadStatus { status, body });
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::MalformedResponse("empty choices array".to_string()))?
            .message
            .content;

        Ok(strip_think_tags(&content).trim().to_string())
    }
}

fn strip_think_tags(content: &str) -> String {
    let mut result = String::with_capacity(content.len());
    let mut rest = content;
    loop {
        let Some(start) = rest.find("<think>") else {
            result.push_str(rest);
            break;
        };
        result.push_str(&rest[..start]);
        rest = &rest[start + "<think>".len()..];
        match rest.find("</think>") {
            Some(end) => rest = &rest[end + "</think>".len()..],
            None => break,
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_a_single_think_block() {
        let raw = "<think>reasoning here</think>final answer";
        assert_eq!(strip_think_tags(raw), "final answer");
    }

    #[test]
    fn leaves_content_without_think_tags_untouched() {
        assert_eq!(strip_think_tags("plain text"), "plain text");
    }

    #[test]
    fn strips_multiple_think_blocks() {
        let raw = "<think>a</think>one<think>b</think>two";
        assert_eq!(strip_think_tags(raw), "onetwo");
    }
}
