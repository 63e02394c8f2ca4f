//! Async HTTP client for the OpenAI chat completions API.
//!
//! The single point of entry for all model calls in the crate. Wraps the
//! messages endpoint with retry on transient failures and implements the
//! [`ChatProvider`] seam the harness consumes, in both batch and SSE
//! streaming modes.

use crate::api::{ChatProvider, ProviderError, retry, retry::RetryConfig, streaming};
use crate::{ChatRequest, OPENAI_CHAT_URL, UsageInfo};
use async_trait::async_trait;
use serde::Deserialize;
use std::ops::ControlFlow;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

// ── Response types ─────────────────────────────────────────────────

/// Raw API response (internal deserialization target).
#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorBody>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorBody {
    message: String,
}

// ── Client ─────────────────────────────────────────────────────────

/// Async client for the OpenAI chat completions API.
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    retry: RetryConfig,
}

impl OpenAiClient {
    /// Create a new client with the given API key and no retries.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .user_agent("empath-rs/0.2")
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            retry: RetryConfig::default(),
        })
    }

    /// Set the retry configuration for transient failures.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn send(&self, body: &serde_json::Value) -> Result<reqwest::Response, ProviderError> {
        let resp = self
            .client
            .post(OPENAI_CHAT_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            // Prefer the structured error message when the body parses.
            let message = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
                .unwrap_or(text);
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp)
    }

    async fn chat_once(&self, request: &ChatRequest) -> Result<String, ProviderError> {
        debug!(
            "chat request: model={}, messages={}, max_tokens={}, temp={}",
            request.model,
            request.messages.len(),
            request.max_tokens,
            request.temperature,
        );

        let start = Instant::now();
        let body = serde_json::to_value(request)?;
        let resp = self.send(&body).await?;
        let text = resp.text().await?;

        debug!(
            "chat response in {:.1}s ({} bytes)",
            start.elapsed().as_secs_f64(),
            text.len()
        );

        let parsed: RawChatResponse = serde_json::from_str(&text)?;
        if let Some(err) = parsed.error {
            return Err(ProviderError::Api {
                status: 200,
                message: err.message,
            });
        }
        if let Some(ref usage) = parsed.usage {
            debug!(
                "token usage: prompt={}, completion={}",
                usage.prompt_tokens.unwrap_or(0),
                usage.completion_tokens.unwrap_or(0),
            );
        }

        let choice = parsed.choices.and_then(|c| c.into_iter().next());
        if let Some(ref c) = choice
            && let Some(ref reason) = c.finish_reason
        {
            debug!("finish_reason: {reason}");
        }
        choice
            .and_then(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(ProviderError::EmptyContent)
    }
}

#[async_trait]
impl ChatProvider for OpenAiClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String, ProviderError> {
        let mut attempt = 0;
        loop {
            match self.chat_once(request).await {
                Ok(text) => return Ok(text),
                Err(e) if attempt < self.retry.max_retries && retry::is_transient(&e) => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        "chat attempt {} failed ({e}), retrying after {}ms",
                        attempt + 1,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn complete_stream(
        &self,
        request: &ChatRequest,
        on_delta: &mut (dyn for<'a> FnMut(&'a str) -> ControlFlow<()> + Send),
    ) -> Result<(), ProviderError> {
        let mut body = serde_json::to_value(request)?;
        body["stream"] = serde_json::Value::Bool(true);

        debug!(
            "streaming chat request: model={}, messages={}",
            request.model,
            request.messages.len()
        );

        // No retry around streaming: fragments may already have reached the
        // caller's screen, so a replay would duplicate them.
        let resp = self.send(&body).await?;
        streaming::consume_sse(resp, on_delta).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_response_parses_content() {
        let json = r#"{
            "choices": [{"message": {"content": "Hi there."}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 4, "total_tokens": 16}
        }"#;
        let parsed: RawChatResponse = serde_json::from_str(json).unwrap();
        let content = parsed
            .choices
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.message.content)
            .unwrap();
        assert_eq!(content, "Hi there.");
    }

    #[test]
    fn raw_response_tolerates_missing_choices() {
        let json = r#"{"error": {"message": "overloaded"}}"#;
        let parsed: RawChatResponse = serde_json::from_str(json).unwrap();
        assert!(parsed.choices.is_none());
        assert_eq!(parsed.error.unwrap().message, "overloaded");
    }
}
