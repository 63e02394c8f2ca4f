//! API interaction layer: the provider seam, HTTP client, streaming, and retry.
//!
//! These modules handle everything between the
//! [`StudyHarness`](crate::study::harness::StudyHarness) and the
//! chat-completions API:
//!
//! - [`client`] — [`OpenAiClient`](client::OpenAiClient), the reqwest-based
//!   implementation of [`ChatProvider`] with retry on transient failures.
//! - [`streaming`] — SSE parser for incremental text deltas. The consumer
//!   drives termination through a [`ControlFlow`] callback, which is how the
//!   harness enforces its streaming word cap mid-flight.
//! - [`retry`] — transient error classification (429, 5xx, network timeouts)
//!   with exponential backoff and deterministic jitter. Never retries
//!   400/401 errors.

use crate::ChatRequest;
use async_trait::async_trait;
use std::ops::ControlFlow;
use thiserror::Error;

pub mod client;
pub mod retry;
pub mod streaming;

pub use client::OpenAiClient;
pub use retry::RetryConfig;
pub use streaming::StreamEvent;

// ── Errors ─────────────────────────────────────────────────────────

/// Failure of a provider call. The harness converts all of these into a
/// fixed apologetic reply; they surface in logs, never to participants.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("model returned empty content")]
    EmptyContent,
}

// ── Provider seam ──────────────────────────────────────────────────

/// Chat-completion provider as the harness sees it: an ordered list of
/// role-tagged messages in, plain text out. No provider-specific metadata
/// crosses this boundary.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Send a request and return the complete reply text.
    async fn complete(&self, request: &ChatRequest) -> Result<String, ProviderError>;

    /// Send a streaming request, invoking `on_delta` for each text fragment
    /// as it arrives. Returning [`ControlFlow::Break`] from the callback
    /// terminates consumption early; fragments already delivered stand, the
    /// rest of the stream is abandoned.
    async fn complete_stream(
        &self,
        request: &ChatRequest,
        on_delta: &mut (dyn for<'a> FnMut(&'a str) -> ControlFlow<()> + Send),
    ) -> Result<(), ProviderError>;
}
