//! Server-Sent Events (SSE) streaming for the chat completions API.
//!
//! Parses `data:` lines from a streaming response into [`StreamEvent`]
//! values and feeds text deltas to a consumer callback. The callback returns
//! [`ControlFlow`], so a consumer can terminate the stream mid-flight; this
//! is how the harness stops a reply shortly after it crosses the word cap
//! instead of paying for the full generation.

use crate::UsageInfo;
use crate::api::ProviderError;
use serde::Deserialize;
use std::ops::ControlFlow;
use tracing::{debug, warn};

/// A single event from an SSE stream.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// An incremental text content delta.
    TextDelta(String),
    /// Token usage information (sent in the final chunk, if at all).
    Usage(UsageInfo),
    /// The stream is complete.
    Done,
}

/// Raw SSE data chunk from the API.
#[derive(Deserialize, Debug)]
struct StreamChunk {
    choices: Option<Vec<StreamChoice>>,
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct StreamChoice {
    delta: Option<StreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct StreamDelta {
    content: Option<String>,
}

/// Parse a single SSE `data:` payload into stream events.
fn parse_sse_data(data: &str, events: &mut Vec<StreamEvent>) {
    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => {
            if let Some(usage) = chunk.usage {
                events.push(StreamEvent::Usage(usage));
            }
            if let Some(choices) = chunk.choices {
                for choice in choices {
                    if let Some(delta) = choice.delta
                        && let Some(content) = delta.content
                        && !content.is_empty()
                    {
                        events.push(StreamEvent::TextDelta(content));
                    }
                    if let Some(reason) = choice.finish_reason {
                        debug!("stream finish_reason: {reason}");
                    }
                }
            }
        }
        Err(e) => {
            warn!("failed to parse SSE chunk: {e} — data: {data}");
        }
    }
}

/// Consume a streaming HTTP response, invoking `on_delta` for each text
/// fragment as it arrives off the wire.
///
/// Reads the body incrementally via `chunk()` so long responses never hit a
/// single-body timeout. Stops at `data: [DONE]`, end-of-body, or the first
/// [`ControlFlow::Break`] returned by the callback (remaining bytes are
/// abandoned by dropping the response).
pub(crate) async fn consume_sse(
    mut resp: reqwest::Response,
    on_delta: &mut (dyn FnMut(&str) -> ControlFlow<()> + Send),
) -> Result<(), ProviderError> {
    let mut buffer = String::new();
    let mut events: Vec<StreamEvent> = Vec::new();
    let mut delivered = 0usize;

    'outer: while let Some(chunk) = resp.chunk().await? {
        buffer.push_str(&String::from_utf8_lossy(&chunk));

        // Process all complete lines in the buffer.
        while let Some(newline_pos) = buffer.find('\n') {
            let line: String = buffer.drain(..=newline_pos).collect();
            let line = line.trim();
            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            if line == "data: [DONE]" {
                events.push(StreamEvent::Done);
                break 'outer;
            }
            if let Some(data) = line.strip_prefix("data: ") {
                parse_sse_data(data, &mut events);
            }

            // Deliver newly parsed deltas; honor an early stop immediately.
            while delivered < events.len() {
                if let StreamEvent::TextDelta(ref text) = events[delivered]
                    && on_delta(text).is_break()
                {
                    debug!("stream stopped early by consumer after {} events", delivered + 1);
                    return Ok(());
                }
                delivered += 1;
            }
        }
    }

    // Process any remaining data in the buffer (incomplete final line).
    let remaining = buffer.trim();
    if remaining != "data: [DONE]"
        && let Some(data) = remaining.strip_prefix("data: ")
    {
        parse_sse_data(data, &mut events);
    }
    while delivered < events.len() {
        if let StreamEvent::TextDelta(ref text) = events[delivered]
            && on_delta(text).is_break()
        {
            return Ok(());
        }
        delivered += 1;
    }

    debug!("stream completed with {} events", events.len());
    Ok(())
}

/// Assemble a complete text string from a sequence of stream events.
pub fn collect_text(events: &[StreamEvent]) -> String {
    let mut text = String::new();
    for event in events {
        if let StreamEvent::TextDelta(delta) = event {
            text.push_str(delta);
        }
    }
    text
}
