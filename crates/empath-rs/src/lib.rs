//! Empathy-style chatbot runtime for web-delivered dialogue studies.
//!
//! `empath-rs` provides the conversational core of a research instrument that
//! assigns each participant one of four empathy styles, exchanges a bounded
//! number of turns with a chat-completion API, screens every participant
//! message for crisis keywords, and hands durable records to a pluggable
//! persistence backend. The central abstraction is the
//! [`StudyHarness`](study::harness::StudyHarness) — a per-session response
//! loop that screens, assembles the prompt, calls the provider (batch or
//! streaming), enforces a soft word cap, and maintains turn history.
//!
//! # Getting started
//!
//! ```ignore
//! use empath_rs::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let api_key = std::env::var("OPENAI_API_KEY")?;
//!     let provider = Arc::new(OpenAiClient::new(api_key)?);
//!     let repository = Arc::new(InMemoryRepository::new());
//!     let store = Arc::new(SessionStore::new());
//!
//!     let harness = StudyHarness::new(
//!         provider,
//!         repository,
//!         CrisisDetector::default(),
//!         PromptLibrary::load("config"),
//!         store,
//!         StudyConfig::default(),
//!     );
//!
//!     let session = harness.create_session(None).await?;
//!     let reply = harness.respond(&session.session_id, "I had a rough week.", 1).await?;
//!     println!("[{}] {}", session.style, reply.reply);
//!     harness.end_session(&session.session_id);
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`study`] | [`StudyHarness`](study::harness::StudyHarness) response loop, styles, assignment, prompt assembly, session store, persistence seam |
//! | [`safety`] | [`CrisisDetector`](safety::CrisisDetector) keyword screening and the fixed safety response |
//! | [`api`] | [`ChatProvider`](api::ChatProvider) seam, OpenAI chat-completions client, SSE streaming, retry with backoff |
//! | [`config`] | [`StudyConfig`](config::StudyConfig) resolved once at startup and injected everywhere |
//!
//! # Design principles
//!
//! 1. **The safety check runs first.** No participant message reaches the
//!    model before the crisis detector has seen it. A match short-circuits
//!    to a fixed, never-model-generated safety response.
//!
//! 2. **Availability over strictness.** Persistence down means random
//!    assignment, not a failed enrollment. A provider error becomes an
//!    apologetic reply, not a crashed study session. Each of these
//!    degradations is an explicit, logged policy.
//!
//! 3. **No ambient state.** The session store is constructed by the host and
//!    passed in; configuration is resolved once at startup; the harness
//!    never reads environment variables or secret stores.
//!
//! 4. **Collaborators are traits.** The model provider and the persistence
//!    backend sit behind [`ChatProvider`](api::ChatProvider) and
//!    [`StudyRepository`](study::repository::StudyRepository), so tests run
//!    against scripted doubles and hosts can swap backends.

pub mod api;
pub mod config;
pub mod prelude;
pub mod safety;
pub mod study;

use serde::{Deserialize, Serialize};

// ── Constants ──────────────────────────────────────────────────────

/// OpenAI chat-completions endpoint.
pub const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Default model for all chat calls.
pub const DEFAULT_MODEL: &str = "gpt-4";

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// A role-tagged message, both a wire type for the provider API and the unit
/// of per-session turn history.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

// ── Request types ──────────────────────────────────────────────────

/// Chat completion request body. Unused optional fields are omitted from
/// serialization so the payload stays minimal.
#[derive(Serialize, Debug, Default, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "is_zero_f32")]
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}
fn is_zero_f32(v: &f32) -> bool {
    *v == 0.0
}

/// Token usage statistics reported by the API.
#[derive(Deserialize, Debug, Clone)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors() {
        let sys = Message::system("hello");
        assert_eq!(sys.role, MessageRole::System);
        assert_eq!(sys.content, "hello");

        let user = Message::user("world");
        assert_eq!(user.role, MessageRole::User);

        let assist = Message::assistant("reply");
        assert_eq!(assist.role, MessageRole::Assistant);
        assert_eq!(assist.content, "reply");
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_value(Message::user("hi")).unwrap();
        assert_eq!(json["role"], "user");
        let back: Message = serde_json::from_value(json).unwrap();
        assert_eq!(back.role, MessageRole::User);
    }

    #[test]
    fn chat_request_skips_unset_fields() {
        let req = ChatRequest {
            model: "test-model".into(),
            messages: vec![Message::user("hi")],
            max_tokens: 100,
            temperature: 0.5,
            stream: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("stream").is_none());
        assert_eq!(json["max_tokens"], 100);

        let bare = ChatRequest {
            model: "test-model".into(),
            messages: vec![],
            ..Default::default()
        };
        let json = serde_json::to_value(&bare).unwrap();
        assert!(json.get("max_tokens").is_none());
        assert!(json.get("temperature").is_none());
    }
}
