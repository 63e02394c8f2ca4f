//! Convenience re-exports for common `empath-rs` types.
//!
//! Meant to be glob-imported when embedding the study runtime:
//!
//! ```ignore
//! use empath_rs::prelude::*;
//! ```
//!
//! This pulls in the types needed for the vast majority of hosts: the
//! [`StudyHarness`] and its result types, the [`OpenAiClient`] provider,
//! the [`CrisisDetector`], the session store, and configuration.
//! Specialized types (stream events, repository record structs, retry
//! internals) are intentionally excluded — import those from their modules
//! directly when needed.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{ChatRequest, Message, MessageRole};

// ── Study runtime ───────────────────────────────────────────────────
pub use crate::study::{
    BotReply, CrisisHit, EmpathyStyle, InMemoryRepository, PromptLibrary, SessionInfo,
    SessionOptions, SessionStore, StudyError, StudyHarness, StudyRepository, WatermarkCondition,
};

// ── Safety ──────────────────────────────────────────────────────────
pub use crate::safety::CrisisDetector;

// ── Provider ────────────────────────────────────────────────────────
pub use crate::api::{ChatProvider, OpenAiClient, ProviderError};

// ── Configuration ───────────────────────────────────────────────────
pub use crate::config::{DetectorFailurePolicy, StudyConfig};
