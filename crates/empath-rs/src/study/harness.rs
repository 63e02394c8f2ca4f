//! The study harness: per-session response orchestration.
//!
//! [`StudyHarness`] ties the runtime together. Session creation draws a
//! style from the sequential assignment policy (or an explicit override)
//! and a watermark condition from an independent coin flip. Every
//! participant turn runs the crisis detector **before** any model call; a
//! match short-circuits to the fixed safety response. Non-crisis turns are
//! assembled into a prompt (system instructions + full history + the new
//! message), sent to the provider in batch or streaming mode, truncated
//! under the soft word cap, and appended to history as exactly one
//! participant turn and one assistant turn.
//!
//! Failure posture: provider errors become a fixed apologetic reply,
//! detector errors follow the configured
//! [`DetectorFailurePolicy`], and persistence errors degrade to random
//! assignment or a skipped best-effort write. A participant never sees a
//! raw error.
//!
//! Concurrency: callers keep at most one in-flight turn per session.
//! Concurrent turns against the same session id race on history order (the
//! store serializes operations, not turns), and concurrent session creation
//! can land two participants on the same rotation slot.

use crate::api::ChatProvider;
use crate::config::{DetectorFailurePolicy, StudyConfig};
use crate::safety::CrisisDetector;
use crate::study::assignment;
use crate::study::prompt::PromptLibrary;
use crate::study::repository::{
    CrisisFlagRecord, MessageRecord, ParticipantRecord, StudyRepository,
};
use crate::study::store::{SessionState, SessionStore};
use crate::study::style::{EmpathyStyle, WatermarkCondition};
use crate::{ChatRequest, Message, MessageRole};
use chrono::Utc;
use rand::Rng;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Fixed reply used when the provider fails. The conversation continues on
/// the participant's next turn.
pub const APOLOGY_REPLY: &str =
    "I'm sorry, I ran into a problem generating a response. Please try again.";

/// Extra words allowed past the cap while looking for a sentence end during
/// batch truncation.
const TRUNCATE_SLACK_WORDS: usize = 20;

/// Extra words allowed past the cap before a streaming reply is hard-stopped.
const STREAM_SLACK_WORDS: usize = 25;

// ── Errors ─────────────────────────────────────────────────────────

/// Caller errors from the harness. Rejected synchronously, before any side
/// effect.
#[derive(Debug, Error)]
pub enum StudyError {
    #[error("invalid style override: '{0}'")]
    InvalidStyle(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),
}

// ── Return types ───────────────────────────────────────────────────

/// Result of creating a session.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub session_id: String,
    pub participant_id: String,
    pub style: EmpathyStyle,
    pub watermark_condition: WatermarkCondition,
}

/// Result of one response turn.
#[derive(Debug, Clone)]
pub struct BotReply {
    pub reply: String,
    pub crisis_detected: bool,
    pub matched_keyword: Option<String>,
}

/// A crisis screening hit: the matched keyword (absent when the detector
/// failed under [`DetectorFailurePolicy::TreatAsCrisis`]) and the fixed
/// safety response to show.
#[derive(Debug, Clone)]
pub struct CrisisHit {
    pub matched_keyword: Option<String>,
    pub response: String,
}

/// Options for [`StudyHarness::create_session_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionOptions<'a> {
    /// Explicit style name; must parse to one of the four styles.
    pub style_override: Option<&'a str>,
    /// External correlation id for recognizing returning participants.
    pub correlation_id: Option<&'a str>,
}

// ── Id generation ──────────────────────────────────────────────────

/// Generate a unique session id.
fn generate_session_id() -> String {
    let ts = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    // Counter handles sub-nanosecond calls.
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("sess-{ts:x}-{count:04x}")
}

/// Generate a participant id in the study's `P{8 hex}` format.
fn generate_participant_id() -> String {
    format!("P{:08X}", rand::rng().random::<u32>())
}

// ── Harness ────────────────────────────────────────────────────────

/// Per-session response orchestration over injected collaborators.
///
/// The harness owns no ambient state: the provider, repository, and session
/// store are constructed by the host and passed in, and configuration is
/// resolved once at startup.
pub struct StudyHarness {
    provider: Arc<dyn ChatProvider>,
    repository: Arc<dyn StudyRepository>,
    detector: CrisisDetector,
    prompts: PromptLibrary,
    store: Arc<SessionStore>,
    config: StudyConfig,
}

impl StudyHarness {
    pub fn new(
        provider: Arc<dyn ChatProvider>,
        repository: Arc<dyn StudyRepository>,
        detector: CrisisDetector,
        prompts: PromptLibrary,
        store: Arc<SessionStore>,
        config: StudyConfig,
    ) -> Self {
        Self {
            provider,
            repository,
            detector,
            prompts,
            store,
            config,
        }
    }

    /// The prompt library in use (hosts display the active system prompt).
    pub fn prompts(&self) -> &PromptLibrary {
        &self.prompts
    }

    // ── Session lifecycle ──────────────────────────────────────────

    /// Create a new session. With no override the style comes from
    /// sequential assignment; an override must name one of the four styles
    /// or the call fails with [`StudyError::InvalidStyle`] before any side
    /// effect.
    pub async fn create_session(
        &self,
        style_override: Option<&str>,
    ) -> Result<SessionInfo, StudyError> {
        self.create_session_with(SessionOptions {
            style_override,
            ..Default::default()
        })
        .await
    }

    /// Create a new session, optionally recognizing a returning participant.
    ///
    /// A returning participant (matched by correlation id before rotation is
    /// consulted) keeps their recorded style and does not consume a rotation
    /// slot; the watermark condition is still drawn fresh. An explicit valid
    /// override beats both the recorded style and rotation.
    pub async fn create_session_with(
        &self,
        options: SessionOptions<'_>,
    ) -> Result<SessionInfo, StudyError> {
        let style_override = match options.style_override {
            Some(raw) => Some(
                raw.parse::<EmpathyStyle>()
                    .map_err(|_| StudyError::InvalidStyle(raw.to_string()))?,
            ),
            None => None,
        };

        // Returning-participant lookup runs before rotation so a reconnect
        // never consumes a rotation slot.
        let mut returning: Option<ParticipantRecord> = None;
        if let Some(correlation_id) = options.correlation_id {
            match self.repository.find_participant(correlation_id).await {
                Ok(found) => returning = found,
                Err(e) => warn!("participant lookup failed ({e}); enrolling as new"),
            }
        }

        let watermark = assignment::random_watermark();
        let session_id = generate_session_id();

        let (participant_id, style) = match returning {
            Some(record) => {
                let style = style_override.unwrap_or(record.style);
                debug!(
                    "returning participant {} reconnected with style {style}",
                    record.participant_id
                );
                (record.participant_id, style)
            }
            None => {
                let style = match style_override {
                    Some(style) => style,
                    None => match self.repository.participant_count().await {
                        Ok(count) => assignment::style_for_enrollment(count),
                        Err(e) => {
                            warn!(
                                "enrollment count unavailable ({e}); \
                                 falling back to random assignment"
                            );
                            assignment::random_style()
                        }
                    },
                };
                let participant_id = generate_participant_id();
                let record = ParticipantRecord {
                    participant_id: participant_id.clone(),
                    style,
                    watermark,
                    correlation_id: options.correlation_id.map(str::to_string),
                    enrolled_at: Utc::now(),
                };
                if let Err(e) = self.repository.create_participant(record).await {
                    warn!("failed to record enrollment for {participant_id}: {e}");
                }
                (participant_id, style)
            }
        };

        self.store.insert(
            &session_id,
            SessionState {
                participant_id: participant_id.clone(),
                style,
                watermark,
                history: Vec::new(),
            },
        );
        info!(
            "session {session_id} created: participant={participant_id}, \
             style={style}, watermark={watermark}"
        );

        Ok(SessionInfo {
            session_id,
            participant_id,
            style,
            watermark_condition: watermark,
        })
    }

    /// Discard a session's in-memory state. Idempotent: ending an unknown or
    /// already-ended session is a no-op.
    pub fn end_session(&self, session_id: &str) {
        self.store.remove(session_id);
        debug!("session {session_id} ended");
    }

    // ── Crisis screening ───────────────────────────────────────────

    /// Screen a message for crisis keywords, applying the configured policy
    /// when the detector itself fails. Callers must run this before
    /// [`stream_respond`](Self::stream_respond); [`respond`](Self::respond)
    /// runs it internally.
    pub fn screen_message(&self, user_message: &str) -> Option<CrisisHit> {
        match self.detector.check(user_message) {
            Ok(Some(keyword)) => Some(CrisisHit {
                matched_keyword: Some(keyword),
                response: self.detector.crisis_response(),
            }),
            Ok(None) => None,
            Err(e) => match self.config.detector_failure {
                DetectorFailurePolicy::FailOpen => {
                    warn!("crisis detector failed ({e}); continuing without screening");
                    None
                }
                DetectorFailurePolicy::TreatAsCrisis => {
                    warn!("crisis detector failed ({e}); treating message as a crisis");
                    Some(CrisisHit {
                        matched_keyword: None,
                        response: self.detector.crisis_response(),
                    })
                }
            },
        }
    }

    // ── Responses ──────────────────────────────────────────────────

    /// Produce the assistant reply for one participant turn.
    ///
    /// The crisis check runs first; on a match the fixed safety text is
    /// returned without any model call and without touching the in-memory
    /// history (crisis framing stays out of later prompts), while the
    /// durable transcript records the flagged message. Otherwise the model
    /// is called, the reply is truncated under the word cap, both turns are
    /// appended to history, and the exchange is persisted best-effort.
    pub async fn respond(
        &self,
        session_id: &str,
        user_message: &str,
        turn: u32,
    ) -> Result<BotReply, StudyError> {
        let session = self
            .store
            .snapshot(session_id)
            .ok_or_else(|| StudyError::SessionNotFound(session_id.to_string()))?;

        if let Some(hit) = self.screen_message(user_message) {
            self.record_crisis(&session.participant_id, turn, user_message, &hit)
                .await;
            return Ok(BotReply {
                reply: hit.response,
                crisis_detected: true,
                matched_keyword: hit.matched_keyword,
            });
        }

        let messages = self.prompts.messages_for_turn(
            session.style,
            &session.history,
            user_message,
            self.config.max_words,
        );
        let request = self.chat_request(messages);

        let reply = match self.provider.complete(&request).await {
            Ok(text) => truncate_to_word_limit(text.trim(), self.config.max_words),
            Err(e) => {
                warn!("provider call failed on turn {turn}: {e}");
                APOLOGY_REPLY.to_string()
            }
        };

        self.store.append_exchange(session_id, user_message, &reply);
        self.persist_exchange(&session.participant_id, turn, user_message, &reply)
            .await;

        Ok(BotReply {
            reply,
            crisis_detected: false,
            matched_keyword: None,
        })
    }

    /// Produce a streamed reply, invoking `on_fragment` for each text
    /// fragment as it arrives. The fragment sequence is finite and not
    /// restartable.
    ///
    /// Performs **no** crisis detection: callers screen via
    /// [`screen_message`](Self::screen_message) first and only stream
    /// non-crisis messages.
    ///
    /// While consuming, the harness tracks the cumulative word count; once
    /// it reaches the cap, consumption stops after the next
    /// sentence-punctuated fragment, or hard-stops 25 words past the cap.
    /// The concatenated text is then truncated like a batch reply and
    /// exactly one participant turn and one assistant turn are appended. On
    /// a provider failure the partial text is discarded (history is never
    /// appended partially) and the apologetic reply is emitted as the final
    /// fragment.
    pub async fn stream_respond(
        &self,
        session_id: &str,
        user_message: &str,
        mut on_fragment: impl FnMut(&str) + Send,
    ) -> Result<BotReply, StudyError> {
        let session = self
            .store
            .snapshot(session_id)
            .ok_or_else(|| StudyError::SessionNotFound(session_id.to_string()))?;

        let messages = self.prompts.messages_for_turn(
            session.style,
            &session.history,
            user_message,
            self.config.max_words,
        );
        let request = self.chat_request(messages);
        let max_words = self.config.max_words;

        let mut full = String::new();
        let mut exceeded = false;
        let result = {
            let mut on_delta = |delta: &str| {
                full.push_str(delta);
                on_fragment(delta);

                let words_seen = full.split_whitespace().count();
                if words_seen >= max_words {
                    exceeded = true;
                }
                if exceeded {
                    if delta.contains(['.', '!', '?']) {
                        return ControlFlow::Break(());
                    }
                    if words_seen >= max_words + STREAM_SLACK_WORDS {
                        return ControlFlow::Break(());
                    }
                }
                ControlFlow::Continue(())
            };
            self.provider.complete_stream(&request, &mut on_delta).await
        };

        match result {
            Ok(()) => {
                let reply = truncate_to_word_limit(full.trim(), max_words);
                self.store.append_exchange(session_id, user_message, &reply);
                Ok(BotReply {
                    reply,
                    crisis_detected: false,
                    matched_keyword: None,
                })
            }
            Err(e) => {
                warn!("streaming call failed: {e}");
                on_fragment(APOLOGY_REPLY);
                Ok(BotReply {
                    reply: APOLOGY_REPLY.to_string(),
                    crisis_detected: false,
                    matched_keyword: None,
                })
            }
        }
    }

    // ── Internals ──────────────────────────────────────────────────

    fn chat_request(&self, messages: Vec<Message>) -> ChatRequest {
        ChatRequest {
            model: self.config.model.clone(),
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            stream: None,
        }
    }

    /// Durably record a crisis exchange: the flagged participant message and
    /// a flag for researcher review. Best-effort; persistence failures are
    /// logged, never surfaced to the participant.
    async fn record_crisis(
        &self,
        participant_id: &str,
        turn: u32,
        user_message: &str,
        hit: &CrisisHit,
    ) {
        let record = MessageRecord {
            participant_id: participant_id.to_string(),
            turn,
            role: MessageRole::User,
            content: user_message.to_string(),
            crisis_flagged: true,
            sent_at: Utc::now(),
        };
        if let Err(e) = self.repository.save_message(record).await {
            warn!("failed to persist crisis message for {participant_id}: {e}");
        }
        if let Some(ref keyword) = hit.matched_keyword {
            let flag = CrisisFlagRecord {
                participant_id: participant_id.to_string(),
                turn,
                matched_keyword: keyword.clone(),
                flagged_at: Utc::now(),
            };
            if let Err(e) = self.repository.create_crisis_flag(flag).await {
                warn!("failed to persist crisis flag for {participant_id}: {e}");
            }
        }
    }

    /// Persist both sides of a completed exchange, best-effort.
    async fn persist_exchange(
        &self,
        participant_id: &str,
        turn: u32,
        user_message: &str,
        reply: &str,
    ) {
        for (role, content) in [(MessageRole::User, user_message), (MessageRole::Assistant, reply)]
        {
            let record = MessageRecord {
                participant_id: participant_id.to_string(),
                turn,
                role,
                content: content.to_string(),
                crisis_flagged: false,
                sent_at: Utc::now(),
            };
            if let Err(e) = self.repository.save_message(record).await {
                warn!("failed to persist {role} message for {participant_id}: {e}");
            }
        }
    }
}

// ── Truncation ─────────────────────────────────────────────────────

/// Truncate `text` around a word cap, preferring complete sentences.
///
/// Texts at or under `limit` words pass through unchanged. Otherwise only
/// the first `limit + 20` words are considered: the cut lands on the latest
/// sentence-ending token (`.`, `!`, `?`) at or under the cap, else on the
/// first sentence end inside the slack, else hard at exactly `limit` words.
pub fn truncate_to_word_limit(text: &str, limit: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= limit {
        return text.to_string();
    }

    let window = &words[..words.len().min(limit + TRUNCATE_SLACK_WORDS)];
    let ends_sentence = |w: &&str| w.contains(['.', '!', '?']);

    let cut = window
        .iter()
        .take(limit)
        .rposition(ends_sentence)
        .or_else(|| {
            window
                .iter()
                .skip(limit)
                .position(ends_sentence)
                .map(|i| i + limit)
        });

    match cut {
        Some(end) => window[..=end].join(" "),
        None => window[..limit].join(" "),
    }
}

// ── Tests ──────────────────────────────────────────────────────────
