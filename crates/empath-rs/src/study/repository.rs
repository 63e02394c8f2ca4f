//! Persistence seam for participants, messages, and crisis flags.
//!
//! The harness treats every repository operation as fallible and degrades on
//! failure (random assignment when the enrollment count is unreachable,
//! logged best-effort writes) rather than failing a participant-facing turn.
//! Schema and migration mechanics live entirely behind this trait.
//!
//! [`InMemoryRepository`] is the reference implementation, used by the CLI
//! and tests.

use crate::MessageRole;
use crate::study::style::{EmpathyStyle, WatermarkCondition};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use thiserror::Error;

// ── Records ────────────────────────────────────────────────────────

/// Durable enrollment record for one participant.
#[derive(Debug, Clone)]
pub struct ParticipantRecord {
    pub participant_id: String,
    pub style: EmpathyStyle,
    pub watermark: WatermarkCondition,
    /// External correlation id (e.g. a panel-provider id) used to recognize
    /// returning participants.
    pub correlation_id: Option<String>,
    pub enrolled_at: DateTime<Utc>,
}

/// One durable message in a participant's transcript.
#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub participant_id: String,
    pub turn: u32,
    pub role: MessageRole,
    pub content: String,
    pub crisis_flagged: bool,
    pub sent_at: DateTime<Utc>,
}

/// A crisis flag raised for researcher review.
#[derive(Debug, Clone)]
pub struct CrisisFlagRecord {
    pub participant_id: String,
    pub turn: u32,
    pub matched_keyword: String,
    pub flagged_at: DateTime<Utc>,
}

/// Failure of the persistence backend.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("persistence unavailable: {0}")]
    Unavailable(String),
}

// ── Seam ───────────────────────────────────────────────────────────

/// Persistence collaborator as the harness sees it.
#[async_trait]
pub trait StudyRepository: Send + Sync {
    /// Number of participants enrolled so far (drives style rotation).
    async fn participant_count(&self) -> Result<u64, RepositoryError>;

    /// Record a new enrollment.
    async fn create_participant(&self, record: ParticipantRecord) -> Result<(), RepositoryError>;

    /// Look up a participant by external correlation id.
    async fn find_participant(
        &self,
        correlation_id: &str,
    ) -> Result<Option<ParticipantRecord>, RepositoryError>;

    /// Append a message to a participant's durable transcript.
    async fn save_message(&self, record: MessageRecord) -> Result<(), RepositoryError>;

    /// Raise a crisis flag for researcher review.
    async fn create_crisis_flag(&self, record: CrisisFlagRecord) -> Result<(), RepositoryError>;
}

// ── In-memory implementation ───────────────────────────────────────

#[derive(Debug, Default)]
struct Inner {
    participants: Vec<ParticipantRecord>,
    messages: Vec<MessageRecord>,
    crisis_flags: Vec<CrisisFlagRecord>,
}

/// In-memory [`StudyRepository`] for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    inner: Mutex<Inner>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// All recorded messages, in insertion order.
    pub fn messages(&self) -> Vec<MessageRecord> {
        self.lock().messages.clone()
    }

    /// All raised crisis flags, in insertion order.
    pub fn crisis_flags(&self) -> Vec<CrisisFlagRecord> {
        self.lock().crisis_flags.clone()
    }
}

#[async_trait]
impl StudyRepository for InMemoryRepository {
    async fn participant_count(&self) -> Result<u64, RepositoryError> {
        Ok(self.lock().participants.len() as u64)
    }

    async fn create_participant(&self, record: ParticipantRecord) -> Result<(), RepositoryError> {
        self.lock().participants.push(record);
        Ok(())
    }

    async fn find_participant(
        &self,
        correlation_id: &str,
    ) -> Result<Option<ParticipantRecord>, RepositoryError> {
        Ok(self
            .lock()
            .participants
            .iter()
            .find(|p| p.correlation_id.as_deref() == Some(correlation_id))
            .cloned())
    }

    async fn save_message(&self, record: MessageRecord) -> Result<(), RepositoryError> {
        self.lock().messages.push(record);
        Ok(())
    }

    async fn create_crisis_flag(&self, record: CrisisFlagRecord) -> Result<(), RepositoryError> {
        self.lock().crisis_flags.push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(id: &str, correlation: Option<&str>) -> ParticipantRecord {
        ParticipantRecord {
            participant_id: id.into(),
            style: EmpathyStyle::Cognitive,
            watermark: WatermarkCondition::Hidden,
            correlation_id: correlation.map(str::to_string),
            enrolled_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn count_tracks_enrollments() {
        let repo = InMemoryRepository::new();
        assert_eq!(repo.participant_count().await.unwrap(), 0);

        repo.create_participant(participant("P1", None)).await.unwrap();
        repo.create_participant(participant("P2", None)).await.unwrap();
        assert_eq!(repo.participant_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn find_by_correlation_id() {
        let repo = InMemoryRepository::new();
        repo.create_participant(participant("P1", Some("prolific-42")))
            .await
            .unwrap();

        let found = repo.find_participant("prolific-42").await.unwrap().unwrap();
        assert_eq!(found.participant_id, "P1");
        assert!(repo.find_participant("prolific-99").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn messages_and_flags_accumulate_in_order() {
        let repo = InMemoryRepository::new();
        repo.save_message(MessageRecord {
            participant_id: "P1".into(),
            turn: 1,
            role: MessageRole::User,
            content: "hello".into(),
            crisis_flagged: false,
            sent_at: Utc::now(),
        })
        .await
        .unwrap();
        repo.create_crisis_flag(CrisisFlagRecord {
            participant_id: "P1".into(),
            turn: 2,
            matched_keyword: "end it all".into(),
            flagged_at: Utc::now(),
        })
        .await
        .unwrap();

        assert_eq!(repo.messages().len(), 1);
        assert_eq!(repo.messages()[0].content, "hello");
        assert_eq!(repo.crisis_flags()[0].matched_keyword, "end it all");
    }
}
