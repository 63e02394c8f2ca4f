//! Host-owned in-memory session state.
//!
//! A [`SessionStore`] maps session ids to [`SessionState`]. It is
//! constructed once by the host application and handed to the harness, so
//! there is no process-global session map. State is ephemeral by design:
//! dropping the store (or the process restarting) ends every session;
//! durable transcripts live behind
//! [`StudyRepository`](super::repository::StudyRepository).
//!
//! The store serializes individual operations but not whole turns: two
//! concurrent turns against the same session id race on history order.
//! Callers keep at most one in-flight turn per session.

use crate::Message;
use crate::study::style::{EmpathyStyle, WatermarkCondition};
use std::collections::HashMap;
use std::sync::Mutex;

/// Per-session conversation state.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub participant_id: String,
    pub style: EmpathyStyle,
    pub watermark: WatermarkCondition,
    /// Ordered, append-only turn history (participant and assistant roles
    /// only; never reordered).
    pub history: Vec<Message>,
}

/// In-memory mapping of session id to conversation state.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, SessionState>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, SessionState>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a new session.
    pub fn insert(&self, session_id: impl Into<String>, state: SessionState) {
        self.lock().insert(session_id.into(), state);
    }

    /// Clone the current state of a session, if it exists.
    pub fn snapshot(&self, session_id: &str) -> Option<SessionState> {
        self.lock().get(session_id).cloned()
    }

    /// Append one participant turn and one assistant turn to a session's
    /// history. Returns `false` if the session is unknown (e.g. ended while
    /// a reply was in flight).
    pub fn append_exchange(&self, session_id: &str, user: &str, assistant: &str) -> bool {
        let mut sessions = self.lock();
        match sessions.get_mut(session_id) {
            Some(state) => {
                state.history.push(Message::user(user));
                state.history.push(Message::assistant(assistant));
                true
            }
            None => false,
        }
    }

    /// Drop a session's state. Idempotent: removing an unknown or
    /// already-removed session is a no-op.
    pub fn remove(&self, session_id: &str) {
        self.lock().remove(session_id);
    }

    /// Whether a session is currently active.
    pub fn contains(&self, session_id: &str) -> bool {
        self.lock().contains_key(session_id)
    }

    /// Number of active sessions.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SessionState {
        SessionState {
            participant_id: "P1234ABCD".into(),
            style: EmpathyStyle::Cognitive,
            watermark: WatermarkCondition::Visible,
            history: Vec::new(),
        }
    }

    #[test]
    fn insert_and_snapshot() {
        let store = SessionStore::new();
        store.insert("s-1", state());

        let snap = store.snapshot("s-1").unwrap();
        assert_eq!(snap.participant_id, "P1234ABCD");
        assert!(snap.history.is_empty());
        assert!(store.snapshot("s-2").is_none());
    }

    #[test]
    fn append_exchange_grows_history_by_two() {
        let store = SessionStore::new();
        store.insert("s-1", state());

        assert!(store.append_exchange("s-1", "hello", "hi there"));
        assert!(store.append_exchange("s-1", "how are you", "doing well"));

        let snap = store.snapshot("s-1").unwrap();
        assert_eq!(snap.history.len(), 4);
        assert_eq!(snap.history[0].content, "hello");
        assert_eq!(snap.history[1].content, "hi there");
        assert_eq!(snap.history[2].content, "how are you");
        assert_eq!(snap.history[3].content, "doing well");
    }

    #[test]
    fn append_to_unknown_session_is_rejected() {
        let store = SessionStore::new();
        assert!(!store.append_exchange("ghost", "a", "b"));
    }

    #[test]
    fn remove_is_idempotent() {
        let store = SessionStore::new();
        store.insert("s-1", state());
        assert!(store.contains("s-1"));

        store.remove("s-1");
        assert!(!store.contains("s-1"));
        store.remove("s-1"); // second removal is a no-op
        store.remove("never-existed");
        assert!(store.is_empty());
    }
}
