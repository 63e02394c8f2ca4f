//! Crisis keyword detection over participant messages.
//!
//! Matching is case-insensitive and word-boundary aware: a keyword (or
//! multi-word phrase) only matches when it is not embedded inside a longer
//! word, so "die" never fires on "diesel". Keywords are evaluated in their
//! configured order and the first match wins; there is no scoring.
//!
//! The active keyword set can be mutated at runtime ([`add_keyword`] /
//! [`remove_keyword`]); every matching pass sees a fully-old or fully-new
//! set, never a half-updated one.
//!
//! [`add_keyword`]: CrisisDetector::add_keyword
//! [`remove_keyword`]: CrisisDetector::remove_keyword

use std::path::Path;
use std::sync::RwLock;
use thiserror::Error;
use tracing::{info, warn};

/// Built-in keyword list used when configuration provides none. Detection is
/// never silently disabled.
const DEFAULT_KEYWORDS: [&str; 6] = [
    "suicide",
    "kill myself",
    "end it all",
    "want to die",
    "no reason to live",
    "better off dead",
];

/// Fixed safety response used when no template is configured.
const DEFAULT_CRISIS_RESPONSE: &str = "\
I'm concerned about what you're sharing and want you to know that help is available right now.

If you're in immediate danger, please call 911.

For crisis support:
- Call or text 988 (Suicide & Crisis Lifeline)
- Text HOME to 741741 (Crisis Text Line)

I'm not a licensed therapist, but these trained professionals can provide immediate, specialized support. Your life matters, and there are people who want to help you through this difficult time.";

/// Failure of the detector itself, as opposed to a keyword match.
///
/// The harness maps this through
/// [`DetectorFailurePolicy`](crate::config::DetectorFailurePolicy) rather
/// than surfacing it to participants.
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("crisis keyword set is unavailable (poisoned lock)")]
    Poisoned,
}

/// Detects crisis-related content in participant messages.
pub struct CrisisDetector {
    keywords: RwLock<Vec<String>>,
    response_template: Option<String>,
}

impl Default for CrisisDetector {
    fn default() -> Self {
        Self::new(Vec::new(), None)
    }
}

impl CrisisDetector {
    /// Create a detector with the given keywords and optional safety-response
    /// template. An empty keyword list falls back to the built-in defaults.
    pub fn new(keywords: Vec<String>, response_template: Option<String>) -> Self {
        let keywords = if keywords.is_empty() {
            DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect()
        } else {
            keywords
        };
        info!("crisis detector initialized with {} keywords", keywords.len());
        Self {
            keywords: RwLock::new(keywords),
            response_template,
        }
    }

    /// Load a detector from a configuration directory containing optional
    /// `crisis_keywords.txt` (one keyword per line) and `crisis_response.txt`
    /// files. Either file missing or unreadable falls back to the built-ins.
    pub fn load(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let keywords = match std::fs::read_to_string(dir.join("crisis_keywords.txt")) {
            Ok(text) => text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(str::to_string)
                .collect(),
            Err(e) => {
                warn!("no crisis keyword file in {}: {e}; using defaults", dir.display());
                Vec::new()
            }
        };
        let template = std::fs::read_to_string(dir.join("crisis_response.txt"))
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        Self::new(keywords, template)
    }

    /// Check a message for crisis keywords.
    ///
    /// Returns the first matching keyword in configured order, or `None`.
    pub fn check(&self, message: &str) -> Result<Option<String>, DetectorError> {
        let keywords = self.keywords.read().map_err(|_| DetectorError::Poisoned)?;
        let message_lower = message.to_lowercase();
        for keyword in keywords.iter() {
            if contains_whole_phrase(&message_lower, &keyword.to_lowercase()) {
                warn!("crisis keyword detected: '{keyword}'");
                return Ok(Some(keyword.clone()));
            }
        }
        Ok(None)
    }

    /// The fixed safety response sent when a crisis keyword is detected.
    /// Configured template when present, built-in text otherwise. Never
    /// model-generated.
    pub fn crisis_response(&self) -> String {
        self.response_template
            .clone()
            .unwrap_or_else(|| DEFAULT_CRISIS_RESPONSE.to_string())
    }

    /// The keywords currently being monitored, in match order.
    pub fn keyword_list(&self) -> Vec<String> {
        self.keywords
            .read()
            .map(|k| k.clone())
            .unwrap_or_default()
    }

    /// Add a keyword to the active set. The set is swapped under the write
    /// guard, so concurrent matching never observes a partial update.
    pub fn add_keyword(&self, keyword: impl Into<String>) {
        let keyword = keyword.into();
        if let Ok(mut keywords) = self.keywords.write() {
            if !keywords.contains(&keyword) {
                info!("added crisis keyword: '{keyword}'");
                keywords.push(keyword);
            }
        }
    }

    /// Remove a keyword from the active set.
    pub fn remove_keyword(&self, keyword: &str) {
        if let Ok(mut keywords) = self.keywords.write()
            && let Some(idx) = keywords.iter().position(|k| k == keyword)
        {
            keywords.remove(idx);
            info!("removed crisis keyword: '{keyword}'");
        }
    }

    /// Poison the keyword lock so tests can exercise detector-failure
    /// policies.
    #[cfg(test)]
    pub(crate) fn poison_for_tests(&self) {
        let result = std::thread::scope(|s| {
            s.spawn(|| {
                let _guard = self.keywords.write().unwrap();
                panic!("poisoning keyword lock for test");
            })
            .join()
        });
        assert!(result.is_err(), "poisoning thread should have panicked");
    }
}

/// Whether `needle` occurs in `haystack` bounded by non-alphanumeric
/// characters (or the ends of the string) on both sides. Both inputs are
/// expected to be lowercased already.
fn contains_whole_phrase(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    for (pos, matched) in haystack.match_indices(needle) {
        let before_ok = haystack
            .get(..pos)
            .and_then(|prefix| prefix.chars().next_back())
            .is_none_or(|c| !c.is_alphanumeric());
        let after_ok = haystack
            .get(pos + matched.len()..)
            .and_then(|suffix| suffix.chars().next())
            .is_none_or(|c| !c.is_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
    }
    false
}
