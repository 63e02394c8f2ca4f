//! Configuration for the [`StudyHarness`](crate::study::harness::StudyHarness).
//!
//! A single [`StudyConfig`] is resolved once at process startup and injected
//! into the harness. The harness itself never reaches into the environment
//! or a secret store; API credentials belong to the host (see `main.rs`).
//!
//! # Examples
//!
//! ```
//! use empath_rs::config::StudyConfig;
//!
//! let config = StudyConfig::new("gpt-4")
//!     .with_max_words(120)
//!     .with_temperature(0.5)
//!     .with_retries(3);
//! assert_eq!(config.max_words, 120);
//! ```

use crate::api::retry::RetryConfig;

// ── Detector failure policy ───────────────────────────────────────

/// What the harness does when the crisis detector itself fails (not when it
/// matches — a match always short-circuits).
///
/// The original deployment silently swallowed detector errors; here the
/// tradeoff is an explicit, logged policy that tests can assert on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectorFailurePolicy {
    /// Treat a detector error as "no crisis detected" and continue to the
    /// model call. Availability over detection; the default, matching the
    /// original deployment.
    #[default]
    FailOpen,
    /// Treat a detector error as a crisis: return the fixed safety response
    /// without calling the model.
    TreatAsCrisis,
}

// ── Study config ──────────────────────────────────────────────────

/// Configuration for a study run.
///
/// Construct with [`StudyConfig::new`] and chain `with_*` methods, or use
/// struct update syntax against `Default` for anything else.
#[derive(Debug, Clone)]
pub struct StudyConfig {
    /// Model identifier sent on every chat request.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens per model response.
    pub max_tokens: u32,
    /// Soft word cap applied to every reply (see the harness truncation
    /// policy). Also parameterizes the length-policy prompt instruction.
    pub max_words: usize,
    /// Policy applied when the crisis detector errors.
    pub detector_failure: DetectorFailurePolicy,
    /// Retry configuration for transient provider failures.
    pub retry: RetryConfig,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            model: crate::DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 1024,
            max_words: 150,
            detector_failure: DetectorFailurePolicy::FailOpen,
            retry: RetryConfig::with_retries(2),
        }
    }
}

impl StudyConfig {
    /// Create a config for the given model with all other fields at their
    /// defaults.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    /// Set the soft word cap for replies.
    pub fn with_max_words(mut self, max_words: usize) -> Self {
        self.max_words = max_words;
        self
    }

    /// Set the maximum tokens per model response.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the policy applied when the crisis detector errors.
    pub fn with_detector_failure(mut self, policy: DetectorFailurePolicy) -> Self {
        self.detector_failure = policy;
        self
    }

    /// Enable automatic retries for transient provider failures (429, 5xx,
    /// network errors). Pass `0` to disable.
    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.retry = RetryConfig::with_retries(max_retries);
        self
    }
}
