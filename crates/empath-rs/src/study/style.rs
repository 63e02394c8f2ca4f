//! The four empathy styles and the watermark condition.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Conversational persona assigned to a participant for their entire session.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EmpathyStyle {
    Cognitive,
    Emotional,
    Motivational,
    /// Baseline persona with no base instruction.
    Neutral,
}

impl EmpathyStyle {
    /// All styles in rotation order. Sequential assignment walks this array
    /// with `enrolled_count mod 4`.
    pub const ALL: [EmpathyStyle; 4] = [
        EmpathyStyle::Cognitive,
        EmpathyStyle::Emotional,
        EmpathyStyle::Motivational,
        EmpathyStyle::Neutral,
    ];

    /// The style's configuration name (also its prompt-file prefix).
    pub fn name(&self) -> &'static str {
        match self {
            EmpathyStyle::Cognitive => "cognitive",
            EmpathyStyle::Emotional => "emotional",
            EmpathyStyle::Motivational => "motivational",
            EmpathyStyle::Neutral => "neutral",
        }
    }
}

impl std::fmt::Display for EmpathyStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Error from parsing an unknown style name.
#[derive(Debug, Error)]
#[error("unknown empathy style: '{0}' (expected cognitive, emotional, motivational, or neutral)")]
pub struct ParseStyleError(pub String);

impl FromStr for EmpathyStyle {
    type Err = ParseStyleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cognitive" => Ok(EmpathyStyle::Cognitive),
            "emotional" => Ok(EmpathyStyle::Emotional),
            "motivational" => Ok(EmpathyStyle::Motivational),
            "neutral" => Ok(EmpathyStyle::Neutral),
            other => Err(ParseStyleError(other.to_string())),
        }
    }
}

/// Whether the participant is shown the AI-disclosure overlay. Orthogonal to
/// style; drawn fresh per session.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WatermarkCondition {
    Visible,
    Hidden,
}

impl std::fmt::Display for WatermarkCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatermarkCondition::Visible => f.write_str("visible"),
            WatermarkCondition::Hidden => f.write_str("hidden"),
        }
    }
}
