//! Per-style base instructions and per-turn prompt assembly.
//!
//! [`PromptLibrary`] holds the base instruction for each style (the neutral
//! baseline intentionally has none) and builds the ordered message list for
//! a model call: system prompt, the **entire** turn history, then the new
//! participant message last.
//!
//! Full history is sent every turn rather than a sliding window: study
//! conversations are bounded (around ten turns), so the resend cost is
//! acceptable and coherence across the whole exchange wins. The
//! anti-repetition and style-anchor instructions compensate for the models'
//! tendency toward generic, repeated phrasing in short supportive dialogue.

use crate::Message;
use crate::study::style::EmpathyStyle;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Per-style base instructions, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct PromptLibrary {
    base: HashMap<EmpathyStyle, String>,
}

impl PromptLibrary {
    /// An empty library: every style resolves to no base instruction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load base instructions from a directory of `{style}_empathy_prompt.txt`
    /// files. A missing or unreadable file resolves to an empty instruction,
    /// never an error. The neutral style never loads a file.
    pub fn load(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let mut base = HashMap::new();
        for style in [
            EmpathyStyle::Cognitive,
            EmpathyStyle::Emotional,
            EmpathyStyle::Motivational,
        ] {
            let path = dir.join(format!("{}_empathy_prompt.txt", style.name()));
            match std::fs::read_to_string(&path) {
                Ok(text) => {
                    let text = text.trim().to_string();
                    if !text.is_empty() {
                        debug!("loaded {} prompt from {}", style, path.display());
                        base.insert(style, text);
                    }
                }
                Err(e) => debug!("no prompt file for {} ({e}); using empty instruction", style),
            }
        }
        Self { base }
    }

    /// Set a style's base instruction directly (tests, embedded defaults).
    pub fn with_base(mut self, style: EmpathyStyle, text: impl Into<String>) -> Self {
        self.base.insert(style, text.into());
        self
    }

    /// The base instruction for a style; empty for styles with none.
    pub fn base_instruction(&self, style: EmpathyStyle) -> &str {
        self.base.get(&style).map(String::as_str).unwrap_or("")
    }

    /// Build the full system prompt for a turn: base instruction (when the
    /// style has one), the length policy, the style anchor (only alongside a
    /// base instruction), and the anti-repetition instruction.
    pub fn system_prompt(&self, style: EmpathyStyle, max_words: usize) -> String {
        let base = self.base_instruction(style);
        let length_policy = format!(
            "Please keep responses concise, around {max_words} words, and finish your \
             thought with a complete sentence."
        );
        let anti_repeat = " Review the full conversation history before responding. Do not \
             repeat the same advice, suggestions, or phrasing you have already provided. \
             Build upon previous exchanges and offer new perspectives or information each time.";

        if base.is_empty() {
            format!("{length_policy}{anti_repeat}")
        } else {
            let anchor = format!(
                " Maintain the {style} empathy style consistently throughout this \
                 conversation. Do not switch styles or tones."
            );
            format!("{base}\n\n{length_policy}{anchor}{anti_repeat}")
        }
    }

    /// Build the ordered message list for a model call: system prompt, the
    /// entire history, then the participant's new message last.
    pub fn messages_for_turn(
        &self,
        style: EmpathyStyle,
        history: &[Message],
        user_message: &str,
        max_words: usize,
    ) -> Vec<Message> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(self.system_prompt(style, max_words)));
        messages.extend(history.iter().cloned());
        messages.push(Message::user(user_message));
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MessageRole;

    fn library() -> PromptLibrary {
        PromptLibrary::new()
            .with_base(EmpathyStyle::Cognitive, "Reflect the user's reasoning.")
            .with_base(EmpathyStyle::Emotional, "Mirror the user's feelings.")
    }

    #[test]
    fn neutral_has_no_base_instruction() {
        let lib = library();
        assert_eq!(lib.base_instruction(EmpathyStyle::Neutral), "");

        let prompt = lib.system_prompt(EmpathyStyle::Neutral, 150);
        assert!(!prompt.contains("Maintain the"));
        assert!(prompt.starts_with("Please keep responses concise"));
    }

    #[test]
    fn system_prompt_always_carries_length_policy() {
        let lib = library();
        for style in EmpathyStyle::ALL {
            let prompt = lib.system_prompt(style, 120);
            assert!(prompt.contains("around 120 words"), "missing policy for {style}");
            assert!(prompt.contains("Do not repeat the same advice"), "missing anti-repeat for {style}");
        }
    }

    #[test]
    fn anchor_only_when_base_instruction_exists() {
        let lib = library();
        let cognitive = lib.system_prompt(EmpathyStyle::Cognitive, 150);
        assert!(cognitive.starts_with("Reflect the user's reasoning."));
        assert!(cognitive.contains("Maintain the cognitive empathy style"));

        // Motivational has no base in this library, so no anchor either.
        let motivational = lib.system_prompt(EmpathyStyle::Motivational, 150);
        assert!(!motivational.contains("Maintain the"));
    }

    #[test]
    fn messages_include_full_history_in_order() {
        let lib = library();
        let history = vec![
            Message::user("turn one"),
            Message::assistant("reply one"),
            Message::user("turn two"),
            Message::assistant("reply two"),
        ];
        let messages =
            lib.messages_for_turn(EmpathyStyle::Emotional, &history, "turn three", 150);

        assert_eq!(messages.len(), 6);
        assert_eq!(messages[0].role, MessageRole::System);
        assert_eq!(messages[1].content, "turn one");
        assert_eq!(messages[2].content, "reply one");
        assert_eq!(messages[3].content, "turn two");
        assert_eq!(messages[4].content, "reply two");
        assert_eq!(messages[5].role, MessageRole::User);
        assert_eq!(messages[5].content, "turn three");
    }

    #[test]
    fn load_tolerates_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("cognitive_empathy_prompt.txt"),
            "Think it through together.\n",
        )
        .unwrap();

        let lib = PromptLibrary::load(dir.path());
        assert_eq!(lib.base_instruction(EmpathyStyle::Cognitive), "Think it through together.");
        assert_eq!(lib.base_instruction(EmpathyStyle::Emotional), "");
        assert_eq!(lib.base_instruction(EmpathyStyle::Neutral), "");
    }
}
