//! Prompt composition.
//!
//! `compose` is a pure function: no clock, no randomness. Identical inputs
//! give byte-identical prompts.

use serde::Serialize;

use crate::assistant::core::config::MAX_HISTORY_WINDOW;
use crate::assistant::core::turn::{ConversationTurn, Role};

/// Longest history message copied into a prompt, in characters.
pub const MAX_HISTORY_TURN_CHARS: usize = 4000;

/// One history message inside a prompt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PromptMessage {
    /// Author of the message.
    pub role: Role,
    /// Message text, possibly shortened.
    pub content: String,
}

/// Prompt parts handed to a completion backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ComposedPrompt {
    /// System instruction.
    pub system: String,
    /// Bounded recent history, oldest first.
    pub history: Vec<PromptMessage>,
    /// The new user message.
    pub question: String,
}

impl ComposedPrompt {
    /// Render the prompt as one deterministic text block.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.estimate_len());
        out.push_str("[SYSTEM]\n");
        out.push_str(&self.system);
        out.push('\n');
        self.push_conversation(&mut out);
        out
    }

    /// Render everything but the system instruction, for backends that
    /// carry the system text separately.
    #[must_use]
    pub fn render_conversation(&self) -> String {
        let mut out = String::with_capacity(self.estimate_len() - self.system.len());
        self.push_conversation(&mut out);
        out
    }

    fn push_conversation(&self, out: &mut String) {
        out.push_str("[HISTORY]\n");
        for message in &self.history {
            render_message(out, message);
        }
        out.push_str("[QUESTION]\n");
        out.push_str(&self.question);
        out.push('\n');
    }

    /// Approximate rendered length in bytes.
    #[must_use]
    pub fn estimate_len(&self) -> usize {
        let mut total = "[SYSTEM]\n".len() + self.system.len() + 1;
        total += "[HISTORY]\n".len();
        for message in &self.history {
            total += message.content.len() + 16;
        }
        total += "[QUESTION]\n".len() + self.question.len() + 1;
        total
    }
}

/// Assemble the system instruction, the most recent history and the new
/// message. At most [`MAX_HISTORY_WINDOW`] history turns are kept.
#[must_use]
pub fn compose(
    system_prompt: &str,
    recent_history: &[ConversationTurn],
    user_message: &str,
) -> ComposedPrompt {
    let start = recent_history.len().saturating_sub(MAX_HISTORY_WINDOW);
    let history = recent_history[start..]
        .iter()
        .map(|turn| PromptMessage {
            role: turn.role,
            content: truncate_to_chars(&turn.content, MAX_HISTORY_TURN_CHARS),
        })
        .collect();

    ComposedPrompt {
        system: system_prompt.to_string(),
        history,
        question: user_message.to_string(),
    }
}

fn render_message(out: &mut String, message: &PromptMessage) {
    let role = match message.role {
        Role::Human => "Utilisateur",
        Role::Assistant => "Assistant",
    };
    out.push_str("- ");
    out.push_str(role);
    out.push_str(": ");
    out.push_str(&message.content);
    out.push('\n');
}

fn truncate_to_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}
