//! Prompt construction modules.

pub mod composer;
pub mod system_prompt;

pub use composer::{ComposedPrompt, MAX_HISTORY_TURN_CHARS, PromptMessage, compose};
pub use system_prompt::{EMPTY_RESULT_ANSWER, MAIN_TABLE, SYSTEM_PROMPT};
