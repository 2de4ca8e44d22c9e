//! History sanitization for assistant replies.
//!
//! Before an assistant reply is stored, embedded SQL is replaced by a short
//! marker and oversized fenced blocks are cut. This is a best-effort content
//! filter: unusual SQL formatting can slip through, and prose that happens to
//! read `select ... from` is redacted too. It is not a security boundary.
//!
//! Content is processed per fence segment (text between two ```` ``` ````),
//! so a redaction never swallows a fence and the code-block structure of
//! the reply survives.
//!
//! Guarantees, for every input:
//! - the output is never longer (in characters) than the input;
//! - sanitizing twice gives the same result as sanitizing once.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::assistant::core::config::SanitizerConfig;
use crate::assistant::core::turn::{ConversationTurn, Role};

/// Replaces a redacted SQL statement.
///
/// Shorter than the shortest possible match (`SELECT FROM`), so a
/// replacement can never grow the text.
pub const SQL_MARKER: &str = "[SQL omis]";

/// Appended to a truncated fenced block.
pub const TRUNCATION_SUFFIX: &str = "\n... [Résultats tronqués pour l'historique] ...";

const FENCE: &str = "```";

#[allow(clippy::expect_used)]
static SQL_STATEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)\bSELECT\b.*?\bFROM\b.*?(\n\n|\z)").expect("static SQL pattern is valid")
});

/// Rewrites assistant replies before they enter the history.
#[derive(Clone, Debug)]
pub struct HistorySanitizer {
    code_block_max_chars: usize,
}

impl Default for HistorySanitizer {
    fn default() -> Self {
        Self::new(&SanitizerConfig::default())
    }
}

impl HistorySanitizer {
    /// Create a sanitizer from configuration.
    #[must_use]
    pub const fn new(config: &SanitizerConfig) -> Self {
        Self {
            code_block_max_chars: config.code_block_max_chars,
        }
    }

    /// Sanitize a turn. Human turns pass through unchanged.
    #[must_use]
    pub fn sanitize(&self, turn: &ConversationTurn) -> ConversationTurn {
        match turn.role {
            Role::Human => turn.clone(),
            Role::Assistant => turn.with_content(self.sanitize_text(&turn.content)),
        }
    }

    /// Sanitize raw assistant text.
    #[must_use]
    pub fn sanitize_text(&self, content: &str) -> String {
        content
            .split(FENCE)
            .enumerate()
            .map(|(index, segment)| {
                // Cut before redacting: a cut can end on a fresh keyword
                // (`fromage` -> `from`), which must be redacted in the same pass.
                if index % 2 == 1 {
                    redact_sql(&self.truncate_block(segment))
                } else {
                    redact_sql(segment)
                }
            })
            .collect::<Vec<_>>()
            .join(FENCE)
    }

    fn truncate_block<'a>(&self, block: &'a str) -> Cow<'a, str> {
        let limit = self.code_block_max_chars + TRUNCATION_SUFFIX.chars().count();
        if block.chars().count() <= limit {
            return Cow::Borrowed(block);
        }
        let mut truncated: String = block.chars().take(self.code_block_max_chars).collect();
        truncated.push_str(TRUNCATION_SUFFIX);
        Cow::Owned(truncated)
    }
}

fn redact_sql(segment: &str) -> String {
    SQL_STATEMENT
        .replace_all(segment, |caps: &Captures<'_>| {
            let terminator = caps.get(1).map_or("", |m| m.as_str());
            format!("{SQL_MARKER}{terminator}")
        })
        .into_owned()
}
