//! Conversation turn model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::assistant::core::ids::TurnId;

/// Author of a conversation turn.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Message typed by the user.
    Human,
    /// Reply produced by the assistant.
    Assistant,
}

impl Role {
    /// Stable string form used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "human" | "user" => Ok(Self::Human),
            "assistant" | "ai" => Ok(Self::Assistant),
            _ => Err(value.to_string()),
        }
    }
}

/// One message of a conversation.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Turn identifier.
    pub id: TurnId,
    /// Author of the message.
    pub role: Role,
    /// Message text.
    pub content: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    /// Build a user turn stamped now.
    #[must_use]
    pub fn human(content: impl Into<String>) -> Self {
        Self::new(Role::Human, content)
    }

    /// Build an assistant turn stamped now.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: TurnId::new(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Same turn with different content; id, role and timestamp are kept.
    #[must_use]
    pub fn with_content(&self, content: String) -> Self {
        Self {
            id: self.id,
            role: self.role,
            content,
            timestamp: self.timestamp,
        }
    }
}

/// Display projection of a turn.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RenderedTurn {
    /// Author of the message.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl From<&ConversationTurn> for RenderedTurn {
    fn from(turn: &ConversationTurn) -> Self {
        Self {
            role: turn.role,
            content: turn.content.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_common_aliases() {
        assert_eq!("user".parse::<Role>(), Ok(Role::Human));
        assert_eq!("ai".parse::<Role>(), Ok(Role::Assistant));
        assert!("tool".parse::<Role>().is_err());
    }

    #[test]
    fn with_content_keeps_identity() {
        let turn = ConversationTurn::assistant("avant");
        let rewritten = turn.with_content("après".to_string());
        assert_eq!(rewritten.id, turn.id);
        assert_eq!(rewritten.timestamp, turn.timestamp);
        assert_eq!(rewritten.content, "après");
    }
}
