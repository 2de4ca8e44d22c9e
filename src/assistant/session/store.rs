//! Per-session conversation history.

use crate::assistant::core::turn::{ConversationTurn, Role};

/// Ordered conversation history owned by one session.
///
/// Storage is unbounded; callers only ever read a bounded window through
/// [`SessionStore::recent`].
#[derive(Clone, Debug, Default)]
pub struct SessionStore {
    turns: Vec<ConversationTurn>,
}

impl SessionStore {
    /// Create an empty store.
    #[must_use]
    pub const fn new() -> Self {
        Self { turns: Vec::new() }
    }

    /// Append a turn at the end of the history.
    pub fn append(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    /// The last `min(n, len)` turns, oldest first.
    #[must_use]
    pub fn recent(&self, n: usize) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    /// Remove every turn.
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Number of stored turns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether the history is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Full history, oldest first.
    #[must_use]
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// Content of the most recent user turn.
    #[must_use]
    pub fn last_user_message(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|turn| turn.role == Role::Human)
            .map(|turn| turn.content.as_str())
    }
}
