use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::Role;
use crate::utils;

/// Whether a turn is still being written.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    /// The assistant turn currently being streamed.
    InProgress,

    /// A finished turn.  Complete turns are never modified.
    Complete,
}

/// One message exchanged in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Who wrote the turn.
    pub role: Role,

    /// The verbatim text of the turn.
    pub content: String,

    /// When the turn was created.
    #[serde(with = "crate::utils::time")]
    pub timestamp: OffsetDateTime,

    /// Whether the turn is finished.
    pub state: TurnState,
}

impl Turn {
    /// Creates a complete turn stamped with the current time.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self::at(role, content, utils::time::now())
    }

    /// Creates a complete turn with an explicit timestamp.
    pub fn at(role: Role, content: impl Into<String>, timestamp: OffsetDateTime) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp,
            state: TurnState::Complete,
        }
    }

    /// Creates a complete user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Creates a complete assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Creates an empty in-progress turn for `role`.
    pub fn in_progress(role: Role) -> Self {
        Self {
            state: TurnState::InProgress,
            ..Self::new(role, String::new())
        }
    }

    /// Returns true while the turn is still being streamed.
    pub fn is_in_progress(&self) -> bool {
        self.state == TurnState::InProgress
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_json_uses_rfc3339() {
        let ts = time::macros::datetime!(2026-10-17 08:30:00 UTC);
        let turn = Turn::at(Role::User, "hi", ts);
        let json = serde_json::to_value(&turn).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["timestamp"], "2026-10-17T08:30:00Z");
        assert_eq!(json["state"], "complete");
        let back: Turn = serde_json::from_value(json).unwrap();
        assert_eq!(back, turn);
    }

    #[test]
    fn in_progress_turn_is_empty() {
        let turn = Turn::in_progress(Role::Assistant);
        assert!(turn.is_in_progress());
        assert!(turn.content.is_empty());
    }
}
