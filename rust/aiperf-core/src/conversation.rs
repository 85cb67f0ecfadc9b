//! Conversations and turns served by the dataset manager.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
    System,
}

/// One turn in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
    /// Fixed-schedule replay timestamp, relative to the run's T0.
    pub timestamp_ns: Option<i64>,
}

/// An ordered sequence of turns, logically immutable for the run once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub session_id: String,
    pub turns: Vec<Turn>,
}

impl Conversation {
    pub fn turn(&self, index: usize) -> Option<&Turn> {
        self.turns.get(index)
    }
}
