//! Wire types exchanged with external collaborators.

use serde::{Deserialize, Serialize};

/// What the chat platform reports about a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadState {
    pub id: String,
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub locked: bool,
}

impl ThreadState {
    /// A thread still accepting messages.
    pub fn is_open(&self) -> bool {
        !self.archived
    }
}
