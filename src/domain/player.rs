use serde::{Deserialize, Serialize};

use super::{ResourceCategory, TagId};

/// Roster identity of a player (e.g. "Player1").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PlayerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A resource offered by a player but not yet settled.
///
/// Category and tag travel together, so a slot can never hold one without the other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingResource {
    pub category: ResourceCategory,
    pub tag: TagId,
}

/// Per-player trade slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerSlot {
    pub player: PlayerId,
    pub pending: Option<PendingResource>,
}

impl PlayerSlot {
    pub fn empty(player: PlayerId) -> Self {
        Self {
            player,
            pending: None,
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn clear(&mut self) {
        self.pending = None;
    }
}
