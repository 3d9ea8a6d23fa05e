//! Mutable game state, owned by [`super::TradeEngine`] and never handed out mutably.

use std::collections::{BTreeSet, HashSet};

use serde::Serialize;

use crate::domain::{PendingResource, PlayerId, PlayerSlot, TagId};
use crate::registry::Player;

#[derive(Debug, Clone)]
pub(crate) struct GameState {
    /// One slot per roster player, in roster order
    slots: Vec<PlayerSlot>,
    active: Option<PlayerId>,
    /// Tags consumed by a successful settlement. Only grows.
    used: HashSet<TagId>,
}

impl GameState {
    pub(crate) fn new(roster: &[Player]) -> Self {
        Self {
            slots: roster
                .iter()
                .map(|p| PlayerSlot::empty(p.id.clone()))
                .collect(),
            active: None,
            used: HashSet::new(),
        }
    }

    pub(crate) fn slot(&self, player: &PlayerId) -> Option<&PlayerSlot> {
        self.slots.iter().find(|s| &s.player == player)
    }

    pub(crate) fn active(&self) -> Option<&PlayerId> {
        self.active.as_ref()
    }

    pub(crate) fn set_active(&mut self, player: PlayerId) {
        self.active = Some(player);
    }

    pub(crate) fn is_burned(&self, tag: &TagId) -> bool {
        self.used.contains(tag)
    }

    pub(crate) fn burn(&mut self, tag: TagId) -> bool {
        self.used.insert(tag)
    }

    /// Put a resource into a player's slot.
    ///
    /// A physical card can only be offered once, so if another slot holds the
    /// same tag that slot is cleared and its owner returned.
    pub(crate) fn assign(
        &mut self,
        player: &PlayerId,
        pending: PendingResource,
    ) -> Option<PlayerId> {
        let mut released = None;
        for slot in self.slots.iter_mut() {
            if &slot.player == player {
                continue;
            }
            if slot.pending.as_ref().map(|p| &p.tag) == Some(&pending.tag) {
                slot.clear();
                released = Some(slot.player.clone());
            }
        }
        if let Some(slot) = self.slots.iter_mut().find(|s| &s.player == player) {
            slot.pending = Some(pending);
        }
        released
    }

    /// Players with a pending resource, in roster order
    pub(crate) fn participants(&self) -> Vec<(PlayerId, PendingResource)> {
        self.slots
            .iter()
            .filter_map(|s| s.pending.clone().map(|p| (s.player.clone(), p)))
            .collect()
    }

    /// Empty every slot and the active pointer. The used set is untouched.
    pub(crate) fn clear_round(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.clear();
        }
        self.active = None;
    }

    pub(crate) fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            active: self.active.clone(),
            slots: self.slots.clone(),
            used_tags: self.used.iter().cloned().collect(),
        }
    }
}

/// Read-only copy of the game state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameSnapshot {
    pub active: Option<PlayerId>,
    pub slots: Vec<PlayerSlot>,
    pub used_tags: BTreeSet<TagId>,
}

impl GameSnapshot {
    /// No active player and no pending offers
    pub fn is_idle(&self) -> bool {
        self.active.is_none() && self.slots.iter().all(|s| !s.has_pending())
    }

    pub fn pending(&self, player: &PlayerId) -> Option<&PendingResource> {
        self.slots
            .iter()
            .find(|s| &s.player == player)
            .and_then(|s| s.pending.as_ref())
    }

    pub fn is_burned(&self, tag: &TagId) -> bool {
        self.used_tags.contains(tag)
    }
}
