//! Trade State Machine
//!
//! Owns all mutable game state and applies normalized events to it:
//!
//! ```text
//! Idle ──player scan──▶ Addressing ──resource scans──▶ Addressing (more offers)
//!   ▲                                                        │
//!   │                         confirm / force-commit (k ≥ 2) ▼
//!   └──────────── reset (always) ◀──────────────────── Committing
//! ```
//!
//! Every operation takes `&mut self`, so exclusive access is the caller's job;
//! in the running system the [`crate::dispatcher`] task is the only owner.
//! Rejections are values, not errors, and each one is reported as feedback.

mod commit;
mod state;

pub use commit::{plan_round, CommitOutcome, SettledTransfer, Transfer};
pub use state::GameSnapshot;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::GameConfig;
use crate::domain::{ControlSignal, GameEvent, PendingResource, PlayerId, ResourceCategory, TagId};
use crate::feedback::{notify, FeedbackEvent, FeedbackSink};
use crate::registry::{TagKind, TagRegistry};
use crate::settlement::SettlementTrigger;

use state::GameState;

/// Timing knobs for commit execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Wait after a round (successful or not) before the reset
    pub settle_delay: Duration,
    /// Wait after each successful transfer
    pub step_delay: Duration,
    /// Give up on a single settlement call after this long
    pub settlement_timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from(&GameConfig::default())
    }
}

impl From<&GameConfig> for EngineConfig {
    fn from(game: &GameConfig) -> Self {
        Self {
            settle_delay: game.settle_delay(),
            step_delay: game.step_delay(),
            settlement_timeout: game.settlement_timeout(),
        }
    }
}

impl EngineConfig {
    /// No delays at all; used by replays and tests
    pub fn immediate() -> Self {
        Self {
            settle_delay: Duration::ZERO,
            step_delay: Duration::ZERO,
            settlement_timeout: None,
        }
    }
}

/// Why an event was refused. None of these change the state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    UnknownTag(TagId),
    UnknownPlayer(PlayerId),
    NoActivePlayer,
    DoubleSpend(TagId),
    InsufficientParticipants { participants: usize },
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::UnknownTag(tag) => write!(f, "unknown tag {tag}"),
            Rejection::UnknownPlayer(player) => write!(f, "unknown player {player}"),
            Rejection::NoActivePlayer => write!(f, "no active player"),
            Rejection::DoubleSpend(tag) => write!(f, "double-spend of {tag}"),
            Rejection::InsufficientParticipants { participants } => {
                write!(f, "insufficient participants ({participants})")
            }
        }
    }
}

/// Result of a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Activated(PlayerId),
    ResourceReady {
        player: PlayerId,
        category: ResourceCategory,
        /// Player whose pending offer of the same tag was withdrawn
        released_from: Option<PlayerId>,
    },
    /// The scan was a confirmation gesture and triggered a commit attempt
    Commit(CommitOutcome),
    Rejected(Rejection),
}

/// Result of any event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Scan(ScanOutcome),
    Commit(CommitOutcome),
    Reset,
}

pub struct TradeEngine {
    registry: Arc<TagRegistry>,
    state: GameState,
    settlement: Arc<dyn SettlementTrigger>,
    feedback: Arc<dyn FeedbackSink>,
    config: EngineConfig,
}

impl TradeEngine {
    pub fn new(
        registry: Arc<TagRegistry>,
        settlement: Arc<dyn SettlementTrigger>,
        feedback: Arc<dyn FeedbackSink>,
        config: EngineConfig,
    ) -> Self {
        let state = GameState::new(registry.roster());
        Self {
            registry,
            state,
            settlement,
            feedback,
            config,
        }
    }

    pub fn snapshot(&self) -> GameSnapshot {
        self.state.snapshot()
    }

    /// Apply one event from any source
    pub async fn handle(&mut self, event: GameEvent) -> EventOutcome {
        match event {
            GameEvent::Scan { channel, tag } => {
                debug!(channel = %channel, tag = %tag, "Scan");
                EventOutcome::Scan(self.on_scan(&tag).await)
            }
            GameEvent::Control(ControlSignal::ForceCommit) => {
                info!("Manual confirm");
                EventOutcome::Commit(self.attempt_commit(true).await)
            }
            GameEvent::Control(ControlSignal::ForceReset) => {
                info!("Manual reset");
                self.reset();
                EventOutcome::Reset
            }
        }
    }

    /// Route a scanned tag to the player or resource handler
    pub async fn on_scan(&mut self, tag: &TagId) -> ScanOutcome {
        let player = match self.registry.resolve(tag) {
            Some(TagKind::Player(player)) => player.id.clone(),
            Some(TagKind::Resource(_)) => return self.on_resource_event(tag),
            None => {
                warn!(tag = %tag, "Unknown tag");
                self.emit(FeedbackEvent::UnknownTag(tag.clone()));
                return ScanOutcome::Rejected(Rejection::UnknownTag(tag.clone()));
            }
        };
        self.on_player_event(&player).await
    }

    /// A player scanned their identity tag.
    ///
    /// With an offer already pending this is a confirmation gesture; otherwise
    /// the player becomes the target of the next resource scan.
    pub async fn on_player_event(&mut self, player: &PlayerId) -> ScanOutcome {
        let Some(slot) = self.state.slot(player) else {
            warn!(player = %player, "Player not in roster");
            self.emit(FeedbackEvent::UnknownPlayer(player.clone()));
            return ScanOutcome::Rejected(Rejection::UnknownPlayer(player.clone()));
        };

        let label = self.registry.label(player).to_string();
        if slot.has_pending() {
            info!("{} confirmed the trade", player);
            self.emit(FeedbackEvent::PlayerConfirmed {
                player: player.clone(),
                label,
            });
            return ScanOutcome::Commit(self.attempt_commit(false).await);
        }

        self.state.set_active(player.clone());
        info!("{} entered trade mode", player);
        self.emit(FeedbackEvent::PlayerActivated {
            player: player.clone(),
            label,
        });
        ScanOutcome::Activated(player.clone())
    }

    /// A resource card was scanned; offer it on behalf of the active player.
    ///
    /// Pending offers are not burned, so the same card may be re-offered
    /// (moving it to the new player) until a settlement consumes it.
    pub fn on_resource_event(&mut self, tag: &TagId) -> ScanOutcome {
        let Some(category) = self.registry.resource_category(tag).cloned() else {
            warn!(tag = %tag, "Not a resource tag");
            self.emit(FeedbackEvent::UnknownTag(tag.clone()));
            return ScanOutcome::Rejected(Rejection::UnknownTag(tag.clone()));
        };

        let Some(player) = self.state.active().cloned() else {
            warn!(tag = %tag, "Resource scanned with no active player");
            self.emit(FeedbackEvent::NoActivePlayer);
            return ScanOutcome::Rejected(Rejection::NoActivePlayer);
        };

        if self.state.is_burned(tag) {
            warn!(tag = %tag, player = %player, "Tag already used in a previous trade");
            self.emit(FeedbackEvent::DoubleSpend(tag.clone()));
            return ScanOutcome::Rejected(Rejection::DoubleSpend(tag.clone()));
        }

        let released_from = self.state.assign(
            &player,
            PendingResource {
                category: category.clone(),
                tag: tag.clone(),
            },
        );
        if let Some(previous) = &released_from {
            info!(tag = %tag, from = %previous, to = %player, "Pending card moved between players");
            self.emit(FeedbackEvent::OfferMoved {
                player: previous.clone(),
                label: self.registry.label(previous).to_string(),
            });
        }
        info!("{} set for {} (tag {})", category, player, tag);
        self.emit(FeedbackEvent::ResourceReady {
            player: player.clone(),
            category: category.clone(),
        });

        ScanOutcome::ResourceReady {
            player,
            category,
            released_from,
        }
    }

    /// Clear every slot and the active player. Burned tags stay burned.
    pub fn reset(&mut self) {
        self.state.clear_round();
        info!("State reset");
        self.emit(FeedbackEvent::Ready);
    }

    fn emit(&self, event: FeedbackEvent) {
        notify(self.feedback.as_ref(), event);
    }
}
