//! Feedback sinks
//!
//! Every state-machine decision produces a [`FeedbackEvent`]: a short status
//! line for the reader displays plus an optional audio cue. Sinks are
//! fire-and-forget. A failing sink is logged and never influences the trade
//! state.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::domain::{PlayerId, ResourceCategory, TagId};

/// Audio cues understood by the sound layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cue {
    Activated,
    ResourceReady,
    DoubleSpend,
    Insufficient,
    Confirmed,
    Failed,
    Reset,
}

impl Cue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cue::Activated => "activated",
            Cue::ResourceReady => "resource-ready",
            Cue::DoubleSpend => "double-spend",
            Cue::Insufficient => "insufficient",
            Cue::Confirmed => "confirmed",
            Cue::Failed => "failed",
            Cue::Reset => "reset",
        }
    }
}

impl std::fmt::Display for Cue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the engine reports to the players
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackEvent {
    PlayerActivated {
        player: PlayerId,
        label: String,
    },
    PlayerConfirmed {
        player: PlayerId,
        label: String,
    },
    ResourceReady {
        player: PlayerId,
        category: ResourceCategory,
    },
    /// A pending card was re-scanned for someone else; addressed to the
    /// player who lost it
    OfferMoved {
        player: PlayerId,
        label: String,
    },
    UnknownTag(TagId),
    UnknownPlayer(PlayerId),
    NoActivePlayer,
    DoubleSpend(TagId),
    InsufficientParticipants {
        participants: usize,
    },
    CommitStarted {
        participants: usize,
    },
    TransferSettled {
        sender_label: String,
        recipient_label: String,
        category: ResourceCategory,
        reference: String,
    },
    CommitConfirmed {
        transfers: usize,
    },
    CommitFailed {
        settled: usize,
        total: usize,
        reason: String,
    },
    Ready,
}

impl FeedbackEvent {
    /// Status line for the reader displays
    pub fn text(&self) -> String {
        match self {
            FeedbackEvent::PlayerActivated { label, .. } => label.clone(),
            FeedbackEvent::PlayerConfirmed { label, .. } => format!("{label} confirms"),
            FeedbackEvent::ResourceReady { category, .. } => format!("{category} ready"),
            FeedbackEvent::OfferMoved { label, .. } => format!("{label} offer moved"),
            FeedbackEvent::UnknownTag(_) => "Unknown tag".to_string(),
            FeedbackEvent::UnknownPlayer(_) => "Unknown player".to_string(),
            FeedbackEvent::NoActivePlayer => "Scan player first".to_string(),
            FeedbackEvent::DoubleSpend(_) => "Block used!".to_string(),
            FeedbackEvent::InsufficientParticipants { .. } => "Need 2+ players".to_string(),
            FeedbackEvent::CommitStarted { .. } => "Sending tx...".to_string(),
            FeedbackEvent::TransferSettled {
                sender_label,
                recipient_label,
                ..
            } => format!("{sender_label}>{recipient_label} OK"),
            FeedbackEvent::CommitConfirmed { .. } => "Trade done".to_string(),
            FeedbackEvent::CommitFailed { settled: 0, .. } => "Tx failed".to_string(),
            FeedbackEvent::CommitFailed { settled, total, .. } => {
                format!("Tx failed {settled}/{total}")
            }
            FeedbackEvent::Ready => "Ready to scan".to_string(),
        }
    }

    pub fn cue(&self) -> Option<Cue> {
        match self {
            FeedbackEvent::PlayerActivated { .. } => Some(Cue::Activated),
            FeedbackEvent::ResourceReady { .. } => Some(Cue::ResourceReady),
            FeedbackEvent::DoubleSpend(_) => Some(Cue::DoubleSpend),
            FeedbackEvent::InsufficientParticipants { .. } => Some(Cue::Insufficient),
            FeedbackEvent::CommitConfirmed { .. } => Some(Cue::Confirmed),
            FeedbackEvent::CommitFailed { .. } => Some(Cue::Failed),
            FeedbackEvent::Ready => Some(Cue::Reset),
            FeedbackEvent::PlayerConfirmed { .. }
            | FeedbackEvent::OfferMoved { .. }
            | FeedbackEvent::UnknownTag(_)
            | FeedbackEvent::UnknownPlayer(_)
            | FeedbackEvent::NoActivePlayer
            | FeedbackEvent::CommitStarted { .. }
            | FeedbackEvent::TransferSettled { .. } => None,
        }
    }

    /// Player the status is addressed to, if it concerns a single player
    pub fn target(&self) -> Option<&PlayerId> {
        match self {
            FeedbackEvent::PlayerActivated { player, .. }
            | FeedbackEvent::PlayerConfirmed { player, .. }
            | FeedbackEvent::ResourceReady { player, .. }
            | FeedbackEvent::OfferMoved { player, .. } => Some(player),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FeedbackError {
    #[error("display channel {0} is full or closed")]
    Display(String),
    #[error("audio playback failed: {0}")]
    Audio(String),
}

/// Renders feedback somewhere (log, display, speaker)
pub trait FeedbackSink: Send + Sync {
    fn emit(&self, event: &FeedbackEvent) -> std::result::Result<(), FeedbackError>;
}

/// Deliver an event and swallow any failure after logging it.
pub fn notify(sink: &dyn FeedbackSink, event: FeedbackEvent) {
    if let Err(e) = sink.emit(&event) {
        warn!(error = %e, text = %event.text(), "Feedback delivery failed");
    }
}

/// Writes feedback to the log
#[derive(Debug, Default, Clone)]
pub struct TracingFeedback;

impl FeedbackSink for TracingFeedback {
    fn emit(&self, event: &FeedbackEvent) -> std::result::Result<(), FeedbackError> {
        match event.cue() {
            Some(cue) => info!(cue = %cue, "{}", event.text()),
            None => info!("{}", event.text()),
        }
        Ok(())
    }
}

/// One reader display and the players it serves
#[derive(Debug, Clone)]
pub struct DisplayRoute {
    pub channel: String,
    pub players: HashSet<PlayerId>,
    pub tx: mpsc::Sender<String>,
}

/// Pushes `DISPLAY:<text>` lines to the reader channels.
///
/// Player-targeted status goes to the channels serving that player; everything
/// else (and any player no channel claims) goes to every channel.
#[derive(Debug, Clone, Default)]
pub struct DisplayFeedback {
    routes: Vec<DisplayRoute>,
}

impl DisplayFeedback {
    pub fn new(routes: Vec<DisplayRoute>) -> Self {
        Self { routes }
    }

    fn routes_for(&self, target: Option<&PlayerId>) -> Vec<&DisplayRoute> {
        let targeted: Vec<&DisplayRoute> = match target {
            Some(player) => self
                .routes
                .iter()
                .filter(|r| r.players.contains(player))
                .collect(),
            None => Vec::new(),
        };
        if targeted.is_empty() {
            self.routes.iter().collect()
        } else {
            targeted
        }
    }
}

impl FeedbackSink for DisplayFeedback {
    fn emit(&self, event: &FeedbackEvent) -> std::result::Result<(), FeedbackError> {
        let line = format!("DISPLAY:{}\n", event.text());
        let mut failed = Vec::new();
        for route in self.routes_for(event.target()) {
            if route.tx.try_send(line.clone()).is_err() {
                failed.push(route.channel.clone());
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(FeedbackError::Display(failed.join(",")))
        }
    }
}

/// Plays cue sounds by spawning an external player (e.g. `afplay`, `paplay`).
///
/// `resource-ready` prefers a per-category file such as `fire.mp3`.
#[derive(Debug, Clone)]
pub struct AudioFeedback {
    command: String,
    sounds_dir: PathBuf,
}

impl AudioFeedback {
    pub fn new(command: impl Into<String>, sounds_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            sounds_dir: sounds_dir.into(),
        }
    }

    pub fn sound_file(&self, event: &FeedbackEvent) -> Option<PathBuf> {
        let cue = event.cue()?;
        if let FeedbackEvent::ResourceReady { category, .. } = event {
            let specific = self
                .sounds_dir
                .join(format!("{}.mp3", category.as_str().to_ascii_lowercase()));
            if specific.exists() {
                return Some(specific);
            }
        }
        Some(self.sounds_dir.join(format!("{}.mp3", cue.as_str())))
    }
}

impl FeedbackSink for AudioFeedback {
    fn emit(&self, event: &FeedbackEvent) -> std::result::Result<(), FeedbackError> {
        let Some(file) = self.sound_file(event) else {
            return Ok(());
        };
        debug!(file = %file.display(), "Playing cue");
        tokio::process::Command::new(&self.command)
            .arg(&file)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(false)
            .spawn()
            .map(|_| ())
            .map_err(|e| FeedbackError::Audio(format!("{}: {e}", file.display())))
    }
}

/// Forwards each event to every inner sink, isolating their failures
#[derive(Clone, Default)]
pub struct FanoutFeedback {
    sinks: Vec<Arc<dyn FeedbackSink>>,
}

impl FanoutFeedback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn FeedbackSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl FeedbackSink for FanoutFeedback {
    fn emit(&self, event: &FeedbackEvent) -> std::result::Result<(), FeedbackError> {
        for sink in &self.sinks {
            notify(sink.as_ref(), event.clone());
        }
        Ok(())
    }
}
