use super::TagId;

/// Operator signals from the manual control stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// Commit whatever is pending without waiting for a confirmation gesture
    ForceCommit,
    /// Drop all pending offers and the active player
    ForceReset,
}

impl std::fmt::Display for ControlSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlSignal::ForceCommit => write!(f, "force-commit"),
            ControlSignal::ForceReset => write!(f, "force-reset"),
        }
    }
}

/// A normalized event headed for the trade engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    /// A tag was read on an input channel
    Scan { channel: String, tag: TagId },
    /// Manual control input
    Control(ControlSignal),
}

impl GameEvent {
    pub fn scan(channel: impl Into<String>, tag: TagId) -> Self {
        GameEvent::Scan {
            channel: channel.into(),
            tag,
        }
    }

    /// Name of the source that produced this event
    pub fn source(&self) -> &str {
        match self {
            GameEvent::Scan { channel, .. } => channel,
            GameEvent::Control(_) => "control",
        }
    }
}
