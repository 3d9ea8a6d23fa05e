//! Single serialization point in front of the trade engine.
//!
//! Every producer (scan channels, manual control, replays) holds an
//! [`EventSender`]; one [`Dispatcher`] task owns the [`TradeEngine`] and applies
//! events strictly one at a time. The queue is bounded and producers wait for
//! room, so nothing is dropped while a commit holds the engine.

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::domain::GameEvent;
use crate::engine::{EventOutcome, TradeEngine};
use crate::error::{Result, TagTradeError};
use crate::shutdown::ShutdownListener;

#[derive(Clone, Debug)]
pub struct EventSender {
    tx: mpsc::Sender<GameEvent>,
}

impl EventSender {
    /// Queue an event, waiting while the queue is full
    pub async fn send(&self, event: GameEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|e| TagTradeError::Channel(format!("dispatcher stopped, dropped {:?}", e.0)))
    }
}

impl From<mpsc::Sender<GameEvent>> for EventSender {
    fn from(tx: mpsc::Sender<GameEvent>) -> Self {
        Self { tx }
    }
}

pub struct Dispatcher {
    engine: TradeEngine,
    rx: mpsc::Receiver<GameEvent>,
    processed: u64,
}

/// Create the queue and the dispatcher that drains it
pub fn channel(engine: TradeEngine, capacity: usize) -> (Dispatcher, EventSender) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        Dispatcher {
            engine,
            rx,
            processed: 0,
        },
        EventSender { tx },
    )
}

impl Dispatcher {
    /// Apply events until shutdown or until every sender is gone.
    ///
    /// An event already being applied always runs to completion, so a commit
    /// in progress is never cut short. Returns the engine for inspection.
    pub async fn run(mut self, mut shutdown: ShutdownListener) -> TradeEngine {
        info!("Dispatcher started");
        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.wait() => {
                    info!("Dispatcher stopping on shutdown");
                    break;
                }
                event = self.rx.recv() => match event {
                    Some(event) => event,
                    None => {
                        info!("All event sources closed");
                        break;
                    }
                },
            };
            self.apply(event).await;
        }
        info!(events = self.processed, "Dispatcher stopped");
        self.engine
    }

    async fn apply(&mut self, event: GameEvent) -> EventOutcome {
        let source = event.source().to_string();
        let outcome = self.engine.handle(event).await;
        self.processed += 1;
        debug!(source = %source, outcome = ?outcome, "Event applied");
        outcome
    }
}
