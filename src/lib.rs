pub mod app;
pub mod cli;
pub mod config;
pub mod control;
pub mod dispatcher;
pub mod domain;
pub mod engine;
pub mod error;
pub mod feedback;
pub mod ingest;
pub mod logging;
pub mod registry;
pub mod settlement;
pub mod shutdown;

pub use config::AppConfig;
pub use dispatcher::{Dispatcher, EventSender};
pub use domain::{ControlSignal, GameEvent, PlayerId, ResourceCategory, TagId};
pub use engine::{CommitOutcome, EngineConfig, EventOutcome, GameSnapshot, Rejection, TradeEngine};
pub use error::{RegistryError, Result, SettlementError, TagTradeError};
pub use feedback::{Cue, FeedbackEvent, FeedbackSink};
pub use registry::TagRegistry;
pub use settlement::{DryRunSettlement, EvmSettlement, SettlementReceipt, SettlementTrigger};
pub use shutdown::{Shutdown, ShutdownListener, ShutdownSignal};
