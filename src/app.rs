//! Process wiring: build the sinks and settlement backend from config, start
//! the dispatcher, one ingestor per reader and the control loop, and stop
//! them all on Ctrl-C.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::{AppConfig, FeedbackConfig, SettlementConfig, SettlementMode};
use crate::control::{parse_control, run_control};
use crate::dispatcher;
use crate::domain::GameEvent;
use crate::engine::{EngineConfig, GameSnapshot, TradeEngine};
use crate::error::{Result, TagTradeError};
use crate::feedback::{
    AudioFeedback, DisplayFeedback, DisplayRoute, FanoutFeedback, FeedbackSink, TracingFeedback,
};
use crate::ingest::{parse_scan_line, ChannelIngestor};
use crate::registry::TagRegistry;
use crate::settlement::{DryRunSettlement, EvmSettlement, SettlementTrigger};
use crate::shutdown::{Shutdown, ShutdownSignal};

/// Display lines buffered per reader before new ones are dropped
const DISPLAY_QUEUE: usize = 32;

/// Channel name given to scans read from a replay file
pub const REPLAY_CHANNEL: &str = "replay";

/// Load the registry and run every config check, including the cross-checks
/// that need the roster.
pub fn load_validated(config: &AppConfig) -> Result<Arc<TagRegistry>> {
    let registry = TagRegistry::load(&config.registry_path)?;
    config
        .validate_against(&registry)
        .map_err(|problems| TagTradeError::InvalidConfig(problems.join("; ")))?;
    Ok(Arc::new(registry))
}

pub async fn build_settlement(
    config: &SettlementConfig,
    registry: &TagRegistry,
) -> Result<Arc<dyn SettlementTrigger>> {
    match config.mode {
        SettlementMode::DryRun => {
            info!("Settlement: dry run");
            Ok(Arc::new(DryRunSettlement))
        }
        SettlementMode::Evm => {
            let evm = EvmSettlement::connect(config, registry.roster()).await?;
            Ok(Arc::new(evm))
        }
    }
}

/// Feedback sinks for a live run, plus the display queue of each reader
pub fn build_feedback(
    config: &AppConfig,
) -> (Arc<dyn FeedbackSink>, HashMap<String, mpsc::Receiver<String>>) {
    let mut fanout = FanoutFeedback::new().with(Arc::new(TracingFeedback));
    let mut display_queues = HashMap::new();

    let FeedbackConfig {
        display,
        audio_command,
        sounds_dir,
    } = &config.feedback;

    if *display && !config.channels.is_empty() {
        let mut routes = Vec::with_capacity(config.channels.len());
        for channel in &config.channels {
            let (tx, rx) = mpsc::channel(DISPLAY_QUEUE);
            routes.push(DisplayRoute {
                channel: channel.name.clone(),
                players: channel.player_ids(),
                tx,
            });
            display_queues.insert(channel.name.clone(), rx);
        }
        fanout = fanout.with(Arc::new(DisplayFeedback::new(routes)));
    }

    if let Some(command) = audio_command.as_ref().filter(|c| !c.trim().is_empty()) {
        info!(command = %command, dir = %sounds_dir.display(), "Audio cues enabled");
        fanout = fanout.with(Arc::new(AudioFeedback::new(command.clone(), sounds_dir.clone())));
    }

    (Arc::new(fanout), display_queues)
}

/// Run the game until Ctrl-C. Returns the final state.
pub async fn run(config: AppConfig) -> Result<GameSnapshot> {
    let registry = load_validated(&config)?;
    info!(
        players = registry.roster().len(),
        categories = registry.categories().len(),
        channels = config.channels.len(),
        "Registry loaded"
    );
    warn!("Used tags are kept in memory only; a restart makes every burned card usable again");

    let settlement = build_settlement(&config.settlement, &registry).await?;
    let (feedback, mut display_queues) = build_feedback(&config);
    let engine = TradeEngine::new(
        registry,
        settlement,
        feedback,
        EngineConfig::from(&config.game),
    );

    let shutdown = Shutdown::new();
    let (dispatcher, events) = dispatcher::channel(engine, config.queue_capacity);
    let dispatcher_task = tokio::spawn(dispatcher.run(shutdown.subscribe()));

    let mut tasks = Vec::new();
    for channel in &config.channels {
        let display_rx = display_queues.remove(&channel.name);
        let ingestor = ChannelIngestor::new(channel.clone(), events.clone(), display_rx);
        tasks.push(tokio::spawn(ingestor.run(shutdown.subscribe())));
    }
    if config.channels.is_empty() {
        warn!("No scan channels configured");
    }

    if config.control.enabled {
        let control_events = events.clone();
        let listener = shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            let stdin = BufReader::new(tokio::io::stdin());
            if let Err(e) = run_control(stdin, control_events, listener).await {
                error!(error = %e, "Control loop failed");
            }
        }));
    }
    drop(events);

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => shutdown.request(ShutdownSignal::Interrupt),
                Err(e) => error!(error = %e, "Failed to listen for Ctrl-C"),
            }
        });
    }

    let engine = dispatcher_task
        .await
        .map_err(|e| TagTradeError::Channel(format!("dispatcher task failed: {}", e)))?;
    if !shutdown.is_requested() {
        // the dispatcher only stops on its own once every sender is gone
        shutdown.request(ShutdownSignal::InputExhausted);
    }
    for task in tasks {
        // stdin reads can't be cancelled; don't wait on them
        task.abort();
    }

    let snapshot = engine.snapshot();
    info!(used_tags = snapshot.used_tags.len(), "Game stopped");
    Ok(snapshot)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayLine {
    Event(GameEvent),
    /// Blank line or `#` comment
    Skip,
    Unrecognized,
}

/// Interpret one replay line: a `SCAN,<id>` line or a control key
pub fn parse_replay_line(line: &str) -> ReplayLine {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return ReplayLine::Skip;
    }
    if let Some(tag) = parse_scan_line(line) {
        return ReplayLine::Event(GameEvent::scan(REPLAY_CHANNEL, tag));
    }
    match parse_control(line) {
        Some(signal) => ReplayLine::Event(GameEvent::Control(signal)),
        None => ReplayLine::Unrecognized,
    }
}

#[derive(Debug, Clone)]
pub struct ReplaySummary {
    pub events: usize,
    pub skipped: usize,
    pub snapshot: GameSnapshot,
}

impl ReplaySummary {
    /// Final table state as pretty-printed JSON
    pub fn snapshot_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.snapshot)?)
    }
}

/// Feed recorded scan/control lines through a fresh engine
pub async fn replay<R>(
    registry: Arc<TagRegistry>,
    settlement: Arc<dyn SettlementTrigger>,
    feedback: Arc<dyn FeedbackSink>,
    engine_config: EngineConfig,
    reader: R,
) -> Result<ReplaySummary>
where
    R: AsyncBufRead + Unpin,
{
    let engine = TradeEngine::new(registry, settlement, feedback, engine_config);
    let shutdown = Shutdown::new();
    let (dispatcher, events) = dispatcher::channel(engine, 64);
    let dispatcher_task = tokio::spawn(dispatcher.run(shutdown.subscribe()));

    let mut lines = reader.lines();
    let mut sent = 0;
    let mut skipped = 0;
    while let Some(line) = lines.next_line().await? {
        match parse_replay_line(&line) {
            ReplayLine::Event(event) => {
                events.send(event).await?;
                sent += 1;
            }
            ReplayLine::Skip => {}
            ReplayLine::Unrecognized => {
                warn!(line = line.trim(), "Unrecognized replay line");
                skipped += 1;
            }
        }
    }
    // closing the queue lets the dispatcher finish what's queued and stop
    drop(events);

    let engine = dispatcher_task
        .await
        .map_err(|e| TagTradeError::Channel(format!("dispatcher task failed: {}", e)))?;
    Ok(ReplaySummary {
        events: sent,
        skipped,
        snapshot: engine.snapshot(),
    })
}

/// Replay a file with dry-run settlement
pub async fn replay_file(
    config: &AppConfig,
    path: &std::path::Path,
    live_delays: bool,
) -> Result<ReplaySummary> {
    let registry = load_validated(config)?;
    let engine_config = if live_delays {
        EngineConfig::from(&config.game)
    } else {
        EngineConfig::immediate()
    };
    let file = tokio::fs::File::open(path).await?;
    replay(
        registry,
        Arc::new(DryRunSettlement),
        Arc::new(TracingFeedback),
        engine_config,
        BufReader::new(file),
    )
    .await
}
