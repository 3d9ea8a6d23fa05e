use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tagtrade::dispatcher;
use tagtrade::engine::ScanOutcome;
use tagtrade::feedback::FeedbackError;
use tagtrade::{
    CommitOutcome, ControlSignal, EngineConfig, EventOutcome, FeedbackEvent, FeedbackSink,
    GameEvent, PlayerId, Rejection, ResourceCategory, SettlementError, SettlementReceipt,
    SettlementTrigger, Shutdown, TagId, TagRegistry, TradeEngine,
};

const REGISTRY: &str = r#"
[[players]]
id = "P1"
tag = "A1"

[[players]]
id = "P2"
tag = "A2"

[[players]]
id = "P3"
tag = "A3"

[[players]]
id = "P4"
tag = "A4"

[resources]
FIRE = ["F1", "F2"]
WATER = ["B1", "B2"]
LAND = ["C1"]
ELECTRICITY = ["E1"]
"#;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Call {
    sender: String,
    recipient: String,
    category: String,
}

/// Records calls; fails the scripted call ordinals (1-based)
#[derive(Default)]
struct RecordingSettlement {
    calls: Mutex<Vec<Call>>,
    fail_on: Vec<usize>,
    delay: Duration,
}

impl RecordingSettlement {
    fn failing_on(fail_on: &[usize]) -> Self {
        Self {
            fail_on: fail_on.to_vec(),
            ..Default::default()
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SettlementTrigger for RecordingSettlement {
    async fn settle(
        &self,
        sender: &PlayerId,
        recipient: &PlayerId,
        category: &ResourceCategory,
    ) -> Result<SettlementReceipt, SettlementError> {
        let ordinal = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(Call {
                sender: sender.to_string(),
                recipient: recipient.to_string(),
                category: category.to_string(),
            });
            calls.len()
        };
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_on.contains(&ordinal) {
            return Err(SettlementError::Rejected(format!("scripted failure {ordinal}")));
        }
        Ok(SettlementReceipt::new(format!("ref-{ordinal}")))
    }
}

#[derive(Default)]
struct EventLog(Mutex<Vec<FeedbackEvent>>);

impl EventLog {
    fn events(&self) -> Vec<FeedbackEvent> {
        self.0.lock().unwrap().clone()
    }
}

impl FeedbackSink for EventLog {
    fn emit(&self, event: &FeedbackEvent) -> Result<(), FeedbackError> {
        self.0.lock().unwrap().push(event.clone());
        Ok(())
    }
}

fn tag(raw: &str) -> TagId {
    TagId::normalize(raw).unwrap()
}

fn pid(raw: &str) -> PlayerId {
    PlayerId::new(raw)
}

fn engine_with(settlement: Arc<RecordingSettlement>) -> (TradeEngine, Arc<EventLog>) {
    let registry = Arc::new(TagRegistry::from_toml_str(REGISTRY).unwrap());
    let feedback = Arc::new(EventLog::default());
    let engine = TradeEngine::new(
        registry,
        settlement,
        feedback.clone(),
        EngineConfig::immediate(),
    );
    (engine, feedback)
}

fn call(sender: &str, recipient: &str, category: &str) -> Call {
    Call {
        sender: sender.into(),
        recipient: recipient.into(),
        category: category.into(),
    }
}

#[tokio::test]
async fn two_player_swap_settles_both_ways() {
    let settlement = Arc::new(RecordingSettlement::default());
    let (mut engine, feedback) = engine_with(settlement.clone());

    engine.on_scan(&tag("A1")).await;
    engine.on_scan(&tag("F1")).await;
    engine.on_scan(&tag("A2")).await;
    engine.on_scan(&tag("B1")).await;
    let outcome = engine
        .handle(GameEvent::Control(ControlSignal::ForceCommit))
        .await;

    match outcome {
        EventOutcome::Commit(CommitOutcome::Settled { transfers }) => assert_eq!(transfers.len(), 2),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(
        settlement.calls(),
        vec![call("P1", "P2", "FIRE"), call("P2", "P1", "WATER")]
    );

    let snapshot = engine.snapshot();
    assert!(snapshot.is_burned(&tag("F1")));
    assert!(snapshot.is_burned(&tag("B1")));
    assert!(snapshot.is_idle());
    assert!(matches!(feedback.events().last(), Some(FeedbackEvent::Ready)));
}

#[tokio::test]
async fn resource_before_any_player_is_rejected() {
    let settlement = Arc::new(RecordingSettlement::default());
    let (mut engine, _) = engine_with(settlement);
    let before = engine.snapshot();

    let outcome = engine.on_scan(&tag("F1")).await;

    assert_eq!(outcome, ScanOutcome::Rejected(Rejection::NoActivePlayer));
    assert_eq!(engine.snapshot(), before);
}

#[tokio::test]
async fn single_offer_cannot_commit() {
    let settlement = Arc::new(RecordingSettlement::default());
    let (mut engine, _) = engine_with(settlement.clone());

    engine.on_scan(&tag("A1")).await;
    engine.on_scan(&tag("F1")).await;
    let before = engine.snapshot();

    let outcome = engine.attempt_commit(false).await;
    assert_eq!(
        outcome,
        CommitOutcome::Rejected(Rejection::InsufficientParticipants { participants: 1 })
    );
    // forcing does not turn it into a self-transfer
    let forced = engine.attempt_commit(true).await;
    assert_eq!(forced, outcome);

    assert!(settlement.calls().is_empty());
    assert_eq!(engine.snapshot(), before);
}

#[tokio::test]
async fn forced_confirm_with_empty_table_resets() {
    let settlement = Arc::new(RecordingSettlement::default());
    let (mut engine, feedback) = engine_with(settlement.clone());

    engine.on_scan(&tag("A1")).await;
    let outcome = engine
        .handle(GameEvent::Control(ControlSignal::ForceCommit))
        .await;

    assert_eq!(outcome, EventOutcome::Commit(CommitOutcome::Cleared));
    assert!(settlement.calls().is_empty());
    assert!(engine.snapshot().is_idle());
    assert!(matches!(feedback.events().last(), Some(FeedbackEvent::Ready)));
}

#[tokio::test]
async fn failed_second_leg_keeps_first_burn_and_resets() {
    let settlement = Arc::new(RecordingSettlement::failing_on(&[2]));
    let (mut engine, feedback) = engine_with(settlement.clone());

    engine.on_scan(&tag("A1")).await;
    engine.on_scan(&tag("F1")).await;
    engine.on_scan(&tag("A2")).await;
    engine.on_scan(&tag("B1")).await;
    engine.on_scan(&tag("A3")).await;
    engine.on_scan(&tag("C1")).await;

    let outcome = engine.attempt_commit(true).await;
    match &outcome {
        CommitOutcome::Aborted {
            settled, total, ..
        } => {
            assert_eq!(settled.len(), 1);
            assert_eq!(*total, 3);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    // third leg never attempted
    assert_eq!(
        settlement.calls(),
        vec![call("P1", "P2", "FIRE"), call("P2", "P3", "WATER")]
    );

    let snapshot = engine.snapshot();
    assert!(snapshot.is_burned(&tag("F1")));
    assert!(!snapshot.is_burned(&tag("B1")));
    assert!(!snapshot.is_burned(&tag("C1")));
    assert!(snapshot.is_idle());
    assert!(feedback
        .events()
        .iter()
        .any(|e| matches!(e, FeedbackEvent::CommitFailed { settled: 1, total: 3, .. })));
}

#[tokio::test]
async fn confirmation_scan_commits_four_player_round_in_roster_order() {
    let settlement = Arc::new(RecordingSettlement::default());
    let (mut engine, _) = engine_with(settlement.clone());

    // offers placed out of roster order
    for raw in ["A3", "C1", "A1", "F1", "A4", "E1", "A2", "B1"] {
        engine.on_scan(&tag(raw)).await;
    }
    // P4 scans again to confirm
    let outcome = engine.on_scan(&tag("A4")).await;
    assert!(matches!(outcome, ScanOutcome::Commit(CommitOutcome::Settled { .. })));

    assert_eq!(
        settlement.calls(),
        vec![
            call("P1", "P2", "FIRE"),
            call("P2", "P3", "WATER"),
            call("P3", "P4", "LAND"),
            call("P4", "P1", "ELECTRICITY"),
        ]
    );
}

#[tokio::test]
async fn burned_tags_are_refused_for_every_player() {
    let settlement = Arc::new(RecordingSettlement::default());
    let (mut engine, _) = engine_with(settlement);

    engine.on_scan(&tag("A1")).await;
    engine.on_scan(&tag("F1")).await;
    engine.on_scan(&tag("A2")).await;
    engine.on_scan(&tag("B1")).await;
    engine.attempt_commit(false).await;

    for player in ["A1", "A2", "A3", "A4"] {
        engine.on_scan(&tag(player)).await;
        let before = engine.snapshot();
        let outcome = engine.on_scan(&tag("f1")).await;
        assert_eq!(outcome, ScanOutcome::Rejected(Rejection::DoubleSpend(tag("F1"))));
        assert_eq!(engine.snapshot(), before);
    }
}

#[tokio::test]
async fn pending_tag_stays_usable_until_settled() {
    let settlement = Arc::new(RecordingSettlement::default());
    let (mut engine, _) = engine_with(settlement);

    engine.on_scan(&tag("A1")).await;
    engine.on_scan(&tag("F1")).await;
    engine.handle(GameEvent::Control(ControlSignal::ForceReset)).await;

    engine.on_scan(&tag("A2")).await;
    let outcome = engine.on_scan(&tag("F1")).await;
    assert!(matches!(outcome, ScanOutcome::ResourceReady { .. }));
    assert_eq!(
        engine.snapshot().pending(&pid("P2")).map(|p| p.category.as_str()),
        Some("FIRE")
    );
}

#[tokio::test]
async fn reset_twice_equals_reset_once() {
    let settlement = Arc::new(RecordingSettlement::default());
    let (mut engine, _) = engine_with(settlement);

    engine.on_scan(&tag("A1")).await;
    engine.on_scan(&tag("F1")).await;
    engine.reset();
    let once = engine.snapshot();
    engine.reset();
    assert_eq!(engine.snapshot(), once);
    assert!(once.is_idle());
}

#[tokio::test]
async fn dispatcher_applies_events_from_many_sources() {
    let settlement = Arc::new(RecordingSettlement::default());
    let (engine, feedback) = engine_with(settlement);
    let shutdown = Shutdown::new();
    let (dispatcher, events) = dispatcher::channel(engine, 4);
    let runner = tokio::spawn(dispatcher.run(shutdown.subscribe()));

    let mut producers = Vec::new();
    for (i, player) in ["A1", "A2", "A3", "A4"].into_iter().enumerate() {
        let events = events.clone();
        producers.push(tokio::spawn(async move {
            for _ in 0..25 {
                events
                    .send(GameEvent::scan(format!("reader{i}"), tag(player)))
                    .await
                    .unwrap();
            }
        }));
    }
    for producer in producers {
        producer.await.unwrap();
    }
    drop(events);

    let engine = tokio::time::timeout(Duration::from_secs(5), runner)
        .await
        .unwrap()
        .unwrap();
    let activations = feedback
        .events()
        .iter()
        .filter(|e| matches!(e, FeedbackEvent::PlayerActivated { .. }))
        .count();
    // the small queue made producers wait; nothing was dropped
    assert_eq!(activations, 100);
    assert!(engine.snapshot().active.is_some());
}

#[tokio::test]
async fn events_queued_during_commit_are_applied_afterwards() {
    let settlement = Arc::new(RecordingSettlement::slow(Duration::from_millis(50)));
    let (engine, _) = engine_with(settlement.clone());
    let shutdown = Shutdown::new();
    let (dispatcher, events) = dispatcher::channel(engine, 16);
    let runner = tokio::spawn(dispatcher.run(shutdown.subscribe()));

    for raw in ["A1", "F1", "A2", "B1"] {
        events.send(GameEvent::scan("reader1", tag(raw))).await.unwrap();
    }
    events
        .send(GameEvent::Control(ControlSignal::ForceCommit))
        .await
        .unwrap();
    // arrives while the round is still settling
    events.send(GameEvent::scan("reader2", tag("A3"))).await.unwrap();
    drop(events);

    let engine = tokio::time::timeout(Duration::from_secs(5), runner)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(settlement.calls().len(), 2);
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.active, Some(pid("P3")));
    assert!(snapshot.is_burned(&tag("F1")));
    assert!(snapshot.is_burned(&tag("B1")));
}
