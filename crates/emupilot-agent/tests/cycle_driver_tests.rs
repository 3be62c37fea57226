//! Driver-level behaviour of the decision cycle with in-memory collaborators.

use async_trait::async_trait;
use emupilot_agent::{
    ActionDecision, CommandSink, CycleDriver, CyclePhase, CycleSettings, DecisionContext,
    DecisionCycle, DecisionOracle, DriverConfig, OracleOutcome, SettlePolicy, TimingGate,
    VisualInput,
};
use emupilot_capture::MonotonicClock;
use emupilot_emulator::{
    ConnectionId, Direction, EmulatorMessage, GameStateSnapshot, LinkError, LinkEvent,
    OutboundCommand,
};
use emupilot_ipc::{ClipPayload, ClipSource, IpcError};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

#[derive(Default)]
struct RecordingSink {
    lines: Mutex<Vec<(ConnectionId, String)>>,
}

impl RecordingSink {
    fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().iter().map(|(_, l)| l.clone()).collect()
    }
}

impl CommandSink for RecordingSink {
    fn send_to(&self, connection: ConnectionId, command: &OutboundCommand) -> Result<(), LinkError> {
        self.lines
            .lock()
            .unwrap()
            .push((connection, command.to_line()));
        Ok(())
    }
}

struct FixedClips;

#[async_trait]
impl ClipSource for FixedClips {
    async fn fetch_clip(&self, _max_duration: Option<f64>) -> Result<ClipPayload, IpcError> {
        Ok(ClipPayload {
            bytes: b"GIF89a".to_vec(),
            frame_count: 1,
            duration_secs: 0.1,
            start_timestamp: 0,
            end_timestamp: 100,
            fps: 10.0,
            frame_delay_ms: 100,
            playback_ms: 100,
        })
    }
}

struct EmptyClips;

#[async_trait]
impl ClipSource for EmptyClips {
    async fn fetch_clip(&self, _max_duration: Option<f64>) -> Result<ClipPayload, IpcError> {
        Err(IpcError::NoFrames {
            start_ms: 0,
            end_ms: 0,
        })
    }
}

/// Presses UP after `delay`, tracking how many calls overlap.
struct SlowOracle {
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl SlowOracle {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DecisionOracle for SlowOracle {
    async fn decide(&self, _visual: &VisualInput, _context: &DecisionContext) -> OracleOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        OracleOutcome::Actions(ActionDecision {
            actions: vec!["UP".into()],
            durations: vec![],
            text: "north".into(),
        })
    }
}

struct Harness {
    events: mpsc::Sender<LinkEvent>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<DecisionCycle>,
    sink: Arc<RecordingSink>,
}

impl Harness {
    fn start(clips: Arc<dyn ClipSource>, oracle: Arc<dyn DecisionOracle>, oracle_timeout: Duration) -> Self {
        let cycle = DecisionCycle::new(
            CycleSettings::default(),
            TimingGate::new(0, 60.0, SettlePolicy::Fixed { delay_ms: 0 }),
        );
        let config = DriverConfig {
            tick_interval: Duration::from_millis(10),
            oracle_timeout,
            ..DriverConfig::default()
        };
        let sink = Arc::new(RecordingSink::default());
        let driver = CycleDriver::new(cycle, config, sink.clone(), clips, oracle, Arc::new(MonotonicClock::new()));

        let (events_tx, events_rx) = mpsc::channel(256);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(driver.run(events_rx, shutdown_rx));
        Self {
            events: events_tx,
            shutdown: shutdown_tx,
            task,
            sink,
        }
    }

    async fn send(&self, event: LinkEvent) {
        self.events.send(event).await.unwrap();
    }

    async fn message(&self, connection: ConnectionId, line: &str) {
        self.send(LinkEvent::Message {
            connection,
            message: EmulatorMessage::parse(line),
        })
        .await;
    }

    async fn wait_for_line(&self, predicate: impl Fn(&[String]) -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !predicate(&self.sink.lines()) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("condition not met, sent: {:?}", self.sink.lines()));
    }

    async fn stop(self) -> DecisionCycle {
        self.shutdown.send(true).unwrap();
        self.task.await.unwrap()
    }
}

fn peer() -> SocketAddr {
    "127.0.0.1:40000".parse().unwrap()
}

fn count(lines: &[String], wanted: &str) -> usize {
    lines.iter().filter(|l| l.as_str() == wanted).count()
}

#[tokio::test]
async fn burst_of_states_yields_one_oracle_call() {
    let oracle = Arc::new(SlowOracle::new(Duration::from_millis(150)));
    let harness = Harness::start(Arc::new(FixedClips), oracle.clone(), Duration::from_secs(5));

    harness.send(LinkEvent::Connected { connection: 1, peer: peer() }).await;
    harness.message(1, "config_loaded").await;
    harness.wait_for_line(|lines| count(lines, "request_state") == 1).await;

    for x in 0..30 {
        harness.message(1, &format!("state||UP||{x}||1||3")).await;
    }
    harness.wait_for_line(|lines| count(lines, "6|2") == 1).await;

    // After the action completes the driver asks for fresh state.
    harness.wait_for_line(|lines| count(lines, "request_state") == 2).await;

    let cycle = harness.stop().await;
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
    assert_eq!(oracle.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(cycle.coalesced_events(), 29);
    assert_eq!(cycle.decisions(), 1);
    assert_eq!(cycle.phase(), CyclePhase::AwaitState);
    assert_eq!(
        cycle.snapshot().copied(),
        Some(GameStateSnapshot {
            direction: Direction::Up,
            x: 29,
            y: 1,
            map_id: 3
        })
    );
}

#[tokio::test]
async fn config_is_sent_first_and_gates_requests() {
    let oracle = Arc::new(SlowOracle::new(Duration::from_millis(1)));
    let harness = Harness::start(Arc::new(FixedClips), oracle.clone(), Duration::from_secs(5));

    harness.send(LinkEvent::Connected { connection: 7, peer: peer() }).await;
    harness.message(7, "ready").await;
    harness.message(7, "state||UP||1||1||1").await;
    harness.wait_for_line(|lines| !lines.is_empty()).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(harness.sink.lines(), vec!["config||unknown||".to_string()]);
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);

    harness.message(7, "config_loaded||unknown").await;
    harness.wait_for_line(|lines| count(lines, "request_state") == 1).await;
    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn oracle_timeout_presses_fallback() {
    let oracle = Arc::new(SlowOracle::new(Duration::from_secs(600)));
    let harness = Harness::start(Arc::new(FixedClips), oracle, Duration::from_millis(200));

    harness.send(LinkEvent::Connected { connection: 1, peer: peer() }).await;
    harness.message(1, "config_loaded").await;
    harness.message(1, "state||DOWN||2||2||2").await;
    harness.wait_for_line(|lines| count(lines, "1|2") == 1).await;

    let cycle = harness.stop().await;
    assert_eq!(cycle.fallbacks(), 1);
    let last = cycle.history().last().cloned().unwrap();
    assert_eq!(last.fallback_reason.as_deref(), Some("oracle error: oracle timeout"));
}

#[tokio::test]
async fn missing_clip_presses_fallback() {
    let oracle = Arc::new(SlowOracle::new(Duration::from_millis(1)));
    let harness = Harness::start(Arc::new(EmptyClips), oracle.clone(), Duration::from_secs(5));

    harness.send(LinkEvent::Connected { connection: 1, peer: peer() }).await;
    harness.message(1, "config_loaded").await;
    harness.message(1, "state||LEFT||0||0||0").await;
    harness.wait_for_line(|lines| count(lines, "1|2") == 1).await;

    harness.stop().await;
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn events_from_replaced_connection_are_ignored() {
    let oracle = Arc::new(SlowOracle::new(Duration::from_millis(1)));
    let harness = Harness::start(Arc::new(FixedClips), oracle.clone(), Duration::from_secs(5));

    harness.send(LinkEvent::Connected { connection: 1, peer: peer() }).await;
    harness.send(LinkEvent::Connected { connection: 2, peer: peer() }).await;
    // Late traffic from the old connection must not acknowledge the new one's config.
    harness.message(1, "config_loaded").await;
    harness
        .send(LinkEvent::Disconnected {
            connection: 1,
            reason: None,
        })
        .await;
    harness.wait_for_line(|lines| count(lines, "config||unknown||") == 2).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let cycle = harness.stop().await;
    assert_eq!(cycle.phase(), CyclePhase::WaitConfig);
    assert!(cycle.status().connected);
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
}

