//! Whole-pipeline run: capture loop, clip server over TCP, emulator link
//! over TCP and the decision cycle, with a scripted emulator.

use async_trait::async_trait;
use emupilot::agent::{
    ActionDecision, CycleDriver, CycleSettings, DecisionContext, DecisionCycle, DecisionOracle,
    DriverConfig, OracleOutcome, SettlePolicy, TimingGate, VisualInput,
};
use emupilot::capture::{
    Capturer, ClipEncoder, ClipEncoderConfig, Clock, FrameRingBuffer, ImageFileSource,
    MonotonicClock,
};
use emupilot::emulator::{EmulatorLink, ProtocolGuard};
use emupilot::ipc::{ClipClient, ClipPolicy, ClipServer, ClipService, TimeoutPolicy};
use image::{Rgba, RgbaImage};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::watch;

/// What the oracle was shown.
#[derive(Default)]
struct Recorded {
    media_types: Mutex<Vec<String>>,
    gif_headers: Mutex<Vec<bool>>,
    contexts: Mutex<Vec<DecisionContext>>,
}

struct PressA {
    seen: Arc<Recorded>,
}

#[async_trait]
impl DecisionOracle for PressA {
    async fn decide(&self, visual: &VisualInput, context: &DecisionContext) -> OracleOutcome {
        self.seen.media_types.lock().unwrap().push(visual.media_type.to_string());
        self.seen.gif_headers.lock().unwrap().push(visual.bytes.starts_with(b"GIF8"));
        self.seen.contexts.lock().unwrap().push(context.clone());
        OracleOutcome::Actions(ActionDecision {
            actions: vec!["A".into()],
            durations: vec![],
            text: "talk".into(),
        })
    }
}

async fn read_line(reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>) -> String {
    let mut line = String::new();
    tokio::time::timeout(Duration::from_secs(10), reader.read_line(&mut line))
        .await
        .expect("emulator side timed out waiting for a command")
        .unwrap();
    line.trim_end().to_string()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scripted_emulator_gets_buttons_for_a_clip_decision() {
    let dir = tempfile::tempdir().unwrap();
    let screen = dir.path().join("live.png");
    RgbaImage::from_pixel(32, 24, Rgba([40, 120, 200, 255]))
        .save(&screen)
        .unwrap();

    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let buffer = Arc::new(FrameRingBuffer::new(Duration::from_secs(20)));
    let mut capturer = Capturer::new(buffer.clone(), clock.clone(), 30.0);
    capturer.start(Box::new(ImageFileSource::new(screen)));

    let encoder = ClipEncoder::new(ClipEncoderConfig {
        target_width: 32,
        ..ClipEncoderConfig::default()
    });
    let service = Arc::new(
        ClipService::new(buffer.clone(), clock.clone(), encoder, ClipPolicy::default())
            .with_capture_flag(capturer.running_flag()),
    );
    let server = ClipServer::bind("127.0.0.1:0", service.clone()).await.unwrap();
    let clip_addr = server.local_addr();
    let server_task = tokio::spawn(server.run(shutdown_rx.clone()));

    let guard = Arc::new(ProtocolGuard::default());
    let link = EmulatorLink::bind("127.0.0.1:0", guard.clone()).await.unwrap();
    let link_addr = link.local_addr();
    let (handle, events, link_task) = link.spawn(shutdown_rx.clone());

    let seen = Arc::new(Recorded::default());
    let driver = CycleDriver::new(
        DecisionCycle::new(
            CycleSettings::default(),
            TimingGate::new(0, 60.0, SettlePolicy::Fixed { delay_ms: 0 }),
        ),
        DriverConfig::default(),
        Arc::new(handle),
        Arc::new(ClipClient::new(clip_addr.to_string(), TimeoutPolicy::default())),
        Arc::new(PressA { seen: seen.clone() }),
        clock,
    )
    .with_guard(guard.clone());
    let driver_task = tokio::spawn(driver.run(events, shutdown_rx));

    // Let the capturer put a few frames in the window.
    tokio::time::timeout(Duration::from_secs(5), async {
        while buffer.len() < 3 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("capturer produced no frames");

    let stream = TcpStream::connect(link_addr).await.unwrap();
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    assert_eq!(read_line(&mut reader).await, "config||unknown||");
    write_half.write_all(b"config_loaded||unknown\n").await.unwrap();
    assert_eq!(read_line(&mut reader).await, "request_state");

    write_half.write_all(b"state||UP||3||4||1\n").await.unwrap();
    assert_eq!(read_line(&mut reader).await, "0|2");

    // The completed press reopens the cycle. A legacy screenshot line is
    // still accepted as a trigger, and counted by the guard.
    assert_eq!(read_line(&mut reader).await, "request_state");
    // Frames for the next clip start at the previous clip's end.
    tokio::time::sleep(Duration::from_millis(250)).await;
    write_half
        .write_all(b"screenshot||/home/player/shots/1.png\n")
        .await
        .unwrap();
    assert_eq!(read_line(&mut reader).await, "0|2");
    assert_eq!(guard.legacy_message_count(), 1);
    assert_eq!(guard.violation_count(), 2);

    shutdown_tx.send(true).unwrap();
    let cycle = driver_task.await.unwrap();
    server_task.await.unwrap().unwrap();
    link_task.await.unwrap();
    capturer.stop();

    assert_eq!(cycle.decisions(), 2);
    assert_eq!(cycle.fallbacks(), 0);
    assert_eq!(*seen.media_types.lock().unwrap(), vec!["image/gif"; 2]);
    assert_eq!(*seen.gif_headers.lock().unwrap(), vec![true, true]);
    let contexts = seen.contexts.lock().unwrap();
    assert_eq!(contexts[0].state.map(|s| (s.x, s.y, s.map_id)), Some((3, 4, 1)));
    assert!(service.watermark().is_some());
}
