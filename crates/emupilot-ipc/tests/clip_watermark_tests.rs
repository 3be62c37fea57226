//! Watermark behaviour of the clip service, in process and over TCP.

use emupilot_capture::{ClipEncoder, ClipEncoderConfig, FrameRingBuffer, ManualClock};
use emupilot_ipc::{ClipClient, ClipPolicy, ClipServer, ClipService, IpcError, TimeoutPolicy};
use image::{Rgba, RgbaImage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

struct Fixture {
    service: Arc<ClipService>,
    buffer: Arc<FrameRingBuffer>,
    clock: Arc<ManualClock>,
}

impl Fixture {
    fn new() -> Self {
        let buffer = Arc::new(FrameRingBuffer::new(Duration::from_secs(20)));
        let clock = Arc::new(ManualClock::new(1_000));
        let encoder = ClipEncoder::new(ClipEncoderConfig {
            target_width: 16,
            ..ClipEncoderConfig::default()
        });
        let service = Arc::new(ClipService::new(
            buffer.clone(),
            clock.clone(),
            encoder,
            ClipPolicy::default(),
        ));
        Self {
            service,
            buffer,
            clock,
        }
    }

    /// Capture `count` frames `step_ms` apart, then let the clock move past the last one.
    fn capture(&self, count: usize, step_ms: u64) {
        for i in 0..count {
            let ts = self.clock.advance(step_ms);
            let shade = (i % 256) as u8;
            self.buffer
                .push(RgbaImage::from_pixel(32, 24, Rgba([shade, shade, 0, 255])), ts)
                .unwrap();
        }
        self.clock.advance(1);
    }
}

#[test]
fn consecutive_clips_are_contiguous() {
    let fixture = Fixture::new();
    fixture.capture(40, 33);

    let mut previous_end = None;
    for round in 0..6 {
        let clip = fixture.service.get_clip(None).unwrap();
        if let Some(end) = previous_end {
            assert_eq!(clip.start_timestamp, end, "gap or overlap in round {round}");
        }
        assert!(clip.end_timestamp > clip.start_timestamp);
        previous_end = Some(clip.end_timestamp);
        fixture.capture(10 + round * 7, 33);
    }
}

#[test]
fn consecutive_clips_never_share_a_frame() {
    let fixture = Fixture::new();
    fixture.capture(30, 10);
    let frames_before = fixture.buffer.snapshot();
    let first = fixture.service.get_clip(None).unwrap();

    fixture.capture(30, 10);
    let second = fixture.service.get_clip(None).unwrap();

    let in_first = frames_before
        .iter()
        .filter(|f| f.timestamp_ms >= first.start_timestamp && f.timestamp_ms < first.end_timestamp)
        .count();
    let all = fixture.buffer.snapshot();
    let in_second = all
        .iter()
        .filter(|f| f.timestamp_ms >= second.start_timestamp && f.timestamp_ms < second.end_timestamp)
        .count();
    let in_both = all
        .iter()
        .filter(|f| f.timestamp_ms >= first.start_timestamp && f.timestamp_ms < first.end_timestamp)
        .filter(|f| f.timestamp_ms >= second.start_timestamp)
        .count();

    assert_eq!(in_first, 30);
    assert_eq!(in_second, 30);
    assert_eq!(in_both, 0);
}

#[test]
fn failed_request_is_retry_safe() {
    let fixture = Fixture::new();
    fixture.capture(20, 50);
    let served = fixture.service.get_clip(None).unwrap();

    // No new frames: two identical requests fail at the same boundary.
    fixture.clock.advance(200);
    let starts: Vec<u64> = (0..2)
        .map(|_| match fixture.service.get_clip(None) {
            Err(IpcError::NoFrames { start_ms, .. }) => start_ms,
            other => panic!("expected NoFrames, got {other:?}"),
        })
        .collect();
    assert_eq!(starts, vec![served.end_timestamp, served.end_timestamp]);
    assert_eq!(fixture.service.watermark(), Some(served.end_timestamp));

    // The retry after new frames arrive picks up exactly where the last success ended.
    fixture.capture(5, 50);
    let next = fixture.service.get_clip(None).unwrap();
    assert_eq!(next.start_timestamp, served.end_timestamp);
}

#[test]
fn concurrent_requests_split_the_timeline() {
    let fixture = Fixture::new();
    fixture.capture(20, 10);

    let mut ranges = std::thread::scope(|scope| {
        scope.spawn(|| {
            for i in 0..300u32 {
                let ts = fixture.clock.advance(10);
                let shade = (i % 256) as u8;
                fixture
                    .buffer
                    .push(RgbaImage::from_pixel(32, 24, Rgba([0, shade, shade, 255])), ts)
                    .unwrap();
                if i % 10 == 0 {
                    std::thread::sleep(Duration::from_millis(1));
                }
            }
        });

        let requesters: Vec<_> = (0..6)
            .map(|_| {
                scope.spawn(|| {
                    let mut served = Vec::new();
                    for _ in 0..15 {
                        match fixture.service.get_clip(None) {
                            Ok(clip) => served.push((clip.start_timestamp, clip.end_timestamp)),
                            Err(IpcError::NoFrames { .. }) => {}
                            Err(other) => panic!("unexpected error {other:?}"),
                        }
                        std::thread::sleep(Duration::from_millis(2));
                    }
                    served
                })
            })
            .collect();

        requesters
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect::<Vec<_>>()
    });

    assert!(!ranges.is_empty());
    ranges.sort_unstable();
    for pair in ranges.windows(2) {
        assert_eq!(pair[1].0, pair[0].1, "ranges {:?} and {:?} overlap or leave a gap", pair[0], pair[1]);
    }
    let last_end = ranges.iter().map(|&(_, end)| end).max();
    assert_eq!(fixture.service.watermark(), last_end);
    assert_eq!(fixture.service.status().clips_served, ranges.len() as u64);
}

#[tokio::test]
async fn clip_round_trip_over_tcp() {
    let fixture = Fixture::new();
    fixture.capture(60, 33);

    let server = ClipServer::bind("127.0.0.1:0", fixture.service.clone())
        .await
        .unwrap();
    let address = server.local_addr().to_string();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server_task = tokio::spawn(server.run(shutdown_rx));

    let client = ClipClient::new(address, TimeoutPolicy::default());

    let status = client.status().await.unwrap();
    assert_eq!(status.frames, 60);
    assert_eq!(status.watermark, None);

    let clip = client.get_clip(None).await.unwrap();
    assert!(clip.bytes.starts_with(b"GIF89a"));
    assert!(clip.frame_count <= 24);
    assert_eq!(Some(clip.end_timestamp), fixture.service.watermark());

    // Same watermark, no frames since: the remote error names the same start.
    match client.get_clip(None).await {
        Err(IpcError::Remote { start_ms, .. }) => assert_eq!(start_ms, Some(clip.end_timestamp)),
        other => panic!("expected remote error, got {other:?}"),
    }

    shutdown_tx.send(true).unwrap();
    server_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn bind_conflict_is_reported() {
    let fixture = Fixture::new();
    let first = ClipServer::bind("127.0.0.1:0", fixture.service.clone())
        .await
        .unwrap();
    let taken = first.local_addr().to_string();

    match ClipServer::bind(&taken, fixture.service.clone()).await {
        Err(IpcError::Bind { address, .. }) => assert_eq!(address, taken),
        Err(other) => panic!("unexpected error {other:?}"),
        Ok(_) => panic!("second bind succeeded"),
    }
}
