// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Fixed-rate capture loop
//!
//! Runs on its own thread: grab one frame, stamp it, append it to the
//! buffer, sleep until the next tick. A failing tick is logged and skipped;
//! only `stop()` ends the loop, and it is observed within one tick.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::ring_buffer::FrameRingBuffer;
use crate::source::FrameSource;

/// Counters shared between the loop thread and observers.
#[derive(Debug, Default)]
pub struct CaptureStats {
    pub frames_captured: AtomicU64,
    pub capture_errors: AtomicU64,
}

impl CaptureStats {
    pub fn frames_captured(&self) -> u64 {
        self.frames_captured.load(Ordering::Relaxed)
    }

    pub fn capture_errors(&self) -> u64 {
        self.capture_errors.load(Ordering::Relaxed)
    }
}

pub struct Capturer {
    buffer: Arc<FrameRingBuffer>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    running: Arc<AtomicBool>,
    stats: Arc<CaptureStats>,
    thread: Option<JoinHandle<()>>,
}

impl Capturer {
    /// # Arguments
    /// * `buffer` - Destination of captured frames
    /// * `clock` - Timestamp source shared with the clip service
    /// * `target_fps` - Capture rate; non-positive values fall back to 1 Hz
    pub fn new(buffer: Arc<FrameRingBuffer>, clock: Arc<dyn Clock>, target_fps: f64) -> Self {
        let interval = if target_fps > 0.0 {
            Duration::from_secs_f64(1.0 / target_fps)
        } else {
            Duration::from_secs(1)
        };
        Self {
            buffer,
            clock,
            interval,
            running: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(CaptureStats::default()),
            thread: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn stats(&self) -> Arc<CaptureStats> {
        Arc::clone(&self.stats)
    }

    /// Shared flag readers can poll to report whether capture is live.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Start the loop on a dedicated thread. Starting twice is a no-op.
    pub fn start(&mut self, mut source: Box<dyn FrameSource>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("[CAPTURE] Capturer already running");
            return;
        }

        let buffer = Arc::clone(&self.buffer);
        let clock = Arc::clone(&self.clock);
        let running = Arc::clone(&self.running);
        let stats = Arc::clone(&self.stats);
        let interval = self.interval;

        let thread = thread::spawn(move || {
            info!(
                "[CAPTURE] Started {} at {:.1} fps",
                source.describe(),
                1.0 / interval.as_secs_f64()
            );
            let mut next_tick = Instant::now();

            while running.load(Ordering::Relaxed) {
                match source.grab() {
                    Ok(image) => match buffer.push(image, clock.now_ms()) {
                        Ok(_) => {
                            stats.frames_captured.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            stats.capture_errors.fetch_add(1, Ordering::Relaxed);
                            warn!("[CAPTURE] Dropped frame: {}", e);
                        }
                    },
                    Err(e) => {
                        let errors = stats.capture_errors.fetch_add(1, Ordering::Relaxed) + 1;
                        // Warn once, repeats go to debug.
                        if errors == 1 {
                            warn!("[CAPTURE] Capture failed, skipping tick: {}", e);
                        } else {
                            debug!("[CAPTURE] Capture failed, skipping tick: {}", e);
                        }
                    }
                }

                next_tick += interval;
                let now = Instant::now();
                if next_tick > now {
                    thread::sleep(next_tick - now);
                } else {
                    // Fell behind; resume cadence from now instead of bursting.
                    next_tick = now;
                }
            }

            info!("[CAPTURE] Stopped");
        });

        self.thread = Some(thread);
    }

    /// Signal the loop to stop and wait for the thread to exit.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("[CAPTURE] Capture thread panicked");
            }
        }
    }
}

impl Drop for Capturer {
    fn drop(&mut self) {
        self.stop();
    }
}
