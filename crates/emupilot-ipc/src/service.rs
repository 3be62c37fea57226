// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Watermark-owning clip service
//!
//! The watermark is the end of the last clip that was served successfully and
//! the start of the next one. A request mutex is held for the whole clip
//! request, range computation through encode and update, so at most one clip
//! request is serviced at a time and no two clips can claim the same range.
//! The watermark itself sits in a separate short-lived lock so `status` never
//! waits on an encode.

use async_trait::async_trait;
use emupilot_capture::{Clock, ClipEncoder, FrameRingBuffer, NowMs};
use emupilot_config::ClipConfig;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{IpcError, Result};
use crate::protocol::{BufferStatus, ClipPayload};

/// Range limits applied when computing a clip's start boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipPolicy {
    /// Lookback of the first request, before any watermark exists
    pub default_lookback_ms: u64,
    /// Longest range a request may cover when it does not name its own limit
    pub max_subsequent_ms: u64,
}

impl From<&ClipConfig> for ClipPolicy {
    fn from(config: &ClipConfig) -> Self {
        Self {
            default_lookback_ms: secs_to_ms(config.default_lookback_secs),
            max_subsequent_ms: secs_to_ms(config.max_subsequent_secs),
        }
    }
}

impl Default for ClipPolicy {
    fn default() -> Self {
        Self::from(&ClipConfig::default())
    }
}

#[derive(Debug, Default)]
struct WatermarkState {
    watermark: Option<NowMs>,
    clips_served: u64,
}

pub struct ClipService {
    buffer: Arc<FrameRingBuffer>,
    clock: Arc<dyn Clock>,
    encoder: ClipEncoder,
    policy: ClipPolicy,
    /// Serializes `get_clip`
    request: Mutex<()>,
    state: Mutex<WatermarkState>,
    capture_running: Option<Arc<AtomicBool>>,
}

impl ClipService {
    pub fn new(
        buffer: Arc<FrameRingBuffer>,
        clock: Arc<dyn Clock>,
        encoder: ClipEncoder,
        policy: ClipPolicy,
    ) -> Self {
        Self {
            buffer,
            clock,
            encoder,
            policy,
            request: Mutex::new(()),
            state: Mutex::new(WatermarkState::default()),
            capture_running: None,
        }
    }

    /// Report the capturer's running flag in `status` responses.
    pub fn with_capture_flag(mut self, running: Arc<AtomicBool>) -> Self {
        self.capture_running = Some(running);
        self
    }

    pub fn buffer(&self) -> &Arc<FrameRingBuffer> {
        &self.buffer
    }

    pub fn watermark(&self) -> Option<NowMs> {
        self.state.lock().watermark
    }

    /// Encode every buffered frame since the watermark and advance it to `now`.
    ///
    /// `max_duration` (seconds) overrides the configured subsequent-clip limit
    /// for this request. Any error leaves the watermark untouched.
    pub fn get_clip(&self, max_duration: Option<f64>) -> Result<ClipPayload> {
        let _request = self.request.lock();

        let end = self.clock.now_ms();
        let watermark = self.state.lock().watermark;
        let mut start = match watermark {
            Some(watermark) => watermark,
            None => {
                let lookback_start = end.saturating_sub(self.policy.default_lookback_ms);
                self.buffer
                    .oldest_timestamp()
                    .map_or(lookback_start, |oldest| oldest.max(lookback_start))
            }
        };

        let max_ms = max_duration
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(secs_to_ms)
            .unwrap_or(self.policy.max_subsequent_ms);
        if end.saturating_sub(start) > max_ms {
            let clamped = end - max_ms;
            debug!(
                "[CLIP-SERVICE] Range {}..{} exceeds {} ms, start clamped to {}",
                start, end, max_ms, clamped
            );
            start = clamped;
        }

        let frames = self.buffer.frames_in_range(start, end);
        if frames.is_empty() {
            debug!("[CLIP-SERVICE] No frames in {}..{}", start, end);
            return Err(IpcError::NoFrames {
                start_ms: start,
                end_ms: end,
            });
        }

        let encoded = self.encoder.encode(&frames).map_err(|e| {
            warn!("[CLIP-SERVICE] Encoding {} frames failed: {}", frames.len(), e);
            IpcError::from(e)
        })?;

        let clips_served = {
            let mut state = self.state.lock();
            state.watermark = Some(end);
            state.clips_served += 1;
            state.clips_served
        };

        let duration_secs = end.saturating_sub(start) as f64 / 1000.0;
        let fps = if duration_secs > 0.0 {
            encoded.frame_count as f64 / duration_secs
        } else {
            0.0
        };

        info!(
            "[CLIP-SERVICE] Clip #{}: {}..{} ({} of {} frames, {} bytes)",
            clips_served,
            start,
            end,
            encoded.frame_count,
            frames.len(),
            encoded.bytes.len()
        );

        Ok(ClipPayload {
            frame_count: encoded.frame_count,
            frame_delay_ms: encoded.frame_delay_ms,
            playback_ms: encoded.playback_ms,
            bytes: encoded.bytes,
            duration_secs,
            start_timestamp: start,
            end_timestamp: end,
            fps,
        })
    }

    pub fn status(&self) -> BufferStatus {
        let state = self.state.lock();
        BufferStatus {
            frames: self.buffer.len(),
            oldest_timestamp: self.buffer.oldest_timestamp(),
            newest_timestamp: self.buffer.newest_timestamp(),
            span_secs: self.buffer.span_ms() as f64 / 1000.0,
            watermark: state.watermark,
            clips_served: state.clips_served,
            capture_running: self
                .capture_running
                .as_ref()
                .is_some_and(|flag| flag.load(Ordering::Relaxed)),
        }
    }
}

fn secs_to_ms(secs: f64) -> u64 {
    (secs.max(0.0) * 1000.0).round() as u64
}

/// Where the decision cycle gets its clips from: in-process or over IPC.
#[async_trait]
pub trait ClipSource: Send + Sync {
    async fn fetch_clip(&self, max_duration: Option<f64>) -> Result<ClipPayload>;
}

/// In-process clip source; encoding runs on the blocking pool.
#[derive(Clone)]
pub struct LocalClipSource {
    service: Arc<ClipService>,
}

impl LocalClipSource {
    pub fn new(service: Arc<ClipService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl ClipSource for LocalClipSource {
    async fn fetch_clip(&self, max_duration: Option<f64>) -> Result<ClipPayload> {
        let service = self.service.clone();
        tokio::task::spawn_blocking(move || service.get_clip(max_duration))
            .await
            .map_err(|e| IpcError::Worker(e.to_string()))?
    }
}
