// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Wire format of the clip IPC channel
//!
//! Request:  `{"type": "get_clip", "max_duration": 4.0}` or `{"type": "status"}`
//! Response: `{"success": true, "clip_bytes": "<base64>", "frame_count": .., "duration": ..,
//!            "start_timestamp": .., "end_timestamp": .., "fps": ..}`
//!           or `{"success": false, "error": ".."}`
//!
//! Timestamps are milliseconds on the clip server's monotonic clock;
//! `duration` is seconds.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use emupilot_capture::NowMs;
use serde::{Deserialize, Serialize};

use crate::error::{IpcError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcRequest {
    GetClip {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_duration: Option<f64>,
    },
    Status,
}

/// A served clip, decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipPayload {
    pub bytes: Vec<u8>,
    pub frame_count: usize,
    pub duration_secs: f64,
    pub start_timestamp: NowMs,
    pub end_timestamp: NowMs,
    pub fps: f64,
    pub frame_delay_ms: u32,
    pub playback_ms: u64,
}

/// Buffer and watermark snapshot answered to `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferStatus {
    pub frames: usize,
    pub oldest_timestamp: Option<NowMs>,
    pub newest_timestamp: Option<NowMs>,
    pub span_secs: f64,
    pub watermark: Option<NowMs>,
    pub clips_served: u64,
    pub capture_running: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IpcResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clip_bytes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_timestamp: Option<NowMs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_timestamp: Option<NowMs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_delay_ms: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playback_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<BufferStatus>,
}

impl IpcResponse {
    pub fn clip(clip: &ClipPayload) -> Self {
        Self {
            success: true,
            clip_bytes: Some(BASE64.encode(&clip.bytes)),
            frame_count: Some(clip.frame_count),
            duration: Some(clip.duration_secs),
            start_timestamp: Some(clip.start_timestamp),
            end_timestamp: Some(clip.end_timestamp),
            fps: Some(clip.fps),
            frame_delay_ms: Some(clip.frame_delay_ms),
            playback_ms: Some(clip.playback_ms),
            ..Self::default()
        }
    }

    pub fn status(status: BufferStatus) -> Self {
        Self {
            success: true,
            status: Some(status),
            ..Self::default()
        }
    }

    /// Failure response. Carries the attempted range when one was computed,
    /// so a caller can see that a retry starts from the same boundary.
    pub fn failure(err: &IpcError) -> Self {
        let (start_timestamp, end_timestamp) = match err {
            IpcError::NoFrames { start_ms, end_ms } => (Some(*start_ms), Some(*end_ms)),
            _ => (None, None),
        };
        Self {
            success: false,
            error: Some(err.to_string()),
            start_timestamp,
            end_timestamp,
            ..Self::default()
        }
    }

    pub fn into_clip(self) -> Result<ClipPayload> {
        if !self.success {
            return Err(self.into_remote_error());
        }
        let encoded = self
            .clip_bytes
            .ok_or_else(|| IpcError::Protocol("clip response without clip_bytes".to_string()))?;
        let bytes = BASE64.decode(encoded.as_bytes())?;
        Ok(ClipPayload {
            bytes,
            frame_count: self.frame_count.unwrap_or(0),
            duration_secs: self.duration.unwrap_or(0.0),
            start_timestamp: self.start_timestamp.unwrap_or(0),
            end_timestamp: self.end_timestamp.unwrap_or(0),
            fps: self.fps.unwrap_or(0.0),
            frame_delay_ms: self.frame_delay_ms.unwrap_or(0),
            playback_ms: self.playback_ms.unwrap_or(0),
        })
    }

    pub fn into_status(self) -> Result<BufferStatus> {
        if !self.success {
            return Err(self.into_remote_error());
        }
        self.status
            .ok_or_else(|| IpcError::Protocol("status response without status".to_string()))
    }

    fn into_remote_error(self) -> IpcError {
        IpcError::Remote {
            message: self.error.unwrap_or_else(|| "unspecified error".to_string()),
            start_ms: self.start_timestamp,
        }
    }
}
