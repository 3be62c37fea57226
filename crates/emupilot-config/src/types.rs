// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! This module defines all configuration structs that map to sections in
//! `emupilot.toml`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PilotConfig {
    pub capture: CaptureConfig,
    pub clip: ClipConfig,
    pub ipc: IpcConfig,
    pub emulator: EmulatorConfig,
    pub timing: TimingConfig,
    pub decision: DecisionConfig,
    pub screenshot: ScreenshotConfig,
    pub game: GameConfig,
    pub logging: LoggingConfig,
}

/// Frame capture loop configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Target capture rate of the background loop
    pub target_fps: f64,
    /// Rolling window retained by the frame buffer, in seconds
    pub window_secs: f64,
    /// Image file the emulator keeps overwriting with its current screen
    pub frame_source_path: PathBuf,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            target_fps: 30.0,
            window_secs: 20.0,
            frame_source_path: PathBuf::from("data/screens/live.png"),
        }
    }
}

/// Clip selection and encoding limits
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClipConfig {
    pub max_frames: usize,
    pub target_width: u32,
    pub min_frame_ms: u32,
    pub target_total_ms: u32,
    /// Lookback used by the very first clip request (no watermark yet)
    pub default_lookback_secs: f64,
    /// Longest range a subsequent clip may cover before its start is clamped
    pub max_subsequent_secs: f64,
}

impl Default for ClipConfig {
    fn default() -> Self {
        Self {
            max_frames: 24,
            target_width: 240,
            min_frame_ms: 50,
            target_total_ms: 2400,
            default_lookback_secs: 3.0,
            max_subsequent_secs: 10.0,
        }
    }
}

/// Clip IPC endpoint and client timeout policy
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct IpcConfig {
    pub host: String,
    pub port: u16,
    pub base_timeout_secs: f64,
    pub timeout_per_clip_sec: f64,
    pub large_clip_threshold_secs: f64,
    pub large_clip_min_timeout_secs: f64,
    pub retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8765,
            base_timeout_secs: 5.0,
            timeout_per_clip_sec: 1.5,
            large_clip_threshold_secs: 6.0,
            large_clip_min_timeout_secs: 30.0,
            retries: 2,
            retry_backoff_ms: 250,
        }
    }
}

impl IpcConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Emulator socket configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EmulatorConfig {
    pub host: String,
    pub port: u16,
    /// Number of protocol violations retained for inspection
    pub violation_log_capacity: usize,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8888,
            violation_log_capacity: 256,
        }
    }
}

impl EmulatorConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Settle delay policy applied after an action completes
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SettleConfig {
    /// Constant delay regardless of what was pressed
    Fixed { delay_ms: u64 },
    /// Base delay plus a per-button weight by category, capped at `max_wait_ms`
    Weighted {
        base_ms: u64,
        movement_ms: u64,
        interaction_ms: u64,
        menu_ms: u64,
        max_wait_ms: u64,
    },
}

impl Default for SettleConfig {
    fn default() -> Self {
        SettleConfig::Weighted {
            base_ms: 250,
            movement_ms: 120,
            interaction_ms: 300,
            menu_ms: 450,
            max_wait_ms: 2500,
        }
    }
}

/// Decision pacing configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Minimum time between two decisions
    pub cooldown_ms: u64,
    /// Emulator frame rate used to convert hold frames into wall time
    pub frame_rate: f64,
    pub default_hold_frames: u32,
    pub settle: SettleConfig,
    /// Re-issue a context request when the emulator has not answered within this window
    pub context_request_timeout_ms: u64,
    /// Cadence of the driver's gate re-evaluation tick
    pub tick_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: 1500,
            frame_rate: 60.0,
            default_hold_frames: 2,
            settle: SettleConfig::default(),
            context_request_timeout_ms: 5000,
            tick_interval_ms: 50,
        }
    }
}

/// What visual context accompanies each decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualMode {
    /// Multi-frame clip spanning "since the last decision"
    Clip,
    /// Single screenshot written to disk by the emulator
    Screenshot,
}

/// Decision oracle configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DecisionConfig {
    pub visual_mode: VisualMode,
    pub oracle_timeout_secs: f64,
    /// Buttons pressed when the oracle fails, times out or is filtered
    pub fallback_buttons: Vec<String>,
    /// Number of executed actions kept as context for the oracle
    pub history_len: usize,
    pub oracle_endpoint: String,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            visual_mode: VisualMode::Clip,
            oracle_timeout_secs: 30.0,
            fallback_buttons: vec!["B".to_string()],
            history_len: 10,
            oracle_endpoint: "http://127.0.0.1:8700/decide".to_string(),
        }
    }
}

/// Screenshot file readiness polling
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScreenshotConfig {
    /// A file smaller than this is assumed to still be written
    pub min_file_bytes: u64,
    pub poll_interval_ms: u64,
    pub max_polls: u32,
}

impl Default for ScreenshotConfig {
    fn default() -> Self {
        Self {
            min_file_bytes: 1024,
            poll_interval_ms: 50,
            max_polls: 40,
        }
    }
}

/// Game configuration pushed to the emulator before any data is requested
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GameConfig {
    pub name: String,
    /// Memory-address mapping the emulator-side script loads (name -> address)
    pub memory_map: BTreeMap<String, String>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            name: "unknown".to_string(),
            memory_map: BTreeMap::new(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub log_dir: Option<PathBuf>,
    pub retention_days: u64,
    pub retention_runs: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
            retention_days: 30,
            retention_runs: 10,
        }
    }
}
