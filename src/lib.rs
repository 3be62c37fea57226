// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # emupilot
//!
//! Real-time synchronization engine for an emulator-playing agent.
//!
//! A background capturer keeps a rolling window of timestamped frames. A
//! clip service turns "every frame since the previous decision" into a GIF
//! and serves it over a local socket. The emulator link speaks the
//! line-oriented emulator protocol, and the decision cycle paces oracle
//! calls so that at most one decision is ever in flight.
//!
//! ## Crates
//!
//! | Module | Crate | Contents |
//! |---|---|---|
//! | [`config`] | `emupilot-config` | `emupilot.toml` loader, overrides, validation |
//! | [`observability`] | `emupilot-observability` | logging initialisation |
//! | [`capture`] | `emupilot-capture` | ring buffer, capturer, clip encoder |
//! | [`ipc`] | `emupilot-ipc` | clip service, server and client |
//! | [`emulator`] | `emupilot-emulator` | emulator link, messages, protocol guard |
//! | [`agent`] | `emupilot-agent` | decision cycle, timing gate, oracle seam |
//!
//! ## Feature Flags
//! - **`file-logging`** (default): JSON log files with daily rotation
//! - **`http-oracle`**: [`agent::HttpOracle`], an oracle reached over HTTP

pub use emupilot_agent as agent;
pub use emupilot_capture as capture;
pub use emupilot_config as config;
pub use emupilot_emulator as emulator;
pub use emupilot_ipc as ipc;
pub use emupilot_observability as observability;

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod prelude {
    //! The types needed to assemble a running pilot.

    pub use crate::agent::{
        CycleDriver, CycleSettings, DecisionCycle, DecisionOracle, DriverConfig, NeutralOracle,
        OracleOutcome, StatusChannel, TimingGate,
    };
    pub use crate::capture::{
        Capturer, ClipEncoder, ClipEncoderConfig, Clock, FrameRingBuffer, ImageFileSource,
        MonotonicClock,
    };
    pub use crate::config::{load_config, validate_config, PilotConfig};
    pub use crate::emulator::{EmulatorLink, ProtocolGuard};
    pub use crate::ipc::{ClipClient, ClipPolicy, ClipServer, ClipService, ClipSource, LocalClipSource};
}
