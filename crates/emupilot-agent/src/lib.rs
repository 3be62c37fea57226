// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # emupilot-agent
//!
//! The coordinating half of the engine. [`DecisionCycle`] is a pure state
//! machine (events in, actions out) that gates requests through a
//! [`TimingGate`] and keeps exactly one decision in flight; [`CycleDriver`]
//! runs it on tokio against the emulator link, a clip source and a
//! [`DecisionOracle`].

pub mod cycle;
pub mod error;
pub mod history;
pub mod knowledge;
pub mod oracle;
pub mod screenshot;
pub mod status;
pub mod timing;

pub use cycle::{
    CommandSink, CycleAction, CycleDriver, CycleEvent, CyclePhase, CycleSettings, DecisionCycle,
    DecisionRequest, DriverConfig, VisualRequest,
};
pub use error::{CycleError, Result};
pub use history::{ActionHistory, ExecutedAction};
pub use knowledge::{KnowledgeSink, NullKnowledgeSink, TracingKnowledgeSink};
#[cfg(feature = "http-oracle")]
pub use oracle::HttpOracle;
pub use oracle::{
    ActionDecision, DecisionContext, DecisionOracle, NeutralOracle, OracleOutcome, VisualInput,
};
pub use screenshot::{wait_for_screenshot, ScreenshotWaitError};
pub use status::{CycleStatus, StatusChannel};
pub use timing::{ActionCategory, SettlePolicy, TimingGate};
