// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Decision oracle seam
//!
//! The oracle is the one long-latency step of a cycle. Whatever goes wrong
//! inside it comes back as a value, never as a panic or an error that could
//! stop the cycle.

#[cfg(feature = "http-oracle")]
mod http;

#[cfg(feature = "http-oracle")]
pub use http::HttpOracle;

use async_trait::async_trait;
use emupilot_emulator::GameStateSnapshot;
use serde::{Deserialize, Serialize};

use crate::history::ExecutedAction;

/// What the oracle wants pressed, as it said it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDecision {
    pub actions: Vec<String>,
    /// Hold frames per action; missing entries use the default hold
    #[serde(default)]
    pub durations: Vec<u32>,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleOutcome {
    Actions(ActionDecision),
    /// The oracle answered but declined (e.g. safety filtered)
    Fallback(String),
    /// The oracle could not be consulted or its answer was unusable
    Error(String),
}

/// Image or clip handed to the oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisualInput {
    pub bytes: Vec<u8>,
    pub media_type: &'static str,
}

impl VisualInput {
    pub fn gif(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            media_type: "image/gif",
        }
    }

    pub fn png(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            media_type: "image/png",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DecisionContext {
    pub game: String,
    pub decision_number: u64,
    pub state: Option<GameStateSnapshot>,
    pub recent_actions: Vec<ExecutedAction>,
}

#[async_trait]
pub trait DecisionOracle: Send + Sync {
    async fn decide(&self, visual: &VisualInput, context: &DecisionContext) -> OracleOutcome;
}

/// Oracle that always declines, so every cycle presses the fallback buttons.
#[derive(Debug, Clone, Default)]
pub struct NeutralOracle;

#[async_trait]
impl DecisionOracle for NeutralOracle {
    async fn decide(&self, _visual: &VisualInput, _context: &DecisionContext) -> OracleOutcome {
        OracleOutcome::Fallback("no oracle configured".to_string())
    }
}
