// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Long-term knowledge store seam
//!
//! Calls are fire-and-forget: implementations must return quickly and must
//! not fail the cycle. Anything slow belongs behind a channel inside the
//! implementation.

use emupilot_emulator::GameStateSnapshot;
use tracing::info;

use crate::history::ExecutedAction;

pub trait KnowledgeSink: Send + Sync {
    fn record_action(&self, game: &str, action: &ExecutedAction);
    fn record_location(&self, game: &str, state: &GameStateSnapshot);
}

/// Discards everything.
#[derive(Debug, Clone, Default)]
pub struct NullKnowledgeSink;

impl KnowledgeSink for NullKnowledgeSink {
    fn record_action(&self, _game: &str, _action: &ExecutedAction) {}
    fn record_location(&self, _game: &str, _state: &GameStateSnapshot) {}
}

/// Writes every record to the `emupilot::knowledge` tracing target.
#[derive(Debug, Clone, Default)]
pub struct TracingKnowledgeSink;

impl KnowledgeSink for TracingKnowledgeSink {
    fn record_action(&self, game: &str, action: &ExecutedAction) {
        info!(
            target: "emupilot::knowledge",
            game,
            buttons = ?action.button_names(),
            fallback = action.is_fallback(),
            "[KNOWLEDGE] action"
        );
    }

    fn record_location(&self, game: &str, state: &GameStateSnapshot) {
        info!(
            target: "emupilot::knowledge",
            game,
            map = state.map_id,
            x = state.x,
            y = state.y,
            "[KNOWLEDGE] location"
        );
    }
}
