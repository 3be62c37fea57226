//! Recent-action history handed to the oracle as context.

use emupilot_capture::NowMs;
use emupilot_emulator::{Button, ButtonCommand, GameStateSnapshot};
use serde::Serialize;
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutedAction {
    pub decided_at: NowMs,
    pub buttons: Vec<Button>,
    pub hold_frames: Vec<u32>,
    pub rationale: String,
    /// Why the fallback was pressed instead of an oracle decision
    pub fallback_reason: Option<String>,
    /// State the decision was taken in
    pub state: Option<GameStateSnapshot>,
}

impl ExecutedAction {
    pub fn new(
        decided_at: NowMs,
        command: &ButtonCommand,
        rationale: String,
        fallback_reason: Option<String>,
        state: Option<GameStateSnapshot>,
    ) -> Self {
        Self {
            decided_at,
            buttons: command.presses().iter().map(|p| p.button).collect(),
            hold_frames: command.presses().iter().map(|p| p.hold_frames).collect(),
            rationale,
            fallback_reason,
            state,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback_reason.is_some()
    }

    pub fn button_names(&self) -> Vec<String> {
        self.buttons.iter().map(|b| b.name().to_string()).collect()
    }
}

/// Bounded ring, oldest evicted first.
#[derive(Debug, Clone)]
pub struct ActionHistory {
    capacity: usize,
    entries: VecDeque<ExecutedAction>,
}

impl ActionHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, action: ExecutedAction) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(action);
    }

    pub fn last(&self) -> Option<&ExecutedAction> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Oldest first.
    pub fn to_vec(&self) -> Vec<ExecutedAction> {
        self.entries.iter().cloned().collect()
    }
}
