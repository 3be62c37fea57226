// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Decision pacing
//!
//! Two conditions must hold before the next decision may start:
//! - the cooldown since the last command was dispatched has elapsed
//! - the settle delay since the last action *completed* has elapsed
//!
//! `next_allowed = max(last_decision + cooldown, last_completion + settle)`

use emupilot_capture::NowMs;
use emupilot_config::{SettleConfig, TimingConfig};
use emupilot_emulator::{Button, ButtonCommand};

/// How long the game needs to react to a kind of input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionCategory {
    Movement,
    Interaction,
    Menu,
}

impl ActionCategory {
    pub fn of(button: Button) -> Self {
        match button {
            b if b.is_directional() => ActionCategory::Movement,
            Button::A | Button::B => ActionCategory::Interaction,
            _ => ActionCategory::Menu,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlePolicy {
    Fixed {
        delay_ms: u64,
    },
    /// `min(base + sum of per-button weights, max_wait)`
    Weighted {
        base_ms: u64,
        movement_ms: u64,
        interaction_ms: u64,
        menu_ms: u64,
        max_wait_ms: u64,
    },
}

impl From<&SettleConfig> for SettlePolicy {
    fn from(config: &SettleConfig) -> Self {
        match *config {
            SettleConfig::Fixed { delay_ms } => SettlePolicy::Fixed { delay_ms },
            SettleConfig::Weighted {
                base_ms,
                movement_ms,
                interaction_ms,
                menu_ms,
                max_wait_ms,
            } => SettlePolicy::Weighted {
                base_ms,
                movement_ms,
                interaction_ms,
                menu_ms,
                max_wait_ms,
            },
        }
    }
}

impl SettlePolicy {
    pub fn settle_delay_ms(&self, command: &ButtonCommand) -> u64 {
        match *self {
            SettlePolicy::Fixed { delay_ms } => delay_ms,
            SettlePolicy::Weighted {
                base_ms,
                movement_ms,
                interaction_ms,
                menu_ms,
                max_wait_ms,
            } => {
                let weights: u64 = command
                    .presses()
                    .iter()
                    .map(|press| match ActionCategory::of(press.button) {
                        ActionCategory::Movement => movement_ms,
                        ActionCategory::Interaction => interaction_ms,
                        ActionCategory::Menu => menu_ms,
                    })
                    .sum();
                base_ms.saturating_add(weights).min(max_wait_ms)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimingGate {
    cooldown_ms: u64,
    frame_rate: f64,
    settle: SettlePolicy,
    last_decision_at: Option<NowMs>,
    last_completion_at: Option<NowMs>,
    pending_settle_ms: u64,
}

impl TimingGate {
    pub fn new(cooldown_ms: u64, frame_rate: f64, settle: SettlePolicy) -> Self {
        Self {
            cooldown_ms,
            frame_rate: if frame_rate > 0.0 { frame_rate } else { 60.0 },
            settle,
            last_decision_at: None,
            last_completion_at: None,
            pending_settle_ms: 0,
        }
    }

    pub fn from_config(config: &TimingConfig) -> Self {
        Self::new(
            config.cooldown_ms,
            config.frame_rate,
            SettlePolicy::from(&config.settle),
        )
    }

    /// Wall time the emulator spends executing `command`: total hold frames / frame rate.
    pub fn action_duration_ms(&self, command: &ButtonCommand) -> u64 {
        (command.total_hold_frames() as f64 * 1000.0 / self.frame_rate).round() as u64
    }

    pub fn record_decision(&mut self, now_ms: NowMs) {
        self.last_decision_at = Some(now_ms);
    }

    /// Remember the settle delay owed once `command` completes; returns its duration.
    pub fn record_dispatch(&mut self, command: &ButtonCommand) -> u64 {
        self.pending_settle_ms = self.settle.settle_delay_ms(command);
        self.action_duration_ms(command)
    }

    pub fn record_completion(&mut self, now_ms: NowMs) {
        self.last_completion_at = Some(now_ms);
    }

    pub fn last_decision_at(&self) -> Option<NowMs> {
        self.last_decision_at
    }

    pub fn last_completion_at(&self) -> Option<NowMs> {
        self.last_completion_at
    }

    pub fn cooldown_ready_at(&self) -> NowMs {
        self.last_decision_at
            .map_or(0, |at| at.saturating_add(self.cooldown_ms))
    }

    pub fn settle_ready_at(&self) -> NowMs {
        self.last_completion_at
            .map_or(0, |at| at.saturating_add(self.pending_settle_ms))
    }

    pub fn next_allowed(&self) -> NowMs {
        self.cooldown_ready_at().max(self.settle_ready_at())
    }

    pub fn is_open(&self, now_ms: NowMs) -> bool {
        now_ms >= self.next_allowed()
    }

    /// Forget per-connection timing (a new emulator connection starts fresh).
    pub fn reset(&mut self) {
        self.last_decision_at = None;
        self.last_completion_at = None;
        self.pending_settle_ms = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emupilot_emulator::ButtonPress;

    fn up_up_a() -> ButtonCommand {
        ButtonCommand::new(vec![
            ButtonPress::new(Button::Up, 2),
            ButtonPress::new(Button::Up, 2),
            ButtonPress::new(Button::A, 2),
        ])
    }

    #[test]
    fn test_action_duration_from_hold_frames() {
        let gate = TimingGate::from_config(&TimingConfig::default());
        assert_eq!(gate.action_duration_ms(&up_up_a()), 100);
    }

    #[test]
    fn test_next_allowed_anchors_on_completion() {
        let mut gate = TimingGate::new(0, 60.0, SettlePolicy::Fixed { delay_ms: 400 });
        gate.record_decision(1_000);
        let duration = gate.record_dispatch(&up_up_a());
        assert_eq!(duration, 100);

        // Not yet completed: only the cooldown (0) applies.
        assert_eq!(gate.next_allowed(), 1_000);

        let completed_at = 1_000 + duration + 30;
        gate.record_completion(completed_at);
        assert_eq!(gate.next_allowed(), completed_at + 400);
        assert!(!gate.is_open(completed_at + 399));
        assert!(gate.is_open(completed_at + 400));
    }

    #[test]
    fn test_cooldown_dominates_short_settle() {
        let mut gate = TimingGate::new(1_500, 60.0, SettlePolicy::Fixed { delay_ms: 100 });
        gate.record_decision(0);
        gate.record_dispatch(&up_up_a());
        gate.record_completion(100);
        assert_eq!(gate.next_allowed(), 1_500);
    }

    #[test]
    fn test_weighted_settle_by_category() {
        let policy = SettlePolicy::from(&SettleConfig::default());
        // 250 base + 2 * 120 movement + 300 interaction
        assert_eq!(policy.settle_delay_ms(&up_up_a()), 790);

        let menu = ButtonCommand::new(vec![ButtonPress::new(Button::Start, 2)]);
        assert_eq!(policy.settle_delay_ms(&menu), 700);

        let walk = ButtonCommand::new(vec![ButtonPress::new(Button::Right, 2); 40]);
        assert_eq!(policy.settle_delay_ms(&walk), 2_500);
    }

    #[test]
    fn test_reset_opens_gate() {
        let mut gate = TimingGate::from_config(&TimingConfig::default());
        gate.record_decision(10_000);
        assert!(!gate.is_open(10_001));
        gate.reset();
        assert!(gate.is_open(0));
    }
}
