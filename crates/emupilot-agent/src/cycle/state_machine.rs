// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Runtime-agnostic decision cycle.
//!
//! A pure, deterministic state machine: the driver feeds it observed events
//! with the current time and executes the actions it returns. It owns every
//! piece of per-connection state (phase, in-flight decision, timing, game
//! state, action history), and its transitions are the only mutators.
//!
//! Phases: `WaitConfig -> AwaitState -> Deciding -> Acting -> AwaitState ...`
//!
//! - Nothing is requested from the emulator before it acknowledges the game
//!   configuration.
//! - At most one decision is in flight. Triggers arriving while `Deciding` or
//!   `Acting` are counted as coalesced and dropped, never queued.
//! - Every connection gets a new epoch; oracle results and completion timers
//!   from an older epoch are ignored.

use emupilot_capture::NowMs;
use emupilot_config::{PilotConfig, VisualMode};
use emupilot_emulator::{
    Button, ButtonCommand, ButtonPress, EmulatorMessage, GameStateSnapshot, LegacyMessage,
    OutboundCommand,
};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::history::{ActionHistory, ExecutedAction};
use crate::oracle::{DecisionContext, OracleOutcome};
use crate::status::CycleStatus;
use crate::timing::TimingGate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    /// Connected (or waiting for a connection) but the game config is not acknowledged
    WaitConfig,
    AwaitState,
    Deciding,
    Acting,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleSettings {
    pub visual_mode: VisualMode,
    pub game: String,
    pub memory_map: BTreeMap<String, String>,
    pub fallback_buttons: Vec<Button>,
    pub default_hold_frames: u32,
    pub history_len: usize,
    pub context_request_timeout_ms: u64,
}

impl CycleSettings {
    pub fn from_config(config: &PilotConfig) -> Self {
        let mut fallback_buttons: Vec<Button> = config
            .decision
            .fallback_buttons
            .iter()
            .filter_map(|name| Button::from_name(name))
            .collect();
        if fallback_buttons.is_empty() {
            fallback_buttons.push(Button::B);
        }

        Self {
            visual_mode: config.decision.visual_mode,
            game: config.game.name.clone(),
            memory_map: config.game.memory_map.clone(),
            fallback_buttons,
            default_hold_frames: config.timing.default_hold_frames,
            history_len: config.decision.history_len,
            context_request_timeout_ms: config.timing.context_request_timeout_ms,
        }
    }
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self::from_config(&PilotConfig::default())
    }
}

/// Visual context the driver must fetch before consulting the oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisualRequest {
    /// Clip since the clip service's watermark
    Clip,
    /// Screenshot file written by the emulator
    Screenshot { path: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecisionRequest {
    pub visual: VisualRequest,
    pub context: DecisionContext,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleEvent {
    Connected,
    Disconnected,
    Message(EmulatorMessage),
    /// Periodic re-evaluation of the timing gate
    Tick,
    DecisionFinished { epoch: u64, outcome: OracleOutcome },
    ActionCompleted { epoch: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleAction {
    Send(OutboundCommand),
    /// Fetch visual context and consult the oracle off the receive path
    StartDecision { epoch: u64, request: DecisionRequest },
    /// Deliver `ActionCompleted { epoch }` after `after_ms`
    ScheduleCompletion { epoch: u64, after_ms: u64 },
    RecordAction(ExecutedAction),
    RecordLocation(GameStateSnapshot),
}

#[derive(Debug, Clone)]
pub struct DecisionCycle {
    settings: CycleSettings,
    gate: TimingGate,
    phase: CyclePhase,
    connected: bool,
    epoch: u64,
    snapshot: Option<GameStateSnapshot>,
    trigger_pending: bool,
    context_requested_at: Option<NowMs>,
    decision_started_at: Option<NowMs>,
    history: ActionHistory,
    decisions: u64,
    fallbacks: u64,
    coalesced: u64,
}

impl DecisionCycle {
    pub fn new(settings: CycleSettings, gate: TimingGate) -> Self {
        let history = ActionHistory::new(settings.history_len);
        Self {
            settings,
            gate,
            phase: CyclePhase::WaitConfig,
            connected: false,
            epoch: 0,
            snapshot: None,
            trigger_pending: false,
            context_requested_at: None,
            decision_started_at: None,
            history,
            decisions: 0,
            fallbacks: 0,
            coalesced: 0,
        }
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.phase, CyclePhase::Deciding | CyclePhase::Acting)
    }

    pub fn snapshot(&self) -> Option<&GameStateSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn history(&self) -> &ActionHistory {
        &self.history
    }

    pub fn gate(&self) -> &TimingGate {
        &self.gate
    }

    pub fn settings(&self) -> &CycleSettings {
        &self.settings
    }

    pub fn coalesced_events(&self) -> u64 {
        self.coalesced
    }

    pub fn decisions(&self) -> u64 {
        self.decisions
    }

    pub fn fallbacks(&self) -> u64 {
        self.fallbacks
    }

    /// Advance the machine by the events observed at `now_ms`.
    pub fn step(&mut self, now_ms: NowMs, events: &[CycleEvent]) -> Vec<CycleAction> {
        let mut actions = Vec::new();

        for event in events {
            match event {
                CycleEvent::Connected => self.on_connected(&mut actions),
                CycleEvent::Disconnected => self.on_disconnected(),
                CycleEvent::Message(message) => self.on_message(now_ms, message, &mut actions),
                CycleEvent::Tick => {}
                CycleEvent::DecisionFinished { epoch, outcome } => {
                    self.on_decision_finished(now_ms, *epoch, outcome, &mut actions)
                }
                CycleEvent::ActionCompleted { epoch } => self.on_action_completed(now_ms, *epoch),
            }
        }

        self.evaluate(now_ms, &mut actions);
        actions
    }

    pub fn status(&self) -> CycleStatus {
        let last = self.history.last();
        CycleStatus {
            phase: self.phase,
            connected: self.connected,
            epoch: self.epoch,
            decisions: self.decisions,
            fallbacks: self.fallbacks,
            coalesced_events: self.coalesced,
            last_decision_at: self.gate.last_decision_at(),
            next_allowed_at: self.gate.next_allowed(),
            last_actions: last.map(|a| a.button_names()).unwrap_or_default(),
            last_rationale: last.map(|a| a.rationale.clone()),
            legacy_messages: 0,
            protocol_violations: 0,
        }
    }

    fn on_connected(&mut self, actions: &mut Vec<CycleAction>) {
        self.reset_connection();
        self.connected = true;
        info!(
            "[CYCLE] Emulator connected (epoch {}), sending '{}' config",
            self.epoch, self.settings.game
        );
        actions.push(CycleAction::Send(OutboundCommand::Config {
            game: self.settings.game.clone(),
            memory_map: self.settings.memory_map.clone(),
        }));
    }

    fn on_disconnected(&mut self) {
        if self.is_busy() {
            warn!("[CYCLE] Emulator disconnected mid-decision; result will be dropped");
        }
        self.reset_connection();
        self.connected = false;
    }

    /// Per-connection state starts over; history and counters survive.
    fn reset_connection(&mut self) {
        self.epoch += 1;
        self.phase = CyclePhase::WaitConfig;
        self.gate.reset();
        self.snapshot = None;
        self.trigger_pending = false;
        self.context_requested_at = None;
        self.decision_started_at = None;
    }

    fn on_message(&mut self, now_ms: NowMs, message: &EmulatorMessage, actions: &mut Vec<CycleAction>) {
        if self.phase == CyclePhase::WaitConfig {
            match message {
                EmulatorMessage::ConfigLoaded { game } => {
                    if let Some(game) = game {
                        if game != &self.settings.game {
                            warn!(
                                "[CYCLE] Emulator loaded '{}' but '{}' was sent",
                                game, self.settings.game
                            );
                        }
                    }
                    info!("[CYCLE] Game config acknowledged");
                    self.phase = CyclePhase::AwaitState;
                    self.trigger_pending = true;
                }
                other => debug!(
                    "[CYCLE] Ignoring '{}' before the game config is acknowledged",
                    other.kind()
                ),
            }
            return;
        }

        match message {
            EmulatorMessage::ConfigLoaded { .. } => {
                debug!("[CYCLE] Repeated config acknowledgement");
            }
            EmulatorMessage::Ready => self.on_trigger(now_ms, None, actions),
            EmulatorMessage::State(state) | EmulatorMessage::Legacy(LegacyMessage::Data(state)) => {
                self.update_snapshot(*state, actions);
                let visual = match self.settings.visual_mode {
                    VisualMode::Clip => Some(VisualRequest::Clip),
                    VisualMode::Screenshot => None,
                };
                self.on_trigger(now_ms, visual, actions);
            }
            EmulatorMessage::ScreenshotWithState { path, state } => {
                self.update_snapshot(*state, actions);
                let visual = self.visual_for_screenshot(path);
                self.on_trigger(now_ms, Some(visual), actions);
            }
            EmulatorMessage::Legacy(LegacyMessage::Screenshot { path }) => {
                let visual = self.visual_for_screenshot(path);
                self.on_trigger(now_ms, Some(visual), actions);
            }
            EmulatorMessage::Legacy(LegacyMessage::Position { x, y }) => {
                let state = self.snapshot.unwrap_or_default().with_position(*x, *y);
                self.update_snapshot(state, actions);
            }
            EmulatorMessage::Unknown { .. } => {}
        }
    }

    fn visual_for_screenshot(&self, path: &str) -> VisualRequest {
        match self.settings.visual_mode {
            VisualMode::Screenshot => VisualRequest::Screenshot {
                path: path.to_string(),
            },
            VisualMode::Clip => VisualRequest::Clip,
        }
    }

    fn update_snapshot(&mut self, state: GameStateSnapshot, actions: &mut Vec<CycleAction>) {
        let moved = self
            .snapshot
            .map_or(true, |previous| !previous.same_location(&state));
        self.snapshot = Some(state);
        if moved {
            actions.push(CycleAction::RecordLocation(state));
        }
    }

    /// A message that could start a decision. `visual` is `None` when the
    /// message cannot supply the context itself and a fresh one must be requested.
    fn on_trigger(&mut self, now_ms: NowMs, visual: Option<VisualRequest>, actions: &mut Vec<CycleAction>) {
        if self.is_busy() {
            self.coalesced += 1;
            debug!(
                "[CYCLE] Decision in flight, trigger coalesced ({} so far)",
                self.coalesced
            );
            return;
        }

        // Any message answers an outstanding context request.
        self.context_requested_at = None;

        match visual {
            Some(visual) if self.gate.is_open(now_ms) => self.start_decision(now_ms, visual, actions),
            _ => self.trigger_pending = true,
        }
    }

    fn start_decision(&mut self, now_ms: NowMs, visual: VisualRequest, actions: &mut Vec<CycleAction>) {
        self.phase = CyclePhase::Deciding;
        self.trigger_pending = false;
        self.context_requested_at = None;
        self.decision_started_at = Some(now_ms);

        let context = DecisionContext {
            game: self.settings.game.clone(),
            decision_number: self.decisions + 1,
            state: self.snapshot,
            recent_actions: self.history.to_vec(),
        };
        debug!("[CYCLE] Decision #{} started ({:?})", context.decision_number, visual);
        actions.push(CycleAction::StartDecision {
            epoch: self.epoch,
            request: DecisionRequest { visual, context },
        });
    }

    fn on_decision_finished(
        &mut self,
        now_ms: NowMs,
        epoch: u64,
        outcome: &OracleOutcome,
        actions: &mut Vec<CycleAction>,
    ) {
        if epoch != self.epoch || self.phase != CyclePhase::Deciding {
            debug!(
                "[CYCLE] Dropping stale decision result (epoch {}, current {})",
                epoch, self.epoch
            );
            return;
        }

        let (command, rationale, fallback_reason) = self.plan_command(outcome);
        // Cooldown runs from dispatch so oracle latency never eats into it.
        self.gate.record_decision(now_ms);
        let duration_ms = self.gate.record_dispatch(&command);
        let decided_at = self.decision_started_at.unwrap_or(now_ms);
        let executed = ExecutedAction::new(decided_at, &command, rationale, fallback_reason, self.snapshot);

        self.decisions += 1;
        if executed.is_fallback() {
            self.fallbacks += 1;
        }
        info!(
            "[CYCLE] Decision #{}: {} ({} ms){}",
            self.decisions,
            command.to_wire(),
            duration_ms,
            executed
                .fallback_reason
                .as_deref()
                .map(|r| format!(" fallback: {r}"))
                .unwrap_or_default()
        );

        self.history.push(executed.clone());
        self.phase = CyclePhase::Acting;
        actions.push(CycleAction::Send(OutboundCommand::Buttons(command)));
        actions.push(CycleAction::RecordAction(executed));
        actions.push(CycleAction::ScheduleCompletion {
            epoch: self.epoch,
            after_ms: duration_ms,
        });
    }

    fn on_action_completed(&mut self, now_ms: NowMs, epoch: u64) {
        if epoch != self.epoch || self.phase != CyclePhase::Acting {
            return;
        }
        self.gate.record_completion(now_ms);
        self.phase = CyclePhase::AwaitState;
        self.trigger_pending = true;
        debug!(
            "[CYCLE] Action completed, next decision allowed at {}",
            self.gate.next_allowed()
        );
    }

    /// Issue a context request when idle, open, and nothing is outstanding.
    fn evaluate(&mut self, now_ms: NowMs, actions: &mut Vec<CycleAction>) {
        if self.phase != CyclePhase::AwaitState || !self.gate.is_open(now_ms) {
            return;
        }
        match self.context_requested_at {
            Some(at) if now_ms.saturating_sub(at) < self.settings.context_request_timeout_ms => return,
            Some(at) => warn!(
                "[CYCLE] No answer to context request sent at {}, asking again",
                at
            ),
            None if self.trigger_pending => {}
            None => return,
        }

        self.trigger_pending = false;
        self.context_requested_at = Some(now_ms);
        let request = match self.settings.visual_mode {
            VisualMode::Clip => OutboundCommand::RequestState,
            VisualMode::Screenshot => OutboundCommand::RequestScreenshot,
        };
        actions.push(CycleAction::Send(request));
    }

    /// Turn an oracle outcome into buttons. Unknown names are dropped; an
    /// empty result and every non-`Actions` outcome become the fallback.
    fn plan_command(&self, outcome: &OracleOutcome) -> (ButtonCommand, String, Option<String>) {
        let hold = self.settings.default_hold_frames;
        let reason = match outcome {
            OracleOutcome::Actions(decision) => {
                let presses: Vec<ButtonPress> = decision
                    .actions
                    .iter()
                    .enumerate()
                    .filter_map(|(i, name)| match Button::from_name(name) {
                        Some(button) => Some(ButtonPress::new(
                            button,
                            decision.durations.get(i).copied().unwrap_or(hold),
                        )),
                        None => {
                            warn!("[CYCLE] Dropping unknown button '{}'", name);
                            None
                        }
                    })
                    .collect();
                if !presses.is_empty() {
                    return (ButtonCommand::new(presses), decision.text.clone(), None);
                }
                "no valid buttons in oracle decision".to_string()
            }
            OracleOutcome::Fallback(reason) => reason.clone(),
            OracleOutcome::Error(reason) => format!("oracle error: {reason}"),
        };

        let presses = self
            .settings
            .fallback_buttons
            .iter()
            .map(|button| ButtonPress::new(*button, hold))
            .collect();
        (ButtonCommand::new(presses), String::new(), Some(reason))
    }
}
