// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Tokio driver for [`DecisionCycle`].
//!
//! One coordinator task owns the state machine. It multiplexes link events,
//! results from its worker tasks (decision, completion timer), a periodic
//! tick and the shutdown signal, and executes the returned actions. The
//! decision itself (clip fetch, screenshot wait, oracle call) runs in a
//! spawned task so the coordinator keeps draining the emulator link.

use emupilot_capture::Clock;
use emupilot_config::{PilotConfig, ScreenshotConfig};
use emupilot_emulator::{ConnectionId, LinkError, LinkEvent, LinkHandle, OutboundCommand, ProtocolGuard};
use emupilot_ipc::ClipSource;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::state_machine::{CycleAction, CycleEvent, DecisionCycle, DecisionRequest, VisualRequest};
use crate::error::CycleError;
use crate::knowledge::{KnowledgeSink, NullKnowledgeSink};
use crate::oracle::{DecisionOracle, OracleOutcome, VisualInput};
use crate::screenshot::wait_for_screenshot;
use crate::status::{CycleStatus, StatusChannel};

/// Where outbound emulator commands go.
pub trait CommandSink: Send + Sync {
    fn send_to(&self, connection: ConnectionId, command: &OutboundCommand) -> Result<(), LinkError>;
}

impl CommandSink for LinkHandle {
    fn send_to(&self, connection: ConnectionId, command: &OutboundCommand) -> Result<(), LinkError> {
        LinkHandle::send_to(self, connection, command)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DriverConfig {
    pub tick_interval: Duration,
    pub oracle_timeout: Duration,
    pub screenshot: ScreenshotConfig,
}

impl DriverConfig {
    pub fn from_config(config: &PilotConfig) -> Self {
        Self {
            tick_interval: Duration::from_millis(config.timing.tick_interval_ms.max(1)),
            oracle_timeout: Duration::from_secs_f64(config.decision.oracle_timeout_secs.max(0.0)),
            screenshot: config.screenshot.clone(),
        }
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self::from_config(&PilotConfig::default())
    }
}

pub struct CycleDriver {
    cycle: DecisionCycle,
    config: DriverConfig,
    commands: Arc<dyn CommandSink>,
    clips: Arc<dyn ClipSource>,
    oracle: Arc<dyn DecisionOracle>,
    clock: Arc<dyn Clock>,
    knowledge: Arc<dyn KnowledgeSink>,
    guard: Option<Arc<ProtocolGuard>>,
    status: StatusChannel,
    last_status: Option<CycleStatus>,
    connection: Option<ConnectionId>,
}

impl CycleDriver {
    pub fn new(
        cycle: DecisionCycle,
        config: DriverConfig,
        commands: Arc<dyn CommandSink>,
        clips: Arc<dyn ClipSource>,
        oracle: Arc<dyn DecisionOracle>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cycle,
            config,
            commands,
            clips,
            oracle,
            clock,
            knowledge: Arc::new(NullKnowledgeSink),
            guard: None,
            status: StatusChannel::new(),
            last_status: None,
            connection: None,
        }
    }

    pub fn with_knowledge(mut self, knowledge: Arc<dyn KnowledgeSink>) -> Self {
        self.knowledge = knowledge;
        self
    }

    /// Include the guard's violation counts in published status.
    pub fn with_guard(mut self, guard: Arc<ProtocolGuard>) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn with_status_channel(mut self, status: StatusChannel) -> Self {
        self.status = status;
        self
    }

    pub fn status_channel(&self) -> StatusChannel {
        self.status.clone()
    }

    /// Drive the cycle until shutdown or until the link's event stream ends.
    /// Returns the final state machine.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<LinkEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> DecisionCycle {
        let (internal_tx, mut internal_rx) = mpsc::unbounded_channel::<CycleEvent>();
        let mut tick = tokio::time::interval(self.config.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("[CYCLE] Driver started");
        loop {
            let event = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                link_event = events.recv() => match link_event {
                    Some(link_event) => match self.translate(link_event) {
                        Some(event) => event,
                        None => continue,
                    },
                    None => {
                        info!("[CYCLE] Emulator link closed");
                        break;
                    }
                },
                Some(internal) = internal_rx.recv() => internal,
                _ = tick.tick() => CycleEvent::Tick,
            };

            let now_ms = self.clock.now_ms();
            let actions = self.cycle.step(now_ms, std::slice::from_ref(&event));
            for action in actions {
                self.execute(action, &internal_tx);
            }
            self.publish_status();
        }

        info!(
            "[CYCLE] Driver stopped after {} decisions ({} fallbacks, {} coalesced events)",
            self.cycle.decisions(),
            self.cycle.fallbacks(),
            self.cycle.coalesced_events()
        );
        self.cycle
    }

    /// Map link events to cycle events, dropping any from a connection that
    /// is no longer the current one.
    fn translate(&mut self, event: LinkEvent) -> Option<CycleEvent> {
        match event {
            LinkEvent::Connected { connection, peer } => {
                debug!("[CYCLE] Connection #{} from {}", connection, peer);
                self.connection = Some(connection);
                Some(CycleEvent::Connected)
            }
            LinkEvent::Message { connection, message } if self.connection == Some(connection) => {
                Some(CycleEvent::Message(message))
            }
            LinkEvent::Disconnected { connection, .. } if self.connection == Some(connection) => {
                self.connection = None;
                Some(CycleEvent::Disconnected)
            }
            LinkEvent::Message { connection, .. } | LinkEvent::Disconnected { connection, .. } => {
                debug!("[CYCLE] Ignoring event from stale connection #{}", connection);
                None
            }
        }
    }

    fn execute(&self, action: CycleAction, internal_tx: &mpsc::UnboundedSender<CycleEvent>) {
        match action {
            CycleAction::Send(command) => {
                let Some(connection) = self.connection else {
                    debug!("[CYCLE] No emulator connected, dropping {:?}", command);
                    return;
                };
                if let Err(e) = self.commands.send_to(connection, &command) {
                    warn!("[CYCLE] Failed to send '{}': {}", command.to_line(), e);
                }
            }
            CycleAction::StartDecision { epoch, request } => {
                let clips = self.clips.clone();
                let oracle = self.oracle.clone();
                let config = self.config.clone();
                let tx = internal_tx.clone();
                tokio::spawn(async move {
                    let outcome = decide(request, clips, oracle, &config).await;
                    let _ = tx.send(CycleEvent::DecisionFinished { epoch, outcome });
                });
            }
            CycleAction::ScheduleCompletion { epoch, after_ms } => {
                let tx = internal_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(after_ms)).await;
                    let _ = tx.send(CycleEvent::ActionCompleted { epoch });
                });
            }
            CycleAction::RecordAction(action) => {
                self.knowledge
                    .record_action(&self.cycle.settings().game, &action);
            }
            CycleAction::RecordLocation(state) => {
                self.knowledge
                    .record_location(&self.cycle.settings().game, &state);
            }
        }
    }

    fn publish_status(&mut self) {
        let mut status = self.cycle.status();
        if let Some(guard) = &self.guard {
            status.legacy_messages = guard.legacy_message_count();
            status.protocol_violations = guard.violation_count();
        }
        if self.last_status.as_ref() != Some(&status) {
            self.status.publish(status.clone());
            self.last_status = Some(status);
        }
    }
}

/// One decision: fetch the visual context, then consult the oracle under a timeout.
async fn decide(
    request: DecisionRequest,
    clips: Arc<dyn ClipSource>,
    oracle: Arc<dyn DecisionOracle>,
    config: &DriverConfig,
) -> OracleOutcome {
    let visual = match fetch_visual(&request.visual, clips.as_ref(), &config.screenshot).await {
        Ok(visual) => visual,
        Err(e) => {
            warn!("[CYCLE] Visual context unavailable: {}", e);
            return OracleOutcome::Error(e.to_string());
        }
    };

    match tokio::time::timeout(config.oracle_timeout, oracle.decide(&visual, &request.context)).await {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!("[CYCLE] Oracle did not answer within {:?}", config.oracle_timeout);
            OracleOutcome::Error("oracle timeout".to_string())
        }
    }
}

async fn fetch_visual(
    request: &VisualRequest,
    clips: &dyn ClipSource,
    screenshot: &ScreenshotConfig,
) -> Result<VisualInput, CycleError> {
    match request {
        VisualRequest::Clip => {
            let clip = clips.fetch_clip(None).await?;
            debug!(
                "[CYCLE] Clip {}..{} with {} frames",
                clip.start_timestamp, clip.end_timestamp, clip.frame_count
            );
            Ok(VisualInput::gif(clip.bytes))
        }
        VisualRequest::Screenshot { path } => {
            let bytes = wait_for_screenshot(Path::new(path), screenshot).await?;
            Ok(VisualInput::png(bytes))
        }
    }
}
