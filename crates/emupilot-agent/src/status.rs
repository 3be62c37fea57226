// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Outward status push for dashboards
//!
//! Only the newest status matters, so the channel is small and slow
//! subscribers skip ahead (`RecvError::Lagged`) instead of queueing.

use emupilot_capture::NowMs;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::cycle::CyclePhase;

const STATUS_CHANNEL_CAPACITY: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleStatus {
    pub phase: CyclePhase,
    pub connected: bool,
    pub epoch: u64,
    pub decisions: u64,
    pub fallbacks: u64,
    pub coalesced_events: u64,
    pub last_decision_at: Option<NowMs>,
    pub next_allowed_at: NowMs,
    pub last_actions: Vec<String>,
    pub last_rationale: Option<String>,
    pub legacy_messages: u64,
    pub protocol_violations: u64,
}

#[derive(Debug, Clone)]
pub struct StatusChannel {
    tx: broadcast::Sender<CycleStatus>,
}

impl StatusChannel {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CycleStatus> {
        self.tx.subscribe()
    }

    pub fn publish(&self, status: CycleStatus) {
        // No subscribers is normal.
        let _ = self.tx.send(status);
    }
}

impl Default for StatusChannel {
    fn default() -> Self {
        Self::new()
    }
}
