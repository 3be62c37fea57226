// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Backward-compatibility guard
//!
//! Deprecated and unrecognized message kinds are still handled by the link,
//! but every occurrence is recorded here. Messages carrying machine-specific
//! absolute paths are flagged separately. Recording never blocks or fails
//! message processing.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use crate::message::{EmulatorMessage, FIELD_SEPARATOR};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    DeprecatedMessage,
    HardcodedPaths,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProtocolViolation {
    pub kind: ViolationKind,
    pub timestamp: DateTime<Utc>,
    pub details: String,
}

pub struct ProtocolGuard {
    capacity: usize,
    log: Mutex<VecDeque<ProtocolViolation>>,
    legacy_messages: AtomicU64,
    violations: AtomicU64,
}

impl ProtocolGuard {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            log: Mutex::new(VecDeque::new()),
            legacy_messages: AtomicU64::new(0),
            violations: AtomicU64::new(0),
        }
    }

    /// Record whatever is non-compliant about one inbound line.
    /// Returns the number of violations recorded for it.
    pub fn inspect(&self, line: &str, message: &EmulatorMessage) -> usize {
        let mut recorded = 0;

        match message {
            EmulatorMessage::Legacy(_) => {
                let count = self.legacy_messages.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    "[PROTOCOL] Deprecated '{}' message (legacy count {}), handling anyway",
                    message.kind(),
                    count
                );
                self.record(
                    ViolationKind::DeprecatedMessage,
                    format!("deprecated message kind '{}'", message.kind()),
                );
                recorded += 1;
            }
            EmulatorMessage::Unknown { kind, .. } => {
                let count = self.legacy_messages.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    "[PROTOCOL] Unrecognized message kind '{}' (legacy count {}), ignored",
                    kind, count
                );
                self.record(ViolationKind::Other, format!("unrecognized message: {}", truncate(line)));
                recorded += 1;
            }
            _ => {}
        }

        if let Some(path) = line
            .split(FIELD_SEPARATOR)
            .map(str::trim)
            .find(|field| is_machine_specific_path(field))
        {
            warn!("[PROTOCOL] Message embeds machine-specific path {}", path);
            self.record(
                ViolationKind::HardcodedPaths,
                format!("'{}' message embeds {}", message.kind(), path),
            );
            recorded += 1;
        }

        recorded
    }

    /// Deprecated or unrecognized messages seen so far.
    pub fn legacy_message_count(&self) -> u64 {
        self.legacy_messages.load(Ordering::Relaxed)
    }

    /// All violations recorded so far, including those evicted from the log.
    pub fn violation_count(&self) -> u64 {
        self.violations.load(Ordering::Relaxed)
    }

    /// Most recent violations, oldest first.
    pub fn recent(&self) -> Vec<ProtocolViolation> {
        self.log.lock().iter().cloned().collect()
    }

    fn record(&self, kind: ViolationKind, details: String) {
        self.violations.fetch_add(1, Ordering::Relaxed);
        let mut log = self.log.lock();
        if log.len() == self.capacity {
            log.pop_front();
        }
        debug!("[PROTOCOL] Violation {:?}: {}", kind, details);
        log.push_back(ProtocolViolation {
            kind,
            timestamp: Utc::now(),
            details,
        });
    }
}

impl Default for ProtocolGuard {
    fn default() -> Self {
        Self::new(256)
    }
}

/// `/Users/..`, `/home/..` or a drive-letter `C:\Users\..` path.
fn is_machine_specific_path(field: &str) -> bool {
    if field.starts_with("/Users/") || field.starts_with("/home/") {
        return true;
    }
    let bytes = field.as_bytes();
    bytes.len() > 2
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (field[2..].starts_with("\\Users\\") || field[2..].starts_with("/Users/"))
}

fn truncate(line: &str) -> &str {
    match line.char_indices().nth(120) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inspect(guard: &ProtocolGuard, line: &str) -> usize {
        guard.inspect(line, &EmulatorMessage::parse(line))
    }

    #[test]
    fn test_current_messages_are_clean() {
        let guard = ProtocolGuard::new(8);
        for line in ["ready", "state||UP||1||2||3", "screenshot_with_state||data/a.png||UP||1||2||3"] {
            assert_eq!(inspect(&guard, line), 0, "{line}");
        }
        assert_eq!(guard.legacy_message_count(), 0);
        assert!(guard.recent().is_empty());
    }

    #[test]
    fn test_each_legacy_message_counts_once() {
        let guard = ProtocolGuard::new(8);
        assert_eq!(inspect(&guard, "position||1||2"), 1);
        assert_eq!(guard.legacy_message_count(), 1);
        assert_eq!(inspect(&guard, "data||UP||1||2||3"), 1);
        assert_eq!(guard.legacy_message_count(), 2);
        assert_eq!(guard.recent()[0].kind, ViolationKind::DeprecatedMessage);
    }

    #[test]
    fn test_hardcoded_paths_flagged_separately() {
        let guard = ProtocolGuard::new(8);
        assert_eq!(inspect(&guard, "screenshot_with_state||/Users/ana/shot.png||UP||1||2||3"), 1);
        assert_eq!(inspect(&guard, "screenshot_with_state||C:\\Users\\ana\\shot.png||UP||1||2||3"), 1);
        assert_eq!(guard.legacy_message_count(), 0);

        // Deprecated and path-embedding at once.
        assert_eq!(inspect(&guard, "screenshot||/home/ana/shot.png"), 2);
        assert_eq!(guard.legacy_message_count(), 1);
        let kinds: Vec<ViolationKind> = guard.recent().iter().map(|v| v.kind).collect();
        assert_eq!(kinds.iter().filter(|k| **k == ViolationKind::HardcodedPaths).count(), 3);
    }

    #[test]
    fn test_log_is_bounded() {
        let guard = ProtocolGuard::new(3);
        for _ in 0..10 {
            inspect(&guard, "bogus");
        }
        assert_eq!(guard.recent().len(), 3);
        assert_eq!(guard.violation_count(), 10);
        assert_eq!(guard.recent()[0].kind, ViolationKind::Other);
    }

    #[test]
    fn test_violation_serializes_snake_case() {
        let guard = ProtocolGuard::new(1);
        inspect(&guard, "position||1||2");
        let json = serde_json::to_value(&guard.recent()[0]).unwrap();
        assert_eq!(json["kind"], "deprecated_message");
    }
}
