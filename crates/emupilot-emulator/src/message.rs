// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Inbound emulator messages
//!
//! Wire format: one message per line, fields separated by `||`, message kind
//! in the first field.
//!
//! | kind                    | fields                          |
//! |-------------------------|---------------------------------|
//! | `ready`                 |                                 |
//! | `config_loaded`         | `[game]`                        |
//! | `state`                 | `dir x y map`                   |
//! | `screenshot_with_state` | `path dir x y map`              |
//! | `screenshot` (legacy)   | `path`                          |
//! | `data` (legacy)         | `dir x y map`                   |
//! | `position` (legacy)     | `x y`                           |
//!
//! Parsing never fails; anything unrecognized becomes [`EmulatorMessage::Unknown`].

use serde::Serialize;
use tracing::debug;

use crate::direction::Direction;

pub const FIELD_SEPARATOR: &str = "||";

/// Player state as last reported by the emulator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GameStateSnapshot {
    pub direction: Direction,
    pub x: i32,
    pub y: i32,
    pub map_id: i32,
}

impl GameStateSnapshot {
    /// Build from `dir x y map` fields; missing or malformed numbers are 0.
    fn from_fields(fields: &[&str]) -> Self {
        Self {
            direction: Direction::normalize(fields.first().copied()),
            x: parse_number(fields.get(1).copied(), "x"),
            y: parse_number(fields.get(2).copied(), "y"),
            map_id: parse_number(fields.get(3).copied(), "map"),
        }
    }

    pub fn with_position(self, x: i32, y: i32) -> Self {
        Self { x, y, ..self }
    }

    /// Same map and tile, ignoring facing.
    pub fn same_location(&self, other: &GameStateSnapshot) -> bool {
        self.map_id == other.map_id && self.x == other.x && self.y == other.y
    }
}

/// Message shapes kept for older emulator-side scripts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyMessage {
    /// Screenshot without state; the last known state applies
    Screenshot { path: String },
    /// Old name of `state`
    Data(GameStateSnapshot),
    /// Position-only update
    Position { x: i32, y: i32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmulatorMessage {
    Ready,
    /// The emulator has loaded the game configuration we pushed
    ConfigLoaded { game: Option<String> },
    State(GameStateSnapshot),
    ScreenshotWithState {
        path: String,
        state: GameStateSnapshot,
    },
    Legacy(LegacyMessage),
    Unknown { kind: String, line: String },
}

impl EmulatorMessage {
    pub fn parse(line: &str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);
        let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
        let kind = fields[0].trim();
        let rest = &fields[1..];

        match kind {
            "ready" => EmulatorMessage::Ready,
            "config_loaded" => EmulatorMessage::ConfigLoaded {
                game: rest
                    .first()
                    .map(|game| game.trim())
                    .filter(|game| !game.is_empty())
                    .map(str::to_string),
            },
            "state" => EmulatorMessage::State(GameStateSnapshot::from_fields(rest)),
            "screenshot_with_state" => EmulatorMessage::ScreenshotWithState {
                path: rest.first().map(|p| p.trim().to_string()).unwrap_or_default(),
                state: GameStateSnapshot::from_fields(rest.get(1..).unwrap_or_default()),
            },
            "screenshot" => EmulatorMessage::Legacy(LegacyMessage::Screenshot {
                path: rest.first().map(|p| p.trim().to_string()).unwrap_or_default(),
            }),
            "data" => EmulatorMessage::Legacy(LegacyMessage::Data(GameStateSnapshot::from_fields(rest))),
            "position" => EmulatorMessage::Legacy(LegacyMessage::Position {
                x: parse_number(rest.first().copied(), "x"),
                y: parse_number(rest.get(1).copied(), "y"),
            }),
            _ => EmulatorMessage::Unknown {
                kind: kind.to_string(),
                line: line.to_string(),
            },
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            EmulatorMessage::Ready => "ready",
            EmulatorMessage::ConfigLoaded { .. } => "config_loaded",
            EmulatorMessage::State(_) => "state",
            EmulatorMessage::ScreenshotWithState { .. } => "screenshot_with_state",
            EmulatorMessage::Legacy(LegacyMessage::Screenshot { .. }) => "screenshot",
            EmulatorMessage::Legacy(LegacyMessage::Data(_)) => "data",
            EmulatorMessage::Legacy(LegacyMessage::Position { .. }) => "position",
            EmulatorMessage::Unknown { kind, .. } => kind,
        }
    }
}

fn parse_number(field: Option<&str>, name: &str) -> i32 {
    let Some(raw) = field.map(str::trim) else {
        return 0;
    };
    match raw.parse::<i32>() {
        Ok(value) => value,
        Err(_) => {
            debug!("[PROTOCOL] Malformed {} field {:?}, using 0", name, raw);
            0
        }
    }
}
