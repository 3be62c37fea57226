// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Outbound emulator commands
//!
//! Button commands travel as `codes|holds`, e.g. `6,6,0|2,2,2` for
//! UP, UP, A held two frames each.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::message::FIELD_SEPARATOR;

pub const MIN_HOLD_FRAMES: u32 = 1;
pub const MAX_HOLD_FRAMES: u32 = 180;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Button {
    A,
    B,
    Select,
    Start,
    Right,
    Left,
    Up,
    Down,
}

impl Button {
    pub const ALL: [Button; 8] = [
        Button::A,
        Button::B,
        Button::Select,
        Button::Start,
        Button::Right,
        Button::Left,
        Button::Up,
        Button::Down,
    ];

    /// Integer code understood by the emulator-side script.
    pub fn code(self) -> u8 {
        match self {
            Button::A => 0,
            Button::B => 1,
            Button::Select => 2,
            Button::Start => 3,
            Button::Right => 4,
            Button::Left => 5,
            Button::Up => 6,
            Button::Down => 7,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Button::A => "A",
            Button::B => "B",
            Button::Select => "SELECT",
            Button::Start => "START",
            Button::Right => "RIGHT",
            Button::Left => "LEFT",
            Button::Up => "UP",
            Button::Down => "DOWN",
        }
    }

    /// Case-insensitive lookup by name.
    pub fn from_name(name: &str) -> Option<Button> {
        let name = name.trim();
        Button::ALL
            .into_iter()
            .find(|button| button.name().eq_ignore_ascii_case(name))
    }

    pub fn is_directional(self) -> bool {
        matches!(self, Button::Up | Button::Down | Button::Left | Button::Right)
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ButtonPress {
    pub button: Button,
    pub hold_frames: u32,
}

impl ButtonPress {
    /// Hold duration is clamped to `[MIN_HOLD_FRAMES, MAX_HOLD_FRAMES]`.
    pub fn new(button: Button, hold_frames: u32) -> Self {
        Self {
            button,
            hold_frames: hold_frames.clamp(MIN_HOLD_FRAMES, MAX_HOLD_FRAMES),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ButtonCommand {
    presses: Vec<ButtonPress>,
}

impl ButtonCommand {
    pub fn new(presses: Vec<ButtonPress>) -> Self {
        Self { presses }
    }

    pub fn presses(&self) -> &[ButtonPress] {
        &self.presses
    }

    pub fn is_empty(&self) -> bool {
        self.presses.is_empty()
    }

    pub fn total_hold_frames(&self) -> u64 {
        self.presses.iter().map(|p| p.hold_frames as u64).sum()
    }

    pub fn to_wire(&self) -> String {
        let codes: Vec<String> = self.presses.iter().map(|p| p.button.code().to_string()).collect();
        let holds: Vec<String> = self.presses.iter().map(|p| p.hold_frames.to_string()).collect();
        format!("{}|{}", codes.join(","), holds.join(","))
    }
}

/// Everything the engine sends to the emulator, one line each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundCommand {
    /// Game configuration, sent on every new connection before anything else
    Config {
        game: String,
        memory_map: BTreeMap<String, String>,
    },
    RequestState,
    RequestScreenshot,
    Buttons(ButtonCommand),
}

impl OutboundCommand {
    pub fn to_line(&self) -> String {
        match self {
            OutboundCommand::Config { game, memory_map } => {
                let pairs: Vec<String> = memory_map.iter().map(|(k, v)| format!("{k}={v}")).collect();
                format!("config{sep}{game}{sep}{}", pairs.join(";"), sep = FIELD_SEPARATOR)
            }
            OutboundCommand::RequestState => "request_state".to_string(),
            OutboundCommand::RequestScreenshot => "request_screenshot".to_string(),
            OutboundCommand::Buttons(command) => command.to_wire(),
        }
    }
}
