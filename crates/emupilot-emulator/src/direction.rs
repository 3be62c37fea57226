// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Facing direction reported by the emulator

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
    #[default]
    Unknown,
}

impl Direction {
    /// Map a raw wire token to a direction. Never fails: empty, absent and
    /// unrecognized tokens (`"UNKNOWN (48)"`, `"weird_value"`) are `Unknown`.
    pub fn normalize(token: Option<&str>) -> Self {
        let Some(token) = token else {
            return Direction::Unknown;
        };
        let token = token.trim();
        if token.eq_ignore_ascii_case("UP") {
            Direction::Up
        } else if token.eq_ignore_ascii_case("DOWN") {
            Direction::Down
        } else if token.eq_ignore_ascii_case("LEFT") {
            Direction::Left
        } else if token.eq_ignore_ascii_case("RIGHT") {
            Direction::Right
        } else {
            Direction::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "UP",
            Direction::Down => "DOWN",
            Direction::Left => "LEFT",
            Direction::Right => "RIGHT",
            Direction::Unknown => "UNKNOWN",
        }
    }
}

impl From<&str> for Direction {
    fn from(token: &str) -> Self {
        Direction::normalize(Some(token))
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_tokens_are_unknown() {
        for token in ["UNKNOWN (48)", "", "weird_value", "UPP", "0x06"] {
            assert_eq!(Direction::normalize(Some(token)), Direction::Unknown, "{token:?}");
        }
        assert_eq!(Direction::normalize(None), Direction::Unknown);
    }

    #[test]
    fn test_cardinal_tokens_pass_through() {
        for (token, expected) in [
            ("UP", Direction::Up),
            ("DOWN", Direction::Down),
            ("LEFT", Direction::Left),
            ("RIGHT", Direction::Right),
        ] {
            let direction = Direction::normalize(Some(token));
            assert_eq!(direction, expected);
            assert_eq!(direction.as_str(), token);
        }
        assert_eq!(Direction::from(" left\r"), Direction::Left);
    }
}
