// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # emupilot-emulator
//!
//! The socket boundary to the running emulator.
//!
//! Inbound lines are parsed up front into [`EmulatorMessage`] variants; the
//! [`ProtocolGuard`] records deprecated shapes without rejecting them, and
//! [`EmulatorLink`] owns the one active connection. Outbound traffic is
//! [`OutboundCommand`], most importantly encoded [`ButtonCommand`]s.

pub mod command;
pub mod direction;
pub mod error;
pub mod guard;
pub mod link;
pub mod message;

pub use command::{Button, ButtonCommand, ButtonPress, OutboundCommand, MAX_HOLD_FRAMES, MIN_HOLD_FRAMES};
pub use direction::Direction;
pub use error::{LinkError, Result};
pub use guard::{ProtocolGuard, ProtocolViolation, ViolationKind};
pub use link::{ConnectionId, EmulatorLink, LinkEvent, LinkHandle};
pub use message::{EmulatorMessage, GameStateSnapshot, LegacyMessage, FIELD_SEPARATOR};
