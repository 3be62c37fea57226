// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # emupilot-observability
//!
//! Logging initialisation shared by every emupilot binary, with per-crate
//! debug flag support.
//!
//! ## Features
//! - `file-logging`: JSON log files with daily rotation and run retention

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod config;
pub mod init;

pub use cli::*;
pub use config::*;
pub use init::*;

/// Known emupilot crate names for debug flags
pub const KNOWN_CRATES: &[&str] = &[
    "emupilot",
    "emupilot-config",
    "emupilot-capture",
    "emupilot-ipc",
    "emupilot-emulator",
    "emupilot-agent",
];

/// Tracing targets use the crate's module path, which swaps `-` for `_`.
pub fn crate_target(crate_name: &str) -> String {
    crate_name.replace('-', "_")
}
