// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # emupilot-ipc
//!
//! "Give me a clip since the last one" as a service:
//! - [`ClipService`] owns the watermark and serves one clip request at a time
//! - [`ClipServer`] exposes it over TCP, one JSON object per line
//! - [`ClipClient`] talks to a remote server with adaptive timeouts and retries
//! - [`ClipSource`] lets the decision cycle use either transparently

pub mod client;
pub mod error;
pub mod protocol;
pub mod server;
pub mod service;

pub use client::{ClipClient, TimeoutPolicy};
pub use error::{IpcError, Result};
pub use protocol::{BufferStatus, ClipPayload, IpcRequest, IpcResponse};
pub use server::ClipServer;
pub use service::{ClipPolicy, ClipService, ClipSource, LocalClipSource};
