//! Error types for the clip IPC layer

use emupilot_capture::{EncodeError, NowMs};
use std::time::Duration;

/// Result type alias using IpcError
pub type Result<T> = std::result::Result<T, IpcError>;

#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    /// Startup-time bind failure; the only fatal error of the clip server
    #[error("Cannot bind clip server to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IPC I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IPC request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed IPC message: {0}")]
    Protocol(String),

    /// No buffered frame falls in the requested range
    #[error("No frames between {start_ms} and {end_ms}")]
    NoFrames { start_ms: NowMs, end_ms: NowMs },

    #[error("Clip encoding failed: {0}")]
    Encode(#[from] EncodeError),

    /// The remote side answered `success: false`
    #[error("Clip server error: {message}")]
    Remote {
        message: String,
        start_ms: Option<NowMs>,
    },

    #[error("Clip worker failed: {0}")]
    Worker(String),
}

impl IpcError {
    /// Transport-level failures worth another attempt with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IpcError::Timeout(_) | IpcError::Io(_))
    }
}

impl From<serde_json::Error> for IpcError {
    fn from(err: serde_json::Error) -> Self {
        IpcError::Protocol(err.to_string())
    }
}

impl From<base64::DecodeError> for IpcError {
    fn from(err: base64::DecodeError) -> Self {
        IpcError::Protocol(format!("clip_bytes is not valid base64: {err}"))
    }
}
