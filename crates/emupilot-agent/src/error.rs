//! Error types for the decision cycle

use emupilot_ipc::IpcError;

use crate::screenshot::ScreenshotWaitError;

/// Result type alias using CycleError
pub type Result<T> = std::result::Result<T, CycleError>;

/// Failures inside one cycle. None of them stops the cycle: visual-context
/// failures become the fallback action.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("Clip unavailable: {0}")]
    Clip(#[from] IpcError),

    #[error(transparent)]
    Screenshot(#[from] ScreenshotWaitError),
}
