//! Error types for capture, buffering and encoding

use crate::clock::NowMs;

/// A single capture tick failed. The loop logs it and skips the tick.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Frame source unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to read frame: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to decode frame: {0}")]
    Decode(#[from] image::ImageError),
}

/// Rejected append to the frame buffer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    #[error("Frame timestamp {got} is older than newest buffered frame {newest}")]
    OutOfOrder { newest: NowMs, got: NowMs },
}

/// Clip encoding failure. The requester sees it; the watermark does not move.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("No frames to encode")]
    NoFrames,

    #[error("Image encoding failed: {0}")]
    Image(#[from] image::ImageError),
}
