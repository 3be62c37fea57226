// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # emupilot-capture
//!
//! Video side of the synchronization engine:
//! - [`FrameRingBuffer`]: frames retained for a fixed *duration*, evicted on append
//! - [`Capturer`]: background loop pulling a [`FrameSource`] at a fixed rate
//! - [`ClipEncoder`]: ordered frame slice to a bounded animated GIF
//!
//! All timestamps are [`NowMs`] values from a [`Clock`].

pub mod capturer;
pub mod clock;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod ring_buffer;
pub mod source;

pub use capturer::{CaptureStats, Capturer};
pub use clock::{Clock, ManualClock, MonotonicClock, NowMs};
pub use encoder::{ClipEncoder, ClipEncoderConfig, EncodedClip};
pub use error::{BufferError, CaptureError, EncodeError};
pub use frame::TimestampedFrame;
pub use ring_buffer::FrameRingBuffer;
pub use source::{FrameSource, ImageFileSource};
