// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Time-windowed frame store
//!
//! Bounded by duration rather than count: every append evicts frames older
//! than `newest - window`, so memory stays at roughly window x capture rate.
//! One writer (the capture loop) and any number of readers share it; readers
//! copy `Arc` handles out under a short read lock and encode without holding it.

use image::RgbaImage;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::NowMs;
use crate::error::BufferError;
use crate::frame::TimestampedFrame;

#[derive(Debug, Default)]
struct BufferInner {
    frames: VecDeque<Arc<TimestampedFrame>>,
    next_sequence: u64,
}

#[derive(Debug)]
pub struct FrameRingBuffer {
    window_ms: u64,
    inner: RwLock<BufferInner>,
}

impl FrameRingBuffer {
    pub fn new(window: Duration) -> Self {
        Self {
            window_ms: window.as_millis() as u64,
            inner: RwLock::new(BufferInner::default()),
        }
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    /// Append a frame captured at `timestamp_ms` and evict everything older
    /// than the window. Returns the sequence number assigned to the frame.
    pub fn push(&self, image: RgbaImage, timestamp_ms: NowMs) -> Result<u64, BufferError> {
        let mut inner = self.inner.write();

        if let Some(newest) = inner.frames.back() {
            if timestamp_ms < newest.timestamp_ms {
                return Err(BufferError::OutOfOrder {
                    newest: newest.timestamp_ms,
                    got: timestamp_ms,
                });
            }
        }

        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        inner.frames.push_back(Arc::new(TimestampedFrame {
            image,
            timestamp_ms,
            sequence,
        }));

        let cutoff = timestamp_ms.saturating_sub(self.window_ms);
        while inner
            .frames
            .front()
            .is_some_and(|frame| frame.timestamp_ms < cutoff)
        {
            inner.frames.pop_front();
        }

        Ok(sequence)
    }

    /// Frames with `start_ms <= timestamp < end_ms`, oldest first.
    pub fn frames_in_range(&self, start_ms: NowMs, end_ms: NowMs) -> Vec<Arc<TimestampedFrame>> {
        if end_ms <= start_ms {
            return Vec::new();
        }
        let inner = self.inner.read();
        let first = inner
            .frames
            .partition_point(|frame| frame.timestamp_ms < start_ms);
        let last = inner
            .frames
            .partition_point(|frame| frame.timestamp_ms < end_ms);
        inner.frames.range(first..last).cloned().collect()
    }

    /// Copy of every buffered frame handle.
    pub fn snapshot(&self) -> Vec<Arc<TimestampedFrame>> {
        self.inner.read().frames.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<Arc<TimestampedFrame>> {
        self.inner.read().frames.back().cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().frames.is_empty()
    }

    pub fn oldest_timestamp(&self) -> Option<NowMs> {
        self.inner.read().frames.front().map(|f| f.timestamp_ms)
    }

    pub fn newest_timestamp(&self) -> Option<NowMs> {
        self.inner.read().frames.back().map(|f| f.timestamp_ms)
    }

    /// Milliseconds between the oldest and newest buffered frame.
    pub fn span_ms(&self) -> u64 {
        let inner = self.inner.read();
        match (inner.frames.front(), inner.frames.back()) {
            (Some(oldest), Some(newest)) => newest.timestamp_ms - oldest.timestamp_ms,
            _ => 0,
        }
    }
}
