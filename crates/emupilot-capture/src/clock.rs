//! Monotonic millisecond clock shared by the capture loop and clip service.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Milliseconds in a monotonic clock domain.
pub type NowMs = u64;

pub trait Clock: Send + Sync {
    fn now_ms(&self) -> NowMs;
}

/// Real clock anchored at construction time.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    base: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> NowMs {
        self.base.elapsed().as_millis() as NowMs
    }
}

/// Clock advanced explicitly, for deterministic tests and replays.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: NowMs) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    pub fn set(&self, now_ms: NowMs) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: u64) -> NowMs {
        self.now.fetch_add(delta_ms, Ordering::SeqCst) + delta_ms
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> NowMs {
        self.now.load(Ordering::SeqCst)
    }
}
