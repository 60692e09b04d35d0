//! Tick time sources

use crate::model::Millis;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Monotonic millisecond clock used to stamp submitted events.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> Millis;
}

/// Wall-clock monotonic time, counted from construction.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> Millis {
        self.origin.elapsed().as_millis() as Millis
    }
}

/// Simulated clock. Clones share the same time, so a test (or a scripted
/// session) can hand one copy to the engine and keep another to advance.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    inner: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(ms: Millis) -> Self {
        Self {
            inner: Arc::new(AtomicU64::new(ms)),
        }
    }

    pub fn set(&self, ms: Millis) {
        self.inner.store(ms, Ordering::Relaxed);
    }

    pub fn advance(&self, ms: Millis) -> Millis {
        self.inner.fetch_add(ms, Ordering::Relaxed) + ms
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Millis {
        self.inner.load(Ordering::Relaxed)
    }
}
