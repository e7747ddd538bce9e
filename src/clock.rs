//! Wall-clock abstraction so timestamps and backoff windows are testable.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::types::EpochMillis;

/// Source of epoch-millisecond timestamps.
pub trait Clock: Send + Sync + 'static {
    /// Current time in milliseconds since the Unix epoch.
    fn now_ms(&self) -> EpochMillis;
}

/// Real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> EpochMillis {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Manually advanced clock for tests.
#[derive(Debug, Clone, Default)]
pub struct FakeClock {
    current: Arc<AtomicU64>,
}

impl FakeClock {
    /// Creates a clock reading `start_ms`.
    pub fn new(start_ms: EpochMillis) -> Self {
        Self {
            current: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        self.current
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    /// Sets the clock to an absolute reading.
    pub fn set(&self, now_ms: EpochMillis) {
        self.current.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> EpochMillis {
        self.current.load(Ordering::SeqCst)
    }
}
