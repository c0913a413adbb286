//! Time source for debounce deadlines and timestamps.
//!
//! Deadlines use tokio's `Instant` so the autosave driver can `sleep_until`
//! them directly (and tests can pause tokio time). [`ManualClock`] lets the
//! state machine be stepped without any runtime at all.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

pub trait Clock: Send + Sync {
    /// Monotonic time for deadlines.
    fn now(&self) -> Instant;

    /// Wall-clock time for `lastSavedAt` and history stamps.
    fn utc_now(&self) -> DateTime<Utc>;
}

/// Real time (or paused tokio time inside `start_paused` tests).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hand-advanced clock for deterministic tests.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    wall_origin: DateTime<Utc>,
    offset: Mutex<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            wall_origin: Utc::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self
            .offset
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *offset += by;
    }

    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }

    pub fn elapsed(&self) -> Duration {
        *self
            .offset
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.wall_origin + elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_only_when_told() {
        let clock = ManualClock::new();
        let t0 = clock.now();
        let w0 = clock.utc_now();
        assert_eq!(clock.now(), t0);

        clock.advance_ms(1500);
        assert_eq!(clock.now() - t0, Duration::from_millis(1500));
        assert_eq!((clock.utc_now() - w0).num_milliseconds(), 1500);
    }
}
