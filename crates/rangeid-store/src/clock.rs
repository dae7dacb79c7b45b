//! Injectable wall-clock source.
//!
//! Lease expiry and rate-limit windows are evaluated against a [`Clock`] so
//! tests can move time forward explicitly instead of sleeping.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Source of the current Unix time in milliseconds.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current Unix timestamp in milliseconds.
    fn now_unix_ms(&self) -> u64;
}

/// Clock backed by the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    /// Returns 0 if the system time is before the Unix epoch rather than
    /// panicking.
    #[inline]
    fn now_unix_ms(&self) -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
    }
}

/// Clock that only moves when told to.
///
/// Clones share the same underlying time, so a test can hand one clone to a
/// store or limiter and advance time through another.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now_ms: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock reading `start_ms`.
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    /// Move time forward by `delta_ms`, saturating at `u64::MAX`.
    pub fn advance_ms(&self, delta_ms: u64) {
        let _ = self.now_ms.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |now| Some(now.saturating_add(delta_ms)));
    }

    /// Jump to an absolute time.
    pub fn set_ms(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now_unix_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_after_2020() {
        let year_2020_ms = 1_577_836_800_000u64;
        assert!(SystemClock.now_unix_ms() > year_2020_ms);
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new(1_000);
        let other = clock.clone();

        clock.advance_ms(250);
        assert_eq!(other.now_unix_ms(), 1_250);

        other.set_ms(5_000);
        assert_eq!(clock.now_unix_ms(), 5_000);
    }

    #[test]
    fn manual_clock_advance_saturates() {
        let clock = ManualClock::new(u64::MAX - 10);
        clock.advance_ms(100);
        assert_eq!(clock.now_unix_ms(), u64::MAX);
    }
}
