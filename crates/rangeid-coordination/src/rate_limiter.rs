//! Multi-window sliding rate limiter with lockout escalation.
//!
//! Each client identity (typically a network address) gets its own
//! [`RateWindowState`]. Requests are admitted while every configured window
//! has room; a request landing in a full window is a violation, and
//! repeated violations lock the client out for a cooldown period.
//!
//! Per-identity state lives behind the [`RateStateStore`] trait and time
//! comes from an injected [`Clock`], so tests can drive the limiter with a
//! [`ManualClock`](rangeid_store::ManualClock) instead of sleeping.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rangeid_store::Clock;
use rangeid_store::SystemClock;
use tracing::debug;
use tracing::warn;

use crate::error::RateLimitError;
use crate::pure::Admission;
use crate::pure::evaluate_request;
use crate::pure::prune_older_than;
use crate::types::RateLimitConfig;
use crate::types::RateWindowState;

/// Storage for per-identity window state.
pub trait RateStateStore: Send + Sync {
    /// Run `f` on the state for `identity`, creating it if absent.
    fn update<R>(&self, identity: &str, f: impl FnOnce(&mut RateWindowState) -> R) -> R;

    /// Copy of the state for `identity`, if tracked.
    fn get(&self, identity: &str) -> Option<RateWindowState>;

    /// Forget `identity`. Returns whether it was tracked.
    fn remove(&self, identity: &str) -> bool;

    /// All tracked identities, in no particular order.
    fn identities(&self) -> Vec<String>;

    /// Keep only identities for which `keep` returns true.
    fn retain(&self, keep: impl FnMut(&str, &mut RateWindowState) -> bool);
}

/// Process-local [`RateStateStore`].
#[derive(Debug, Default)]
pub struct InMemoryRateStateStore {
    states: Mutex<HashMap<String, RateWindowState>>,
}

impl RateStateStore for InMemoryRateStateStore {
    fn update<R>(&self, identity: &str, f: impl FnOnce(&mut RateWindowState) -> R) -> R {
        let mut states = self.states.lock();
        f(states.entry(identity.to_string()).or_default())
    }

    fn get(&self, identity: &str) -> Option<RateWindowState> {
        self.states.lock().get(identity).cloned()
    }

    fn remove(&self, identity: &str) -> bool {
        self.states.lock().remove(identity).is_some()
    }

    fn identities(&self) -> Vec<String> {
        self.states.lock().keys().cloned().collect()
    }

    fn retain(&self, mut keep: impl FnMut(&str, &mut RateWindowState) -> bool) {
        self.states.lock().retain(|identity, state| keep(identity, state));
    }
}

/// Admission gate evaluated before any allocation work.
pub struct RateLimiter<S: RateStateStore = InMemoryRateStateStore> {
    config: RateLimitConfig,
    states: S,
    clock: Arc<dyn Clock>,
}

impl RateLimiter<InMemoryRateStateStore> {
    /// Limiter with in-memory state and the system clock.
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_state_store(config, InMemoryRateStateStore::default(), Arc::new(SystemClock))
    }

    /// Limiter with in-memory state and the given clock.
    pub fn with_clock(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_state_store(config, InMemoryRateStateStore::default(), clock)
    }
}

impl<S: RateStateStore> RateLimiter<S> {
    pub fn with_state_store(config: RateLimitConfig, states: S, clock: Arc<dyn Clock>) -> Self {
        Self { config, states, clock }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Whether a request from `identity` is admitted now.
    pub fn accept(&self, identity: &str) -> bool {
        self.try_accept(identity).is_ok()
    }

    /// Admit a request from `identity` now, or say why not.
    pub fn try_accept(&self, identity: &str) -> Result<(), RateLimitError> {
        self.try_accept_at(identity, self.clock.now_unix_ms())
    }

    /// Admit a request from `identity` at `now_ms`.
    ///
    /// Every call except one made during a lockout is recorded, so rejected
    /// requests still count toward later windows.
    pub fn try_accept_at(&self, identity: &str, now_ms: u64) -> Result<(), RateLimitError> {
        let admission = self.states.update(identity, |state| evaluate_request(state, now_ms, &self.config));
        self.report(identity, admission, now_ms)
    }

    /// What [`try_accept`](Self::try_accept) would answer, without recording
    /// anything.
    pub fn check(&self, identity: &str) -> Result<(), RateLimitError> {
        self.check_at(identity, self.clock.now_unix_ms())
    }

    pub fn check_at(&self, identity: &str, now_ms: u64) -> Result<(), RateLimitError> {
        let mut state = self.states.get(identity).unwrap_or_default();
        match evaluate_request(&mut state, now_ms, &self.config) {
            Admission::Accepted => Ok(()),
            Admission::Throttled { retry_after_ms } => Err(RateLimitError::Throttled { retry_after_ms }),
            Admission::LockedOut { until_ms } | Admission::LockoutStarted { until_ms } => {
                Err(RateLimitError::LockedOut {
                    until_ms,
                    retry_after_ms: until_ms.saturating_sub(now_ms),
                })
            }
        }
    }

    /// Forget everything about `identity`, lifting any lockout.
    pub fn reset(&self, identity: &str) -> bool {
        let removed = self.states.remove(identity);
        if removed {
            debug!(identity, "rate limit state reset");
        }
        removed
    }

    pub fn tracked_identities(&self) -> Vec<String> {
        let mut identities = self.states.identities();
        identities.sort();
        identities
    }

    /// Drop identities with nothing left inside the longest window and no
    /// active lockout. Returns how many were dropped.
    pub fn evict_idle(&self) -> usize {
        let now_ms = self.clock.now_unix_ms();
        let max_window_ms = self.config.max_window_ms();
        let mut evicted = 0usize;
        self.states.retain(|_, state| {
            prune_older_than(&mut state.timestamps, now_ms, max_window_ms);
            prune_older_than(&mut state.violations, now_ms, max_window_ms);
            if state.lockout_until_ms.is_some_and(|until_ms| until_ms <= now_ms) {
                state.lockout_until_ms = None;
            }
            let keep = !state.is_idle();
            if !keep {
                evicted += 1;
            }
            keep
        });
        evicted
    }

    fn report(&self, identity: &str, admission: Admission, now_ms: u64) -> Result<(), RateLimitError> {
        match admission {
            Admission::Accepted => Ok(()),
            Admission::Throttled { retry_after_ms } => {
                debug!(identity, retry_after_ms, "request throttled");
                Err(RateLimitError::Throttled { retry_after_ms })
            }
            Admission::LockoutStarted { until_ms } => {
                warn!(
                    identity,
                    until_ms,
                    lockout_ms = self.config.lockout_ms,
                    "client locked out after repeated violations"
                );
                Err(RateLimitError::LockedOut {
                    until_ms,
                    retry_after_ms: until_ms.saturating_sub(now_ms),
                })
            }
            Admission::LockedOut { until_ms } => Err(RateLimitError::LockedOut {
                until_ms,
                retry_after_ms: until_ms.saturating_sub(now_ms),
            }),
        }
    }
}
