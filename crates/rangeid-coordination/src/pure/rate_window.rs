//! Pure sliding-window admission functions.
//!
//! A client is tracked as a list of request times plus a list of violation
//! times. Each configured window caps how many requests may fall inside it;
//! a request landing in a full window is a violation, and enough violations
//! inside the longest window turn into a lockout.
//!
//! # Tiger Style
//!
//! - Uses saturating arithmetic for all calculations
//! - Time is passed explicitly (no calls to system time)
//! - Deterministic behavior for testing and verification

use std::collections::VecDeque;

use crate::types::RateLimitConfig;
use crate::types::RateWindow;
use crate::types::RateWindowState;

// ============================================================================
// Window Arithmetic
// ============================================================================

/// Drop entries that fall outside a window of `window_ms` ending at `now_ms`.
///
/// An entry at `t` is inside the window while `t > now_ms - window_ms`.
/// Entries must be in ascending order.
#[inline]
pub fn prune_older_than(entries: &mut VecDeque<u64>, now_ms: u64, window_ms: u64) {
    let Some(horizon) = now_ms.checked_sub(window_ms) else {
        return;
    };
    while entries.front().is_some_and(|&t| t <= horizon) {
        entries.pop_front();
    }
}

/// Count entries inside a window of `window_ms` ending at `now_ms`.
#[inline]
pub fn count_since(entries: &VecDeque<u64>, now_ms: u64, window_ms: u64) -> usize {
    match now_ms.checked_sub(window_ms) {
        Some(horizon) => entries.iter().rev().take_while(|&&t| t > horizon).count(),
        None => entries.len(),
    }
}

/// Milliseconds until `window` admits one more request, or `None` if it
/// already has room.
///
/// When the window holds `count >= max` requests, the oldest
/// `count - max + 1` of them must age out first.
fn window_retry_after(entries: &VecDeque<u64>, now_ms: u64, window: &RateWindow) -> Option<u64> {
    let count = count_since(entries, now_ms, window.duration_ms);
    let max = window.max_requests as usize;
    if count < max {
        return None;
    }
    let first_in_window = entries.len() - count;
    let blocking = entries.get(first_in_window + (count - max)).copied().unwrap_or(now_ms);
    Some(blocking.saturating_add(window.duration_ms).saturating_sub(now_ms).max(1))
}

// ============================================================================
// Admission
// ============================================================================

/// Outcome of evaluating one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Request admitted.
    Accepted,
    /// A window was full; the request counted as a violation.
    Throttled {
        /// Wait until every window has room again.
        retry_after_ms: u64,
    },
    /// Client was already locked out; nothing was recorded.
    LockedOut {
        /// When the lockout ends.
        until_ms: u64,
    },
    /// This request's violation crossed the threshold and started a lockout.
    LockoutStarted {
        /// When the lockout ends.
        until_ms: u64,
    },
}

impl Admission {
    #[inline]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Admission::Accepted)
    }
}

/// Evaluate one request at `now_ms` and update `state` accordingly.
///
/// 1. An active lockout rejects without touching counters; a lapsed one is cleared.
/// 2. Requests and violations outside the longest window are pruned.
/// 3. The request is a violation if any window already holds its maximum.
/// 4. The request time is recorded whatever the outcome.
/// 5. A violation is recorded; reaching the threshold clears both lists and
///    locks the client out for `lockout_ms`.
pub fn evaluate_request(state: &mut RateWindowState, now_ms: u64, config: &RateLimitConfig) -> Admission {
    if let Some(until_ms) = state.lockout_until_ms {
        if now_ms < until_ms {
            return Admission::LockedOut { until_ms };
        }
        state.lockout_until_ms = None;
    }

    let max_window_ms = config.max_window_ms();
    prune_older_than(&mut state.timestamps, now_ms, max_window_ms);
    prune_older_than(&mut state.violations, now_ms, max_window_ms);

    let retry_after_ms = config
        .windows
        .iter()
        .filter_map(|window| window_retry_after(&state.timestamps, now_ms, window))
        .max();

    state.timestamps.push_back(now_ms);

    let Some(retry_after_ms) = retry_after_ms else {
        return Admission::Accepted;
    };

    state.violations.push_back(now_ms);
    if state.violations.len() >= config.violation_threshold.max(1) as usize {
        let until_ms = now_ms.saturating_add(config.lockout_ms);
        state.timestamps.clear();
        state.violations.clear();
        state.lockout_until_ms = Some(until_ms);
        return Admission::LockoutStarted { until_ms };
    }

    Admission::Throttled { retry_after_ms }
}
