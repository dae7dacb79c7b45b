//! Shared types for allocation and rate limiting.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use rangeid_constants::rate_limit::DEFAULT_LOCKOUT_MS;
use rangeid_constants::rate_limit::DEFAULT_VIOLATION_THRESHOLD;
use rangeid_constants::rate_limit::DEFAULT_WINDOWS;
use serde::Deserialize;
use serde::Serialize;

use crate::error::RangeError;

/// Content of a consumption document: the ids already claimed.
///
/// Stored as a JSON array, kept sorted and unique by every writer.
pub type ConsumedIds = Vec<u64>;

/// Build the document key for one owner's allocation domain.
///
/// ```ignore
/// assert_eq!(document_key("alice", "widgets"), "alice/widgets.json");
/// ```
pub fn document_key(owner_id: &str, category: &str) -> String {
    format!("{owner_id}/{category}.json")
}

/// An inclusive range of identifiers, `from..=to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdRange {
    pub from: u64,
    pub to: u64,
}

impl IdRange {
    pub fn new(from: u64, to: u64) -> Self {
        Self { from, to }
    }

    /// Whether `id` lies in this range.
    #[inline]
    pub fn contains(&self, id: u64) -> bool {
        self.from <= id && id <= self.to
    }

    /// Number of ids in the range (0 for an inverted range).
    #[inline]
    pub fn len(&self) -> u64 {
        if self.to < self.from {
            0
        } else {
            (self.to - self.from).saturating_add(1)
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for IdRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.from, self.to)
    }
}

impl FromStr for IdRange {
    type Err = RangeError;

    /// Parses `"100-199"` or a single id `"42"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_bound = |bound: &str| {
            bound.trim().parse::<u64>().map_err(|_| RangeError::NonNumeric {
                input: bound.trim().to_string(),
            })
        };
        match s.split_once('-') {
            Some((from, to)) => Ok(IdRange::new(parse_bound(from)?, parse_bound(to)?)),
            None => {
                let id = parse_bound(s)?;
                Ok(IdRange::new(id, id))
            }
        }
    }
}

/// What the caller wants from an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AllocationRequest {
    /// Record the id in the document. When false the document is only read.
    pub commit: bool,
    /// Claim this specific id instead of the first free one.
    pub required_id: Option<u64>,
}

impl AllocationRequest {
    /// Claim the first free id.
    pub fn next() -> Self {
        Self {
            commit: true,
            required_id: None,
        }
    }

    /// Report the first free id without claiming it.
    pub fn peek() -> Self {
        Self {
            commit: false,
            required_id: None,
        }
    }

    /// Claim a specific id.
    pub fn claim(id: u64) -> Self {
        Self {
            commit: true,
            required_id: Some(id),
        }
    }
}

/// Result of an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    /// The chosen id; 0 when the ranges are exhausted.
    pub id: u64,
    /// Whether `id` was free when last observed.
    pub available: bool,
    /// Whether this call wrote the document.
    pub updated: bool,
    /// The requested id was already consumed by someone else.
    pub was_already_consumed: bool,
    /// The document held consumed ids before this call.
    pub has_prior_consumption: bool,
}

/// One sliding window: at most `max_requests` within `duration_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateWindow {
    pub duration_ms: u64,
    pub max_requests: u32,
}

impl RateWindow {
    pub fn new(duration_ms: u64, max_requests: u32) -> Self {
        Self {
            duration_ms,
            max_requests,
        }
    }
}

/// Rate limiter policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Windows, evaluated smallest first.
    #[serde(default = "default_windows")]
    pub windows: Vec<RateWindow>,
    /// Violations within the largest window that trigger a lockout.
    #[serde(default = "default_violation_threshold")]
    pub violation_threshold: u32,
    /// Lockout duration.
    #[serde(default = "default_lockout_ms")]
    pub lockout_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            windows: default_windows(),
            violation_threshold: default_violation_threshold(),
            lockout_ms: default_lockout_ms(),
        }
    }
}

impl RateLimitConfig {
    /// Config with the given windows and default escalation policy.
    pub fn with_windows(windows: impl IntoIterator<Item = RateWindow>) -> Self {
        let mut windows: Vec<RateWindow> = windows.into_iter().collect();
        windows.sort_by_key(|window| window.duration_ms);
        Self {
            windows,
            ..Self::default()
        }
    }

    /// Longest window; state older than this is pruned.
    pub fn max_window_ms(&self) -> u64 {
        self.windows.iter().map(|window| window.duration_ms).max().unwrap_or(0)
    }
}

fn default_windows() -> Vec<RateWindow> {
    DEFAULT_WINDOWS.iter().map(|&(duration_ms, max_requests)| RateWindow::new(duration_ms, max_requests)).collect()
}

fn default_violation_threshold() -> u32 {
    DEFAULT_VIOLATION_THRESHOLD
}

fn default_lockout_ms() -> u64 {
    DEFAULT_LOCKOUT_MS
}

/// Per-client sliding window state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateWindowState {
    /// Times of recent requests, oldest first.
    pub timestamps: VecDeque<u64>,
    /// Times of recent violations, oldest first.
    pub violations: VecDeque<u64>,
    /// Set while the client is locked out.
    pub lockout_until_ms: Option<u64>,
}

impl RateWindowState {
    /// Nothing tracked: no recent requests, violations, or lockout.
    pub fn is_idle(&self) -> bool {
        self.timestamps.is_empty() && self.violations.is_empty() && self.lockout_until_ms.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_range_pair() {
        assert_eq!("100-199".parse::<IdRange>().unwrap(), IdRange::new(100, 199));
        assert_eq!(" 5 - 9 ".parse::<IdRange>().unwrap(), IdRange::new(5, 9));
    }

    #[test]
    fn parse_single_id() {
        assert_eq!("42".parse::<IdRange>().unwrap(), IdRange::new(42, 42));
    }

    #[test]
    fn parse_non_numeric_bound() {
        assert_eq!("1-x".parse::<IdRange>(), Err(RangeError::NonNumeric { input: "x".to_string() }));
        assert!(matches!("abc".parse::<IdRange>(), Err(RangeError::NonNumeric { .. })));
        // Negative numbers are not valid ids
        assert!(matches!("-5".parse::<IdRange>(), Err(RangeError::NonNumeric { .. })));
    }

    #[test]
    fn range_len_and_contains() {
        let range = IdRange::new(10, 19);
        assert_eq!(range.len(), 10);
        assert!(range.contains(10));
        assert!(range.contains(19));
        assert!(!range.contains(20));
        assert_eq!(IdRange::new(5, 4).len(), 0);
        assert_eq!(IdRange::new(1, u64::MAX).len(), u64::MAX);
    }

    #[test]
    fn document_key_layout() {
        assert_eq!(document_key("alice", "widgets"), "alice/widgets.json");
    }

    #[test]
    fn default_rate_config_matches_constants() {
        let config = RateLimitConfig::default();
        assert_eq!(config.windows.len(), 4);
        assert_eq!(config.windows[0], RateWindow::new(1_000, 10));
        assert_eq!(config.max_window_ms(), 30_000);
        assert_eq!(config.violation_threshold, 3);
        assert_eq!(config.lockout_ms, 15_000);
    }

    #[test]
    fn with_windows_sorts_by_duration() {
        let config = RateLimitConfig::with_windows([RateWindow::new(5_000, 20), RateWindow::new(1_000, 5)]);
        assert_eq!(config.windows[0].duration_ms, 1_000);
        assert_eq!(config.max_window_ms(), 5_000);
    }
}
