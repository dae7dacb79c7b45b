//! Error types for coordination primitives.

use std::fmt;

use rangeid_store::StoreError;
use snafu::Snafu;

use crate::types::IdRange;

/// Errors from the updater, allocator and service facade.
///
/// Version conflicts never appear here: they drive the optimistic retry loop
/// and are absorbed by it.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CoordinationError {
    /// Wall-clock budget exhausted during an optimistic update.
    #[snafu(display("operation timed out after {timeout_ms}ms: {operation}"))]
    Timeout {
        /// Description of the operation.
        operation: String,
        /// Budget that was exhausted.
        timeout_ms: u64,
    },

    /// Allocation gave up after its bounded number of attempts.
    ///
    /// Usually heavy contention; a human may retry or check whether the
    /// configured ranges are nearly exhausted.
    #[snafu(display("allocation on '{key}' gave up after {attempts} attempts"))]
    TooManyAttempts {
        /// Document key being allocated from.
        key: String,
        /// Number of attempts made.
        attempts: u32,
    },

    /// Range list failed validation; the store was not touched.
    #[snafu(display("invalid ranges: {source}"))]
    InvalidRange {
        /// What was wrong with the ranges.
        source: RangeError,
    },

    /// A required id lies outside every configured range.
    #[snafu(display("id {id} is outside every configured range"))]
    IdOutOfRange {
        /// The requested id.
        id: u64,
    },

    /// Admission control rejected the caller.
    #[snafu(display("client '{identity}' rejected: {source}"))]
    RateLimited {
        /// Client identity that was rejected.
        identity: String,
        /// Why it was rejected.
        source: RateLimitError,
    },

    /// Document is leased by another holder.
    #[snafu(display("document '{key}' is locked by another holder"))]
    LeaseConflict {
        /// The leased document.
        key: String,
    },

    /// Data in storage is corrupted or unparseable.
    #[snafu(display("corrupted data in '{key}': {reason}"))]
    CorruptedData {
        /// The key with corrupted data.
        key: String,
        /// Description of what went wrong.
        reason: String,
    },

    /// Underlying storage error.
    #[snafu(display("storage error: {source}"))]
    Storage {
        /// The underlying error.
        source: StoreError,
    },

    /// JSON serialization/deserialization error.
    #[snafu(display("serialization error: {source}"))]
    Serialization {
        /// The underlying error.
        source: serde_json::Error,
    },
}

impl CoordinationError {
    /// Whether the failure was transient (the system was busy) and a later
    /// retry may succeed, as opposed to a rejected input or broken data.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoordinationError::Timeout { .. } | CoordinationError::TooManyAttempts { .. })
    }
}

impl From<StoreError> for CoordinationError {
    fn from(source: StoreError) -> Self {
        match source {
            StoreError::LeaseConflict { key } => CoordinationError::LeaseConflict { key },
            source => CoordinationError::Storage { source },
        }
    }
}

impl From<serde_json::Error> for CoordinationError {
    fn from(source: serde_json::Error) -> Self {
        CoordinationError::Serialization { source }
    }
}

impl From<RangeError> for CoordinationError {
    fn from(source: RangeError) -> Self {
        CoordinationError::InvalidRange { source }
    }
}

/// Why a range list was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum RangeError {
    /// No ranges were given.
    #[snafu(display("range list is empty"))]
    Empty,

    /// More ranges than an allocation domain may have.
    #[snafu(display("{count} ranges exceeds maximum of {max}"))]
    TooMany {
        /// Ranges supplied.
        count: usize,
        /// Configured maximum.
        max: u32,
    },

    /// A bound could not be parsed as an integer.
    #[snafu(display("range bound '{input}' is not a number"))]
    NonNumeric {
        /// The offending text.
        input: String,
    },

    /// A bound is zero, which is reserved as the "exhausted" sentinel.
    #[snafu(display("range {range} has a zero bound"))]
    ZeroBound {
        /// The offending range.
        range: IdRange,
    },

    /// `to` is smaller than `from`.
    #[snafu(display("range {range} ends before it starts"))]
    Inverted {
        /// The offending range.
        range: IdRange,
    },

    /// Two ranges overlap after sorting by `from`.
    #[snafu(display("range {second} overlaps {first}"))]
    Overlap {
        /// The earlier range.
        first: IdRange,
        /// The range starting inside it.
        second: IdRange,
    },
}

/// Rejection from the rate limiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    /// At least one sliding window is full.
    Throttled {
        /// Estimated wait until the fullest window admits a request again.
        retry_after_ms: u64,
    },
    /// The client exceeded the violation threshold and is locked out.
    LockedOut {
        /// When the lockout ends (Unix ms).
        until_ms: u64,
        /// Milliseconds until the lockout ends.
        retry_after_ms: u64,
    },
}

impl RateLimitError {
    /// Milliseconds the caller should wait before trying again.
    pub fn retry_after_ms(&self) -> u64 {
        match self {
            RateLimitError::Throttled { retry_after_ms } => *retry_after_ms,
            RateLimitError::LockedOut { retry_after_ms, .. } => *retry_after_ms,
        }
    }

    /// Whether this rejection is a lockout rather than plain throttling.
    pub fn is_lockout(&self) -> bool {
        matches!(self, RateLimitError::LockedOut { .. })
    }
}

impl fmt::Display for RateLimitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitError::Throttled { retry_after_ms } => {
                write!(f, "rate limited, retry after {}ms", retry_after_ms)
            }
            RateLimitError::LockedOut {
                until_ms,
                retry_after_ms,
            } => write!(f, "locked out until {} (retry after {}ms)", until_ms, retry_after_ms),
        }
    }
}

impl std::error::Error for RateLimitError {}
