//! Centralized constants for rangeid.
//!
//! Every tunable used by the store, the optimistic updater, the allocator and
//! the rate limiter lives here so the bounds can be checked in one place.
//!
//! Tiger Style: Constants are fixed and immutable, enforced at compile time.
//! Each constant has explicit bounds to prevent unbounded resource allocation.
//!
//! # Modules
//!
//! - [`store`]: Document size limits and lease durations
//! - [`update`]: Optimistic update timeout and retry backoff
//! - [`allocation`]: Allocation attempt bounds
//! - [`rate_limit`]: Sliding window defaults and lockout policy

mod assertions;

pub mod store {
    //! Document store bounds.

    /// Maximum size of a document key in bytes (1 KB).
    ///
    /// Keys look like `"{owner}/{category}.json"`, so this is generous.
    pub const MAX_KEY_SIZE: u32 = 1024;

    /// Maximum size of serialized document content in bytes (4 MB).
    ///
    /// A consumed-id document holding a million ids stays well under this.
    pub const MAX_CONTENT_SIZE: u32 = 4 * 1024 * 1024;

    /// Lease duration used by the lock wrapper (60 seconds).
    pub const DEFAULT_LEASE_DURATION_MS: u64 = 60_000;

    /// Minimum lease duration accepted by a store (1 second).
    pub const MIN_LEASE_DURATION_MS: u64 = 1_000;

    /// Maximum lease duration accepted by a store (10 minutes).
    ///
    /// Leases are for coarse administrative exclusion; anything longer should
    /// renew rather than hold indefinitely.
    pub const MAX_LEASE_DURATION_MS: u64 = 10 * 60 * 1_000;
}

pub mod update {
    //! Optimistic read-modify-write loop tunables.

    /// Wall-clock budget for one logical optimistic update (2.5 seconds).
    pub const DEFAULT_UPDATE_TIMEOUT_MS: u64 = 2_500;

    /// Upper bound on a caller-supplied update timeout (60 seconds).
    pub const MAX_UPDATE_TIMEOUT_MS: u64 = 60_000;

    /// Fixed backoff between re-reads after a transient read failure.
    pub const READ_RETRY_BACKOFF_MS: u64 = 10;
}

pub mod allocation {
    //! Identifier allocation bounds.

    /// Transform attempts before allocation gives up with `TooManyAttempts`.
    ///
    /// Bounds retry amplification under heavy contention independently of
    /// the wall-clock budget.
    pub const DEFAULT_MAX_ALLOCATION_ATTEMPTS: u32 = 50;

    /// Hard ceiling on a configured attempt bound.
    pub const MAX_ALLOCATION_ATTEMPTS: u32 = 1_000;

    /// Maximum number of ranges accepted for one allocation domain.
    pub const MAX_RANGES: u32 = 1_024;
}

pub mod rate_limit {
    //! Multi-window rate limiter defaults.

    /// Default sliding windows as `(duration_ms, max_requests)`, smallest first.
    pub const DEFAULT_WINDOWS: [(u64, u32); 4] = [(1_000, 10), (5_000, 20), (10_000, 40), (30_000, 60)];

    /// Violations inside the tracking interval that trigger a lockout.
    pub const DEFAULT_VIOLATION_THRESHOLD: u32 = 3;

    /// Lockout duration once the violation threshold is reached (15 seconds).
    pub const DEFAULT_LOCKOUT_MS: u64 = 15_000;

    /// Maximum number of windows a limiter may be configured with.
    pub const MAX_WINDOWS: u32 = 16;
}

// Re-export commonly used constants at crate root
pub use allocation::DEFAULT_MAX_ALLOCATION_ATTEMPTS;
pub use rate_limit::DEFAULT_LOCKOUT_MS;
pub use rate_limit::DEFAULT_VIOLATION_THRESHOLD;
pub use rate_limit::DEFAULT_WINDOWS;
pub use store::DEFAULT_LEASE_DURATION_MS;
pub use store::MAX_CONTENT_SIZE;
pub use store::MAX_KEY_SIZE;
pub use update::DEFAULT_UPDATE_TIMEOUT_MS;
pub use update::READ_RETRY_BACKOFF_MS;
