//! Compile-time checks on constant relationships.
//!
//! A constant edited into an inconsistent state fails the build here rather
//! than producing surprising runtime behavior.

use crate::allocation::*;
use crate::rate_limit::*;
use crate::store::*;
use crate::update::*;

// ============================================================================
// Store Bounds
// ============================================================================

const _: () = assert!(MAX_KEY_SIZE > 0);
const _: () = assert!(MAX_CONTENT_SIZE > 0);

// Lease duration ordering
const _: () = assert!(MIN_LEASE_DURATION_MS > 0);
const _: () = assert!(MIN_LEASE_DURATION_MS <= DEFAULT_LEASE_DURATION_MS);
const _: () = assert!(DEFAULT_LEASE_DURATION_MS <= MAX_LEASE_DURATION_MS);

// ============================================================================
// Update Loop
// ============================================================================

const _: () = assert!(DEFAULT_UPDATE_TIMEOUT_MS > 0);
const _: () = assert!(DEFAULT_UPDATE_TIMEOUT_MS <= MAX_UPDATE_TIMEOUT_MS);
const _: () = assert!(READ_RETRY_BACKOFF_MS > 0);
// A read retry must fit comfortably inside the update budget
const _: () = assert!(READ_RETRY_BACKOFF_MS < DEFAULT_UPDATE_TIMEOUT_MS);

// ============================================================================
// Allocation
// ============================================================================

const _: () = assert!(DEFAULT_MAX_ALLOCATION_ATTEMPTS > 0);
const _: () = assert!(DEFAULT_MAX_ALLOCATION_ATTEMPTS <= MAX_ALLOCATION_ATTEMPTS);
const _: () = assert!(MAX_RANGES > 0);

// ============================================================================
// Rate Limiting
// ============================================================================

const _: () = assert!(DEFAULT_VIOLATION_THRESHOLD > 0);
const _: () = assert!(DEFAULT_LOCKOUT_MS > 0);
const _: () = assert!(DEFAULT_WINDOWS.len() as u32 <= MAX_WINDOWS);

// Default windows are sorted by duration and non-degenerate
const _: () = {
    let mut i = 0;
    while i < DEFAULT_WINDOWS.len() {
        assert!(DEFAULT_WINDOWS[i].0 > 0);
        assert!(DEFAULT_WINDOWS[i].1 > 0);
        if i > 0 {
            assert!(DEFAULT_WINDOWS[i - 1].0 < DEFAULT_WINDOWS[i].0);
        }
        i += 1;
    }
};
