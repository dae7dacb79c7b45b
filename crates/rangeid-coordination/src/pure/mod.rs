//! Pure functions behind the allocator and the rate limiter.
//!
//! This module implements the "Functional Core, Imperative Shell" pattern:
//! the async shells ([`ConsumptionCoordinator`](crate::ConsumptionCoordinator),
//! [`RateLimiter`](crate::RateLimiter)) do I/O and bookkeeping, while every
//! decision is made here. All functions are deterministic and side-effect
//! free, which makes them suitable for:
//!
//! - Unit testing with explicit inputs/outputs
//! - Property-based testing with Bolero
//! - Testing allocation policy independently of concurrency behavior
//!
//! # Module Organization
//!
//! - [`allocator`]: Range validation, first-free-id search, consumed-set merge
//! - [`rate_window`]: Sliding window pruning, counting and admission decisions
//!
//! # Tiger Style
//!
//! - Saturating arithmetic for all time calculations
//! - Time is passed explicitly (no calls to system time)
//! - No panics - all functions are total

pub mod allocator;
pub mod rate_window;

// ============================================================================
// Re-exports: Allocator
// ============================================================================

pub use allocator::ConsumptionPlan;
pub use allocator::count_available;
pub use allocator::find_first_available_id;
pub use allocator::merge_consumed_ids;
pub use allocator::normalize_ranges;
pub use allocator::plan_consumption;
pub use allocator::ranges_contain;
pub use allocator::validate_ranges;

// ============================================================================
// Re-exports: Rate Window
// ============================================================================

pub use rate_window::Admission;
pub use rate_window::count_since;
pub use rate_window::evaluate_request;
pub use rate_window::prune_older_than;
