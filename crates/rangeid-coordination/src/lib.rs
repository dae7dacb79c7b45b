//! Range-based id allocation over versioned documents.
//!
//! This crate coordinates many independent clients claiming unique integer
//! ids from shared numeric ranges, with no central coordinator beyond a
//! document store that supports version-conditional writes:
//!
//! - `OptimisticUpdater` - Read-transform-conditional-write loop with a wall-clock budget
//! - `ConsumptionCoordinator` - Claims ids by appending to a per-domain consumption document
//! - `DocumentLock` - Advisory lease-based locking of documents
//! - `RateLimiter` - Multi-window sliding admission control with lockout escalation
//! - `IdService` - Facade combining the above under one instance identity
//!
//! Every decision is made by the pure functions in [`pure`]; the types above
//! only do I/O around them.
//!
//! ## Allocation Example
//!
//! ```ignore
//! use rangeid_coordination::{IdRange, IdService, ServiceConfig, document_key};
//! use rangeid_store::InMemoryDocumentStore;
//!
//! let service = IdService::new(InMemoryDocumentStore::new(), &ServiceConfig::default());
//! let ranges: Vec<IdRange> = vec!["100-199".parse()?, "500-599".parse()?];
//!
//! let allocation = service
//!     .allocate_next_id(&document_key("alice", "widgets"), &ranges, true, None)
//!     .await?;
//! if !allocation.available {
//!     // Every id in the ranges is taken
//! }
//! ```
//!
//! ## Update Example
//!
//! ```ignore
//! use rangeid_coordination::{OptimisticUpdater, Transform};
//!
//! let updater = OptimisticUpdater::new(store);
//! let outcome = updater
//!     .update("alice/settings.json", |current: Option<&Settings>, _attempt| {
//!         match current {
//!             Some(settings) if settings.enabled => Ok(Transform::Unchanged),
//!             _ => Ok(Transform::Replace(Settings { enabled: true })),
//!         }
//!     })
//!     .await?;
//! ```

mod allocation;
mod config;
mod error;
mod lock;
pub mod pure;
mod rate_limiter;
mod service;
mod types;
mod updater;

pub use allocation::ConsumptionCoordinator;
pub use config::ConfigError;
pub use config::ServiceConfig;
pub use error::CoordinationError;
pub use error::RangeError;
pub use error::RateLimitError;
pub use lock::DocumentLock;
pub use rate_limiter::InMemoryRateStateStore;
pub use rate_limiter::RateLimiter;
pub use rate_limiter::RateStateStore;
pub use service::IdService;
pub use types::Allocation;
pub use types::AllocationRequest;
pub use types::ConsumedIds;
pub use types::IdRange;
pub use types::RateLimitConfig;
pub use types::RateWindow;
pub use types::RateWindowState;
pub use types::document_key;
pub use updater::OptimisticUpdater;
pub use updater::Transform;
pub use updater::UpdateOutcome;
pub use updater::UpdaterConfig;
