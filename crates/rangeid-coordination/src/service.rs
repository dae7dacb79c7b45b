//! Caller-facing facade.
//!
//! [`IdService`] bundles the allocator, the lock wrapper, the rate limiter
//! and plain document access behind one instance identity. HTTP handlers,
//! CLI commands and other front ends talk to this type only.

use std::sync::Arc;

use rangeid_store::Clock;
use rangeid_store::DocumentStore;
use rangeid_store::LeaseId;
use rangeid_store::StoreError;
use rangeid_store::SystemClock;
use tracing::debug;
use tracing::warn;

use crate::allocation::ConsumptionCoordinator;
use crate::config::ServiceConfig;
use crate::error::CoordinationError;
use crate::lock::DocumentLock;
use crate::rate_limiter::RateLimiter;
use crate::types::Allocation;
use crate::types::AllocationRequest;
use crate::types::IdRange;
use crate::updater::OptimisticUpdater;

/// One allocator instance, identified by its lease holder id.
pub struct IdService<S: DocumentStore + ?Sized> {
    store: Arc<S>,
    holder: LeaseId,
    updater: OptimisticUpdater<S>,
    coordinator: ConsumptionCoordinator<S>,
    lock: DocumentLock<S>,
    rate_limiter: RateLimiter,
}

impl<S: DocumentStore + ?Sized> IdService<S> {
    /// Service on `store` using the system clock for rate limiting.
    pub fn new(store: Arc<S>, config: &ServiceConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<S>, config: &ServiceConfig, clock: Arc<dyn Clock>) -> Self {
        let holder = config.resolve_holder();
        let updater = OptimisticUpdater::with_config(Arc::clone(&store), config.updater_config(&holder));
        let coordinator = ConsumptionCoordinator::with_updater(updater.clone(), config.max_allocation_attempts);
        let lock = DocumentLock::with_duration(Arc::clone(&store), holder.clone(), config.lease_duration_ms);
        let rate_limiter = RateLimiter::with_clock(config.rate_limit.clone(), clock);
        debug!(holder = %holder, "id service created");

        Self {
            store,
            holder,
            updater,
            coordinator,
            lock,
            rate_limiter,
        }
    }

    /// Lease identity used for locks and lease-aware writes.
    pub fn holder(&self) -> &LeaseId {
        &self.holder
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Allocate from `ranges` in the document at `domain_key`.
    ///
    /// With `commit == false` nothing is written and the result reports what
    /// a committing call would claim. See
    /// [`ConsumptionCoordinator::allocate`] for error semantics.
    pub async fn allocate_next_id(
        &self,
        domain_key: &str,
        ranges: &[IdRange],
        commit: bool,
        required_id: Option<u64>,
    ) -> Result<Allocation, CoordinationError> {
        self.coordinator.allocate(domain_key, ranges, AllocationRequest { commit, required_id }).await
    }

    /// [`allocate_next_id`](Self::allocate_next_id) behind admission control
    /// for `client`.
    pub async fn allocate_next_id_for(
        &self,
        client: &str,
        domain_key: &str,
        ranges: &[IdRange],
        commit: bool,
        required_id: Option<u64>,
    ) -> Result<Allocation, CoordinationError> {
        if let Err(source) = self.rate_limiter.try_accept(client) {
            return Err(CoordinationError::RateLimited {
                identity: client.to_string(),
                source,
            });
        }
        self.allocate_next_id(domain_key, ranges, commit, required_id).await
    }

    /// Content of the document at `key`, or `None` if it does not exist.
    pub async fn read_document(&self, key: &str) -> Result<Option<serde_json::Value>, CoordinationError> {
        self.updater.read(key).await
    }

    /// Delete the document at `key`.
    ///
    /// Returns `false` if it does not exist or another holder has it locked.
    pub async fn delete_document(&self, key: &str) -> bool {
        match self.store.delete(key, Some(&self.holder)).await {
            Ok(()) => true,
            Err(error @ (StoreError::NotFound { .. } | StoreError::LeaseConflict { .. })) => {
                debug!(key, error = %error, "delete refused");
                false
            }
            Err(error) => {
                warn!(key, error = %error, "delete failed");
                false
            }
        }
    }

    /// Lock the document at `key` for this instance.
    pub async fn lock_document(&self, key: &str) -> bool {
        self.lock.lock(key).await
    }

    /// Release this instance's lock on `key`.
    pub async fn unlock_document(&self, key: &str) -> bool {
        self.lock.unlock(key).await
    }

    /// Admission decision for one request from `client`.
    pub fn rate_limiter_accept(&self, client: &str) -> bool {
        self.rate_limiter.accept(client)
    }
}
