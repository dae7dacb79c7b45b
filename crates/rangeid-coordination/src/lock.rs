//! Advisory document locks built on store leases.
//!
//! A [`DocumentLock`] acquires and releases leases under one fixed holder
//! identity and duration. Locks are meant for coarse administrative
//! exclusion, such as a bulk migration of a domain document; id allocation
//! itself never locks.

use std::sync::Arc;

use rangeid_constants::store::DEFAULT_LEASE_DURATION_MS;
use rangeid_store::DocumentStore;
use rangeid_store::Lease;
use rangeid_store::LeaseId;
use rangeid_store::StoreError;
use tracing::debug;
use tracing::warn;

use crate::error::CoordinationError;

/// Lease-backed lock handle for one holder.
pub struct DocumentLock<S: DocumentStore + ?Sized> {
    store: Arc<S>,
    holder: LeaseId,
    duration_ms: u64,
}

impl<S: DocumentStore + ?Sized> DocumentLock<S> {
    /// Lock handle with the default lease duration.
    pub fn new(store: Arc<S>, holder: LeaseId) -> Self {
        Self::with_duration(store, holder, DEFAULT_LEASE_DURATION_MS)
    }

    pub fn with_duration(store: Arc<S>, holder: LeaseId, duration_ms: u64) -> Self {
        Self {
            store,
            holder,
            duration_ms,
        }
    }

    pub fn holder(&self) -> &LeaseId {
        &self.holder
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    /// Acquire or renew the lease on `key`.
    ///
    /// Fails with [`CoordinationError::LeaseConflict`] if another holder has
    /// an active lease and with a `NotFound` storage error if the document
    /// does not exist.
    pub async fn try_lock(&self, key: &str) -> Result<Lease, CoordinationError> {
        let lease = self.store.acquire_lease(key, &self.holder, self.duration_ms).await?;
        debug!(key, holder = %self.holder, expires_at_ms = lease.expires_at_ms, "document locked");
        Ok(lease)
    }

    /// Release the lease on `key`.
    ///
    /// Fails with a `LeaseMismatch` storage error if this holder does not
    /// hold an active lease, including after expiry.
    pub async fn try_unlock(&self, key: &str) -> Result<(), CoordinationError> {
        self.store.release_lease(key, &self.holder).await?;
        debug!(key, holder = %self.holder, "document unlocked");
        Ok(())
    }

    /// Lock `key`, reporting lease and existence failures as `false`.
    ///
    /// Other store failures are also `false`; they are logged.
    pub async fn lock(&self, key: &str) -> bool {
        match self.try_lock(key).await {
            Ok(_) => true,
            Err(error) => {
                log_refusal("lock", key, &error);
                false
            }
        }
    }

    /// Unlock `key`, reporting any failure as `false`.
    pub async fn unlock(&self, key: &str) -> bool {
        match self.try_unlock(key).await {
            Ok(()) => true,
            Err(error) => {
                log_refusal("unlock", key, &error);
                false
            }
        }
    }
}

fn log_refusal(operation: &str, key: &str, error: &CoordinationError) {
    match error {
        CoordinationError::LeaseConflict { .. }
        | CoordinationError::Storage {
            source: StoreError::NotFound { .. } | StoreError::LeaseMismatch { .. },
        } => debug!(key, operation, error = %error, "lock operation refused"),
        _ => warn!(key, operation, error = %error, "lock operation failed"),
    }
}

#[cfg(test)]
mod tests {
    use rangeid_store::InMemoryDocumentStore;
    use rangeid_store::ManualClock;
    use rangeid_store::WriteRequest;
    use serde_json::json;

    use super::*;

    async fn store_with(key: &str) -> Arc<InMemoryDocumentStore> {
        let store = InMemoryDocumentStore::new();
        store.conditional_write(WriteRequest::create(key, json!([]))).await.unwrap();
        store
    }

    #[tokio::test]
    async fn second_holder_cannot_lock() {
        let store = store_with("k").await;
        let alice = DocumentLock::new(store.clone(), LeaseId::new("alice"));
        let bob = DocumentLock::new(store.clone(), LeaseId::new("bob"));

        assert!(alice.lock("k").await);
        assert!(!bob.lock("k").await);
        assert!(matches!(bob.try_lock("k").await, Err(CoordinationError::LeaseConflict { .. })));

        assert!(alice.unlock("k").await);
        assert!(bob.lock("k").await);
    }

    #[tokio::test]
    async fn holder_can_relock_to_renew() {
        let store = store_with("k").await;
        let alice = DocumentLock::new(store.clone(), LeaseId::new("alice"));
        assert!(alice.lock("k").await);
        assert!(alice.lock("k").await);
    }

    #[tokio::test]
    async fn lock_missing_document_fails() {
        let store = InMemoryDocumentStore::new();
        let alice = DocumentLock::new(store, LeaseId::new("alice"));
        assert!(!alice.lock("missing").await);
    }

    #[tokio::test]
    async fn unlock_without_lock_fails() {
        let store = store_with("k").await;
        let alice = DocumentLock::new(store.clone(), LeaseId::new("alice"));
        let bob = DocumentLock::new(store, LeaseId::new("bob"));

        assert!(!alice.unlock("k").await);
        assert!(alice.lock("k").await);
        assert!(!bob.unlock("k").await);
        assert!(alice.unlock("k").await);
        // Already released
        assert!(!alice.unlock("k").await);
    }

    #[tokio::test]
    async fn expired_lock_cannot_be_unlocked_and_frees_document() {
        let clock = Arc::new(ManualClock::new(0));
        let store = Arc::new(InMemoryDocumentStore::with_clock(clock.clone()));
        store.conditional_write(WriteRequest::create("k", json!([]))).await.unwrap();
        let alice = DocumentLock::with_duration(store.clone(), LeaseId::new("alice"), 5_000);
        let bob = DocumentLock::new(store, LeaseId::new("bob"));

        assert!(alice.lock("k").await);
        clock.advance_ms(5_000);

        assert!(!alice.unlock("k").await);
        assert!(bob.lock("k").await);
    }
}
