//! In-memory document store.
//!
//! Implements the full [`DocumentStore`] contract (versioned conditional
//! writes, create-only writes, lease exclusion and expiry) inside a single
//! process. Used as the backend in tests and by the CLI, which persists it
//! between invocations through [`StoreSnapshot`].

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::clock::Clock;
use crate::clock::SystemClock;
use crate::document::Version;
use crate::document::VersionedDocument;
use crate::document::WriteCondition;
use crate::document::WriteRequest;
use crate::error::StoreError;
use crate::lease::Lease;
use crate::lease::LeaseId;
use crate::traits::DocumentStore;
use crate::validation::validate_content;
use crate::validation::validate_key;
use crate::validation::validate_lease_duration;

/// Stored content plus its current version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub content: serde_json::Value,
    pub version: Version,
}

/// Serializable image of an [`InMemoryDocumentStore`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Revision counter; versions are minted from it.
    pub revision: u64,
    pub documents: BTreeMap<String, StoredDocument>,
    #[serde(default)]
    pub leases: Vec<Lease>,
}

#[derive(Debug, Default)]
struct StoreState {
    revision: u64,
    documents: BTreeMap<String, StoredDocument>,
    leases: BTreeMap<String, Lease>,
}

impl StoreState {
    /// Mint a version that has never been issued by this store.
    fn next_version(&mut self) -> Version {
        self.revision = self.revision.saturating_add(1);
        Version::new(format!("\"0x{:016X}\"", self.revision))
    }

    /// The lease on `key` if it has not lapsed. Lapsed leases are dropped.
    fn active_lease(&mut self, key: &str, now_ms: u64) -> Option<&Lease> {
        if self.leases.get(key).is_some_and(|lease| !lease.is_active(now_ms)) {
            self.leases.remove(key);
        }
        self.leases.get(key)
    }
}

/// A thread-safe in-memory [`DocumentStore`].
#[derive(Debug)]
pub struct InMemoryDocumentStore {
    state: Mutex<StoreState>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }
}

impl InMemoryDocumentStore {
    /// Create an empty store on the system clock, wrapped in `Arc`.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create an empty store whose leases expire against `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            clock,
        }
    }

    /// Rebuild a store from a snapshot.
    pub fn from_snapshot(snapshot: StoreSnapshot, clock: Arc<dyn Clock>) -> Self {
        let leases = snapshot.leases.into_iter().map(|lease| (lease.key.clone(), lease)).collect();
        Self {
            state: Mutex::new(StoreState {
                revision: snapshot.revision,
                documents: snapshot.documents,
                leases,
            }),
            clock,
        }
    }

    /// Capture all documents and still-active leases.
    pub fn snapshot(&self) -> StoreSnapshot {
        let now_ms = self.clock.now_unix_ms();
        let state = self.state.lock();
        StoreSnapshot {
            revision: state.revision,
            documents: state.documents.clone(),
            leases: state.leases.values().filter(|lease| lease.is_active(now_ms)).cloned().collect(),
        }
    }

    /// Keys of all stored documents, in order.
    pub fn keys(&self) -> Vec<String> {
        self.state.lock().documents.keys().cloned().collect()
    }

    /// The active lease on `key`, if any.
    pub fn lease(&self, key: &str) -> Option<Lease> {
        let now_ms = self.clock.now_unix_ms();
        self.state.lock().active_lease(key, now_ms).cloned()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn read(&self, key: &str) -> Result<VersionedDocument, StoreError> {
        validate_key(key)?;
        let state = self.state.lock();
        Ok(match state.documents.get(key) {
            Some(doc) => VersionedDocument::new(key, doc.content.clone(), doc.version.clone()),
            None => VersionedDocument::absent(key),
        })
    }

    async fn conditional_write(&self, request: WriteRequest) -> Result<Version, StoreError> {
        validate_key(&request.key)?;
        validate_content(&request.content)?;

        let now_ms = self.clock.now_unix_ms();
        let mut state = self.state.lock();

        if let Some(lease) = state.active_lease(&request.key, now_ms) {
            if !lease.is_held_by(request.lease.as_ref()) {
                return Err(StoreError::LeaseConflict { key: request.key });
            }
        }

        let current = state.documents.get(&request.key).map(|doc| doc.version.clone());
        let condition_holds = match (&request.condition, &current) {
            (WriteCondition::Any, _) => true,
            (WriteCondition::Absent, None) => true,
            (WriteCondition::Absent, Some(_)) => false,
            (WriteCondition::Matches(expected), Some(actual)) => expected == actual,
            (WriteCondition::Matches(_), None) => false,
        };
        if !condition_holds {
            return Err(StoreError::Conflict {
                key: request.key,
                expected: request.condition,
                actual: current,
            });
        }

        let version = state.next_version();
        debug!(key = %request.key, version = %version, "document written");
        state.documents.insert(request.key, StoredDocument {
            content: request.content,
            version: version.clone(),
        });
        Ok(version)
    }

    async fn delete(&self, key: &str, lease: Option<&LeaseId>) -> Result<(), StoreError> {
        validate_key(key)?;
        let now_ms = self.clock.now_unix_ms();
        let mut state = self.state.lock();

        if !state.documents.contains_key(key) {
            return Err(StoreError::NotFound { key: key.to_string() });
        }
        if let Some(active) = state.active_lease(key, now_ms) {
            if !active.is_held_by(lease) {
                return Err(StoreError::LeaseConflict { key: key.to_string() });
            }
        }

        state.documents.remove(key);
        state.leases.remove(key);
        debug!(key, "document deleted");
        Ok(())
    }

    async fn acquire_lease(&self, key: &str, holder: &LeaseId, duration_ms: u64) -> Result<Lease, StoreError> {
        validate_key(key)?;
        validate_lease_duration(duration_ms)?;
        let now_ms = self.clock.now_unix_ms();
        let mut state = self.state.lock();

        if !state.documents.contains_key(key) {
            return Err(StoreError::NotFound { key: key.to_string() });
        }
        if let Some(active) = state.active_lease(key, now_ms) {
            if active.holder != *holder {
                return Err(StoreError::LeaseConflict { key: key.to_string() });
            }
        }

        let lease = Lease::new(key, holder.clone(), now_ms, duration_ms);
        debug!(key, holder = %holder, expires_at_ms = lease.expires_at_ms, "lease acquired");
        state.leases.insert(key.to_string(), lease.clone());
        Ok(lease)
    }

    async fn release_lease(&self, key: &str, lease: &LeaseId) -> Result<(), StoreError> {
        validate_key(key)?;
        let now_ms = self.clock.now_unix_ms();
        let mut state = self.state.lock();

        if !state.documents.contains_key(key) {
            return Err(StoreError::NotFound { key: key.to_string() });
        }
        let is_holder = state.active_lease(key, now_ms).is_some_and(|active| active.holder == *lease);
        if !is_holder {
            return Err(StoreError::LeaseMismatch {
                key: key.to_string(),
                lease: lease.to_string(),
            });
        }

        state.leases.remove(key);
        debug!(key, holder = %lease, "lease released");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::clock::ManualClock;

    const LEASE_MS: u64 = 10_000;

    fn store_with_clock() -> (InMemoryDocumentStore, ManualClock) {
        let clock = ManualClock::new(1_000_000);
        (InMemoryDocumentStore::with_clock(Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn read_missing_key_is_absent() {
        let store = InMemoryDocumentStore::new();
        let doc = store.read("nobody/nothing.json").await.unwrap();
        assert_eq!(doc, VersionedDocument::absent("nobody/nothing.json"));
    }

    #[tokio::test]
    async fn write_then_read_round_trips_with_new_version() {
        let store = InMemoryDocumentStore::new();
        let v1 = store.conditional_write(WriteRequest::create("k", json!([1]))).await.unwrap();

        let before = store.read("k").await.unwrap();
        assert_eq!(before.version, Some(v1.clone()));

        let v2 = store
            .conditional_write(WriteRequest::replace("k", json!([1, 2]), before.version))
            .await
            .unwrap();
        assert_ne!(v1, v2);

        let after = store.read("k").await.unwrap();
        assert_eq!(after.content, Some(json!([1, 2])));
        assert_eq!(after.version, Some(v2));
    }

    #[tokio::test]
    async fn stale_version_conflicts() {
        let store = InMemoryDocumentStore::new();
        let v1 = store.conditional_write(WriteRequest::create("k", json!(1))).await.unwrap();
        store.conditional_write(WriteRequest::replace("k", json!(2), Some(v1.clone()))).await.unwrap();

        let err = store.conditional_write(WriteRequest::replace("k", json!(3), Some(v1))).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert_eq!(store.read("k").await.unwrap().content, Some(json!(2)));
    }

    #[tokio::test]
    async fn create_only_write_conflicts_on_existing_document() {
        let store = InMemoryDocumentStore::new();
        store.conditional_write(WriteRequest::create("k", json!(1))).await.unwrap();
        let err = store.conditional_write(WriteRequest::create("k", json!(2))).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { actual: Some(_), .. }));
    }

    #[tokio::test]
    async fn unconditional_write_always_succeeds() {
        let store = InMemoryDocumentStore::new();
        store.conditional_write(WriteRequest::replace("k", json!(1), None)).await.unwrap();
        store.conditional_write(WriteRequest::replace("k", json!(2), None)).await.unwrap();
        assert_eq!(store.read("k").await.unwrap().content, Some(json!(2)));
    }

    #[tokio::test]
    async fn expected_version_on_missing_document_conflicts() {
        let store = InMemoryDocumentStore::new();
        let err = store
            .conditional_write(WriteRequest::replace("k", json!(1), Some(Version::new("bogus"))))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { actual: None, .. }));
    }

    #[tokio::test]
    async fn delete_missing_document_is_not_found() {
        let store = InMemoryDocumentStore::new();
        assert_eq!(store.delete("k", None).await, Err(StoreError::NotFound { key: "k".to_string() }));
    }

    #[tokio::test]
    async fn lease_requires_existing_document() {
        let store = InMemoryDocumentStore::new();
        let err = store.acquire_lease("k", &LeaseId::new("a"), LEASE_MS).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn lease_excludes_other_holders() {
        let (store, _clock) = store_with_clock();
        let alice = LeaseId::new("alice");
        let bob = LeaseId::new("bob");
        store.conditional_write(WriteRequest::create("k", json!([]))).await.unwrap();

        store.acquire_lease("k", &alice, LEASE_MS).await.unwrap();
        assert!(matches!(
            store.acquire_lease("k", &bob, LEASE_MS).await,
            Err(StoreError::LeaseConflict { .. })
        ));

        // Writes and deletes from non-holders are refused
        let write = WriteRequest::replace("k", json!([1]), None).with_lease(Some(bob.clone()));
        assert!(matches!(store.conditional_write(write).await, Err(StoreError::LeaseConflict { .. })));
        let anonymous = WriteRequest::replace("k", json!([1]), None);
        assert!(matches!(store.conditional_write(anonymous).await, Err(StoreError::LeaseConflict { .. })));
        assert!(matches!(store.delete("k", None).await, Err(StoreError::LeaseConflict { .. })));
        assert!(matches!(store.delete("k", Some(&bob)).await, Err(StoreError::LeaseConflict { .. })));

        // The holder may write
        let write = WriteRequest::replace("k", json!([1]), None).with_lease(Some(alice.clone()));
        store.conditional_write(write).await.unwrap();
    }

    #[tokio::test]
    async fn holder_can_renew_lease() {
        let (store, clock) = store_with_clock();
        let alice = LeaseId::new("alice");
        store.conditional_write(WriteRequest::create("k", json!([]))).await.unwrap();

        let first = store.acquire_lease("k", &alice, LEASE_MS).await.unwrap();
        clock.advance_ms(5_000);
        let renewed = store.acquire_lease("k", &alice, LEASE_MS).await.unwrap();
        assert_eq!(renewed.expires_at_ms, first.expires_at_ms + 5_000);
    }

    #[tokio::test]
    async fn lease_expires() {
        let (store, clock) = store_with_clock();
        let alice = LeaseId::new("alice");
        let bob = LeaseId::new("bob");
        store.conditional_write(WriteRequest::create("k", json!([]))).await.unwrap();
        store.acquire_lease("k", &alice, LEASE_MS).await.unwrap();

        clock.advance_ms(LEASE_MS);

        // Expired lease can no longer be released, and no longer excludes
        assert!(matches!(store.release_lease("k", &alice).await, Err(StoreError::LeaseMismatch { .. })));
        store.acquire_lease("k", &bob, LEASE_MS).await.unwrap();
        assert_eq!(store.lease("k").map(|lease| lease.holder), Some(bob));
    }

    #[tokio::test]
    async fn release_requires_holder() {
        let store = InMemoryDocumentStore::new();
        let alice = LeaseId::new("alice");
        store.conditional_write(WriteRequest::create("k", json!([]))).await.unwrap();
        store.acquire_lease("k", &alice, LEASE_MS).await.unwrap();

        assert!(matches!(
            store.release_lease("k", &LeaseId::new("mallory")).await,
            Err(StoreError::LeaseMismatch { .. })
        ));
        store.release_lease("k", &alice).await.unwrap();
        // Second release fails
        assert!(matches!(store.release_lease("k", &alice).await, Err(StoreError::LeaseMismatch { .. })));
    }

    #[tokio::test]
    async fn holder_can_delete_leased_document() {
        let store = InMemoryDocumentStore::new();
        let alice = LeaseId::new("alice");
        store.conditional_write(WriteRequest::create("k", json!([]))).await.unwrap();
        store.acquire_lease("k", &alice, LEASE_MS).await.unwrap();

        store.delete("k", Some(&alice)).await.unwrap();
        assert!(!store.read("k").await.unwrap().exists());
        assert!(store.lease("k").is_none());
    }

    #[tokio::test]
    async fn snapshot_round_trip_preserves_versions_and_leases() {
        let (store, clock) = store_with_clock();
        let alice = LeaseId::new("alice");
        let version = store.conditional_write(WriteRequest::create("k", json!([3, 1]))).await.unwrap();
        store.acquire_lease("k", &alice, LEASE_MS).await.unwrap();

        let encoded = serde_json::to_string(&store.snapshot()).unwrap();
        let decoded: StoreSnapshot = serde_json::from_str(&encoded).unwrap();
        let restored = InMemoryDocumentStore::from_snapshot(decoded, Arc::new(clock));

        let doc = restored.read("k").await.unwrap();
        assert_eq!(doc.version, Some(version.clone()));
        assert_eq!(restored.lease("k").map(|lease| lease.holder), Some(alice));

        // Versions minted after restore do not collide with earlier ones
        let write =
            WriteRequest::replace("k", json!([]), Some(version.clone())).with_lease(Some(LeaseId::new("alice")));
        let next = restored.conditional_write(write).await.unwrap();
        assert_ne!(next, version);
    }

    #[tokio::test]
    async fn oversized_key_rejected_before_write() {
        let store = InMemoryDocumentStore::new();
        let key = "k".repeat(2_000);
        let err = store.conditional_write(WriteRequest::create(key, json!(1))).await.unwrap_err();
        assert!(matches!(err, StoreError::KeyTooLarge { .. }));
        assert!(store.keys().is_empty());
    }
}
