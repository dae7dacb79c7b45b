//! Test doubles for rangeid document stores.
//!
//! Each wrapper delegates to an inner [`DocumentStore`] and adds one
//! behaviour useful in tests:
//!
//! - [`CountingStore`]: counts calls, to assert that no-op updates never write
//! - [`FlakyStore`]: fails the first N reads or writes with a transient error,
//!   or commits writes and then loses the acknowledgement
//! - [`InterferingStore`]: slips a competing write in just before the next
//!   conditional write, to force a version conflict deterministically
//!
//! ```ignore
//! let store = Arc::new(CountingStore::new(InMemoryDocumentStore::new()));
//! let updater = OptimisticUpdater::new(store.clone());
//! updater.update("k", |_: Option<&u64>, _| Ok(Transform::Unchanged)).await?;
//! assert_eq!(store.writes(), 0);
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use parking_lot::Mutex;
use rangeid_store::DocumentStore;
use rangeid_store::Lease;
use rangeid_store::LeaseId;
use rangeid_store::StoreError;
use rangeid_store::Version;
use rangeid_store::VersionedDocument;
use rangeid_store::WriteRequest;
use tracing::debug;

pub use rangeid_store::InMemoryDocumentStore;
pub use rangeid_store::ManualClock;

// ============================================================================
// CountingStore
// ============================================================================

/// Counts every call made to the inner store.
pub struct CountingStore<S: DocumentStore + ?Sized> {
    inner: Arc<S>,
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    lease_calls: AtomicU64,
}

impl<S: DocumentStore + ?Sized> CountingStore<S> {
    pub fn new(inner: Arc<S>) -> Self {
        Self {
            inner,
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            lease_calls: AtomicU64::new(0),
        }
    }

    /// Number of `read` calls.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of `conditional_write` calls, successful or not.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Acquire and release calls combined.
    pub fn lease_calls(&self) -> u64 {
        self.lease_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<S: DocumentStore + ?Sized> DocumentStore for CountingStore<S> {
    async fn read(&self, key: &str) -> Result<VersionedDocument, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read(key).await
    }

    async fn conditional_write(&self, request: WriteRequest) -> Result<Version, StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.conditional_write(request).await
    }

    async fn delete(&self, key: &str, lease: Option<&LeaseId>) -> Result<(), StoreError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(key, lease).await
    }

    async fn acquire_lease(&self, key: &str, holder: &LeaseId, duration_ms: u64) -> Result<Lease, StoreError> {
        self.lease_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.acquire_lease(key, holder, duration_ms).await
    }

    async fn release_lease(&self, key: &str, lease: &LeaseId) -> Result<(), StoreError> {
        self.lease_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.release_lease(key, lease).await
    }
}

// ============================================================================
// FlakyStore
// ============================================================================

/// Fails a fixed number of reads and writes with [`StoreError::Unavailable`]
/// before behaving normally.
pub struct FlakyStore<S: DocumentStore + ?Sized> {
    inner: Arc<S>,
    read_failures_left: AtomicU32,
    write_failures_left: AtomicU32,
    lost_acks_left: AtomicU32,
    failed_reads: AtomicU32,
    failed_writes: AtomicU32,
    lost_acks: AtomicU32,
}

impl<S: DocumentStore + ?Sized> FlakyStore<S> {
    /// Fail the next `read_failures` reads and `write_failures` writes.
    /// `u32::MAX` keeps failing for the lifetime of any realistic test.
    pub fn new(inner: Arc<S>, read_failures: u32, write_failures: u32) -> Self {
        Self {
            inner,
            read_failures_left: AtomicU32::new(read_failures),
            write_failures_left: AtomicU32::new(write_failures),
            lost_acks_left: AtomicU32::new(0),
            failed_reads: AtomicU32::new(0),
            failed_writes: AtomicU32::new(0),
            lost_acks: AtomicU32::new(0),
        }
    }

    /// Let the next `count` successful writes commit, then report them as
    /// [`StoreError::Unavailable`], like a response lost after the backend
    /// applied the write.
    pub fn with_lost_acks(self, count: u32) -> Self {
        self.lost_acks_left.store(count, Ordering::SeqCst);
        self
    }

    pub fn failed_reads(&self) -> u32 {
        self.failed_reads.load(Ordering::SeqCst)
    }

    pub fn failed_writes(&self) -> u32 {
        self.failed_writes.load(Ordering::SeqCst)
    }

    /// Writes that committed but were reported as failed.
    pub fn lost_acks(&self) -> u32 {
        self.lost_acks.load(Ordering::SeqCst)
    }
}

/// Consume one injected failure, if any remain.
fn take_failure(remaining: &AtomicU32, failed: &AtomicU32) -> bool {
    let took = remaining.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok();
    if took {
        // Saturate instead of wrapping for effectively endless failures
        let _ = failed.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_add(1));
    }
    took
}

fn injected(operation: &str) -> StoreError {
    StoreError::Unavailable {
        reason: format!("injected {operation} failure"),
    }
}

#[async_trait]
impl<S: DocumentStore + ?Sized> DocumentStore for FlakyStore<S> {
    async fn read(&self, key: &str) -> Result<VersionedDocument, StoreError> {
        if take_failure(&self.read_failures_left, &self.failed_reads) {
            return Err(injected("read"));
        }
        self.inner.read(key).await
    }

    async fn conditional_write(&self, request: WriteRequest) -> Result<Version, StoreError> {
        if take_failure(&self.write_failures_left, &self.failed_writes) {
            return Err(injected("write"));
        }
        let version = self.inner.conditional_write(request).await?;
        if take_failure(&self.lost_acks_left, &self.lost_acks) {
            debug!(version = %version, "dropping write acknowledgement");
            return Err(injected("write acknowledgement"));
        }
        Ok(version)
    }

    async fn delete(&self, key: &str, lease: Option<&LeaseId>) -> Result<(), StoreError> {
        self.inner.delete(key, lease).await
    }

    async fn acquire_lease(&self, key: &str, holder: &LeaseId, duration_ms: u64) -> Result<Lease, StoreError> {
        self.inner.acquire_lease(key, holder, duration_ms).await
    }

    async fn release_lease(&self, key: &str, lease: &LeaseId) -> Result<(), StoreError> {
        self.inner.release_lease(key, lease).await
    }
}

// ============================================================================
// InterferingStore
// ============================================================================

/// Writes competing content just before the next conditional write to a key.
///
/// The competing write is unconditional and happens once per
/// [`interfere_with`](Self::interfere_with) call, so the caller's write sees
/// a version it did not read and conflicts.
pub struct InterferingStore<S: DocumentStore + ?Sized> {
    inner: Arc<S>,
    pending: Mutex<HashMap<String, serde_json::Value>>,
    interferences: AtomicU64,
}

impl<S: DocumentStore + ?Sized> InterferingStore<S> {
    pub fn new(inner: Arc<S>) -> Self {
        Self {
            inner,
            pending: Mutex::new(HashMap::new()),
            interferences: AtomicU64::new(0),
        }
    }

    /// Arm a competing write of `content` to `key`.
    pub fn interfere_with(&self, key: impl Into<String>, content: serde_json::Value) {
        self.pending.lock().insert(key.into(), content);
    }

    /// Number of competing writes performed so far.
    pub fn interferences(&self) -> u64 {
        self.interferences.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<S: DocumentStore + ?Sized> DocumentStore for InterferingStore<S> {
    async fn read(&self, key: &str) -> Result<VersionedDocument, StoreError> {
        self.inner.read(key).await
    }

    async fn conditional_write(&self, request: WriteRequest) -> Result<Version, StoreError> {
        let competing = self.pending.lock().remove(&request.key);
        if let Some(content) = competing {
            debug!(key = %request.key, "injecting competing write");
            self.inner.conditional_write(WriteRequest::replace(request.key.clone(), content, None)).await?;
            self.interferences.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.conditional_write(request).await
    }

    async fn delete(&self, key: &str, lease: Option<&LeaseId>) -> Result<(), StoreError> {
        self.inner.delete(key, lease).await
    }

    async fn acquire_lease(&self, key: &str, holder: &LeaseId, duration_ms: u64) -> Result<Lease, StoreError> {
        self.inner.acquire_lease(key, holder, duration_ms).await
    }

    async fn release_lease(&self, key: &str, lease: &LeaseId) -> Result<(), StoreError> {
        self.inner.release_lease(key, lease).await
    }
}
