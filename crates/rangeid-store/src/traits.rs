//! The backend interface.

use async_trait::async_trait;

use crate::document::Version;
use crate::document::VersionedDocument;
use crate::document::WriteRequest;
use crate::error::StoreError;
use crate::lease::Lease;
use crate::lease::LeaseId;

/// A remote blob store with versioned conditional writes and leases.
///
/// Every method is a round trip to the authoritative backend; implementations
/// must not cache, since correctness of the optimistic update loop depends on
/// always observing the current version.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a document. A missing key yields [`VersionedDocument::absent`].
    async fn read(&self, key: &str) -> Result<VersionedDocument, StoreError>;

    /// Write a document if `request.condition` holds.
    ///
    /// Returns the new version, which differs from every earlier version of
    /// the key. Fails with [`StoreError::Conflict`] when the condition does
    /// not hold and with [`StoreError::LeaseConflict`] when the document is
    /// leased by someone other than `request.lease`.
    async fn conditional_write(&self, request: WriteRequest) -> Result<Version, StoreError>;

    /// Delete a document and any lease on it.
    ///
    /// Fails with [`StoreError::LeaseConflict`] if an active lease exists and
    /// `lease` is not its holder.
    async fn delete(&self, key: &str, lease: Option<&LeaseId>) -> Result<(), StoreError>;

    /// Acquire (or renew, for the current holder) a lease on an existing
    /// document.
    async fn acquire_lease(&self, key: &str, holder: &LeaseId, duration_ms: u64) -> Result<Lease, StoreError>;

    /// Release a lease. Fails with [`StoreError::LeaseMismatch`] if `lease`
    /// is not the active lease, including when it already expired.
    async fn release_lease(&self, key: &str, lease: &LeaseId) -> Result<(), StoreError>;
}
