//! Advisory leases on documents.

use serde::Deserialize;
use serde::Serialize;

/// Identity presented when acquiring, using or releasing a lease.
///
/// The lock wrapper uses the owning instance's identity, so the lease id and
/// the holder id are the same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeaseId(String);

impl LeaseId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh random identity.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LeaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A time-bounded exclusive hold on one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    /// Key of the leased document.
    pub key: String,
    /// Current holder.
    pub holder: LeaseId,
    /// When the lease was (last) acquired, Unix ms.
    pub acquired_at_ms: u64,
    /// When the lease lapses, Unix ms.
    pub expires_at_ms: u64,
}

impl Lease {
    pub fn new(key: impl Into<String>, holder: LeaseId, now_ms: u64, duration_ms: u64) -> Self {
        Self {
            key: key.into(),
            holder,
            acquired_at_ms: now_ms,
            expires_at_ms: now_ms.saturating_add(duration_ms),
        }
    }

    /// A lease is active strictly before its expiry instant.
    #[inline]
    pub fn is_active(&self, now_ms: u64) -> bool {
        now_ms < self.expires_at_ms
    }

    /// Whether `lease` is this lease's holder.
    #[inline]
    pub fn is_held_by(&self, lease: Option<&LeaseId>) -> bool {
        lease == Some(&self.holder)
    }

    /// Remaining time in milliseconds (0 once expired).
    #[inline]
    pub fn remaining_ms(&self, now_ms: u64) -> u64 {
        self.expires_at_ms.saturating_sub(now_ms)
    }
}
