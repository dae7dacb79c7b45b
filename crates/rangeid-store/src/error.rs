//! Document store errors.

use thiserror::Error;

use crate::document::Version;
use crate::document::WriteCondition;

/// Errors returned by a [`DocumentStore`](crate::DocumentStore).
///
/// Reads never return `NotFound`; absence is reported through
/// [`VersionedDocument::absent`](crate::VersionedDocument::absent).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("document '{key}' not found")]
    NotFound { key: String },

    /// The write precondition did not hold.
    #[error("version conflict on '{key}': expected {expected:?}, found {actual:?}")]
    Conflict {
        key: String,
        expected: WriteCondition,
        actual: Option<Version>,
    },

    /// The document is leased by someone other than the caller.
    #[error("document '{key}' is leased by another holder")]
    LeaseConflict { key: String },

    /// A release presented a lease that is not the active one.
    #[error("lease '{lease}' is not the active lease on '{key}'")]
    LeaseMismatch { key: String, lease: String },

    /// The backend could not be reached or answered with a retryable failure.
    #[error("store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("key cannot be empty")]
    EmptyKey,

    #[error("key size {size} exceeds maximum of {max} bytes")]
    KeyTooLarge { size: usize, max: u32 },

    #[error("content size {size} exceeds maximum of {max} bytes")]
    ContentTooLarge { size: usize, max: u32 },

    #[error("lease duration {duration_ms}ms outside allowed range {min_ms}..={max_ms}ms")]
    InvalidLeaseDuration { duration_ms: u64, min_ms: u64, max_ms: u64 },
}

impl StoreError {
    /// Whether retrying the same call may succeed without any state change
    /// on the caller's side.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = StoreError::NotFound {
            key: "alice/widgets.json".to_string(),
        };
        assert_eq!(err.to_string(), "document 'alice/widgets.json' not found");
    }

    #[test]
    fn conflict_display_includes_both_sides() {
        let err = StoreError::Conflict {
            key: "k".to_string(),
            expected: WriteCondition::Matches(Version::new("v1")),
            actual: Some(Version::new("v2")),
        };
        let text = err.to_string();
        assert!(text.contains("v1"));
        assert!(text.contains("v2"));
    }

    #[test]
    fn only_unavailable_is_transient() {
        assert!(
            StoreError::Unavailable {
                reason: "503".to_string()
            }
            .is_transient()
        );
        assert!(!StoreError::EmptyKey.is_transient());
        assert!(!StoreError::LeaseConflict { key: "k".to_string() }.is_transient());
    }
}
