//! Request validation shared by store backends.
//!
//! Tiger Style: every bound is checked before the backend is touched.

use rangeid_constants::store::MAX_CONTENT_SIZE;
use rangeid_constants::store::MAX_KEY_SIZE;
use rangeid_constants::store::MAX_LEASE_DURATION_MS;
use rangeid_constants::store::MIN_LEASE_DURATION_MS;

use crate::error::StoreError;

/// Reject empty and oversized keys.
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() {
        return Err(StoreError::EmptyKey);
    }
    if key.len() > MAX_KEY_SIZE as usize {
        return Err(StoreError::KeyTooLarge {
            size: key.len(),
            max: MAX_KEY_SIZE,
        });
    }
    Ok(())
}

/// Reject content whose serialized form exceeds the size limit.
///
/// Returns the serialized size on success.
pub fn validate_content(content: &serde_json::Value) -> Result<usize, StoreError> {
    let size = content.to_string().len();
    if size > MAX_CONTENT_SIZE as usize {
        return Err(StoreError::ContentTooLarge {
            size,
            max: MAX_CONTENT_SIZE,
        });
    }
    Ok(size)
}

/// Reject lease durations outside the configured bounds.
pub fn validate_lease_duration(duration_ms: u64) -> Result<(), StoreError> {
    if !(MIN_LEASE_DURATION_MS..=MAX_LEASE_DURATION_MS).contains(&duration_ms) {
        return Err(StoreError::InvalidLeaseDuration {
            duration_ms,
            min_ms: MIN_LEASE_DURATION_MS,
            max_ms: MAX_LEASE_DURATION_MS,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn empty_key_rejected() {
        assert_eq!(validate_key(""), Err(StoreError::EmptyKey));
    }

    #[test]
    fn oversized_key_rejected() {
        let key = "k".repeat(MAX_KEY_SIZE as usize + 1);
        assert!(matches!(validate_key(&key), Err(StoreError::KeyTooLarge { .. })));
        assert!(validate_key(&key[1..]).is_ok());
    }

    #[test]
    fn content_size_reported() {
        assert_eq!(validate_content(&json!([1, 2, 3])).unwrap(), "[1,2,3]".len());
    }

    #[test]
    fn lease_duration_bounds() {
        assert!(validate_lease_duration(MIN_LEASE_DURATION_MS).is_ok());
        assert!(validate_lease_duration(MAX_LEASE_DURATION_MS).is_ok());
        assert!(validate_lease_duration(MIN_LEASE_DURATION_MS - 1).is_err());
        assert!(validate_lease_duration(MAX_LEASE_DURATION_MS + 1).is_err());
    }
}
