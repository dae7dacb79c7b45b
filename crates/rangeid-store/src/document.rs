//! Document, version and write request types.

use serde::Deserialize;
use serde::Serialize;

use crate::lease::LeaseId;

/// Opaque revision token of a stored document.
///
/// Callers only ever round-trip a version they obtained from a read or a
/// write; comparing two versions is plain value equality of the token. Store
/// backends are the only code that should mint new versions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(String);

impl Version {
    /// Wrap a backend-issued token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for backends that need to send it over the wire.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A document as observed by a read.
///
/// A missing document is represented by `content == None` and
/// `version == None`; reads never fail just because a key is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedDocument {
    /// Key the document is stored under.
    pub key: String,
    /// JSON content, absent if the document does not exist.
    pub content: Option<serde_json::Value>,
    /// Version of `content`, absent if the document does not exist.
    pub version: Option<Version>,
}

impl VersionedDocument {
    /// An existing document.
    pub fn new(key: impl Into<String>, content: serde_json::Value, version: Version) -> Self {
        Self {
            key: key.into(),
            content: Some(content),
            version: Some(version),
        }
    }

    /// The sentinel for a key with no document.
    pub fn absent(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            content: None,
            version: None,
        }
    }

    /// Whether the document exists.
    pub fn exists(&self) -> bool {
        self.version.is_some()
    }

    /// The write condition that succeeds only if nothing changed since this
    /// read: `Matches` for an existing document, `Absent` otherwise.
    pub fn unchanged_condition(&self) -> WriteCondition {
        match &self.version {
            Some(version) => WriteCondition::Matches(version.clone()),
            None => WriteCondition::Absent,
        }
    }
}

/// Precondition attached to a conditional write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteCondition {
    /// Unconditional write.
    Any,
    /// Create-only: fails if the document already exists.
    Absent,
    /// Fails unless the current version equals this token.
    Matches(Version),
}

impl From<Option<Version>> for WriteCondition {
    /// `None` maps to an unconditional write.
    fn from(expected: Option<Version>) -> Self {
        match expected {
            Some(version) => WriteCondition::Matches(version),
            None => WriteCondition::Any,
        }
    }
}

/// Request to write a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteRequest {
    pub key: String,
    pub content: serde_json::Value,
    pub condition: WriteCondition,
    /// Lease presented by the writer. Required to write a leased document.
    pub lease: Option<LeaseId>,
}

impl WriteRequest {
    /// Write guarded by an expected version; `None` writes unconditionally.
    pub fn replace(key: impl Into<String>, content: serde_json::Value, expected: Option<Version>) -> Self {
        Self {
            key: key.into(),
            content,
            condition: expected.into(),
            lease: None,
        }
    }

    /// Write that only succeeds if the document does not exist yet.
    pub fn create(key: impl Into<String>, content: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            content,
            condition: WriteCondition::Absent,
            lease: None,
        }
    }

    /// Write with an explicit condition.
    pub fn with_condition(key: impl Into<String>, content: serde_json::Value, condition: WriteCondition) -> Self {
        Self {
            key: key.into(),
            content,
            condition,
            lease: None,
        }
    }

    /// Present a lease with this write.
    pub fn with_lease(mut self, lease: Option<LeaseId>) -> Self {
        self.lease = lease;
        self
    }
}
