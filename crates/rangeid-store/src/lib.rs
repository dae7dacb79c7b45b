//! Versioned document store for rangeid.
//!
//! A document store holds JSON documents under string keys. Every document
//! carries an opaque [`Version`] token that changes on each successful write,
//! and writes can be made conditional on that token (ETag-style
//! compare-and-swap). Documents may additionally be held under a time-bounded
//! [`Lease`] that excludes writes and deletes from other holders.
//!
//! The [`DocumentStore`] trait is the seam between the coordination layer and
//! a concrete backend. [`InMemoryDocumentStore`] is the reference backend used
//! by tests and the CLI; any object store with conditional put semantics can
//! implement the trait.
//!
//! ## Conditional Write Example
//!
//! ```ignore
//! use rangeid_store::{DocumentStore, InMemoryDocumentStore, WriteRequest};
//!
//! let store = InMemoryDocumentStore::new();
//! let doc = store.read("alice/widgets.json").await?;
//!
//! // Fails with StoreError::Conflict if someone else wrote in between
//! let version = store
//!     .conditional_write(WriteRequest::replace("alice/widgets.json", json!([1, 2]), doc.version))
//!     .await?;
//! ```

mod clock;
mod document;
mod error;
pub mod inmemory;
mod lease;
mod traits;
pub mod validation;

pub use clock::Clock;
pub use clock::ManualClock;
pub use clock::SystemClock;
pub use document::Version;
pub use document::VersionedDocument;
pub use document::WriteCondition;
pub use document::WriteRequest;
pub use error::StoreError;
pub use inmemory::InMemoryDocumentStore;
pub use inmemory::StoreSnapshot;
pub use lease::Lease;
pub use lease::LeaseId;
pub use traits::DocumentStore;
