//! Optimistic read-transform-write loop over a [`DocumentStore`].
//!
//! The updater turns a pure transform into a safe compare-and-swap cycle:
//! read the document, apply the transform to what was read, and write the
//! result on the condition that the version has not moved. Losing a race
//! means re-reading and re-applying the transform to fresh state.
//!
//! # Termination
//!
//! The loop ends when the transform reports [`Transform::Unchanged`] (no
//! write issued), a write succeeds, the transform returns an error, or the
//! wall-clock budget runs out. The budget wraps the whole loop, so it is
//! observed at every store call and backoff sleep.

use std::sync::Arc;
use std::time::Duration;

use rangeid_constants::update::DEFAULT_UPDATE_TIMEOUT_MS;
use rangeid_constants::update::READ_RETRY_BACKOFF_MS;
use rangeid_store::DocumentStore;
use rangeid_store::LeaseId;
use rangeid_store::StoreError;
use rangeid_store::Version;
use rangeid_store::VersionedDocument;
use rangeid_store::WriteRequest;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use tracing::warn;

use crate::error::CoordinationError;

/// Configuration for [`OptimisticUpdater`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdaterConfig {
    /// Wall-clock budget for one update, in milliseconds.
    pub timeout_ms: u64,
    /// Pause between retries after a transient store failure.
    pub read_retry_backoff_ms: u64,
    /// Lease presented with every write, so a holder can update a document
    /// it has locked.
    pub lease: Option<LeaseId>,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_UPDATE_TIMEOUT_MS,
            read_retry_backoff_ms: READ_RETRY_BACKOFF_MS,
            lease: None,
        }
    }
}

/// What a transform wants done with the document it was shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transform<T> {
    /// Nothing to change; the updater returns without writing.
    Unchanged,
    /// Write this content.
    Replace(T),
}

/// How an update finished.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome<T> {
    /// The transform's content was committed.
    Written {
        content: T,
        version: Version,
        /// Number of times the transform ran.
        attempts: u32,
    },
    /// The transform declined to change the document; nothing was written.
    Unchanged {
        /// Content as last read, `None` if the document does not exist.
        content: Option<T>,
        version: Option<Version>,
        attempts: u32,
    },
}

impl<T> UpdateOutcome<T> {
    /// Whether a write was committed.
    pub fn is_written(&self) -> bool {
        matches!(self, UpdateOutcome::Written { .. })
    }

    /// Number of times the transform ran.
    pub fn attempts(&self) -> u32 {
        match self {
            UpdateOutcome::Written { attempts, .. } | UpdateOutcome::Unchanged { attempts, .. } => *attempts,
        }
    }

    /// Content after the update, if the document exists.
    pub fn content(&self) -> Option<&T> {
        match self {
            UpdateOutcome::Written { content, .. } => Some(content),
            UpdateOutcome::Unchanged { content, .. } => content.as_ref(),
        }
    }
}

/// Applies transforms to documents with optimistic concurrency control.
pub struct OptimisticUpdater<S: DocumentStore + ?Sized> {
    store: Arc<S>,
    config: UpdaterConfig,
}

impl<S: DocumentStore + ?Sized> Clone for OptimisticUpdater<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
        }
    }
}

impl<S: DocumentStore + ?Sized> OptimisticUpdater<S> {
    /// Create an updater with default timeouts and no lease.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, UpdaterConfig::default())
    }

    pub fn with_config(store: Arc<S>, config: UpdaterConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &UpdaterConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Apply `transform` to the document at `key` within the default budget.
    ///
    /// `transform` receives the current content (`None` if the document does
    /// not exist) and a zero-based attempt number. It may run several times
    /// and must compute its answer from the content it is given.
    pub async fn update<T, F>(&self, key: &str, transform: F) -> Result<UpdateOutcome<T>, CoordinationError>
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnMut(Option<&T>, u32) -> Result<Transform<T>, CoordinationError> + Send,
    {
        self.update_with_timeout(key, self.config.timeout_ms, transform).await
    }

    /// Like [`update`](Self::update) with an explicit budget.
    pub async fn update_with_timeout<T, F>(
        &self,
        key: &str,
        timeout_ms: u64,
        transform: F,
    ) -> Result<UpdateOutcome<T>, CoordinationError>
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnMut(Option<&T>, u32) -> Result<Transform<T>, CoordinationError> + Send,
    {
        match tokio::time::timeout(Duration::from_millis(timeout_ms), self.update_loop(key, transform)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(key, timeout_ms, "optimistic update timed out");
                Err(CoordinationError::Timeout {
                    operation: format!("update of '{key}'"),
                    timeout_ms,
                })
            }
        }
    }

    /// Read and decode a document, retrying transient failures within the
    /// default budget. Returns `None` for a missing document.
    pub async fn read<T>(&self, key: &str) -> Result<Option<T>, CoordinationError>
    where
        T: DeserializeOwned + Send,
    {
        let timeout_ms = self.config.timeout_ms;
        let read = async {
            let document = self.read_with_retry(key).await?;
            decode_content(&document)
        };
        match tokio::time::timeout(Duration::from_millis(timeout_ms), read).await {
            Ok(result) => result,
            Err(_) => Err(CoordinationError::Timeout {
                operation: format!("read of '{key}'"),
                timeout_ms,
            }),
        }
    }

    async fn update_loop<T, F>(&self, key: &str, mut transform: F) -> Result<UpdateOutcome<T>, CoordinationError>
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnMut(Option<&T>, u32) -> Result<Transform<T>, CoordinationError> + Send,
    {
        let mut attempt = 0u32;
        // Content of a write whose outcome is unknown after a transient failure
        let mut unconfirmed: Option<(serde_json::Value, T)> = None;

        loop {
            let document = self.read_with_retry(key).await?;

            if let Some((written, content)) = unconfirmed.take() {
                if let (Some(stored), Some(version)) = (&document.content, &document.version) {
                    if *stored == written {
                        debug!(key, version = %version, attempts = attempt, "unacknowledged write found committed");
                        return Ok(UpdateOutcome::Written {
                            content,
                            version: version.clone(),
                            attempts: attempt,
                        });
                    }
                }
            }

            let current: Option<T> = decode_content(&document)?;

            let next = transform(current.as_ref(), attempt)?;
            attempt = attempt.saturating_add(1);

            let content = match next {
                Transform::Unchanged => {
                    debug!(key, attempts = attempt, "transform left document unchanged, skipping write");
                    return Ok(UpdateOutcome::Unchanged {
                        content: current,
                        version: document.version,
                        attempts: attempt,
                    });
                }
                Transform::Replace(content) => content,
            };

            let value = serde_json::to_value(&content)?;
            let request = WriteRequest::with_condition(key, value.clone(), document.unchanged_condition())
                .with_lease(self.config.lease.clone());

            match self.store.conditional_write(request).await {
                Ok(version) => {
                    debug!(key, version = %version, attempts = attempt, "optimistic update committed");
                    return Ok(UpdateOutcome::Written {
                        content,
                        version,
                        attempts: attempt,
                    });
                }
                Err(StoreError::Conflict { .. }) => {
                    debug!(key, attempt, "version conflict, re-reading");
                }
                Err(error) if error.is_transient() => {
                    warn!(key, attempt, error = %error, "transient write failure, re-reading");
                    unconfirmed = Some((value, content));
                    tokio::time::sleep(Duration::from_millis(self.config.read_retry_backoff_ms)).await;
                }
                Err(error) => return Err(error.into()),
            }
        }
    }

    /// Read until the store gives an authoritative answer.
    ///
    /// Transient failures back off and retry; they do not count as attempts.
    async fn read_with_retry(&self, key: &str) -> Result<VersionedDocument, CoordinationError> {
        loop {
            match self.store.read(key).await {
                Ok(document) => return Ok(document),
                Err(error) if error.is_transient() => {
                    warn!(key, error = %error, "transient read failure, retrying");
                    tokio::time::sleep(Duration::from_millis(self.config.read_retry_backoff_ms)).await;
                }
                Err(error) => return Err(error.into()),
            }
        }
    }
}

fn decode_content<T: DeserializeOwned>(document: &VersionedDocument) -> Result<Option<T>, CoordinationError> {
    document
        .content
        .as_ref()
        .map(|value| {
            serde_json::from_value(value.clone()).map_err(|e| CoordinationError::CorruptedData {
                key: document.key.clone(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use rangeid_store::InMemoryDocumentStore;
    use rangeid_store::WriteCondition;
    use rangeid_testing::CountingStore;
    use rangeid_testing::FlakyStore;
    use rangeid_testing::InterferingStore;
    use serde_json::json;

    use super::*;

    async fn seed(store: &InMemoryDocumentStore, key: &str, content: serde_json::Value) -> Version {
        store.conditional_write(WriteRequest::create(key, content)).await.unwrap()
    }

    #[tokio::test]
    async fn writes_transform_result() {
        let store = InMemoryDocumentStore::new();
        let updater = OptimisticUpdater::new(store.clone());

        let outcome = updater
            .update("k", |current: Option<&Vec<u64>>, _| {
                let mut next = current.cloned().unwrap_or_default();
                next.push(1);
                Ok(Transform::Replace(next))
            })
            .await
            .unwrap();

        assert!(outcome.is_written());
        assert_eq!(outcome.attempts(), 1);
        assert_eq!(store.read("k").await.unwrap().content, Some(json!([1])));
    }

    #[tokio::test]
    async fn unchanged_transform_never_writes() {
        let inner = InMemoryDocumentStore::new();
        seed(&inner, "k", json!([1, 2])).await;
        let store = Arc::new(CountingStore::new(inner));
        let updater = OptimisticUpdater::new(store.clone());

        let outcome = updater.update("k", |_: Option<&Vec<u64>>, _| Ok(Transform::Unchanged)).await.unwrap();

        assert_eq!(outcome.content(), Some(&vec![1, 2]));
        assert!(!outcome.is_written());
        assert_eq!(store.writes(), 0);
        assert_eq!(store.reads(), 1);
    }

    #[tokio::test]
    async fn first_write_is_create_only() {
        let store = Arc::new(InterferingStore::new(InMemoryDocumentStore::new()));
        // Someone else creates the document between our read and our write
        store.interfere_with("k", json!([7]));
        let updater = OptimisticUpdater::new(store.clone());

        let mut seen = Vec::new();
        let outcome = updater
            .update("k", |current: Option<&Vec<u64>>, _| {
                seen.push(current.cloned());
                let mut next = current.cloned().unwrap_or_default();
                next.push(1);
                Ok(Transform::Replace(next))
            })
            .await
            .unwrap();

        assert_eq!(seen, vec![None, Some(vec![7])]);
        assert_eq!(outcome.content(), Some(&vec![7, 1]));
        assert_eq!(outcome.attempts(), 2);
    }

    #[tokio::test]
    async fn conflict_reapplies_transform_to_fresh_state() {
        let inner = InMemoryDocumentStore::new();
        seed(&inner, "k", json!({"count": 1})).await;
        let store = Arc::new(InterferingStore::new(inner));
        store.interfere_with("k", json!({"count": 10}));
        let updater = OptimisticUpdater::new(store.clone());

        let outcome = updater
            .update("k", |current: Option<&serde_json::Value>, _| {
                let count = current.and_then(|v| v["count"].as_u64()).unwrap_or(0);
                Ok(Transform::Replace(json!({"count": count + 1})))
            })
            .await
            .unwrap();

        assert_eq!(outcome.content(), Some(&json!({"count": 11})));
        assert_eq!(store.read("k").await.unwrap().content, Some(json!({"count": 11})));
    }

    #[tokio::test]
    async fn attempt_numbers_increase() {
        let inner = InMemoryDocumentStore::new();
        seed(&inner, "k", json!(0)).await;
        let store = Arc::new(InterferingStore::new(inner));
        store.interfere_with("k", json!(1));
        let updater = OptimisticUpdater::new(store);

        let mut attempts = Vec::new();
        updater
            .update("k", |current: Option<&u64>, attempt| {
                attempts.push(attempt);
                Ok(Transform::Replace(current.copied().unwrap_or(0) + 1))
            })
            .await
            .unwrap();

        assert_eq!(attempts, vec![0, 1]);
    }

    #[tokio::test]
    async fn transient_reads_are_retried_without_counting_attempts() {
        let store = Arc::new(FlakyStore::new(InMemoryDocumentStore::new(), 3, 0));
        let updater = OptimisticUpdater::new(store.clone());

        let outcome = updater.update("k", |_: Option<&u64>, _| Ok(Transform::Replace(5))).await.unwrap();

        assert_eq!(outcome.attempts(), 1);
        assert_eq!(store.failed_reads(), 3);
    }

    #[tokio::test]
    async fn transient_write_failure_rereads_and_retries() {
        let store = Arc::new(FlakyStore::new(InMemoryDocumentStore::new(), 0, 1));
        let updater = OptimisticUpdater::new(store.clone());

        let outcome = updater.update("k", |_: Option<&u64>, _| Ok(Transform::Replace(5))).await.unwrap();

        assert!(outcome.is_written());
        assert_eq!(outcome.attempts(), 2);
    }

    #[tokio::test]
    async fn committed_write_with_lost_ack_is_not_repeated() {
        let store = Arc::new(FlakyStore::new(InMemoryDocumentStore::new(), 0, 0).with_lost_acks(1));
        let updater = OptimisticUpdater::new(store.clone());
        let mut calls = 0;

        let outcome = updater
            .update("k", |current: Option<&Vec<u64>>, _| {
                calls += 1;
                let mut next = current.cloned().unwrap_or_default();
                next.push(next.len() as u64 + 1);
                Ok(Transform::Replace(next))
            })
            .await
            .unwrap();

        assert!(outcome.is_written());
        assert_eq!(outcome.content(), Some(&vec![1]));
        assert_eq!(calls, 1);
        assert_eq!(store.lost_acks(), 1);
        let stored = store.read("k").await.unwrap();
        assert_eq!(stored.content, Some(json!([1])));
        assert!(matches!(outcome, UpdateOutcome::Written { version, .. } if Some(version.clone()) == stored.version));
    }

    #[tokio::test]
    async fn transform_error_propagates_without_retry() {
        let store = InMemoryDocumentStore::new();
        let updater = OptimisticUpdater::new(store);
        let mut calls = 0;

        let result = updater
            .update("k", |_: Option<&u64>, _| {
                calls += 1;
                Err(CoordinationError::IdOutOfRange { id: 9 })
            })
            .await;

        assert!(matches!(result, Err(CoordinationError::IdOutOfRange { id: 9 })));
        assert_eq!(calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_store_never_recovers() {
        let store = Arc::new(FlakyStore::new(InMemoryDocumentStore::new(), u32::MAX, 0));
        let updater = OptimisticUpdater::new(store);

        let result = updater.update_with_timeout("k", 100, |_: Option<&u64>, _| Ok(Transform::Replace(1))).await;

        assert!(matches!(result, Err(CoordinationError::Timeout { timeout_ms: 100, .. })));
    }

    #[tokio::test]
    async fn malformed_content_is_corrupted_data() {
        let store = InMemoryDocumentStore::new();
        seed(&store, "k", json!("not a list")).await;
        let updater = OptimisticUpdater::new(store);

        let result = updater.update("k", |_: Option<&Vec<u64>>, _| Ok(Transform::Unchanged)).await;

        assert!(matches!(result, Err(CoordinationError::CorruptedData { key, .. }) if key == "k"));
    }

    #[tokio::test]
    async fn leased_document_rejects_foreign_updater() {
        let store = InMemoryDocumentStore::new();
        seed(&store, "k", json!(1)).await;
        let holder = LeaseId::new("holder");
        store.acquire_lease("k", &holder, 60_000).await.unwrap();

        let stranger = OptimisticUpdater::new(store.clone());
        let result = stranger.update("k", |_: Option<&u64>, _| Ok(Transform::Replace(2))).await;
        assert!(matches!(result, Err(CoordinationError::LeaseConflict { .. })));

        let owner = OptimisticUpdater::with_config(store.clone(), UpdaterConfig {
            lease: Some(holder),
            ..UpdaterConfig::default()
        });
        let outcome = owner.update("k", |_: Option<&u64>, _| Ok(Transform::Replace(2))).await.unwrap();
        assert!(outcome.is_written());
    }

    #[tokio::test]
    async fn read_decodes_content() {
        let store = InMemoryDocumentStore::new();
        seed(&store, "k", json!([3, 4])).await;
        let updater = OptimisticUpdater::new(store);

        assert_eq!(updater.read::<Vec<u64>>("k").await.unwrap(), Some(vec![3, 4]));
        assert_eq!(updater.read::<Vec<u64>>("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn written_version_differs_from_read_version() {
        let store = InMemoryDocumentStore::new();
        let first = seed(&store, "k", json!(1)).await;
        let updater = OptimisticUpdater::new(store.clone());

        let outcome = updater.update("k", |_: Option<&u64>, _| Ok(Transform::Replace(2))).await.unwrap();

        let UpdateOutcome::Written { version, .. } = outcome else {
            panic!("expected a write");
        };
        assert_ne!(version, first);
        let stale = WriteRequest::with_condition("k", json!(3), WriteCondition::Matches(first));
        assert!(matches!(store.conditional_write(stale).await, Err(StoreError::Conflict { .. })));
    }
}
