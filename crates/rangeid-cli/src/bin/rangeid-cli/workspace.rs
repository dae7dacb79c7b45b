//! Local document store persisted to a JSON state file.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use rangeid_coordination::IdService;
use rangeid_coordination::ServiceConfig;
use rangeid_store::Clock;
use rangeid_store::InMemoryDocumentStore;
use rangeid_store::StoreSnapshot;
use rangeid_store::SystemClock;
use tracing::debug;

/// Store and service for one CLI invocation.
pub struct Workspace {
    pub store: Arc<InMemoryDocumentStore>,
    pub service: IdService<InMemoryDocumentStore>,
    state_path: Option<PathBuf>,
}

impl Workspace {
    /// Load the state file if it exists; start empty otherwise.
    pub fn open(state_path: Option<PathBuf>, config: ServiceConfig) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = match state_path.as_deref() {
            Some(path) if path.exists() => {
                let snapshot = read_snapshot(path)?;
                debug!(path = %path.display(), documents = snapshot.documents.len(), "loaded state file");
                Arc::new(InMemoryDocumentStore::from_snapshot(snapshot, Arc::clone(&clock)))
            }
            _ => Arc::new(InMemoryDocumentStore::with_clock(Arc::clone(&clock))),
        };
        let service = IdService::with_clock(Arc::clone(&store), &config, clock);

        Ok(Self {
            store,
            service,
            state_path,
        })
    }

    /// Write the store back to the state file, if one was given.
    pub fn save(&self) -> Result<()> {
        let Some(path) = self.state_path.as_deref() else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(&self.store.snapshot()).context("failed to serialize state")?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, path).with_context(|| format!("failed to replace {}", path.display()))?;
        debug!(path = %path.display(), "saved state file");
        Ok(())
    }
}

fn read_snapshot(path: &Path) -> Result<StoreSnapshot> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read state file {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse state file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use rangeid_coordination::IdRange;

    use super::*;

    fn config() -> ServiceConfig {
        ServiceConfig {
            holder_id: Some("test".to_string()),
            ..ServiceConfig::default()
        }
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let first = Workspace::open(Some(path.clone()), config()).unwrap();
        first.service.allocate_next_id("o/c.json", &[IdRange::new(1, 9)], true, None).await.unwrap();
        assert!(first.service.lock_document("o/c.json").await);
        first.save().unwrap();

        let second = Workspace::open(Some(path), config()).unwrap();
        let next = second.service.allocate_next_id("o/c.json", &[IdRange::new(1, 9)], true, None).await.unwrap();
        assert_eq!(next.id, 2);
        // Lock held by the same holder id carries over
        assert!(second.service.unlock_document("o/c.json").await);
    }

    #[test]
    fn no_state_file_means_nothing_saved() {
        let workspace = Workspace::open(None, config()).unwrap();
        assert!(workspace.save().is_ok());
        assert!(workspace.store.keys().is_empty());
    }
}
