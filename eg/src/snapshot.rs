//! Snapshot backend seen by the orchestrator
//!
//! The generation chain only ever holds opaque references; how file sets are
//! packaged is the backend's business.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use snapstore::{SnapshotError, SnapshotStore};
use tracing::debug;

use crate::domain::SourceFile;

/// Content-addressable storage of file sets
#[async_trait]
pub trait SnapshotBackend: Send + Sync {
    /// Persist a file set and return a new reference
    async fn store(&self, files: Vec<SourceFile>) -> Result<String, SnapshotError>;

    /// Restore the file set behind a reference
    async fn extract(&self, snapshot_ref: &str) -> Result<Vec<SourceFile>, SnapshotError>;
}

/// Extract a snapshot, treating an absent reference as the empty set
///
/// A present reference that does not resolve is still an error.
pub async fn extract_or_empty(
    backend: &dyn SnapshotBackend,
    snapshot_ref: Option<&str>,
) -> Result<Vec<SourceFile>, SnapshotError> {
    match snapshot_ref {
        None => {
            debug!("extract_or_empty: no snapshot ref, returning empty set");
            Ok(Vec::new())
        }
        Some(snapshot_ref) => backend.extract(snapshot_ref).await,
    }
}

/// Snapshot backend over an on-disk `snapstore`
#[derive(Clone)]
pub struct DiskSnapshots {
    store: Arc<SnapshotStore>,
}

impl DiskSnapshots {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        Ok(Self {
            store: Arc::new(SnapshotStore::open(dir)?),
        })
    }

    /// References of every stored snapshot
    pub fn list(&self) -> Result<Vec<String>, SnapshotError> {
        self.store.list()
    }
}

#[async_trait]
impl SnapshotBackend for DiskSnapshots {
    async fn store(&self, files: Vec<SourceFile>) -> Result<String, SnapshotError> {
        debug!(count = files.len(), "DiskSnapshots::store: called");
        let store = self.store.clone();
        let entries: Vec<snapstore::FileEntry> = files.into_iter().map(Into::into).collect();
        tokio::task::spawn_blocking(move || store.store(&entries))
            .await
            .map_err(|e| SnapshotError::Io(std::io::Error::other(e)))?
    }

    async fn extract(&self, snapshot_ref: &str) -> Result<Vec<SourceFile>, SnapshotError> {
        debug!(%snapshot_ref, "DiskSnapshots::extract: called");
        let store = self.store.clone();
        let snapshot_ref = snapshot_ref.to_string();
        let entries = tokio::task::spawn_blocking(move || store.extract(&snapshot_ref))
            .await
            .map_err(|e| SnapshotError::Io(std::io::Error::other(e)))??;
        Ok(entries.into_iter().map(Into::into).collect())
    }
}
