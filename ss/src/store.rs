//! Core SnapshotStore implementation

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::SnapshotError;
use crate::archive;

const ARCHIVE_EXT: &str = ".tar.gz";
const MAX_REF_LEN: usize = 64;

/// Opaque identifier for a stored snapshot
pub type SnapshotRef = String;

/// One file in a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Relative path with `/` separators
    pub path: String,
    /// UTF-8 file content
    pub content: String,
}

impl FileEntry {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Statistics for a snapshot
#[derive(Debug, Clone)]
pub struct SnapshotStats {
    /// Number of files
    pub file_count: usize,
    /// Total uncompressed content bytes
    pub content_bytes: u64,
    /// Size of the archive on disk
    pub archive_bytes: u64,
}

/// The main snapshot store
pub struct SnapshotStore {
    /// Base path for storage
    base_path: PathBuf,
}

impl SnapshotStore {
    /// Open or create a snapshot store at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let base_path = path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;
        debug!(?base_path, "Opened snapshot store");
        Ok(Self { base_path })
    }

    /// Directory holding the archives
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Package a file set into a new snapshot and return its reference
    ///
    /// The archive is written to a temp file in the store directory and
    /// renamed into place, so a reference never points at a partial archive.
    pub fn store(&self, files: &[FileEntry]) -> Result<SnapshotRef, SnapshotError> {
        debug!(count = files.len(), "SnapshotStore::store: called");
        let bytes = archive::pack(files)?;

        let snapshot_ref = Uuid::now_v7().to_string();
        let final_path = self.archive_path(&snapshot_ref)?;

        let mut temp = tempfile::NamedTempFile::new_in(&self.base_path)?;
        temp.write_all(&bytes)?;
        temp.as_file().sync_all()?;
        temp.persist(&final_path).map_err(|e| SnapshotError::Io(e.error))?;

        info!(%snapshot_ref, files = files.len(), bytes = bytes.len(), "Stored snapshot");
        Ok(snapshot_ref)
    }

    /// Restore the file set held by a snapshot
    pub fn extract(&self, snapshot_ref: &str) -> Result<Vec<FileEntry>, SnapshotError> {
        debug!(%snapshot_ref, "SnapshotStore::extract: called");
        let path = self.archive_path(snapshot_ref)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SnapshotError::NotFound(snapshot_ref.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        archive::unpack(&bytes)
    }

    /// Check whether a reference resolves to a stored snapshot
    pub fn exists(&self, snapshot_ref: &str) -> bool {
        self.archive_path(snapshot_ref).map(|p| p.is_file()).unwrap_or(false)
    }

    /// List all snapshot references, oldest first
    pub fn list(&self) -> Result<Vec<SnapshotRef>, SnapshotError> {
        let mut refs = Vec::new();

        for entry in fs::read_dir(&self.base_path)? {
            let entry = entry?;
            if entry.path().is_file()
                && let Some(name) = entry.file_name().to_str()
                && let Some(snapshot_ref) = name.strip_suffix(ARCHIVE_EXT)
                && validate_ref(snapshot_ref).is_ok()
            {
                refs.push(snapshot_ref.to_string());
            }
        }

        // v7 UUIDs sort by creation time
        refs.sort();
        Ok(refs)
    }

    /// Get statistics for a snapshot
    pub fn stats(&self, snapshot_ref: &str) -> Result<SnapshotStats, SnapshotError> {
        let path = self.archive_path(snapshot_ref)?;
        let metadata = fs::metadata(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SnapshotError::NotFound(snapshot_ref.to_string()),
            _ => SnapshotError::Io(e),
        })?;
        let files = self.extract(snapshot_ref)?;

        Ok(SnapshotStats {
            file_count: files.len(),
            content_bytes: files.iter().map(|f| f.content.len() as u64).sum(),
            archive_bytes: metadata.len(),
        })
    }

    fn archive_path(&self, snapshot_ref: &str) -> Result<PathBuf, SnapshotError> {
        validate_ref(snapshot_ref)?;
        Ok(self.base_path.join(format!("{snapshot_ref}{ARCHIVE_EXT}")))
    }
}

/// References are generated by the store; anything else is rejected before
/// it can touch the filesystem.
fn validate_ref(snapshot_ref: &str) -> Result<(), SnapshotError> {
    let well_formed = !snapshot_ref.is_empty()
        && snapshot_ref.len() <= MAX_REF_LEN
        && snapshot_ref.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');

    if well_formed {
        Ok(())
    } else {
        Err(SnapshotError::InvalidRef(snapshot_ref.to_string()))
    }
}
