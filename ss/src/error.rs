//! Snapshot store error types

use thiserror::Error;

/// Errors that can occur while storing or extracting snapshots
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Snapshot not found: {0}")]
    NotFound(String),

    #[error("Invalid snapshot reference: {0}")]
    InvalidRef(String),

    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("Duplicate path in file set: {0}")]
    DuplicatePath(String),

    #[error("Corrupt snapshot archive: {0}")]
    Corrupt(String),

    #[error("Snapshot exceeds limits: {0}")]
    TooLarge(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SnapshotError {
    /// Check if the reference simply does not resolve
    pub fn is_not_found(&self) -> bool {
        matches!(self, SnapshotError::NotFound(_))
    }
}
