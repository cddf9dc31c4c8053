//! Capability error types
//!
//! These abort the run. Problems the model can fix by itself (bad input,
//! failing checks) are returned as error results instead.

use snapstore::SnapshotError;
use thiserror::Error;

use crate::verify::VerifyError;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Paths outside {namespace}: {}", paths.join(", "))]
    PathViolation { namespace: String, paths: Vec<String> },

    #[error("writeFiles without a passing verifyFiles for the same files: {reason}")]
    UnverifiedWrite { reason: String },

    #[error("Failed to fetch snapshot {snapshot_ref}: {source}")]
    SnapshotFetch {
        snapshot_ref: String,
        #[source]
        source: SnapshotError,
    },

    #[error("Failed to store snapshot: {0}")]
    SnapshotStore(#[source] SnapshotError),

    #[error("Verifier failed: {0}")]
    Verifier(#[from] VerifyError),
}

impl ToolError {
    /// Stable name used in logs and call records
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::PathViolation { .. } => "PathViolationError",
            ToolError::UnverifiedWrite { .. } => "UnverifiedWriteError",
            ToolError::SnapshotFetch { .. } => "SnapshotFetchError",
            ToolError::SnapshotStore(_) => "SnapshotStoreError",
            ToolError::Verifier(_) => "VerifierError",
        }
    }
}
