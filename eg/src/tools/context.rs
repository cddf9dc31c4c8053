//! ToolContext - per-run state shared by the capabilities

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::{CallLog, CallOutcome, Fingerprint, SourceFile};
use crate::guard::Namespace;
use crate::references::ReferenceProvider;
use crate::snapshot::{SnapshotBackend, extract_or_empty};
use crate::verify::Verifier;

use super::ToolError;
use super::gate::VerificationGate;

#[derive(Default)]
struct RunState {
    /// Files behind the base snapshot, fetched on first use
    base_files: Option<Vec<SourceFile>>,
    gate: VerificationGate,
    written_ref: Option<String>,
    call_log: CallLog,
}

/// Execution context for one orchestrator run
///
/// Scoped to a single exercise namespace and a single base snapshot. The
/// collaborators are injected; the context owns nothing global.
#[derive(Clone)]
pub struct ToolContext {
    namespace: Namespace,
    base_snapshot_ref: Option<String>,
    snapshots: Arc<dyn SnapshotBackend>,
    verifier: Arc<dyn Verifier>,
    references: Arc<dyn ReferenceProvider>,
    state: Arc<Mutex<RunState>>,
}

impl ToolContext {
    pub fn new(
        namespace: Namespace,
        base_snapshot_ref: Option<String>,
        snapshots: Arc<dyn SnapshotBackend>,
        verifier: Arc<dyn Verifier>,
        references: Arc<dyn ReferenceProvider>,
    ) -> Self {
        debug!(%namespace, ?base_snapshot_ref, "ToolContext::new: called");
        Self {
            namespace,
            base_snapshot_ref,
            snapshots,
            verifier,
            references,
            state: Arc::new(Mutex::new(RunState::default())),
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn base_snapshot_ref(&self) -> Option<&str> {
        self.base_snapshot_ref.as_deref()
    }

    pub fn snapshots(&self) -> &dyn SnapshotBackend {
        self.snapshots.as_ref()
    }

    pub fn verifier(&self) -> &dyn Verifier {
        self.verifier.as_ref()
    }

    pub fn references(&self) -> &dyn ReferenceProvider {
        self.references.as_ref()
    }

    /// Files of the base snapshot (namespace-relative), or empty if none
    pub async fn base_files(&self) -> Result<Vec<SourceFile>, ToolError> {
        let mut state = self.state.lock().await;
        if let Some(files) = &state.base_files {
            return Ok(files.clone());
        }

        debug!(base = ?self.base_snapshot_ref, "ToolContext::base_files: fetching");
        let files = extract_or_empty(self.snapshots.as_ref(), self.base_snapshot_ref.as_deref())
            .await
            .map_err(|source| ToolError::SnapshotFetch {
                snapshot_ref: self.base_snapshot_ref.clone().unwrap_or_default(),
                source,
            })?;
        state.base_files = Some(files.clone());
        Ok(files)
    }

    /// Run every path through the guard, mapping to namespace-relative paths
    ///
    /// One bad path rejects the whole batch.
    pub fn authorize(&self, files: Vec<SourceFile>) -> Result<Vec<SourceFile>, ToolError> {
        let relative = self
            .namespace
            .authorize_all(files.iter().map(|f| f.path.as_str()))
            .map_err(|paths| ToolError::PathViolation {
                namespace: self.namespace.to_string(),
                paths,
            })?;

        Ok(relative
            .into_iter()
            .zip(files)
            .map(|(path, file)| SourceFile::new(path, file.content))
            .collect())
    }

    pub async fn record_verification(&self, fingerprint: Fingerprint, ok: bool) {
        self.state.lock().await.gate.record(fingerprint, ok);
    }

    /// Fail unless the last verification passed for exactly these files
    pub async fn require_verified(&self, fingerprint: &Fingerprint) -> Result<(), ToolError> {
        self.state
            .lock()
            .await
            .gate
            .check(fingerprint)
            .map_err(|reason| ToolError::UnverifiedWrite { reason })
    }

    /// Forget the last verification; every `verifyFiles` call starts here
    pub async fn clear_verification(&self) {
        self.state.lock().await.gate.reset();
    }

    pub async fn set_written(&self, snapshot_ref: String) {
        let mut state = self.state.lock().await;
        state.gate.reset();
        state.written_ref = Some(snapshot_ref);
    }

    /// Snapshot stored by a successful `writeFiles`, if any
    pub async fn written_ref(&self) -> Option<String> {
        self.state.lock().await.written_ref.clone()
    }

    pub async fn record_call(&self, name: &str, arguments: serde_json::Value, outcome: CallOutcome) {
        self.state.lock().await.call_log.record(name, arguments, outcome);
    }

    pub async fn call_log(&self) -> CallLog {
        self.state.lock().await.call_log.clone()
    }
}
