//! Verification gate
//!
//! Remembers only the most recent `verifyFiles` outcome. A write is allowed
//! iff that outcome passed and was computed for exactly the files being
//! written.

use tracing::debug;

use crate::domain::Fingerprint;

#[derive(Debug, Clone, Default)]
pub struct VerificationGate {
    last: Option<(Fingerprint, bool)>,
}

impl VerificationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a verification outcome, replacing any earlier one
    pub fn record(&mut self, fingerprint: Fingerprint, ok: bool) {
        debug!(%fingerprint, ok, "VerificationGate::record: called");
        self.last = Some((fingerprint, ok));
    }

    /// Check that `fingerprint` may be written
    ///
    /// On refusal, returns the reason.
    pub fn check(&self, fingerprint: &Fingerprint) -> Result<(), String> {
        match &self.last {
            None => Err("no verifyFiles call in this run".to_string()),
            Some((verified, _)) if verified != fingerprint => Err(format!(
                "last verified files ({}) differ from the files being written ({})",
                verified, fingerprint
            )),
            Some((_, false)) => Err("last verifyFiles for these files reported errors".to_string()),
            Some((_, true)) => Ok(()),
        }
    }

    /// Forget the last outcome
    pub fn reset(&mut self) {
        self.last = None;
    }
}
