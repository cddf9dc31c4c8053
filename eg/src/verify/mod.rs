//! Sandboxed verification of candidate file sets
//!
//! A verifier materializes a file set for one exercise namespace somewhere
//! isolated, runs static checks over it, and reports diagnostics. Only
//! `error` diagnostics fail a verification.

mod command;
mod diagnostic;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::config::VerifierConfig;
use crate::domain::SourceFile;
use crate::guard::Namespace;

pub use command::CommandVerifier;
pub use diagnostic::{Diagnostic, PROJECT_FILE, Severity, parse_output, parse_tsc_line, parse_unix_line};

/// Infrastructure failures while verifying; check failures are diagnostics
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("Failed to prepare verification sandbox: {0}")]
    Setup(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of one verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    pub ok: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl VerifyReport {
    /// Build a report; `ok` iff no diagnostic is an error
    pub fn from_diagnostics(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            ok: !diagnostics.iter().any(Diagnostic::is_error),
            diagnostics,
        }
    }

    pub fn passed() -> Self {
        Self::from_diagnostics(Vec::new())
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }
}

/// Static checker for exercise file sets
#[async_trait]
pub trait Verifier: Send + Sync {
    /// Verify `files` (namespace-relative paths) materialized under `namespace`
    async fn verify(&self, files: &[SourceFile], namespace: &Namespace) -> Result<VerifyReport, VerifyError>;
}

/// Verifier that accepts everything
pub struct PassThroughVerifier;

#[async_trait]
impl Verifier for PassThroughVerifier {
    async fn verify(&self, _files: &[SourceFile], _namespace: &Namespace) -> Result<VerifyReport, VerifyError> {
        Ok(VerifyReport::passed())
    }
}

/// Build the verifier described by config
pub fn create_verifier(config: &VerifierConfig) -> Arc<dyn Verifier> {
    if config.enabled {
        Arc::new(CommandVerifier::from_config(config))
    } else {
        warn!("Verification disabled; every candidate will pass");
        Arc::new(PassThroughVerifier)
    }
}
