//! Verifier that runs checker commands in a throwaway directory

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::VerifierConfig;
use crate::domain::SourceFile;
use crate::guard::Namespace;

use super::diagnostic::{Diagnostic, PROJECT_FILE, parse_output};
use super::{VerifyError, VerifyReport, Verifier};

/// Dependencies are linked, not copied
const LINKED_DIRS: &[&str] = &["node_modules"];

/// Characters of raw output kept when a check fails without parsable output
const OUTPUT_TAIL_CHARS: usize = 2000;

/// Output of one check command
#[derive(Debug)]
struct CheckOutput {
    command: String,
    exit_code: Option<i32>,
    output: String,
    timed_out: bool,
    duration_ms: u64,
}

/// Runs configured check commands over a materialized file set
///
/// Each verification gets a fresh temporary directory holding a copy of the
/// scaffold (project config, lint rules) with the file set written under the
/// namespace. Nothing outside that directory is touched.
pub struct CommandVerifier {
    scaffold_dir: Option<PathBuf>,
    commands: Vec<String>,
    timeout: Duration,
}

impl CommandVerifier {
    pub fn new(scaffold_dir: Option<PathBuf>, commands: Vec<String>, timeout: Duration) -> Self {
        Self {
            scaffold_dir,
            commands,
            timeout,
        }
    }

    pub fn from_config(config: &VerifierConfig) -> Self {
        Self::new(
            config.scaffold_dir.clone(),
            config.commands.clone(),
            Duration::from_millis(config.timeout_ms),
        )
    }

    /// Lay out scaffold and files under `root`
    async fn materialize(&self, root: &Path, files: &[SourceFile], namespace: &Namespace) -> Result<(), VerifyError> {
        debug!(root = %root.display(), count = files.len(), "CommandVerifier::materialize: called");

        if let Some(scaffold) = &self.scaffold_dir {
            let scaffold = scaffold.clone();
            let root = root.to_path_buf();
            tokio::task::spawn_blocking(move || copy_scaffold(&scaffold, &root))
                .await
                .map_err(|e| VerifyError::Setup(e.to_string()))??;
        }

        let ns_dir = root.join(namespace.as_str());
        // Whatever the scaffold shipped for this namespace is replaced by the candidate
        if ns_dir.exists() {
            tokio::fs::remove_dir_all(&ns_dir).await?;
        }
        tokio::fs::create_dir_all(&ns_dir).await?;

        for file in files {
            let target = ns_dir.join(&file.path);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&target, &file.content).await?;
        }

        Ok(())
    }

    /// Run one check command with the timeout applied
    async fn run_check(&self, command: &str, root: &Path) -> Result<CheckOutput, VerifyError> {
        debug!(%command, "CommandVerifier::run_check: called");
        let start = Instant::now();

        let child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(root)
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(self.timeout, child).await {
            Ok(output) => {
                let output = output?;
                let mut text = String::from_utf8_lossy(&output.stdout).to_string();
                text.push_str(&String::from_utf8_lossy(&output.stderr));
                Ok(CheckOutput {
                    command: command.to_string(),
                    exit_code: output.status.code(),
                    output: text,
                    timed_out: false,
                    duration_ms: start.elapsed().as_millis() as u64,
                })
            }
            Err(_) => {
                warn!(%command, timeout_ms = self.timeout.as_millis() as u64, "Check timed out");
                Ok(CheckOutput {
                    command: command.to_string(),
                    exit_code: None,
                    output: String::new(),
                    timed_out: true,
                    duration_ms: start.elapsed().as_millis() as u64,
                })
            }
        }
    }
}

/// Turn one check's output into diagnostics
fn check_diagnostics(check: &CheckOutput, root: &str) -> Vec<Diagnostic> {
    if check.timed_out {
        return vec![Diagnostic::error(
            PROJECT_FILE,
            None,
            format!("`{}` timed out after {}ms", check.command, check.duration_ms),
        )];
    }

    let mut diagnostics = parse_output(&check.output, Some(root));
    let failed = check.exit_code != Some(0);

    if failed && !diagnostics.iter().any(Diagnostic::is_error) {
        diagnostics.push(Diagnostic::error(
            PROJECT_FILE,
            None,
            format!(
                "`{}` exited with {} and no parsable errors:\n{}",
                check.command,
                check
                    .exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "a signal".to_string()),
                tail(&check.output, OUTPUT_TAIL_CHARS)
            ),
        ));
    }

    diagnostics
}

/// Warnings about files outside the namespace are noise; errors still block
fn keep_diagnostic(diagnostic: &Diagnostic, namespace: &Namespace) -> bool {
    diagnostic.is_error() || namespace.is_authorized(&diagnostic.file)
}

fn tail(text: &str, max_chars: usize) -> &str {
    let trimmed = text.trim_end();
    let count = trimmed.chars().count();
    if count <= max_chars {
        return trimmed;
    }
    let skip = count - max_chars;
    let byte_index = trimmed.char_indices().nth(skip).map(|(i, _)| i).unwrap_or(0);
    &trimmed[byte_index..]
}

fn copy_scaffold(scaffold: &Path, root: &Path) -> Result<(), VerifyError> {
    if !scaffold.is_dir() {
        return Err(VerifyError::Setup(format!(
            "scaffold directory not found: {}",
            scaffold.display()
        )));
    }

    let walker = WalkDir::new(scaffold).follow_links(false).into_iter().filter_entry(|entry| {
        let linked = entry.depth() == 1 && LINKED_DIRS.iter().any(|name| entry.file_name() == *name);
        if linked {
            link_dir(entry.path(), &root.join(entry.file_name()));
        }
        !linked
    });

    for entry in walker {
        let entry = entry.map_err(|e| VerifyError::Setup(e.to_string()))?;
        let rel = entry
            .path()
            .strip_prefix(scaffold)
            .map_err(|e| VerifyError::Setup(e.to_string()))?;
        let target = root.join(rel);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            std::fs::copy(entry.path(), &target)?;
        }
    }

    Ok(())
}

#[cfg(unix)]
fn link_dir(source: &Path, target: &Path) {
    if let Err(e) = std::os::unix::fs::symlink(source, target) {
        warn!(source = %source.display(), error = %e, "Failed to link scaffold directory");
    }
}

#[cfg(not(unix))]
fn link_dir(source: &Path, _target: &Path) {
    warn!(source = %source.display(), "Scaffold directory links are only supported on unix");
}

#[async_trait]
impl Verifier for CommandVerifier {
    async fn verify(&self, files: &[SourceFile], namespace: &Namespace) -> Result<VerifyReport, VerifyError> {
        debug!(count = files.len(), %namespace, "CommandVerifier::verify: called");

        let workdir = tempfile::Builder::new().prefix("exgen-verify-").tempdir()?;
        self.materialize(workdir.path(), files, namespace).await?;

        let root = workdir.path().to_string_lossy().to_string();
        let mut diagnostics = Vec::new();

        for template in &self.commands {
            let command = template.replace("{namespace}", namespace.as_str());
            let check = self.run_check(&command, workdir.path()).await?;
            debug!(
                command = %check.command,
                exit_code = ?check.exit_code,
                duration_ms = check.duration_ms,
                "CommandVerifier::verify: check finished"
            );
            diagnostics.extend(
                check_diagnostics(&check, &root)
                    .into_iter()
                    .filter(|d| keep_diagnostic(d, namespace)),
            );
        }

        let report = VerifyReport::from_diagnostics(diagnostics);
        info!(
            %namespace,
            ok = report.ok,
            errors = report.error_count(),
            total = report.diagnostics.len(),
            "Verification finished"
        );
        Ok(report)
    }
}
