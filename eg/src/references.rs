//! Reference implementations offered to the model through `getCodeContext`
//!
//! The provider is built once from config and injected into every run.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::ReferencesConfig;
use crate::domain::SourceFile;

/// Extensions worth showing as examples
const REFERENCE_EXTENSIONS: &[&str] = &["ts", "tsx", "json", "css", "md"];

/// Directories never descended into
const SKIPPED_DIRS: &[&str] = &["node_modules", ".git", "dist", "build"];

/// Read-only source of example code
#[async_trait]
pub trait ReferenceProvider: Send + Sync {
    async fn references(&self) -> Result<Vec<SourceFile>, std::io::Error>;
}

/// Fixed reference set
#[derive(Debug, Clone, Default)]
pub struct StaticReferences {
    files: Vec<SourceFile>,
}

impl StaticReferences {
    pub fn new(files: Vec<SourceFile>) -> Self {
        Self { files }
    }
}

#[async_trait]
impl ReferenceProvider for StaticReferences {
    async fn references(&self) -> Result<Vec<SourceFile>, std::io::Error> {
        Ok(self.files.clone())
    }
}

/// References read from a directory of existing exercises
#[derive(Debug, Clone)]
pub struct DirectoryReferences {
    root: PathBuf,
    max_files: usize,
    max_bytes: usize,
}

impl DirectoryReferences {
    pub fn new(root: impl Into<PathBuf>, max_files: usize, max_bytes: usize) -> Self {
        Self {
            root: root.into(),
            max_files,
            max_bytes,
        }
    }

    fn collect(&self) -> Result<Vec<SourceFile>, std::io::Error> {
        debug!(root = %self.root.display(), "DirectoryReferences::collect: called");
        let mut files = Vec::new();
        let mut total = 0usize;

        let walker = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !(e.file_type().is_dir() && SKIPPED_DIRS.iter().any(|d| e.file_name() == *d)));

        for entry in walker {
            let entry = entry.map_err(std::io::Error::other)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let wanted = entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| REFERENCE_EXTENSIONS.contains(&e));
            if !wanted {
                continue;
            }

            let content = match std::fs::read_to_string(entry.path()) {
                Ok(c) => c,
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "Skipping unreadable reference file");
                    continue;
                }
            };
            if total + content.len() > self.max_bytes {
                debug!(total, "DirectoryReferences::collect: byte cap reached");
                break;
            }

            let rel = entry
                .path()
                .strip_prefix(&self.root)
                .map_err(std::io::Error::other)?
                .to_string_lossy()
                .replace('\\', "/");
            total += content.len();
            files.push(SourceFile::new(rel, content));

            if files.len() >= self.max_files {
                break;
            }
        }

        debug!(count = files.len(), bytes = total, "DirectoryReferences::collect: done");
        Ok(files)
    }
}

#[async_trait]
impl ReferenceProvider for DirectoryReferences {
    async fn references(&self) -> Result<Vec<SourceFile>, std::io::Error> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.collect())
            .await
            .map_err(std::io::Error::other)?
    }
}

/// Build the provider described by config
pub fn create_references(config: &ReferencesConfig) -> Arc<dyn ReferenceProvider> {
    match &config.directory {
        Some(dir) => Arc::new(DirectoryReferences::new(dir, config.max_files, config.max_bytes)),
        None => {
            debug!("create_references: no reference directory configured");
            Arc::new(StaticReferences::default())
        }
    }
}
