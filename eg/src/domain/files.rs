//! Source file sets and their fingerprints

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One source file: a relative path and its UTF-8 content
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: String,
    pub content: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

impl From<snapstore::FileEntry> for SourceFile {
    fn from(entry: snapstore::FileEntry) -> Self {
        Self {
            path: entry.path,
            content: entry.content,
        }
    }
}

impl From<SourceFile> for snapstore::FileEntry {
    fn from(file: SourceFile) -> Self {
        snapstore::FileEntry {
            path: file.path,
            content: file.content,
        }
    }
}

/// Order-independent identity of a file set
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0[..12])
    }
}

/// Fingerprint a file set by value
///
/// Files are hashed in path order with length prefixes, so two sets with
/// the same pairs in any order agree. Returns the offending path when the
/// set names a path twice.
pub fn fingerprint(files: &[SourceFile]) -> Result<Fingerprint, String> {
    let mut sorted: Vec<&SourceFile> = files.iter().collect();
    sorted.sort_by(|a, b| a.path.cmp(&b.path));

    let mut hasher = Sha256::new();
    let mut previous: Option<&str> = None;
    for file in sorted {
        if previous == Some(file.path.as_str()) {
            return Err(file.path.clone());
        }
        previous = Some(&file.path);

        hasher.update((file.path.len() as u64).to_le_bytes());
        hasher.update(file.path.as_bytes());
        hasher.update((file.content.len() as u64).to_le_bytes());
        hasher.update(file.content.as_bytes());
    }

    Ok(Fingerprint(hex::encode(hasher.finalize())))
}

/// Overlay `candidate` on `base`; candidate paths win
pub fn merge_over(base: &[SourceFile], candidate: &[SourceFile]) -> Vec<SourceFile> {
    let mut merged: BTreeMap<&str, &str> = base.iter().map(|f| (f.path.as_str(), f.content.as_str())).collect();
    for file in candidate {
        merged.insert(&file.path, &file.content);
    }
    merged
        .into_iter()
        .map(|(path, content)| SourceFile::new(path, content))
        .collect()
}
