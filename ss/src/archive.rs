//! Deterministic tar.gz packing for file sets
//!
//! Entries are written in path order with zeroed mtime, fixed mode and no
//! owner information, so the same file set always produces the same bytes.

use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::{Component, Path};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tracing::debug;

use crate::store::FileEntry;
use crate::{MAX_FILE_BYTES, MAX_FILE_COUNT, MAX_TOTAL_BYTES, SnapshotError};

const FILE_MODE: u32 = 0o644;

/// Check that a path is safe to store as an archive entry
///
/// Paths must be relative, use `/` separators, and contain only normal
/// components.
pub fn validate_entry_path(path: &str) -> Result<(), SnapshotError> {
    let invalid = |reason| SnapshotError::InvalidPath {
        path: path.to_string(),
        reason,
    };

    if path.is_empty() {
        return Err(invalid("empty path"));
    }
    if path.contains('\\') || path.contains('\0') {
        return Err(invalid("backslash or NUL byte"));
    }
    if path.starts_with('/') || Path::new(path).is_absolute() {
        return Err(invalid("absolute path"));
    }
    if path.ends_with('/') {
        return Err(invalid("trailing separator"));
    }

    for segment in path.split('/') {
        match segment {
            "" => return Err(invalid("empty component")),
            "." => return Err(invalid("current directory component")),
            ".." => return Err(invalid("parent directory component")),
            _ => {}
        }
    }

    for component in Path::new(path).components() {
        match component {
            Component::Normal(_) => {}
            Component::ParentDir => return Err(invalid("parent directory component")),
            Component::CurDir => return Err(invalid("current directory component")),
            _ => return Err(invalid("non-relative component")),
        }
    }

    Ok(())
}

/// Pack a file set into gzipped tar bytes
pub fn pack(files: &[FileEntry]) -> Result<Vec<u8>, SnapshotError> {
    debug!(count = files.len(), "pack: called");

    if files.len() > MAX_FILE_COUNT {
        return Err(SnapshotError::TooLarge(format!(
            "{} files (max {})",
            files.len(),
            MAX_FILE_COUNT
        )));
    }

    let mut sorted: Vec<&FileEntry> = files.iter().collect();
    sorted.sort_by(|a, b| a.path.cmp(&b.path));

    let mut total_bytes = 0u64;
    for pair in sorted.windows(2) {
        if pair[0].path == pair[1].path {
            return Err(SnapshotError::DuplicatePath(pair[0].path.clone()));
        }
    }
    for file in &sorted {
        validate_entry_path(&file.path)?;
        let size = file.content.len() as u64;
        if size > MAX_FILE_BYTES {
            return Err(SnapshotError::TooLarge(format!(
                "{} is {} bytes (max {})",
                file.path, size, MAX_FILE_BYTES
            )));
        }
        total_bytes += size;
    }
    if total_bytes > MAX_TOTAL_BYTES {
        return Err(SnapshotError::TooLarge(format!(
            "{} total bytes (max {})",
            total_bytes, MAX_TOTAL_BYTES
        )));
    }

    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.mode(tar::HeaderMode::Deterministic);

    for file in sorted {
        let bytes = file.content.as_bytes();
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(bytes.len() as u64);
        header.set_mode(FILE_MODE);
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);
        builder.append_data(&mut header, &file.path, bytes)?;
    }

    let mut encoder = builder.into_inner()?;
    encoder.flush()?;
    let bytes = encoder.finish()?;

    debug!(bytes = bytes.len(), "pack: done");
    Ok(bytes)
}

/// Unpack gzipped tar bytes into a file set
///
/// Rejects links, unsafe paths, duplicate entries and non-UTF-8 content.
/// Directory entries are skipped.
pub fn unpack(bytes: &[u8]) -> Result<Vec<FileEntry>, SnapshotError> {
    debug!(bytes = bytes.len(), "unpack: called");

    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    let entries = archive
        .entries()
        .map_err(|e| SnapshotError::Corrupt(format!("failed to read entries: {e}")))?;

    let mut files = Vec::new();
    let mut seen = HashSet::new();
    let mut total_bytes = 0u64;

    for entry_result in entries {
        let mut entry = entry_result.map_err(|e| SnapshotError::Corrupt(format!("bad entry: {e}")))?;
        let entry_path = entry
            .path()
            .map_err(|e| SnapshotError::Corrupt(format!("bad entry path: {e}")))?
            .to_path_buf();
        let path = entry_path
            .to_str()
            .ok_or_else(|| SnapshotError::Corrupt(format!("non-UTF-8 path: {}", entry_path.display())))?
            .to_string();

        let entry_type = entry.header().entry_type();
        match entry_type {
            tar::EntryType::Directory => continue,
            tar::EntryType::Regular | tar::EntryType::Continuous => {}
            tar::EntryType::Symlink | tar::EntryType::Link => {
                return Err(SnapshotError::Corrupt(format!("symlink/hardlink entry: {path}")));
            }
            other => {
                return Err(SnapshotError::Corrupt(format!("unsupported entry type {other:?}: {path}")));
            }
        }

        validate_entry_path(&path)?;

        let size = entry.size();
        if size > MAX_FILE_BYTES {
            return Err(SnapshotError::TooLarge(format!("{path} is {size} bytes")));
        }
        total_bytes += size;
        if total_bytes > MAX_TOTAL_BYTES {
            return Err(SnapshotError::TooLarge(format!("more than {MAX_TOTAL_BYTES} total bytes")));
        }
        if seen.len() >= MAX_FILE_COUNT {
            return Err(SnapshotError::TooLarge(format!("more than {MAX_FILE_COUNT} files")));
        }
        if !seen.insert(path.clone()) {
            return Err(SnapshotError::DuplicatePath(path));
        }

        let mut raw = Vec::with_capacity(size as usize);
        entry.read_to_end(&mut raw)?;
        let content = String::from_utf8(raw).map_err(|_| SnapshotError::Corrupt(format!("non-UTF-8 content: {path}")))?;

        files.push(FileEntry { path, content });
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    debug!(count = files.len(), "unpack: done");
    Ok(files)
}
