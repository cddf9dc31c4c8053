//! SnapStore - immutable snapshots of exercise source files
//!
//! Packages a set of `{path, content}` pairs into a single gzipped tar
//! archive and hands back an opaque reference. Snapshots are never modified
//! after they are written; every edit produces a new one.
//!
//! # Architecture
//!
//! ```text
//! snapshots/
//! ├── 019a3c1e-4f2b-7c00-9e1d-5a6b7c8d9e0f.tar.gz
//! ├── 019a3c1f-02aa-7d11-8b3c-0e1f2a3b4c5d.tar.gz
//! └── ...
//! ```
//!
//! Archives are flat: one regular-file entry per path, no directory entries,
//! no metadata beyond path and content.
//!
//! # Example
//!
//! ```ignore
//! use snapstore::{FileEntry, SnapshotStore};
//!
//! let store = SnapshotStore::open("snapshots")?;
//! let snapshot_ref = store.store(&[FileEntry::new("index.tsx", "export {}")])?;
//! let files = store.extract(&snapshot_ref)?;
//! ```

pub mod archive;
pub mod cli;
pub mod config;
mod error;
mod store;

pub use error::SnapshotError;
pub use store::{FileEntry, SnapshotRef, SnapshotStats, SnapshotStore};

/// Largest single file accepted into a snapshot (4MB)
pub const MAX_FILE_BYTES: u64 = 4 * 1024 * 1024;

/// Largest total content accepted into a snapshot (64MB)
pub const MAX_TOTAL_BYTES: u64 = 64 * 1024 * 1024;

/// Most files a single snapshot may hold
pub const MAX_FILE_COUNT: usize = 10_000;
