//! Domain types for exgen
//!
//! Exercises own an append-only chain of generations. Each completed
//! generation points at an immutable snapshot of the exercise's files.

mod call_log;
mod exercise;
mod files;
mod generation;
mod id;

pub use call_log::{CallLog, CallOutcome, CallRecord};
pub use exercise::{Exercise, is_valid_slug};
pub use files::{Fingerprint, SourceFile, fingerprint, merge_over};
pub use generation::{ChainLink, Generation, GenerationStatus, PriorContext};
pub use id::{generate_id, slugify};
