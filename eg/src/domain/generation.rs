//! Generation records and lifecycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::generate_id;

/// Lifecycle of a generation
///
/// `Generating` is the only non-terminal state. At most one generation per
/// exercise is in it at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    Generating,
    Completed,
    Failed,
}

impl GenerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generating => "generating",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "generating" => Some(Self::Generating),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Generating)
    }
}

impl std::fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One user turn's worth of generation work for an exercise
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generation {
    pub id: String,
    pub exercise_id: String,
    /// Position in the exercise's history, starting at 1
    pub seq: u32,
    pub prompt: String,
    pub status: GenerationStatus,
    pub summary: Option<String>,
    /// Set exactly when status is `Completed`
    pub snapshot_ref: Option<String>,
    /// Snapshot of the latest completed generation when this one was opened
    pub base_snapshot_ref: Option<String>,
    /// Reason recorded on transition to `Failed`
    pub failure: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Generation {
    /// Open a new generation in the `Generating` state
    pub fn open(
        exercise_id: impl Into<String>,
        exercise_slug: &str,
        seq: u32,
        prompt: impl Into<String>,
        base_snapshot_ref: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id("gen", &format!("{}-{}", exercise_slug, seq)),
            exercise_id: exercise_id.into(),
            seq,
            prompt: prompt.into(),
            status: GenerationStatus::Generating,
            summary: None,
            snapshot_ref: None,
            base_snapshot_ref,
            failure: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_generating(&self) -> bool {
        !self.status.is_terminal()
    }
}

/// What the next run builds on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriorContext {
    /// Prompt of the first generation in the exercise's history
    pub base_prompt: String,
    /// Snapshot the current generation extends, if any
    pub last_snapshot_ref: Option<String>,
    /// Current prompt when it refines the base, `None` on the creation turn
    pub last_user_instruction: Option<String>,
}

/// One completed generation in an exercise's snapshot chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainLink {
    pub generation_id: String,
    pub seq: u32,
    pub snapshot_ref: String,
    /// Snapshot this one was built on; the previous link's ref, or none for the first
    pub base_snapshot_ref: Option<String>,
}
