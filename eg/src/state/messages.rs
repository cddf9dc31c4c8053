//! State manager messages
//!
//! Commands and responses for the actor pattern.

use thiserror::Error;
use tokio::sync::oneshot;

use crate::domain::{ChainLink, Exercise, Generation, GenerationStatus, PriorContext};

/// Errors from state operations
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A terminal transition was requested for a generation that is no longer generating
    #[error("Generation {id} is {status}, not generating")]
    DoubleCompletion { id: String, status: GenerationStatus },

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Channel error")]
    ChannelError,
}

impl From<rusqlite::Error> for StateError {
    fn from(e: rusqlite::Error) -> Self {
        StateError::StoreError(e.to_string())
    }
}

/// Response from state operations
pub type StateResponse<T> = Result<T, StateError>;

/// Result of `continue_or_create`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedGeneration {
    pub generation: Generation,
    /// False when an in-flight generation was continued
    pub created: bool,
}

/// Commands sent to the StateManager actor
#[derive(Debug)]
pub enum StateCommand {
    CreateExercise {
        exercise: Exercise,
        reply: oneshot::Sender<StateResponse<Exercise>>,
    },
    GetExerciseBySlug {
        slug: String,
        reply: oneshot::Sender<StateResponse<Option<Exercise>>>,
    },
    ListExercises {
        reply: oneshot::Sender<StateResponse<Vec<Exercise>>>,
    },

    ContinueOrCreate {
        exercise_id: String,
        prompt: String,
        reply: oneshot::Sender<StateResponse<OpenedGeneration>>,
    },
    ResolvePriorContext {
        generation_id: String,
        reply: oneshot::Sender<StateResponse<PriorContext>>,
    },
    Complete {
        generation_id: String,
        summary: String,
        snapshot_ref: String,
        reply: oneshot::Sender<StateResponse<Generation>>,
    },
    MarkFailed {
        generation_id: String,
        reason: String,
        reply: oneshot::Sender<StateResponse<Generation>>,
    },
    GetGeneration {
        id: String,
        reply: oneshot::Sender<StateResponse<Option<Generation>>>,
    },
    ListGenerations {
        exercise_id: String,
        reply: oneshot::Sender<StateResponse<Vec<Generation>>>,
    },
    SnapshotChain {
        exercise_id: String,
        reply: oneshot::Sender<StateResponse<Vec<ChainLink>>>,
    },

    Shutdown,
}
