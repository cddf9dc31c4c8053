//! Turn service
//!
//! Wires one user turn end to end: resolve the exercise, take its run lock,
//! open or continue a generation, run the agent and record the result
//! through the state manager.

mod locks;

use std::sync::Arc;

use eyre::Context;
use snapstore::SnapshotError;
use thiserror::Error;
use tokio::sync::AcquireError;
use tracing::{debug, info, warn};

use crate::agent::{AgentEngine, AgentError, AgentEvent, EventSink, RunOutcome, RunStats};
use crate::config::Config;
use crate::domain::{CallLog, ChainLink, Exercise, Generation, SourceFile};
use crate::guard::Namespace;
use crate::llm::{self, LlmClient, Message, Role};
use crate::references::{self, ReferenceProvider};
use crate::snapshot::{DiskSnapshots, SnapshotBackend, extract_or_empty};
use crate::state::{StateError, StateManager};
use crate::tools::ToolContext;
use crate::verify::{self, Verifier};

pub use locks::ExerciseLocks;

/// Errors surfaced to callers of the service
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Exercise not found: {0}")]
    ExerciseNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Exercise lock closed")]
    Lock(#[from] AcquireError),
}

/// How a turn ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed { snapshot_ref: String, summary: String },
    AwaitingInput { text: String },
    Failed { reason: String },
}

/// Result of a turn that did not abort
#[derive(Debug, Clone)]
pub struct TurnReport {
    /// The generation as stored after the turn
    pub generation: Generation,
    pub outcome: TurnOutcome,
    pub stats: RunStats,
    pub call_log: CallLog,
}

/// Latest prompt in the conversation
///
/// The last message must come from the user and carry text.
pub fn current_prompt(conversation: &[Message]) -> Result<String, ServiceError> {
    let last = conversation
        .last()
        .ok_or_else(|| ServiceError::InvalidRequest("no messages".to_string()))?;
    if last.role != Role::User {
        return Err(ServiceError::InvalidRequest(
            "last message must come from the user".to_string(),
        ));
    }
    let prompt = last.text();
    if prompt.trim().is_empty() {
        return Err(ServiceError::InvalidRequest("empty user message".to_string()));
    }
    Ok(prompt)
}

/// Runs user turns against exercises
pub struct GenerationService {
    state: StateManager,
    snapshots: Arc<dyn SnapshotBackend>,
    verifier: Arc<dyn Verifier>,
    references: Arc<dyn ReferenceProvider>,
    engine: AgentEngine,
    locks: ExerciseLocks,
}

impl GenerationService {
    pub fn new(
        state: StateManager,
        snapshots: Arc<dyn SnapshotBackend>,
        verifier: Arc<dyn Verifier>,
        references: Arc<dyn ReferenceProvider>,
        engine: AgentEngine,
    ) -> Self {
        Self {
            state,
            snapshots,
            verifier,
            references,
            engine,
            locks: ExerciseLocks::new(),
        }
    }

    /// Build the service from config, with the configured model client
    pub fn from_config(config: &Config) -> eyre::Result<Self> {
        let llm = llm::create_client(&config.llm).context("Failed to create LLM client")?;
        Self::from_config_with_llm(config, llm)
    }

    pub fn from_config_with_llm(config: &Config, llm: Arc<dyn LlmClient>) -> eyre::Result<Self> {
        debug!(data_dir = %config.storage.data_dir.display(), "GenerationService::from_config_with_llm: called");
        let state = StateManager::spawn(config.storage.database_path()).context("Failed to open generation store")?;
        let snapshots = DiskSnapshots::open(config.storage.snapshot_dir()).context("Failed to open snapshot store")?;

        Ok(Self::new(
            state,
            Arc::new(snapshots),
            verify::create_verifier(&config.verifier),
            references::create_references(&config.references),
            AgentEngine::new(llm, config.agent.clone()),
        ))
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    pub async fn exercise(&self, slug: &str) -> Result<Exercise, ServiceError> {
        self.state
            .get_exercise_by_slug(slug)
            .await?
            .ok_or_else(|| ServiceError::ExerciseNotFound(slug.to_string()))
    }

    /// Run one user turn
    ///
    /// Budget exhaustion marks the generation failed and is reported as a
    /// `Failed` outcome. Any other error aborts the turn and leaves the
    /// generation as it was.
    pub async fn submit(
        &self,
        slug: &str,
        conversation: Vec<Message>,
        events: &EventSink,
    ) -> Result<TurnReport, ServiceError> {
        debug!(%slug, messages = conversation.len(), "GenerationService::submit: called");
        let prompt = current_prompt(&conversation)?;
        let exercise = self.exercise(slug).await?;

        if self.locks.is_busy(slug).await {
            info!(%slug, "Waiting for the running turn to finish");
        }
        let _permit = self.locks.acquire(slug).await?;

        let opened = self.state.continue_or_create(&exercise.id, &prompt).await?;
        let generation = opened.generation;
        info!(
            %slug,
            generation = %generation.id,
            seq = generation.seq,
            created = opened.created,
            "Turn started"
        );
        events
            .emit(AgentEvent::Started {
                generation_id: generation.id.clone(),
                seq: generation.seq,
                created: opened.created,
            })
            .await;

        let prior = self.state.resolve_prior_context(&generation.id).await?;
        let ctx = ToolContext::new(
            Namespace::for_exercise(slug),
            prior.last_snapshot_ref.clone(),
            self.snapshots.clone(),
            self.verifier.clone(),
            self.references.clone(),
        );

        let run = self.engine.run(&prior, conversation, &ctx, events).await;
        let call_log = ctx.call_log().await;

        let (generation, outcome, stats) = match run {
            Ok((RunOutcome::Written { snapshot_ref, summary }, stats)) => {
                let generation = self.state.complete(&generation.id, &summary, &snapshot_ref).await?;
                events
                    .emit(AgentEvent::Completed {
                        generation_id: generation.id.clone(),
                        snapshot_ref: snapshot_ref.clone(),
                        summary: summary.clone(),
                    })
                    .await;
                (generation, TurnOutcome::Completed { snapshot_ref, summary }, stats)
            }
            Ok((RunOutcome::AwaitingInput { text }, stats)) => {
                events
                    .emit(AgentEvent::AwaitingInput {
                        generation_id: generation.id.clone(),
                        text: text.clone(),
                    })
                    .await;
                (generation, TurnOutcome::AwaitingInput { text }, stats)
            }
            Err(e) if e.is_budget_exhausted() => {
                let reason = e.to_string();
                warn!(generation = %generation.id, %reason, "Marking generation failed");
                let generation = self.state.mark_failed(&generation.id, &reason).await?;
                events
                    .emit(AgentEvent::Failed {
                        generation_id: generation.id.clone(),
                        reason: reason.clone(),
                    })
                    .await;
                let stats = e.stats().unwrap_or_default();
                (generation, TurnOutcome::Failed { reason }, stats)
            }
            Err(e) => {
                warn!(generation = %generation.id, error = %e, "Turn aborted");
                return Err(e.into());
            }
        };

        info!(%slug, generation = %generation.id, status = %generation.status, "Turn finished");
        Ok(TurnReport {
            generation,
            outcome,
            stats,
            call_log,
        })
    }

    /// Generations of an exercise, oldest first
    pub async fn history(&self, slug: &str) -> Result<Vec<Generation>, ServiceError> {
        let exercise = self.exercise(slug).await?;
        Ok(self.state.list_generations(&exercise.id).await?)
    }

    pub async fn chain(&self, slug: &str) -> Result<Vec<ChainLink>, ServiceError> {
        let exercise = self.exercise(slug).await?;
        Ok(self.state.snapshot_chain(&exercise.id).await?)
    }

    /// Files of a completed generation, or of the latest one
    ///
    /// Paths are repository-relative. An exercise with no completed
    /// generation has no files.
    pub async fn files(&self, slug: &str, generation_id: Option<&str>) -> Result<Vec<SourceFile>, ServiceError> {
        let exercise = self.exercise(slug).await?;
        let snapshot_ref = match generation_id {
            Some(id) => {
                let generation = self
                    .state
                    .get_generation(id)
                    .await?
                    .filter(|g| g.exercise_id == exercise.id)
                    .ok_or_else(|| StateError::NotFound(format!("generation {}", id)))?;
                generation.snapshot_ref
            }
            None => self.state.latest_snapshot_ref(&exercise.id).await?,
        };

        let namespace = Namespace::for_exercise(slug);
        let files = extract_or_empty(self.snapshots.as_ref(), snapshot_ref.as_deref()).await?;
        Ok(files
            .into_iter()
            .map(|f| SourceFile::new(namespace.to_repo_path(&f.path), f.content))
            .collect())
    }
}
