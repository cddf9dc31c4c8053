//! StateManager - actor that owns the GenerationStore
//!
//! Every lifecycle transition goes through a single task, so the
//! continue-or-create check and the insert it guards cannot interleave.

use std::path::Path;

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::domain::{ChainLink, Exercise, Generation, PriorContext};

use super::messages::{OpenedGeneration, StateCommand, StateError, StateResponse};
use super::store::GenerationStore;

/// Broadcast when a generation changes state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateEvent {
    GenerationCreated { id: String, exercise_id: String, seq: u32 },
    GenerationCompleted { id: String, snapshot_ref: String },
    GenerationFailed { id: String, reason: String },
}

/// Handle to send commands to the StateManager
#[derive(Clone)]
pub struct StateManager {
    tx: mpsc::Sender<StateCommand>,
    event_tx: broadcast::Sender<StateEvent>,
}

impl StateManager {
    /// Spawn a new StateManager actor over the database at `db_path`
    pub fn spawn(db_path: impl AsRef<Path>) -> eyre::Result<Self> {
        debug!(db_path = %db_path.as_ref().display(), "StateManager::spawn: called");
        let store = GenerationStore::open(db_path.as_ref())?;
        Ok(Self::with_store(store))
    }

    /// Spawn over an in-memory database
    pub fn spawn_in_memory() -> eyre::Result<Self> {
        Ok(Self::with_store(GenerationStore::open_in_memory()?))
    }

    fn with_store(store: GenerationStore) -> Self {
        let (tx, rx) = mpsc::channel(256);
        let (event_tx, _) = broadcast::channel(64);

        tokio::spawn(actor_loop(store, rx));
        info!("StateManager spawned");

        Self { tx, event_tx }
    }

    /// Subscribe to generation state changes
    pub fn subscribe_events(&self) -> broadcast::Receiver<StateEvent> {
        self.event_tx.subscribe()
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<StateResponse<T>>) -> StateCommand) -> StateResponse<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    // === Exercises ===

    pub async fn create_exercise(&self, slug: &str, title: &str) -> StateResponse<Exercise> {
        debug!(%slug, "create_exercise: called");
        let exercise = Exercise::new(slug, title);
        self.request(|reply| StateCommand::CreateExercise { exercise, reply }).await
    }

    pub async fn get_exercise_by_slug(&self, slug: &str) -> StateResponse<Option<Exercise>> {
        debug!(%slug, "get_exercise_by_slug: called");
        self.request(|reply| StateCommand::GetExerciseBySlug {
            slug: slug.to_string(),
            reply,
        })
        .await
    }

    /// Get an exercise by slug, returning error if not found
    pub async fn get_exercise_required(&self, slug: &str) -> StateResponse<Exercise> {
        self.get_exercise_by_slug(slug)
            .await?
            .ok_or_else(|| StateError::NotFound(format!("exercise {}", slug)))
    }

    pub async fn list_exercises(&self) -> StateResponse<Vec<Exercise>> {
        debug!("list_exercises: called");
        self.request(|reply| StateCommand::ListExercises { reply }).await
    }

    // === Generations ===

    /// Return the exercise's in-flight generation, or open the next one
    pub async fn continue_or_create(&self, exercise_id: &str, prompt: &str) -> StateResponse<OpenedGeneration> {
        debug!(%exercise_id, "continue_or_create: called");
        let opened = self
            .request(|reply| StateCommand::ContinueOrCreate {
                exercise_id: exercise_id.to_string(),
                prompt: prompt.to_string(),
                reply,
            })
            .await?;

        if opened.created {
            let _ = self.event_tx.send(StateEvent::GenerationCreated {
                id: opened.generation.id.clone(),
                exercise_id: opened.generation.exercise_id.clone(),
                seq: opened.generation.seq,
            });
        }
        Ok(opened)
    }

    pub async fn resolve_prior_context(&self, generation_id: &str) -> StateResponse<PriorContext> {
        debug!(%generation_id, "resolve_prior_context: called");
        self.request(|reply| StateCommand::ResolvePriorContext {
            generation_id: generation_id.to_string(),
            reply,
        })
        .await
    }

    /// Mark a generation completed with the snapshot it produced
    pub async fn complete(&self, generation_id: &str, summary: &str, snapshot_ref: &str) -> StateResponse<Generation> {
        debug!(%generation_id, %snapshot_ref, "complete: called");
        let generation = self
            .request(|reply| StateCommand::Complete {
                generation_id: generation_id.to_string(),
                summary: summary.to_string(),
                snapshot_ref: snapshot_ref.to_string(),
                reply,
            })
            .await?;

        let _ = self.event_tx.send(StateEvent::GenerationCompleted {
            id: generation.id.clone(),
            snapshot_ref: snapshot_ref.to_string(),
        });
        Ok(generation)
    }

    pub async fn mark_failed(&self, generation_id: &str, reason: &str) -> StateResponse<Generation> {
        debug!(%generation_id, %reason, "mark_failed: called");
        let generation = self
            .request(|reply| StateCommand::MarkFailed {
                generation_id: generation_id.to_string(),
                reason: reason.to_string(),
                reply,
            })
            .await?;

        let _ = self.event_tx.send(StateEvent::GenerationFailed {
            id: generation.id.clone(),
            reason: reason.to_string(),
        });
        Ok(generation)
    }

    pub async fn get_generation(&self, id: &str) -> StateResponse<Option<Generation>> {
        debug!(%id, "get_generation: called");
        self.request(|reply| StateCommand::GetGeneration {
            id: id.to_string(),
            reply,
        })
        .await
    }

    pub async fn list_generations(&self, exercise_id: &str) -> StateResponse<Vec<Generation>> {
        debug!(%exercise_id, "list_generations: called");
        self.request(|reply| StateCommand::ListGenerations {
            exercise_id: exercise_id.to_string(),
            reply,
        })
        .await
    }

    pub async fn snapshot_chain(&self, exercise_id: &str) -> StateResponse<Vec<ChainLink>> {
        debug!(%exercise_id, "snapshot_chain: called");
        self.request(|reply| StateCommand::SnapshotChain {
            exercise_id: exercise_id.to_string(),
            reply,
        })
        .await
    }

    /// Latest completed snapshot for an exercise, if any
    pub async fn latest_snapshot_ref(&self, exercise_id: &str) -> StateResponse<Option<String>> {
        Ok(self
            .snapshot_chain(exercise_id)
            .await?
            .pop()
            .map(|link| link.snapshot_ref))
    }

    /// Shutdown the StateManager
    pub async fn shutdown(&self) -> Result<(), StateError> {
        debug!("shutdown: called");
        self.tx
            .send(StateCommand::Shutdown)
            .await
            .map_err(|_| StateError::ChannelError)
    }
}

async fn actor_loop(mut store: GenerationStore, mut rx: mpsc::Receiver<StateCommand>) {
    debug!("StateManager actor started");

    while let Some(cmd) = rx.recv().await {
        match cmd {
            StateCommand::CreateExercise { exercise, reply } => {
                debug!(slug = %exercise.slug, "actor_loop: CreateExercise command");
                let result = store.insert_exercise(&exercise).map(|_| exercise);
                let _ = reply.send(result);
            }

            StateCommand::GetExerciseBySlug { slug, reply } => {
                debug!(%slug, "actor_loop: GetExerciseBySlug command");
                let _ = reply.send(store.get_exercise_by_slug(&slug));
            }

            StateCommand::ListExercises { reply } => {
                debug!("actor_loop: ListExercises command");
                let _ = reply.send(store.list_exercises());
            }

            StateCommand::ContinueOrCreate {
                exercise_id,
                prompt,
                reply,
            } => {
                debug!(%exercise_id, "actor_loop: ContinueOrCreate command");
                let _ = reply.send(store.continue_or_create(&exercise_id, &prompt));
            }

            StateCommand::ResolvePriorContext { generation_id, reply } => {
                debug!(%generation_id, "actor_loop: ResolvePriorContext command");
                let _ = reply.send(store.prior_context(&generation_id));
            }

            StateCommand::Complete {
                generation_id,
                summary,
                snapshot_ref,
                reply,
            } => {
                debug!(%generation_id, "actor_loop: Complete command");
                let result = store.complete(&generation_id, &summary, &snapshot_ref);
                if let Err(e) = &result {
                    warn!(%generation_id, error = %e, "Completion rejected");
                }
                let _ = reply.send(result);
            }

            StateCommand::MarkFailed {
                generation_id,
                reason,
                reply,
            } => {
                debug!(%generation_id, "actor_loop: MarkFailed command");
                let _ = reply.send(store.mark_failed(&generation_id, &reason));
            }

            StateCommand::GetGeneration { id, reply } => {
                debug!(%id, "actor_loop: GetGeneration command");
                let _ = reply.send(store.get_generation(&id));
            }

            StateCommand::ListGenerations { exercise_id, reply } => {
                debug!(%exercise_id, "actor_loop: ListGenerations command");
                let _ = reply.send(store.list_generations(&exercise_id));
            }

            StateCommand::SnapshotChain { exercise_id, reply } => {
                debug!(%exercise_id, "actor_loop: SnapshotChain command");
                let _ = reply.send(store.snapshot_chain(&exercise_id));
            }

            StateCommand::Shutdown => {
                info!("StateManager shutting down");
                break;
            }
        }
    }

    debug!("StateManager actor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::GenerationStatus;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_exercise_lifecycle() {
        let temp = tempdir().unwrap();
        let manager = StateManager::spawn(temp.path().join("exgen.db")).unwrap();

        let exercise = manager.create_exercise("odd-one-out", "Odd One Out").await.unwrap();
        let found = manager.get_exercise_required("odd-one-out").await.unwrap();
        assert_eq!(found, exercise);

        assert!(matches!(
            manager.get_exercise_required("missing").await.unwrap_err(),
            StateError::NotFound(_)
        ));
        assert_eq!(manager.list_exercises().await.unwrap().len(), 1);

        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_submissions_share_one_generation() {
        let manager = StateManager::spawn_in_memory().unwrap();
        let exercise = manager.create_exercise("odd-one-out", "Odd One Out").await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let manager = manager.clone();
            let exercise_id = exercise.id.clone();
            handles.push(tokio::spawn(async move {
                manager
                    .continue_or_create(&exercise_id, &format!("prompt {i}"))
                    .await
                    .unwrap()
            }));
        }

        let mut ids = Vec::new();
        let mut created = 0;
        for handle in handles {
            let opened = handle.await.unwrap();
            created += usize::from(opened.created);
            ids.push(opened.generation.id);
        }
        ids.dedup();

        assert_eq!(created, 1);
        assert_eq!(ids.len(), 1);
        let generations = manager.list_generations(&exercise.id).await.unwrap();
        assert_eq!(generations.len(), 1);
        assert_eq!(generations[0].status, GenerationStatus::Generating);
    }

    #[tokio::test]
    async fn test_complete_once_and_events() {
        let manager = StateManager::spawn_in_memory().unwrap();
        let mut events = manager.subscribe_events();
        let exercise = manager.create_exercise("odd-one-out", "Odd One Out").await.unwrap();

        let opened = manager.continue_or_create(&exercise.id, "P1").await.unwrap();
        let id = opened.generation.id.clone();
        manager.complete(&id, "Built the grid", "R1").await.unwrap();

        let err = manager.complete(&id, "again", "R2").await.unwrap_err();
        assert!(matches!(err, StateError::DoubleCompletion { .. }));

        assert_eq!(
            events.recv().await.unwrap(),
            StateEvent::GenerationCreated {
                id: id.clone(),
                exercise_id: exercise.id.clone(),
                seq: 1
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            StateEvent::GenerationCompleted {
                id: id.clone(),
                snapshot_ref: "R1".to_string()
            }
        );
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_chain_is_linear() {
        let manager = StateManager::spawn_in_memory().unwrap();
        let exercise = manager.create_exercise("odd-one-out", "Odd One Out").await.unwrap();

        for (i, snapshot) in ["R1", "R2", "R3"].iter().enumerate() {
            let opened = manager
                .continue_or_create(&exercise.id, &format!("P{}", i + 1))
                .await
                .unwrap();
            manager.complete(&opened.generation.id, "ok", snapshot).await.unwrap();
        }

        let chain = manager.snapshot_chain(&exercise.id).await.unwrap();
        let refs: Vec<_> = chain.iter().map(|l| l.snapshot_ref.as_str()).collect();
        assert_eq!(refs, vec!["R1", "R2", "R3"]);
        for pair in chain.windows(2) {
            assert_eq!(pair[1].base_snapshot_ref.as_deref(), Some(pair[0].snapshot_ref.as_str()));
            assert_eq!(pair[1].seq, pair[0].seq + 1);
        }
        assert_eq!(
            manager.latest_snapshot_ref(&exercise.id).await.unwrap().as_deref(),
            Some("R3")
        );
    }

    #[tokio::test]
    async fn test_mark_failed_then_prior_context() {
        let manager = StateManager::spawn_in_memory().unwrap();
        let exercise = manager.create_exercise("odd-one-out", "Odd One Out").await.unwrap();

        let g1 = manager.continue_or_create(&exercise.id, "P1").await.unwrap().generation;
        manager.complete(&g1.id, "ok", "R1").await.unwrap();
        let g2 = manager.continue_or_create(&exercise.id, "P2").await.unwrap().generation;
        manager.mark_failed(&g2.id, "turn budget exhausted").await.unwrap();

        let g3 = manager.continue_or_create(&exercise.id, "P3").await.unwrap().generation;
        let ctx = manager.resolve_prior_context(&g3.id).await.unwrap();
        assert_eq!(ctx.base_prompt, "P1");
        assert_eq!(ctx.last_snapshot_ref.as_deref(), Some("R1"));
        assert_eq!(ctx.last_user_instruction.as_deref(), Some("P3"));
    }
}
