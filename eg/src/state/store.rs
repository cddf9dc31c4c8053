//! SQLite persistence for exercises and their generation chains
//!
//! Only the state actor touches this. The partial unique index backs the
//! at-most-one-generating rule at the storage level as well.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use tracing::{debug, info};

use crate::domain::{ChainLink, Exercise, Generation, GenerationStatus, PriorContext, is_valid_slug};

use super::messages::{OpenedGeneration, StateError, StateResponse};

const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS exercises (
  id TEXT PRIMARY KEY,
  slug TEXT NOT NULL UNIQUE,
  title TEXT NOT NULL,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS generations (
  id TEXT PRIMARY KEY,
  exercise_id TEXT NOT NULL REFERENCES exercises(id),
  seq INTEGER NOT NULL,
  prompt TEXT NOT NULL,
  status TEXT NOT NULL CHECK (status IN ('generating', 'completed', 'failed')),
  summary TEXT,
  snapshot_ref TEXT,
  base_snapshot_ref TEXT,
  failure TEXT,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL,
  UNIQUE (exercise_id, seq),
  CHECK (status <> 'completed' OR snapshot_ref IS NOT NULL)
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_generations_one_generating
  ON generations(exercise_id) WHERE status = 'generating';
"#;

const GENERATION_COLUMNS: &str = "id, exercise_id, seq, prompt, status, summary, snapshot_ref, base_snapshot_ref, \
                                  failure, created_at, updated_at";

fn parse_time(value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

fn exercise_from_row(row: &Row<'_>) -> rusqlite::Result<Exercise> {
    Ok(Exercise {
        id: row.get(0)?,
        slug: row.get(1)?,
        title: row.get(2)?,
        created_at: parse_time(&row.get::<_, String>(3)?)?,
    })
}

fn generation_from_row(row: &Row<'_>) -> rusqlite::Result<Generation> {
    let status: String = row.get(4)?;
    let status = GenerationStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown generation status {status:?}").into(),
        )
    })?;

    Ok(Generation {
        id: row.get(0)?,
        exercise_id: row.get(1)?,
        seq: row.get(2)?,
        prompt: row.get(3)?,
        status,
        summary: row.get(5)?,
        snapshot_ref: row.get(6)?,
        base_snapshot_ref: row.get(7)?,
        failure: row.get(8)?,
        created_at: parse_time(&row.get::<_, String>(9)?)?,
        updated_at: parse_time(&row.get::<_, String>(10)?)?,
    })
}

fn get_generation_tx(tx: &Transaction<'_>, id: &str) -> StateResponse<Option<Generation>> {
    Ok(tx
        .query_row(
            &format!("SELECT {GENERATION_COLUMNS} FROM generations WHERE id = ?1"),
            params![id],
            generation_from_row,
        )
        .optional()?)
}

fn latest_generation_tx(tx: &Transaction<'_>, exercise_id: &str) -> StateResponse<Option<Generation>> {
    Ok(tx
        .query_row(
            &format!("SELECT {GENERATION_COLUMNS} FROM generations WHERE exercise_id = ?1 ORDER BY seq DESC LIMIT 1"),
            params![exercise_id],
            generation_from_row,
        )
        .optional()?)
}

/// Owner of the SQLite connection
pub struct GenerationStore {
    conn: Connection,
}

impl GenerationStore {
    /// Open (or create) the database at `path`
    pub fn open(path: impl AsRef<Path>) -> StateResponse<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "GenerationStore::open: called");
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StateError::StoreError(e.to_string()))?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::migrate(conn)
    }

    pub fn open_in_memory() -> StateResponse<Self> {
        Self::migrate(Connection::open_in_memory()?)
    }

    fn migrate(conn: Connection) -> StateResponse<Self> {
        conn.execute_batch(SCHEMA)?;
        info!("Generation store ready");
        Ok(Self { conn })
    }

    // === Exercises ===

    pub fn insert_exercise(&mut self, exercise: &Exercise) -> StateResponse<()> {
        debug!(slug = %exercise.slug, "GenerationStore::insert_exercise: called");
        if !is_valid_slug(&exercise.slug) {
            return Err(StateError::InvalidInput(format!("invalid exercise slug {:?}", exercise.slug)));
        }
        let tx = self.conn.transaction()?;
        let taken: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM exercises WHERE slug = ?1)",
            params![exercise.slug],
            |row| row.get(0),
        )?;
        if taken {
            return Err(StateError::AlreadyExists(format!("exercise {}", exercise.slug)));
        }
        tx.execute(
            "INSERT INTO exercises (id, slug, title, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                exercise.id,
                exercise.slug,
                exercise.title,
                exercise.created_at.to_rfc3339()
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn get_exercise_by_slug(&self, slug: &str) -> StateResponse<Option<Exercise>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, slug, title, created_at FROM exercises WHERE slug = ?1",
                params![slug],
                exercise_from_row,
            )
            .optional()?)
    }

    pub fn list_exercises(&self) -> StateResponse<Vec<Exercise>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, slug, title, created_at FROM exercises ORDER BY slug")?;
        let rows = stmt.query_map([], exercise_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // === Generations ===

    pub fn get_generation(&self, id: &str) -> StateResponse<Option<Generation>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {GENERATION_COLUMNS} FROM generations WHERE id = ?1"),
                params![id],
                generation_from_row,
            )
            .optional()?)
    }

    /// Generations of an exercise, oldest first
    pub fn list_generations(&self, exercise_id: &str) -> StateResponse<Vec<Generation>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {GENERATION_COLUMNS} FROM generations WHERE exercise_id = ?1 ORDER BY seq"
        ))?;
        let rows = stmt.query_map(params![exercise_id], generation_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Reuse the in-flight generation or open a new one, in one transaction
    ///
    /// A new generation chains to the latest completed snapshot; failed
    /// generations are skipped over.
    pub fn continue_or_create(&mut self, exercise_id: &str, prompt: &str) -> StateResponse<OpenedGeneration> {
        debug!(%exercise_id, "GenerationStore::continue_or_create: called");
        let tx = self.conn.transaction()?;

        let slug: Option<String> = tx
            .query_row(
                "SELECT slug FROM exercises WHERE id = ?1",
                params![exercise_id],
                |row| row.get(0),
            )
            .optional()?;
        let slug = slug.ok_or_else(|| StateError::NotFound(format!("exercise {}", exercise_id)))?;

        let latest = latest_generation_tx(&tx, exercise_id)?;
        if let Some(generation) = latest.as_ref().filter(|g| g.is_generating()) {
            debug!(id = %generation.id, "GenerationStore::continue_or_create: continuing in-flight generation");
            return Ok(OpenedGeneration {
                generation: generation.clone(),
                created: false,
            });
        }

        let base_snapshot_ref: Option<String> = tx
            .query_row(
                "SELECT snapshot_ref FROM generations WHERE exercise_id = ?1 AND status = 'completed' \
                 ORDER BY seq DESC LIMIT 1",
                params![exercise_id],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        let seq = latest.map(|g| g.seq + 1).unwrap_or(1);

        let generation = Generation::open(exercise_id, &slug, seq, prompt, base_snapshot_ref);
        tx.execute(
            &format!("INSERT INTO generations ({GENERATION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"),
            params![
                generation.id,
                generation.exercise_id,
                generation.seq,
                generation.prompt,
                generation.status.as_str(),
                generation.summary,
                generation.snapshot_ref,
                generation.base_snapshot_ref,
                generation.failure,
                generation.created_at.to_rfc3339(),
                generation.updated_at.to_rfc3339(),
            ],
        )?;
        tx.commit()?;

        info!(id = %generation.id, seq, base = ?generation.base_snapshot_ref, "Opened generation");
        Ok(OpenedGeneration {
            generation,
            created: true,
        })
    }

    pub fn prior_context(&self, generation_id: &str) -> StateResponse<PriorContext> {
        let generation = self
            .get_generation(generation_id)?
            .ok_or_else(|| StateError::NotFound(format!("generation {}", generation_id)))?;

        let base_prompt: String = self.conn.query_row(
            "SELECT prompt FROM generations WHERE exercise_id = ?1 ORDER BY seq LIMIT 1",
            params![generation.exercise_id],
            |row| row.get(0),
        )?;

        let last_user_instruction = (generation.prompt != base_prompt).then(|| generation.prompt.clone());

        Ok(PriorContext {
            base_prompt,
            last_snapshot_ref: generation.base_snapshot_ref,
            last_user_instruction,
        })
    }

    /// `generating -> completed`; anything else is a double completion
    pub fn complete(&mut self, generation_id: &str, summary: &str, snapshot_ref: &str) -> StateResponse<Generation> {
        debug!(%generation_id, %snapshot_ref, "GenerationStore::complete: called");
        self.finish(generation_id, |tx, now| {
            tx.execute(
                "UPDATE generations SET status = 'completed', summary = ?2, snapshot_ref = ?3, updated_at = ?4 \
                 WHERE id = ?1 AND status = 'generating'",
                params![generation_id, summary, snapshot_ref, now],
            )
        })
    }

    /// `generating -> failed`
    pub fn mark_failed(&mut self, generation_id: &str, reason: &str) -> StateResponse<Generation> {
        debug!(%generation_id, %reason, "GenerationStore::mark_failed: called");
        self.finish(generation_id, |tx, now| {
            tx.execute(
                "UPDATE generations SET status = 'failed', failure = ?2, updated_at = ?3 \
                 WHERE id = ?1 AND status = 'generating'",
                params![generation_id, reason, now],
            )
        })
    }

    fn finish(
        &mut self,
        generation_id: &str,
        update: impl FnOnce(&Transaction<'_>, &str) -> rusqlite::Result<usize>,
    ) -> StateResponse<Generation> {
        let tx = self.conn.transaction()?;
        let now = Utc::now().to_rfc3339();

        if update(&tx, &now)? == 0 {
            return match get_generation_tx(&tx, generation_id)? {
                Some(generation) => Err(StateError::DoubleCompletion {
                    id: generation.id,
                    status: generation.status,
                }),
                None => Err(StateError::NotFound(format!("generation {}", generation_id))),
            };
        }

        let generation = get_generation_tx(&tx, generation_id)?
            .ok_or_else(|| StateError::NotFound(format!("generation {}", generation_id)))?;
        tx.commit()?;
        Ok(generation)
    }

    /// Completed generations with their snapshots, oldest first
    pub fn snapshot_chain(&self, exercise_id: &str) -> StateResponse<Vec<ChainLink>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, seq, snapshot_ref, base_snapshot_ref FROM generations \
             WHERE exercise_id = ?1 AND status = 'completed' ORDER BY seq",
        )?;
        let rows = stmt.query_map(params![exercise_id], |row| {
            Ok(ChainLink {
                generation_id: row.get(0)?,
                seq: row.get(1)?,
                snapshot_ref: row.get(2)?,
                base_snapshot_ref: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}
