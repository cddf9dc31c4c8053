//! HTTP route handlers

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::agent::{AgentEvent, EventSink};
use crate::domain::{Generation, SourceFile};
use crate::llm::{Message, Role};
use crate::service::current_prompt;

use super::AppState;
use super::error::{ApiError, public_message};
use super::sse::event_stream;

/// Build the API router
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/chat", post(chat))
        .route("/exercises/{slug}/generations", get(list_generations))
        .route("/exercises/{slug}/files", get(get_files))
}

pub async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub slug: String,
    pub messages: Vec<ChatMessage>,
}

/// POST /api/chat - run one user turn, streaming events
async fn chat(State(state): State<AppState>, Json(request): Json<ChatRequest>) -> Result<impl IntoResponse, ApiError> {
    debug!(slug = %request.slug, messages = request.messages.len(), "chat: called");
    let conversation: Vec<Message> = request
        .messages
        .into_iter()
        .map(|m| match m.role {
            Role::User => Message::user(m.content),
            Role::Assistant => Message::assistant(m.content),
        })
        .collect();

    current_prompt(&conversation)?;
    state.service.exercise(&request.slug).await?;

    let (tx, rx) = mpsc::channel(64);
    let service = state.service.clone();
    let slug = request.slug;
    tokio::spawn(async move {
        let events = EventSink::new(tx);
        if let Err(e) = service.submit(&slug, conversation, &events).await {
            warn!(%slug, error = %e, "Turn failed");
            events
                .emit(AgentEvent::Error {
                    message: public_message(&e),
                })
                .await;
        }
    });

    Ok(event_stream(rx))
}

/// GET /api/exercises/{slug}/generations
async fn list_generations(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Vec<Generation>>, ApiError> {
    Ok(Json(state.service.history(&slug).await?))
}

#[derive(Debug, Deserialize)]
struct FilesQuery {
    generation: Option<String>,
}

/// GET /api/exercises/{slug}/files - files of the latest completed snapshot
async fn get_files(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<FilesQuery>,
) -> Result<Json<Vec<SourceFile>>, ApiError> {
    Ok(Json(state.service.files(&slug, query.generation.as_deref()).await?))
}
