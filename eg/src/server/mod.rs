//! HTTP submission endpoint

mod error;
mod routes;
mod sse;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use eyre::Context;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;
use crate::service::GenerationService;

pub use error::ApiError;
pub use routes::{ChatMessage, ChatRequest};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<GenerationService>,
}

/// Build the full application router
pub fn router(service: Arc<GenerationService>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health))
        .nest("/api", routes::api_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(AppState { service })
}

/// Serve until ctrl-c
pub async fn serve(service: Arc<GenerationService>, config: &ServerConfig) -> eyre::Result<()> {
    let addr: SocketAddr = config
        .address()
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.address()))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(%addr, "Listening");

    axum::serve(listener, router(service))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await
        .context("Server error")?;
    Ok(())
}
