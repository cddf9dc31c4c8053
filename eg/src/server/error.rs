//! HTTP error mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::service::ServiceError;
use crate::state::StateError;

/// Errors returned before a response stream starts
///
/// Bodies are plain text. Internal details are logged, not sent.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Internal server error")]
    Internal,
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::ExerciseNotFound(_) | ServiceError::State(StateError::NotFound(_)) => {
                ApiError::NotFound(e.to_string())
            }
            ServiceError::InvalidRequest(_) => ApiError::BadRequest(e.to_string()),
            other => {
                warn!(error = %other, "Request failed");
                ApiError::Internal
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

/// Message for a turn that failed after streaming started
pub fn public_message(e: &ServiceError) -> String {
    match e {
        ServiceError::ExerciseNotFound(_) | ServiceError::InvalidRequest(_) => e.to_string(),
        _ => "Generation failed".to_string(),
    }
}
