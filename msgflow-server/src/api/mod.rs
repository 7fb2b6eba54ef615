//! HTTP API.
//!
//! # Endpoints
//!
//! - `GET  /health`    - per-flow status and payment source states
//! - `GET  /stats`     - per-channel counters and merge queue counters
//! - `POST /users`     - publish a user
//! - `POST /addresses` - publish an address for validation

pub mod messages;
pub mod status;

use axum::{Router, http::StatusCode, response::IntoResponse};
use msgflow_core::pipeline::PipelineError;

use crate::state::AppState;

/// Build the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(status::router())
        .merge(messages::router())
}

/// Errors that can occur in API handlers.
#[derive(Debug)]
pub enum ApiError {
    /// The pipeline has been stopped and no longer accepts messages.
    Stopped,
    /// The pipeline rejected the message for a wiring reason.
    Internal(PipelineError),
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::Stopped => ApiError::Stopped,
            other => ApiError::Internal(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ApiError::Stopped => {
                (StatusCode::SERVICE_UNAVAILABLE, "pipeline is stopped").into_response()
            }
            ApiError::Internal(e) => {
                tracing::error!(error = %e, "Pipeline rejected message");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
        }
    }
}
