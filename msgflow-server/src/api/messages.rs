//! Producer endpoints.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};
use msgflow_sdk::{AddressMessage, UserMessage};

use super::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", post(publish_user))
        .route("/addresses", post(publish_address))
}

/// `POST /users`: publish a user to every user sink.
async fn publish_user(
    State(state): State<AppState>,
    Json(user): Json<UserMessage>,
) -> Result<impl IntoResponse, ApiError> {
    let delivery = state.pipeline.publish_user(user)?;
    Ok((StatusCode::ACCEPTED, Json(delivery)))
}

/// `POST /addresses`: publish an address for validation.
///
/// An invalid postcode is not an error here; the address is accepted and
/// flagged by the validation stage.
async fn publish_address(
    State(state): State<AppState>,
    Json(address): Json<AddressMessage>,
) -> Result<impl IntoResponse, ApiError> {
    let delivery = state.pipeline.publish_address(address)?;
    Ok((StatusCode::ACCEPTED, Json(delivery)))
}
