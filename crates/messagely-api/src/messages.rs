use axum::{
    Extension, Json,
    extract::State,
    response::IntoResponse,
};
use serde_json::json;
use tracing::debug;

use messagely_types::api::{Claims, SendMessageRequest};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;
use crate::extract::{JsonBody, PathParam};

/// GET /messages/{id} — visible to the sender and the recipient only.
pub async fn get_message(
    State(state): State<AppState>,
    PathParam(id): PathParam<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let message = blocking(&state, move |s| s.db.get_message(id)).await?;

    if claims.username != message.from_user.username && claims.username != message.to_user.username {
        return Err(ApiError::unauthorized());
    }

    Ok(Json(json!({ "message": message })))
}

/// POST /messages — the sender is always the caller.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    JsonBody(req): JsonBody<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let from = claims.username;
    let message = blocking(&state, move |s| {
        s.db.create_message(&from, &req.to_username, &req.body)
    })
    .await?;

    debug!(
        "Message {} from {} to {}",
        message.id, message.from_username, message.to_username
    );
    Ok(Json(json!({ "message": message })))
}

/// POST /messages/{id}/read — recipient only.
pub async fn mark_read(
    State(state): State<AppState>,
    PathParam(id): PathParam<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let message = blocking(&state, move |s| s.db.get_message(id)).await?;

    if claims.username != message.to_user.username {
        return Err(ApiError::unauthorized());
    }

    let receipt = blocking(&state, move |s| s.db.mark_read(id)).await?;
    Ok(Json(json!({ "message": receipt })))
}
