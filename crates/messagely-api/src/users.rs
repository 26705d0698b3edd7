use axum::{
    Extension, Json,
    extract::State,
    response::IntoResponse,
};
use serde_json::json;

use messagely_types::api::Claims;

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;
use crate::extract::PathParam;
use crate::middleware::ensure_correct_user;

/// GET /users — summary of every user.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let users = blocking(&state, |s| s.db.all_users()).await?;
    Ok(Json(json!({ "users": users })))
}

/// GET /users/{username} — full profile, self only.
pub async fn get_user(
    State(state): State<AppState>,
    PathParam(username): PathParam<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_correct_user(&claims, &username)?;

    let user = blocking(&state, move |s| s.db.get_user(&username)).await?;
    Ok(Json(json!({ "user": user })))
}

/// GET /users/{username}/to — inbox, self only.
pub async fn messages_to(
    State(state): State<AppState>,
    PathParam(username): PathParam<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_correct_user(&claims, &username)?;

    let messages = blocking(&state, move |s| s.db.messages_to(&username)).await?;
    Ok(Json(json!({ "messages": messages })))
}

/// GET /users/{username}/from — outbox, self only.
pub async fn messages_from(
    State(state): State<AppState>,
    PathParam(username): PathParam<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_correct_user(&claims, &username)?;

    let messages = blocking(&state, move |s| s.db.messages_from(&username)).await?;
    Ok(Json(json!({ "messages": messages })))
}
