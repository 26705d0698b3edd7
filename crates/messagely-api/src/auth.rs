use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::info;

use messagely_db::models::NewUser;
use messagely_db::{Database, Hasher};
use messagely_types::api::{Claims, LoginRequest, RegisterRequest, TokenResponse};

use crate::blocking;
use crate::error::ApiError;
use crate::extract::JsonBody;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub hasher: Hasher,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
}

const MAX_USERNAME_LEN: usize = 32;

pub async fn register(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // Validate input
    if req.username.is_empty() || req.username.len() > MAX_USERNAME_LEN {
        return Err(ApiError::BadRequest(format!(
            "username must be 1 to {} characters",
            MAX_USERNAME_LEN
        )));
    }
    if req.password.is_empty() {
        return Err(ApiError::BadRequest("password is required".into()));
    }

    let user = blocking(&state, move |s| {
        s.db.register_user(
            &s.hasher,
            &NewUser {
                username: &req.username,
                password: &req.password,
                first_name: &req.first_name,
                last_name: &req.last_name,
                phone: &req.phone,
            },
        )
    })
    .await?;

    info!("Registered user {}", user.username);

    let token = create_token(&state.jwt_secret, &user.username, state.token_ttl)?;
    Ok((StatusCode::CREATED, Json(TokenResponse { token })))
}

pub async fn login(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.clone();
    let valid = blocking(&state, move |s| {
        let valid = s.db.authenticate(&s.hasher, &req.username, &req.password)?;
        if valid {
            s.db.update_login_timestamp(&req.username)?;
        }
        Ok(valid)
    })
    .await?;

    if !valid {
        return Err(ApiError::Unauthorized("Invalid username/password".into()));
    }

    let token = create_token(&state.jwt_secret, &username, state.token_ttl)?;
    Ok(Json(TokenResponse { token }))
}

pub fn create_token(
    secret: &str,
    username: &str,
    ttl: chrono::Duration,
) -> Result<String, ApiError> {
    let now = Utc::now();
    let expires = now
        .checked_add_signed(ttl)
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("token ttl {} out of range", ttl)))?;
    let claims = Claims {
        username: username.to_string(),
        iat: unix_seconds(now)?,
        exp: unix_seconds(expires)?,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(e.into()))
}

fn unix_seconds(at: DateTime<Utc>) -> Result<usize, ApiError> {
    usize::try_from(at.timestamp()).map_err(|e| ApiError::Internal(e.into()))
}
