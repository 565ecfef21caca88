use axum::{
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

use super::extract::Json;
use super::{ApiError, SharedState};
use crate::errors::StudioError;
use crate::studio::auth::{
    AuthUser, clear_session_cookie, hash_password_blocking, hash_token, new_session_token,
    normalize_email, session_cookie, validate_password, verify_password_blocking,
};
use crate::studio::models::User;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

pub async fn register(
    State(state): State<SharedState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = normalize_email(&req.email)?;
    validate_password(&req.password)?;
    let name = req
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());
    let ttl = state.config.auth.session_ttl_hours;
    let hash = hash_password_blocking(req.password).await?;

    let token = new_session_token();
    let token_hash = hash_token(&token);
    let user = state
        .db
        .call(move |db| {
            let user = db.create_user(&email, name.as_deref(), &hash)?;
            db.create_session(user.id, &token_hash, ttl)?;
            Ok(user)
        })
        .await?;
    tracing::info!(user_id = user.id, name = user.display_name(), "user registered");

    let cookie = session_cookie(&token, ttl, state.config.auth.cookie_secure);
    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie)],
        Json(AuthResponse { user, token }),
    ))
}

pub async fn login(
    State(state): State<SharedState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // Malformed emails get the same answer as unknown ones.
    let email = normalize_email(&req.email).map_err(|_| StudioError::InvalidCredentials)?;
    let ttl = state.config.auth.session_ttl_hours;

    let result = async {
        let credentials = state
            .db
            .call(move |db| {
                let purged = db.purge_expired_sessions()?;
                if purged > 0 {
                    tracing::debug!(purged, "expired sessions removed");
                }
                db.find_credentials(&email)
            })
            .await?;
        let Some((user, hash)) = credentials else {
            return Err(StudioError::InvalidCredentials.into());
        };
        if !verify_password_blocking(req.password, hash).await? {
            return Err(StudioError::InvalidCredentials.into());
        }
        Ok::<_, anyhow::Error>(user)
    }
    .await;
    let user = result.inspect_err(|e| {
        if matches!(e.downcast_ref::<StudioError>(), Some(StudioError::InvalidCredentials)) {
            tracing::info!("login rejected");
        }
    })?;

    let token = new_session_token();
    let token_hash = hash_token(&token);
    let user_id = user.id;
    state
        .db
        .call(move |db| db.create_session(user_id, &token_hash, ttl))
        .await?;
    tracing::info!(user_id = user.id, "user logged in");

    let cookie = session_cookie(&token, ttl, state.config.auth.cookie_secure);
    Ok(([(header::SET_COOKIE, cookie)], Json(AuthResponse { user, token })))
}

pub async fn logout(
    State(state): State<SharedState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let token_hash = user.token_hash.clone();
    state
        .db
        .call(move |db| db.delete_session(&token_hash))
        .await?;
    tracing::info!(user_id = user.id, "user logged out");
    Ok((
        StatusCode::NO_CONTENT,
        [(
            header::SET_COOKIE,
            clear_session_cookie(state.config.auth.cookie_secure),
        )],
    ))
}

pub async fn me(user: AuthUser) -> Json<User> {
    Json(user.user)
}
