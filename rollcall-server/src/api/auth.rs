//! Login, logout and current-user endpoints
//!
//! A successful login issues an opaque session token, both as an HttpOnly
//! cookie and in the response body for clients that prefer `Authorization:
//! Bearer`.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use validator::Validate;

use rollcall_common::models::UserProfile;
use rollcall_common::validation;

use crate::api::ApiJson;
use crate::credentials::verify_password;
use crate::error::{ApiError, ApiResult};
use crate::sessions::{expired_cookie, session_cookie, AuthSession};
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "username is required"))]
    pub username: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub user: UserProfile,
    pub token: String,
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> ApiResult<Response> {
    validation::check(&request)?;

    let username = request.username.trim();
    let found = state.storage.get_user_by_username(username).await?;

    // Unknown usernames still pay for one PBKDF2 run
    let stored = found
        .as_ref()
        .map(|user| user.password_hash.clone())
        .unwrap_or_else(|| state.hasher.decoy_hash());
    let password = request.password;
    let matches = tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .map_err(|e| ApiError::Internal(format!("password check failed: {}", e)))?;
    let user = found.filter(|_| matches);

    let Some(user) = user else {
        warn!("Failed login for '{}'", username);
        return Err(ApiError::Unauthorized("Invalid credentials".to_string()));
    };

    let token = state.sessions.create(user.id).await;
    info!("User '{}' logged in", user.username);

    let cookie = session_cookie(&token, state.sessions.ttl());
    let body = LoginResponse {
        user: user.profile(),
        token,
    };
    Ok(([(header::SET_COOKIE, cookie)], Json(body)).into_response())
}

/// POST /api/auth/logout
///
/// Succeeds with or without a live session.
pub async fn logout(State(state): State<AppState>, session: Option<AuthSession>) -> Response {
    if let Some(session) = session {
        state.sessions.revoke(&session.token).await;
        info!("User {} logged out", session.user_id);
    }
    (
        StatusCode::OK,
        [(header::SET_COOKIE, expired_cookie())],
        Json(json!({ "message": "Logged out successfully" })),
    )
        .into_response()
}

/// GET /api/auth/user
pub async fn current_user(
    State(state): State<AppState>,
    session: AuthSession,
) -> ApiResult<Json<UserProfile>> {
    let user = state
        .storage
        .get_user(session.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    Ok(Json(user.profile()))
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/user", get(current_user))
}
