//! Profile updates for the signed-in instructor

use axum::{extract::State, routing::patch, Json, Router};
use serde::Deserialize;

use rollcall_common::models::{UserPatch, UserProfile};

use crate::api::ApiJson;
use crate::error::{ApiError, ApiResult};
use crate::sessions::AuthSession;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LanguageRequest {
    #[serde(default)]
    pub language: Option<String>,
}

/// PATCH /api/user/language
pub async fn update_language(
    State(state): State<AppState>,
    session: AuthSession,
    ApiJson(request): ApiJson<LanguageRequest>,
) -> ApiResult<Json<UserProfile>> {
    let language = request
        .language
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .ok_or_else(|| ApiError::field("language", "Language is required"))?;

    let patch = UserPatch {
        language: Some(language),
        ..Default::default()
    }
    .normalized()?;
    let user = state.storage.update_user(session.user_id, &patch).await?;
    Ok(Json(user.profile()))
}

/// PATCH /api/user/profile
///
/// Name, department, image and language; blank optional fields are cleared.
pub async fn update_profile(
    State(state): State<AppState>,
    session: AuthSession,
    ApiJson(patch): ApiJson<UserPatch>,
) -> ApiResult<Json<UserProfile>> {
    let patch = patch.normalized()?;
    let user = state.storage.update_user(session.user_id, &patch).await?;
    Ok(Json(user.profile()))
}

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/api/user/language", patch(update_language))
        .route("/api/user/profile", patch(update_profile))
}
