//! Dashboard aggregates for the signed-in instructor

use axum::{extract::State, routing::get, Json, Router};

use rollcall_common::time;

use crate::error::ApiResult;
use crate::recorder::{CourseStat, TodayStats};
use crate::sessions::AuthSession;
use crate::AppState;

/// GET /api/dashboard/stats
pub async fn stats(
    State(state): State<AppState>,
    session: AuthSession,
) -> ApiResult<Json<TodayStats>> {
    Ok(Json(
        state
            .recorder
            .today_stats(session.user_id, time::now())
            .await?,
    ))
}

/// GET /api/dashboard/course-stats
pub async fn course_stats(
    State(state): State<AppState>,
    session: AuthSession,
) -> ApiResult<Json<Vec<CourseStat>>> {
    Ok(Json(state.recorder.course_stats(session.user_id).await?))
}

pub fn dashboard_routes() -> Router<AppState> {
    Router::new()
        .route("/api/dashboard/stats", get(stats))
        .route("/api/dashboard/course-stats", get(course_stats))
}
