//! Attendance write and read endpoints

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use rollcall_common::models::{Attendance, AttendanceInput, RecentAttendance};
use rollcall_common::time;

use crate::api::{ApiJson, ApiPath, ApiQuery};
use crate::error::{ApiError, ApiResult};
use crate::sessions::AuthSession;
use crate::AppState;

pub const DEFAULT_RECENT_LIMIT: usize = 10;
pub const MAX_RECENT_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<i64>,
}

impl RecentQuery {
    /// Default when absent, capped at [`MAX_RECENT_LIMIT`]
    pub fn effective_limit(&self) -> ApiResult<usize> {
        match self.limit {
            None => Ok(DEFAULT_RECENT_LIMIT),
            Some(n) if n < 0 => Err(ApiError::field("limit", "must not be negative")),
            Some(n) => Ok(usize::try_from(n).unwrap_or(MAX_RECENT_LIMIT).min(MAX_RECENT_LIMIT)),
        }
    }
}

/// POST /api/attendance
pub async fn create_attendance(
    State(state): State<AppState>,
    _session: AuthSession,
    ApiJson(input): ApiJson<AttendanceInput>,
) -> ApiResult<(StatusCode, Json<Attendance>)> {
    let created = state.recorder.record_input(input, time::now()).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/attendance/course/:course
///
/// `:course` is a numeric course id or a course code.
pub async fn course_attendance(
    State(state): State<AppState>,
    _session: AuthSession,
    ApiPath(course): ApiPath<String>,
) -> ApiResult<Json<Vec<Attendance>>> {
    let course_id = match course.parse::<i64>() {
        Ok(id) => id,
        Err(_) => {
            state
                .storage
                .get_course_by_code(course.trim())
                .await?
                .ok_or_else(|| ApiError::NotFound("Course not found".to_string()))?
                .id
        }
    };
    Ok(Json(
        state.storage.list_attendances_by_course(course_id).await?,
    ))
}

/// GET /api/attendance/student/:id
pub async fn student_attendance(
    State(state): State<AppState>,
    _session: AuthSession,
    ApiPath(student_id): ApiPath<i64>,
) -> ApiResult<Json<Vec<Attendance>>> {
    Ok(Json(
        state
            .storage
            .list_attendances_by_student(student_id)
            .await?,
    ))
}

/// GET /api/attendance/recent?limit=N
pub async fn recent_attendance(
    State(state): State<AppState>,
    _session: AuthSession,
    ApiQuery(query): ApiQuery<RecentQuery>,
) -> ApiResult<Json<Vec<RecentAttendance>>> {
    let limit = query.effective_limit()?;
    Ok(Json(state.recorder.recent(limit).await?))
}

/// GET /api/attendance/today/:student_id/:course_id
pub async fn today_status(
    State(state): State<AppState>,
    _session: AuthSession,
    ApiPath((student_id, course_id)): ApiPath<(i64, i64)>,
) -> ApiResult<Json<Option<Attendance>>> {
    Ok(Json(
        state
            .recorder
            .today_status(student_id, course_id, time::now())
            .await?,
    ))
}

pub fn attendance_routes() -> Router<AppState> {
    Router::new()
        .route("/api/attendance", post(create_attendance))
        .route("/api/attendance/course/:course", get(course_attendance))
        .route("/api/attendance/student/:id", get(student_attendance))
        .route("/api/attendance/recent", get(recent_attendance))
        .route(
            "/api/attendance/today/:student_id/:course_id",
            get(today_status),
        )
}
