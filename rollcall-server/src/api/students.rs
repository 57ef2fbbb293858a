//! Student CRUD

use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::info;

use rollcall_common::models::{NewStudent, Student, StudentPatch};

use crate::api::{ApiJson, ApiPath};
use crate::error::{ApiError, ApiResult};
use crate::sessions::AuthSession;
use crate::AppState;

/// GET /api/students
pub async fn list_students(
    State(state): State<AppState>,
    _session: AuthSession,
) -> ApiResult<Json<Vec<Student>>> {
    Ok(Json(state.storage.list_students().await?))
}

/// GET /api/students/:id
pub async fn get_student(
    State(state): State<AppState>,
    _session: AuthSession,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<Student>> {
    state
        .storage
        .get_student(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Student not found".to_string()))
}

/// POST /api/students
pub async fn create_student(
    State(state): State<AppState>,
    _session: AuthSession,
    ApiJson(student): ApiJson<NewStudent>,
) -> ApiResult<(StatusCode, Json<Student>)> {
    let created = state.storage.create_student(student.normalized()?).await?;
    info!("Created student {} ({})", created.id, created.student_id);
    Ok((StatusCode::CREATED, Json(created)))
}

/// PATCH /api/students/:id
pub async fn update_student(
    State(state): State<AppState>,
    _session: AuthSession,
    ApiPath(id): ApiPath<i64>,
    ApiJson(patch): ApiJson<StudentPatch>,
) -> ApiResult<Json<Student>> {
    let updated = state.storage.update_student(id, &patch.normalized()?).await?;
    Ok(Json(updated))
}

/// DELETE /api/students/:id
pub async fn delete_student(
    State(state): State<AppState>,
    _session: AuthSession,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<StatusCode> {
    if state.storage.delete_student(id).await? {
        info!("Deleted student {}", id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Student not found".to_string()))
    }
}

pub fn student_routes() -> Router<AppState> {
    Router::new()
        .route("/api/students", get(list_students).post(create_student))
        .route(
            "/api/students/:id",
            get(get_student).patch(update_student).delete(delete_student),
        )
}
