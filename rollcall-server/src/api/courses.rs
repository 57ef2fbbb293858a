//! Course CRUD and rosters
//!
//! Listing is scoped to the signed-in instructor. Single-course reads and
//! edits are not.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use tracing::info;

use rollcall_common::models::{Course, CoursePatch, NewCourse, Student};

use crate::api::{ApiJson, ApiPath};
use crate::error::{ApiError, ApiResult};
use crate::sessions::AuthSession;
use crate::AppState;

fn course_not_found() -> ApiError {
    ApiError::NotFound("Course not found".to_string())
}

/// GET /api/courses
pub async fn list_courses(
    State(state): State<AppState>,
    session: AuthSession,
) -> ApiResult<Json<Vec<Course>>> {
    Ok(Json(
        state
            .storage
            .list_courses_by_instructor(session.user_id)
            .await?,
    ))
}

/// GET /api/courses/:id
pub async fn get_course(
    State(state): State<AppState>,
    _session: AuthSession,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<Course>> {
    state
        .storage
        .get_course(id)
        .await?
        .map(Json)
        .ok_or_else(course_not_found)
}

/// POST /api/courses
///
/// The instructor is always the caller, whatever the body says.
pub async fn create_course(
    State(state): State<AppState>,
    session: AuthSession,
    ApiJson(mut course): ApiJson<NewCourse>,
) -> ApiResult<(StatusCode, Json<Course>)> {
    course.instructor_id = session.user_id;
    let created = state.storage.create_course(course.normalized()?).await?;
    info!(
        "Created course {} ({}) for instructor {}",
        created.id, created.code, created.instructor_id
    );
    Ok((StatusCode::CREATED, Json(created)))
}

/// PATCH /api/courses/:id
pub async fn update_course(
    State(state): State<AppState>,
    _session: AuthSession,
    ApiPath(id): ApiPath<i64>,
    ApiJson(patch): ApiJson<CoursePatch>,
) -> ApiResult<Json<Course>> {
    let updated = state.storage.update_course(id, &patch.normalized()?).await?;
    Ok(Json(updated))
}

/// DELETE /api/courses/:id
pub async fn delete_course(
    State(state): State<AppState>,
    _session: AuthSession,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<StatusCode> {
    if state.storage.delete_course(id).await? {
        info!("Deleted course {}", id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(course_not_found())
    }
}

/// GET /api/courses/:id/students
pub async fn course_students(
    State(state): State<AppState>,
    _session: AuthSession,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<Vec<Student>>> {
    if state.storage.get_course(id).await?.is_none() {
        return Err(course_not_found());
    }
    Ok(Json(state.storage.list_students_by_course(id).await?))
}

pub fn course_routes() -> Router<AppState> {
    Router::new()
        .route("/api/courses", get(list_courses).post(create_course))
        .route(
            "/api/courses/:id",
            get(get_course).patch(update_course).delete(delete_course),
        )
        .route("/api/courses/:id/students", get(course_students))
}
