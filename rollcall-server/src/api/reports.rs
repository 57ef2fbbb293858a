//! CSV attendance export

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tracing::info;

use rollcall_common::time;

use crate::api::ApiPath;
use crate::error::ApiResult;
use crate::sessions::AuthSession;
use crate::AppState;

/// GET /api/reports/export/:course_id
pub async fn export_course(
    State(state): State<AppState>,
    _session: AuthSession,
    ApiPath(course_id): ApiPath<i64>,
) -> ApiResult<Response> {
    let export = state.recorder.export_course(course_id).await?;
    let body = export.to_csv()?;
    let filename = export.filename(time::now());
    info!(
        "Exported {} attendance rows for course {}",
        export.rows.len(),
        export.course.code
    );

    let headers = [
        (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        ),
    ];
    Ok((headers, body).into_response())
}

pub fn report_routes() -> Router<AppState> {
    Router::new().route("/api/reports/export/:course_id", get(export_course))
}
