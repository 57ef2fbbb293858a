//! Face enrollment and face check-in uploads
//!
//! Both endpoints take `multipart/form-data` with text fields `studentId`,
//! `courseId` and `faceDescriptor` (a JSON number array) plus the file
//! field `faceImage`. Every request must carry an image or a descriptor.

use axum::{
    extract::{
        multipart::{Field, Multipart, MultipartRejection},
        Request, State,
    },
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use tracing::{debug, warn};

use rollcall_common::models::{Attendance, Descriptor, Student};
use rollcall_common::time;
use rollcall_common::validation::FieldError;

use crate::api::ApiPath;
use crate::error::{ApiError, ApiResult};
use crate::sessions::AuthSession;
use crate::verification::Capture;
use crate::AppState;

#[derive(Debug, Default)]
struct FaceForm {
    student_id: Option<String>,
    course_id: Option<String>,
    descriptor: Option<String>,
    image: Option<Vec<u8>>,
}

impl FaceForm {
    async fn read(
        multipart: Result<Multipart, MultipartRejection>,
        image_limit: usize,
    ) -> ApiResult<Self> {
        let mut multipart = multipart?;
        let mut form = FaceForm::default();
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            match name.as_str() {
                "studentId" => form.student_id = Some(field.text().await?),
                "courseId" => form.course_id = Some(field.text().await?),
                "faceDescriptor" => form.descriptor = Some(field.text().await?),
                "faceImage" => form.image = Some(read_image(field, image_limit).await?),
                other => debug!("Ignoring multipart field '{}'", other),
            }
        }
        Ok(form)
    }

    /// Descriptor and image, or the field errors that prevent building them
    fn capture(&mut self, errors: &mut Vec<FieldError>) -> Capture {
        let descriptor = match self.descriptor.take().map(|raw| raw.trim().to_string()) {
            None => None,
            Some(raw) if raw.is_empty() => None,
            Some(raw) => match serde_json::from_str::<Descriptor>(&raw) {
                Ok(descriptor) if descriptor.iter().all(|v| v.is_finite()) => Some(descriptor),
                Ok(_) => {
                    errors.push(FieldError::new(
                        "faceDescriptor",
                        "descriptor values must be finite numbers",
                    ));
                    None
                }
                Err(_) => {
                    errors.push(FieldError::new(
                        "faceDescriptor",
                        "must be a JSON array of numbers",
                    ));
                    None
                }
            },
        };
        let capture = Capture {
            descriptor,
            image: self.image.take(),
        };
        if capture.is_empty() && errors.iter().all(|e| e.field != "faceDescriptor") {
            errors.push(FieldError::new(
                "faceImage",
                "a face image or face descriptor is required",
            ));
        }
        capture
    }
}

/// Collect the image field, refusing it once it passes `limit` bytes
async fn read_image(mut field: Field<'_>, limit: usize) -> ApiResult<Vec<u8>> {
    let mut image = Vec::new();
    while let Some(chunk) = field.chunk().await? {
        if image.len() + chunk.len() > limit {
            warn!("Rejected face image over limit {}", limit);
            return Err(ApiError::PayloadTooLarge(format!(
                "Face image exceeds {} bytes",
                limit
            )));
        }
        image.extend_from_slice(&chunk);
    }
    Ok(image)
}

fn parse_id(field: &str, raw: Option<&str>, errors: &mut Vec<FieldError>) -> Option<i64> {
    match raw.map(str::trim) {
        None | Some("") => {
            errors.push(FieldError::new(field, format!("{} is required", field)));
            None
        }
        Some(raw) => match raw.parse::<i64>() {
            Ok(id) if id > 0 => Some(id),
            _ => {
                errors.push(FieldError::new(field, "must be a positive id"));
                None
            }
        },
    }
}

/// POST /api/students/:id/face
///
/// Stores the submitted descriptor as-is; an image-only upload enrolls an
/// empty descriptor.
pub async fn enroll_face(
    State(state): State<AppState>,
    _session: AuthSession,
    ApiPath(student_id): ApiPath<i64>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<Student>> {
    let mut form = FaceForm::read(multipart, state.upload_limit).await?;
    let mut errors = Vec::new();
    let capture = form.capture(&mut errors);
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let student = state
        .verifier
        .enroll(student_id, capture.descriptor.unwrap_or_default())
        .await?;
    Ok(Json(student))
}

/// POST /api/attendance/verify-face
pub async fn verify_face(
    State(state): State<AppState>,
    _session: AuthSession,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<(StatusCode, Json<Attendance>)> {
    let mut form = FaceForm::read(multipart, state.upload_limit).await?;
    let mut errors = Vec::new();
    let student_id = parse_id("studentId", form.student_id.as_deref(), &mut errors);
    let course_id = parse_id("courseId", form.course_id.as_deref(), &mut errors);
    let capture = form.capture(&mut errors);

    let (Some(student_id), Some(course_id)) = (student_id, course_id) else {
        return Err(ApiError::Validation(errors));
    };
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let record = state
        .verifier
        .verify(student_id, course_id, &capture, time::now())
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Reject uploads whose declared length is over the body ceiling
///
/// Runs before the body is touched. Bodies without a usable
/// `Content-Length` fall through to the streaming limit and the per-image
/// check in `read_image`.
pub async fn enforce_upload_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let declared = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok());

    let limit = state.upload_body_limit();
    if let Some(length) = declared {
        if length > limit as u64 {
            warn!(
                "Rejected upload to {}: {} bytes over limit {}",
                request.uri().path(),
                length,
                limit
            );
            return ApiError::PayloadTooLarge(format!("Upload exceeds {} bytes", limit))
                .into_response();
        }
    }
    next.run(request).await
}

pub fn face_routes() -> Router<AppState> {
    Router::new()
        .route("/api/students/:id/face", post(enroll_face))
        .route("/api/attendance/verify-face", post(verify_face))
}
