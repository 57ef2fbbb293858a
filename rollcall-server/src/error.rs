//! Error types for rollcall-server
//!
//! Every failure a request can hit maps to one [`ApiError`] variant and one
//! HTTP status. Internal failures are logged and reduced to a generic
//! message; nothing about storage internals reaches the client.

use axum::{
    extract::multipart::{MultipartError, MultipartRejection},
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::error;

use rollcall_common::validation::FieldError;

use crate::storage::StorageError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or missing input, with per-field detail (400)
    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    /// Request could not be understood at all (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// No valid session (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Natural key already in use (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Upload over the size ceiling (413)
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Verification policy refused the capture (422)
    #[error("Verification rejected: {0}")]
    VerificationRejected(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        ApiError::Validation(vec![FieldError::new(field, message)])
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::VerificationRejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::Validation(fields) => json!({
                "error": {
                    "code": "VALIDATION_ERROR",
                    "message": "Invalid request",
                    "fields": fields,
                }
            }),
            ApiError::Internal(detail) => {
                error!("Internal error: {}", detail);
                json!({
                    "error": {
                        "code": "INTERNAL_ERROR",
                        "message": "Internal server error",
                    }
                })
            }
            ApiError::BadRequest(msg) => envelope("BAD_REQUEST", msg),
            ApiError::Unauthorized(msg) => envelope("UNAUTHORIZED", msg),
            ApiError::NotFound(msg) => envelope("NOT_FOUND", msg),
            ApiError::Conflict(msg) => envelope("CONFLICT", msg),
            ApiError::PayloadTooLarge(msg) => envelope("PAYLOAD_TOO_LARGE", msg),
            ApiError::VerificationRejected(msg) => envelope("VERIFICATION_REJECTED", msg),
        };

        (status, Json(body)).into_response()
    }
}

fn envelope(code: &str, message: String) -> Value {
    json!({
        "error": {
            "code": code,
            "message": message,
        }
    })
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(what) => ApiError::NotFound(format!("{} not found", what)),
            StorageError::Conflict(msg) => ApiError::Conflict(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<rollcall_common::Error> for ApiError {
    fn from(err: rollcall_common::Error) -> Self {
        use rollcall_common::Error;
        match err {
            Error::Validation(fields) => ApiError::Validation(fields),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(err) => ApiError::Validation(vec![FieldError::new(
                "body",
                err.body_text(),
            )]),
            other if other.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                ApiError::PayloadTooLarge(other.body_text())
            }
            other => ApiError::BadRequest(other.body_text()),
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Validation(vec![FieldError::new("query", rejection.body_text())])
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(err.body_text())
        } else {
            ApiError::BadRequest(err.body_text())
        }
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_errors_map_to_statuses() {
        let not_found: ApiError = StorageError::NotFound("Student 9".to_string()).into();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let conflict: ApiError = StorageError::Conflict("taken".to_string()).into();
        assert_eq!(conflict.status(), StatusCode::CONFLICT);

        let integrity: ApiError = StorageError::Integrity("dangling".to_string()).into();
        assert_eq!(integrity.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_common_validation_keeps_fields() {
        let err: ApiError = rollcall_common::Error::Validation(vec![FieldError::new(
            "name",
            "must be at least 2 characters",
        )])
        .into();
        match err {
            ApiError::Validation(fields) => assert_eq!(fields[0].field, "name"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
