//! Security tests for rollcall-server
//!
//! - Face images over the size ceiling are refused with 413; an image of
//!   exactly the ceiling is accepted
//! - Every `/api` route except login and logout requires a session
//! - Password hashes never leave the server

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt;

use rollcall_common::models::{NewUser, DEFAULT_LANGUAGE};
use rollcall_server::credentials::PasswordHasherConfig;
use rollcall_server::storage::{MemStorage, Storage};
use rollcall_server::{build_router, AppState, ServerOptions, UPLOAD_FORM_OVERHEAD};

const UPLOAD_LIMIT: usize = 4 * 1024;
const BOUNDARY: &str = "rollcall-security-boundary";

/// Test helper: app with a small upload ceiling and one instructor
async fn setup_app() -> Router {
    let storage: Arc<dyn Storage> = Arc::new(MemStorage::new());
    let hasher = PasswordHasherConfig::with_rounds(1_000);
    storage
        .create_user(NewUser {
            username: "faculty".to_string(),
            password_hash: hasher.hash("password").unwrap(),
            name: "Prof. Jane Smith".to_string(),
            department: None,
            profile_image: None,
            language: DEFAULT_LANGUAGE.to_string(),
        })
        .await
        .unwrap();

    let options = ServerOptions {
        upload_limit: UPLOAD_LIMIT,
        hasher,
        ..Default::default()
    };
    build_router(AppState::new(storage, options))
}

async fn login(app: &Router) -> String {
    let request = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "username": "faculty", "password": "password" }).to_string(),
        ))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    body["token"].as_str().unwrap().to_string()
}

async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

fn image_upload(size: usize) -> Vec<u8> {
    let mut body = format!(
        "--{}\r\nContent-Disposition: form-data; name=\"studentId\"\r\n\r\n1\r\n\
         --{}\r\nContent-Disposition: form-data; name=\"courseId\"\r\n\r\n1\r\n\
         --{}\r\nContent-Disposition: form-data; name=\"faceImage\"; filename=\"face.jpg\"\r\n\
         Content-Type: image/jpeg\r\n\r\n",
        BOUNDARY, BOUNDARY, BOUNDARY
    )
    .into_bytes();
    body.extend(std::iter::repeat(0xAB).take(size));
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

// =============================================================================
// Upload ceiling
// =============================================================================

fn upload_request(body: Vec<u8>, token: Option<&str>, declare_length: bool) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/attendance/verify-face")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        );
    if declare_length {
        builder = builder.header(header::CONTENT_LENGTH, body.len());
    }
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body)).unwrap()
}

#[tokio::test]
async fn test_declared_length_over_limit_is_rejected_before_auth() {
    let app = setup_app().await;
    let body = image_upload(UPLOAD_LIMIT + UPLOAD_FORM_OVERHEAD);

    let response = app.oneshot(upload_request(body, None, true)).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "PAYLOAD_TOO_LARGE");
}

#[tokio::test]
async fn test_streamed_image_over_limit_is_rejected() {
    let app = setup_app().await;
    let token = login(&app).await;

    // No Content-Length header: the image is refused while it streams
    let request = Request::builder()
        .method("POST")
        .uri("/api/students/1/face")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::from(image_upload(UPLOAD_LIMIT * 2)))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "PAYLOAD_TOO_LARGE");
}

#[tokio::test]
async fn test_streamed_body_over_body_ceiling_is_rejected() {
    let app = setup_app().await;
    let token = login(&app).await;
    // Oversized text field, so the body ceiling trips rather than the image check
    let mut body = format!(
        "--{}\r\nContent-Disposition: form-data; name=\"faceDescriptor\"\r\n\r\n",
        BOUNDARY
    )
    .into_bytes();
    body.extend(std::iter::repeat(b'0').take(UPLOAD_LIMIT + UPLOAD_FORM_OVERHEAD * 2));
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    let response = app
        .oneshot(upload_request(body, Some(&token), false))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "PAYLOAD_TOO_LARGE");
}

#[tokio::test]
async fn test_image_exactly_at_limit_is_accepted() {
    let app = setup_app().await;
    let token = login(&app).await;

    // Student 1 does not exist, so getting past the size checks means 404
    let response = app
        .clone()
        .oneshot(upload_request(image_upload(UPLOAD_LIMIT), Some(&token), true))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(upload_request(image_upload(UPLOAD_LIMIT + 1), Some(&token), true))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "PAYLOAD_TOO_LARGE");
}

#[tokio::test]
async fn test_upload_under_limit_is_not_rejected_for_size() {
    let app = setup_app().await;
    let token = login(&app).await;
    let body = image_upload(UPLOAD_LIMIT / 4);

    let request = Request::builder()
        .method("POST")
        .uri("/api/attendance/verify-face")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .header(header::CONTENT_LENGTH, body.len())
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::from(body))
        .unwrap();

    // Student 1 does not exist, so the gateway answers 404
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// Session enforcement
// =============================================================================

#[tokio::test]
async fn test_protected_routes_require_session() {
    let app = setup_app().await;

    let routes = [
        ("GET", "/api/auth/user"),
        ("GET", "/api/students"),
        ("GET", "/api/students/1"),
        ("DELETE", "/api/students/1"),
        ("GET", "/api/courses"),
        ("GET", "/api/courses/1/students"),
        ("GET", "/api/attendance/course/CS101"),
        ("GET", "/api/attendance/student/1"),
        ("GET", "/api/attendance/recent"),
        ("GET", "/api/attendance/today/1/1"),
        ("GET", "/api/dashboard/stats"),
        ("GET", "/api/dashboard/course-stats"),
        ("GET", "/api/reports/export/1"),
    ];

    for (method, uri) in routes {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(
            response.status(),
            StatusCode::UNAUTHORIZED,
            "{} {} should require a session",
            method,
            uri
        );
        let body = extract_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    }
}

#[tokio::test]
async fn test_unknown_token_is_rejected() {
    let app = setup_app().await;
    let request = Request::builder()
        .uri("/api/students")
        .header(header::AUTHORIZATION, "Bearer not-a-real-session")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_writes_require_session() {
    let app = setup_app().await;
    let request = Request::builder()
        .method("POST")
        .uri("/api/attendance")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "studentId": 1,
                "courseId": 1,
                "status": "present",
                "verificationMethod": "manual"
            })
            .to_string(),
        ))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Secret handling
// =============================================================================

#[tokio::test]
async fn test_profile_never_exposes_password_hash() {
    let app = setup_app().await;
    let token = login(&app).await;

    let request = Request::builder()
        .uri("/api/auth/user")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    let text = body.to_string();
    assert!(!text.contains("pbkdf2"));
    assert!(body.get("passwordHash").is_none());
    assert_eq!(body["username"], "faculty");
}
