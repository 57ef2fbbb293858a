//! rollcall-server library - faculty attendance service
//!
//! Students, courses and check-ins behind a session-authenticated JSON API,
//! with face check-in uploads and CSV reports.

use axum::{extract::DefaultBodyLimit, middleware, Router};
use chrono::Duration;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use rollcall_common::config::{
    TomlConfig, VerificationConfig, DEFAULT_SESSION_TTL_HOURS, DEFAULT_UPLOAD_LIMIT,
};

pub mod api;
pub mod credentials;
pub mod error;
pub mod recorder;
pub mod seed;
pub mod sessions;
pub mod storage;
pub mod verification;

use credentials::PasswordHasherConfig;
use recorder::AttendanceRecorder;
use sessions::SessionStore;
use storage::Storage;
use verification::{policy_from_config, VerificationGateway};

/// Longest session lifetime honored from config (one year)
pub const MAX_SESSION_TTL_HOURS: u64 = 24 * 365;

/// Room left in a face upload body for boundaries and the text fields
pub const UPLOAD_FORM_OVERHEAD: usize = 16 * 1024;

/// Runtime knobs taken from the bootstrap config
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub session_ttl: Duration,
    pub upload_limit: usize,
    pub verification: VerificationConfig,
    pub hasher: PasswordHasherConfig,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            session_ttl: Duration::hours(DEFAULT_SESSION_TTL_HOURS as i64),
            upload_limit: DEFAULT_UPLOAD_LIMIT,
            verification: VerificationConfig::default(),
            hasher: PasswordHasherConfig::default(),
        }
    }
}

impl ServerOptions {
    pub fn from_config(config: &TomlConfig) -> Self {
        Self {
            session_ttl: Duration::hours(
                config.sessions.ttl_hours.min(MAX_SESSION_TTL_HOURS) as i64,
            ),
            upload_limit: config.uploads.max_bytes,
            verification: config.verification.clone(),
            hasher: PasswordHasherConfig::default(),
        }
    }
}

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub recorder: AttendanceRecorder,
    pub verifier: VerificationGateway,
    pub sessions: Arc<SessionStore>,
    pub hasher: PasswordHasherConfig,
    /// Ceiling for the `faceImage` file, in bytes
    pub upload_limit: usize,
}

impl AppState {
    pub fn new(storage: Arc<dyn Storage>, options: ServerOptions) -> Self {
        let recorder = AttendanceRecorder::new(storage.clone());
        let verifier = VerificationGateway::new(
            storage.clone(),
            recorder.clone(),
            policy_from_config(&options.verification),
        );
        Self {
            storage,
            recorder,
            verifier,
            sessions: Arc::new(SessionStore::new(options.session_ttl)),
            hasher: options.hasher,
            upload_limit: options.upload_limit,
        }
    }

    /// Ceiling for a whole face upload request body
    pub fn upload_body_limit(&self) -> usize {
        self.upload_limit.saturating_add(UPLOAD_FORM_OVERHEAD)
    }
}

/// Build application router
///
/// `/health` is public; everything under `/api` except login and logout
/// requires a session.
pub fn build_router(state: AppState) -> Router {
    // Face uploads get their own body ceiling, checked before the body is read
    let uploads = api::face::face_routes()
        .layer(DefaultBodyLimit::max(state.upload_body_limit()))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::face::enforce_upload_limit,
        ));

    Router::new()
        .merge(api::health::health_routes())
        .merge(api::auth::auth_routes())
        .merge(api::users::user_routes())
        .merge(api::students::student_routes())
        .merge(api::courses::course_routes())
        .merge(api::attendance::attendance_routes())
        .merge(api::dashboard::dashboard_routes())
        .merge(api::reports::report_routes())
        .merge(uploads)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
