//! HTTP API handlers for rollcall-server

use axum::extract::{FromRequest, FromRequestParts};

use crate::error::ApiError;

pub mod attendance;
pub mod auth;
pub mod courses;
pub mod dashboard;
pub mod face;
pub mod health;
pub mod reports;
pub mod students;
pub mod users;

/// JSON body whose rejections use the API error envelope
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Path parameters whose rejections use the API error envelope
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

/// Query string whose rejections use the API error envelope
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);
