//! # Rollcall Common Library
//!
//! Shared code for the rollcall attendance service:
//! - Domain model and field validation
//! - Bootstrap configuration and root folder resolution
//! - SQLite schema initialization
//! - Local-day time helpers

pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod models;
pub mod time;
pub mod validation;

pub use error::{Error, Result};
