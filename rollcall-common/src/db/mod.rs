//! SQLite schema and connection setup

pub mod init;

pub use init::*;
