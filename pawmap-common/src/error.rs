//! Error type shared by the PawMap crates
//!
//! Store, configuration and I/O failures. Per-record import problems and
//! provider failures have their own types in `pawmap-discovery` and only end
//! up here when they wrap one of these.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// SQLite query or connection failure
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Missing or malformed configuration; aborts a run before any work
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON column or payload that does not (de)serialize
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Broken invariant inside the store (unexpected row content, lock budget exhausted)
    #[error("Internal error: {0}")]
    Internal(String),
}
