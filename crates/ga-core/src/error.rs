//! Error types for ga-core

use thiserror::Error;

/// Main error type for ga-core
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Mail source error: {0}")]
    Source(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for ga-core
pub type Result<T> = std::result::Result<T, Error>;
