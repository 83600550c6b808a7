//! Error types for ga-gmail

use thiserror::Error;

/// ga-gmail error type
#[derive(Error, Debug)]
pub enum GmailError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gmail API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<GmailError> for ga_core::Error {
    fn from(err: GmailError) -> Self {
        match err {
            GmailError::Config(msg) => ga_core::Error::Config(msg),
            other => ga_core::Error::Source(other.to_string()),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, GmailError>;
