//! Error types for mailpipe

use std::fmt;
use thiserror::Error;

/// Failure of a single call against the remote mailbox.
///
/// `status` carries the HTTP status code when the remote answered with one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    pub status: Option<u16>,
    pub message: String,
}

impl SourceError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self::new(Some(status), message)
    }

    /// 429 (rate limit) and 403 (quota exceeded) are worth waiting out.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self.status, Some(429) | Some(403))
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(code) => write!(f, "{} (status {})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for SourceError {}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Remote source error: {0}")]
    Source(#[from] SourceError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
