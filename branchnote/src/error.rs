//! Error types for Branchnote
//!
//! All errors use thiserror for structured error handling.
//! These errors can be serialized across the presentation boundary as
//! plain human-readable strings.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not signed in or session expired. Please sign in again.")]
    Unauthorized,

    #[error("Note or folder not found: {0}")]
    NotFound(String),

    #[error("Server unreachable: {0}")]
    NetworkUnavailable(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Local storage error: {0}")]
    Storage(String),

    #[error("Server error: {0}")]
    Remote(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Errors that mean "the server could not be reached" and trigger the
    /// offline fallback path.
    pub fn is_network(&self) -> bool {
        matches!(self, AppError::NetworkUnavailable(_))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            AppError::NetworkUnavailable(err.to_string())
        } else if err.is_decode() {
            AppError::Remote("Unexpected response from server".to_string())
        } else {
            AppError::Remote(err.to_string())
        }
    }
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
