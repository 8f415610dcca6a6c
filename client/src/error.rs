//! Error types for the Housemate client core

use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Inbound data carried no signature any known key could verify
    #[error("Invalid message signature")]
    InvalidSignature,

    /// Inbound data could not be interpreted at all
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// The server answered with a falsy status
    #[error("Request failed: {0}")]
    Application(String),

    /// Network error, timeout or non-success HTTP status
    #[error("Transport error: {0}")]
    Transport(String),

    /// Client-side form validation
    #[error("{0}")]
    Validation(String),

    #[error("Expected property {field} of {record} to be of a different type: {reason}")]
    TypeMismatch {
        record: &'static str,
        field: String,
        reason: String,
    },

    #[error("Unknown record type: {0}")]
    UnknownRecordType(String),

    #[error("Socket error: {0}")]
    Socket(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether the messenger may retry the request that produced this error
    pub fn is_transport(&self) -> bool {
        matches!(self, AppError::Transport(_) | AppError::Http(_))
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
