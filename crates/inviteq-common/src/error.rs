//! Error types for InviteQ

use thiserror::Error;

/// Main error type for InviteQ
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Send integration error: {0}")]
    Send(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for InviteQ
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Config(_) => 500,
            Error::Database(_) => 500,
            Error::Validation(_) => 422,
            Error::NotFound(_) => 404,
            Error::RateLimitExceeded => 429,
            Error::InvalidTransition(_) => 409,
            Error::Send(_) => 502,
            Error::Internal(_) => 500,
            Error::Other(_) => 500,
        }
    }

    /// Returns the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "CONFIG_ERROR",
            Error::Database(_) => "DATABASE_ERROR",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::NotFound(_) => "NOT_FOUND",
            Error::RateLimitExceeded => "RATE_LIMITED",
            Error::InvalidTransition(_) => "INVALID_TRANSITION",
            Error::Send(_) => "SEND_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
            Error::Other(_) => "INTERNAL_ERROR",
        }
    }
}
