//! Error types for credential handling

use garm_core::DurationError;
use thiserror::Error;

/// Credential errors
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token {field} duration {value}")]
    InvalidDuration {
        field: &'static str,
        value: String,
        #[source]
        source: DurationError,
    },

    #[error("token refresh duration must be greater than zero")]
    ZeroRefresh,

    #[error("invalid token configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read private key {path}")]
    KeyRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid private key: {0}")]
    InvalidKey(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("load token from filepath {path} failed")]
    TokenRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid server identity token: {0}")]
    InvalidToken(String),

    /// No refresh has succeeded yet
    #[error("token not found")]
    NotFound,
}

/// Result type for credential operations
pub type Result<T> = std::result::Result<T, TokenError>;
