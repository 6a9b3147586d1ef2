use garm_authz::AuthzError;
use garm_token::TokenError;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, ApiError>;

/// Errors returned by webhook handlers
///
/// The dispatcher turns any of these into a 500 response naming the error.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("mapping error: {0}")]
    Authz(#[from] AuthzError),

    #[error("credential error: {0}")]
    Token(#[from] TokenError),

    #[error("policy service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("policy service error: {0}")]
    Policy(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Listener lifecycle and transport errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Listener failed to bind or stopped serving with an error
    #[error("{listener} listener failed")]
    Serve {
        listener: String,
        #[source]
        source: std::io::Error,
    },

    /// Listener task ended without reporting a result
    #[error("{listener} listener task aborted")]
    Aborted { listener: String },

    /// Graceful shutdown did not finish in time; connections were closed
    #[error("{listener} listener shutdown exceeded {deadline:?}")]
    ShutdownDeadline { listener: String, deadline: Duration },

    /// Shutdown was requested by the caller
    #[error("context closed")]
    Cancelled,

    #[error("tls configuration error: {0}")]
    Tls(String),
}
