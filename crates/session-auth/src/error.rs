//! Error types for authentication server operations

/// Errors from authentication server exchanges.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] transport::TransportError),

    #[error("refresh credential rejected ({status}): {body}")]
    RefreshRejected { status: u16, body: String },

    #[error("login rejected ({status}): {body}")]
    LoginRejected { status: u16, body: String },

    #[error("logout rejected ({status}): {body}")]
    LogoutRejected { status: u16, body: String },

    #[error("invalid response from authentication server: {0}")]
    InvalidResponse(String),

    #[error("credential storage error: {0}")]
    Storage(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
