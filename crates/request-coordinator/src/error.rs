//! Error types for authenticated request execution

use transport::TransportError;

/// Errors from authenticated request execution.
///
/// Session-level variants mean the user has to sign in again; request-level
/// variants mean this one call failed and the session is intact. See
/// [`Error::is_session_level`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no access credential stored")]
    NoAccessCredential,

    #[error("no refresh credential stored")]
    NoRefreshCredential,

    #[error("refresh exchange failed: {0}")]
    RefreshExchangeFailed(String),

    #[error("refresh abandoned before completion")]
    RefreshAbandoned,

    #[error("session expired: {0}")]
    SessionExpired(String),

    #[error("request failed: {0}")]
    Transport(#[from] TransportError),

    #[error("login failed: {0}")]
    Login(session_auth::Error),

    #[error("logout failed: {0}")]
    Logout(session_auth::Error),
}

impl Error {
    /// Whether the failure ended (or never had) a session, as opposed to a
    /// single request failing.
    pub fn is_session_level(&self) -> bool {
        matches!(
            self,
            Error::NoAccessCredential
                | Error::NoRefreshCredential
                | Error::RefreshExchangeFailed(_)
                | Error::RefreshAbandoned
                | Error::SessionExpired(_)
        )
    }
}

/// Result alias for coordinator operations.
pub type Result<T> = std::result::Result<T, Error>;
