//! Authentication server exchanges
//!
//! Handles the three token endpoint interactions:
//! 1. Login (username/password for an access + refresh pair)
//! 2. Refresh (refresh credential for a new access credential)
//! 3. Logout (blacklist the refresh credential)
//!
//! All three POST JSON straight through the `Transport`. None of them carry
//! the access credential, so they must never be routed through the
//! authenticated executor.

use serde::{Deserialize, Serialize};
use tracing::debug;
use transport::{HttpRequest, HttpResponse, Transport};

use crate::constants::{DEFAULT_LOGIN_PATH, DEFAULT_LOGOUT_PATH, DEFAULT_REFRESH_PATH};
use crate::error::{Error, Result};

/// Absolute URLs of the authentication server endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEndpoints {
    pub refresh_url: String,
    pub login_url: String,
    pub logout_url: String,
}

impl AuthEndpoints {
    /// Endpoints at the default paths under `base_url`.
    pub fn from_base(base_url: &str) -> Self {
        Self::with_paths(
            base_url,
            DEFAULT_REFRESH_PATH,
            DEFAULT_LOGIN_PATH,
            DEFAULT_LOGOUT_PATH,
        )
    }

    pub fn with_paths(base_url: &str, refresh: &str, login: &str, logout: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            refresh_url: join(base, refresh),
            login_url: join(base, login),
            logout_url: join(base, logout),
        }
    }
}

fn join(base: &str, path: &str) -> String {
    format!("{base}/{}", path.trim_start_matches('/'))
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

/// Successful refresh exchange body.
///
/// `refresh` is present only when the server rotates refresh credentials.
#[derive(Debug, Deserialize, Serialize)]
pub struct RefreshResponse {
    pub access: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
}

/// Credential pair issued at login.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Exchange the refresh credential for a new access credential.
///
/// Any non-2xx status is a rejection; the status and body are kept for logs.
pub async fn refresh_access(
    transport: &dyn Transport,
    endpoints: &AuthEndpoints,
    refresh: &str,
) -> Result<RefreshResponse> {
    let request =
        HttpRequest::post(endpoints.refresh_url.as_str()).json(&RefreshRequest { refresh })?;
    let response = transport.perform(&request).await?;

    if !response.is_success() {
        return Err(Error::RefreshRejected {
            status: response.status.as_u16(),
            body: body_or_placeholder(&response),
        });
    }

    let parsed: RefreshResponse = response
        .json()
        .map_err(|e| Error::InvalidResponse(format!("invalid refresh response: {e}")))?;
    if parsed.access.is_empty() {
        return Err(Error::InvalidResponse(
            "refresh response carried an empty access credential".into(),
        ));
    }
    debug!(rotated = parsed.refresh.is_some(), "refresh exchange succeeded");
    Ok(parsed)
}

/// Obtain a credential pair with username and password.
pub async fn login(
    transport: &dyn Transport,
    endpoints: &AuthEndpoints,
    username: &str,
    password: &str,
) -> Result<TokenPair> {
    let request = HttpRequest::post(endpoints.login_url.as_str())
        .json(&LoginRequest { username, password })?;
    let response = transport.perform(&request).await?;

    if !response.is_success() {
        return Err(Error::LoginRejected {
            status: response.status.as_u16(),
            body: body_or_placeholder(&response),
        });
    }

    response
        .json()
        .map_err(|e| Error::InvalidResponse(format!("invalid login response: {e}")))
}

/// Ask the server to blacklist `refresh`.
pub async fn logout(
    transport: &dyn Transport,
    endpoints: &AuthEndpoints,
    refresh: &str,
) -> Result<()> {
    let request =
        HttpRequest::post(endpoints.logout_url.as_str()).json(&RefreshRequest { refresh })?;
    let response = transport.perform(&request).await?;

    if !response.is_success() {
        return Err(Error::LogoutRejected {
            status: response.status.as_u16(),
            body: body_or_placeholder(&response),
        });
    }
    Ok(())
}

fn body_or_placeholder(response: &HttpResponse) -> String {
    if response.body.is_empty() {
        String::from("<no body>")
    } else {
        response.text()
    }
}
