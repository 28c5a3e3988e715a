//! Per-session composition
//!
//! A `Session` owns one refresh coordinator and the executor built on it, so
//! refresh state lives exactly as long as the session that uses it. Login and
//! logout sit here rather than in the executor: they talk to the auth server
//! directly and never carry the access credential.

use std::sync::Arc;
use std::time::Duration;

use common::Secret;
use serde::Serialize;
use session_auth::claims;
use session_auth::{
    ACCESS_KEY, AuthEndpoints, CredentialStore, REDIRECT_AFTER_LOGIN_KEY, REFRESH_KEY, USER_KEY,
};
use tracing::{debug, info};
use transport::Transport;

use crate::coordinator::RefreshCoordinator;
use crate::error::{Error, Result};
use crate::executor::AuthenticatedExecutor;
use crate::invalidator::{ClearSession, SessionInvalidator};

/// How a logout ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutOutcome {
    /// The server blacklisted the refresh credential.
    Revoked,
    /// Nothing worth revoking; only local credentials were cleared.
    LocalOnly,
}

/// Snapshot of the stored credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub user: Option<String>,
    pub access_present: bool,
    pub access_expires_at: Option<u64>,
    pub refresh_present: bool,
    pub refresh_expires_at: Option<u64>,
}

pub struct Session {
    store: Arc<dyn CredentialStore>,
    transport: Arc<dyn Transport>,
    endpoints: AuthEndpoints,
    invalidator: Arc<ClearSession>,
    coordinator: Arc<RefreshCoordinator>,
    executor: AuthenticatedExecutor,
}

impl Session {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        transport: Arc<dyn Transport>,
        endpoints: AuthEndpoints,
        invalidator: Arc<ClearSession>,
        refresh_timeout: Option<Duration>,
    ) -> Self {
        let boundary: Arc<dyn SessionInvalidator> = invalidator.clone();
        let mut coordinator = RefreshCoordinator::new(
            store.clone(),
            transport.clone(),
            endpoints.clone(),
            boundary.clone(),
        );
        if let Some(timeout) = refresh_timeout {
            coordinator = coordinator.with_refresh_timeout(timeout);
        }
        let coordinator = Arc::new(coordinator);
        let executor = AuthenticatedExecutor::new(
            store.clone(),
            transport.clone(),
            coordinator.clone(),
            boundary,
        );

        Self {
            store,
            transport,
            endpoints,
            invalidator,
            coordinator,
            executor,
        }
    }

    /// Executor for authenticated API calls in this session.
    pub fn executor(&self) -> &AuthenticatedExecutor {
        &self.executor
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    /// Sign in and store the issued credential pair.
    ///
    /// Returns the location remembered at the last invalidation, if any, so
    /// the caller can send the user back there.
    pub async fn login(
        &self,
        username: &str,
        password: &Secret<String>,
    ) -> Result<Option<String>> {
        let pair = session_auth::login(
            self.transport.as_ref(),
            &self.endpoints,
            username,
            password.expose(),
        )
        .await
        .map_err(Error::Login)?;

        self.store.set(ACCESS_KEY, &pair.access);
        self.store.set(REFRESH_KEY, &pair.refresh);
        self.store
            .set(USER_KEY, &serde_json::json!({ "username": username }).to_string());
        self.invalidator.rearm();

        let redirect = self.store.get(REDIRECT_AFTER_LOGIN_KEY);
        if redirect.is_some() {
            self.store.remove(REDIRECT_AFTER_LOGIN_KEY);
        }
        info!(username, "logged in");
        Ok(redirect)
    }

    /// Revoke the refresh credential and clear the session.
    ///
    /// A missing or already expired refresh credential is cleared locally
    /// without contacting the server. If the server refuses, the credentials
    /// are kept so the logout can be retried.
    pub async fn logout(&self) -> Result<LogoutOutcome> {
        let refresh = self.store.get(REFRESH_KEY).map(Secret::new);
        let outcome = match refresh {
            Some(refresh) if !claims::is_expired(refresh.expose(), claims::now_secs()) => {
                session_auth::logout(self.transport.as_ref(), &self.endpoints, refresh.expose())
                    .await
                    .map_err(Error::Logout)?;
                LogoutOutcome::Revoked
            }
            _ => {
                debug!("refresh credential absent or expired, clearing locally");
                LogoutOutcome::LocalOnly
            }
        };

        for key in [ACCESS_KEY, REFRESH_KEY, USER_KEY] {
            self.store.remove(key);
        }
        info!(?outcome, "logged out");
        Ok(outcome)
    }

    pub fn status(&self) -> SessionStatus {
        let access = self.store.get(ACCESS_KEY);
        let refresh = self.store.get(REFRESH_KEY);
        let user = self
            .store
            .get(USER_KEY)
            .and_then(|raw| serde_json::from_str::<serde_json::Value>(&raw).ok())
            .and_then(|v| v.get("username")?.as_str().map(str::to_string));

        SessionStatus {
            user,
            access_present: access.is_some(),
            access_expires_at: access.as_deref().and_then(claims::expires_at),
            refresh_present: refresh.is_some(),
            refresh_expires_at: refresh.as_deref().and_then(claims::expires_at),
        }
    }
}
