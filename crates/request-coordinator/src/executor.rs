//! Authenticated request execution with one transparent refresh-and-replay
//!
//! Per call: attach the stored access credential, perform, and on a 401 wait
//! for the refresh coordinator and replay exactly once. Every other status is
//! returned untouched, business errors included. Requests to the auth server
//! itself never come through here.
//!
//! A 401 that arrives after another call's refresh has already settled is
//! answered by that refresh; it never starts a second episode.

use std::sync::Arc;

use common::Secret;
use serde::Serialize;
use session_auth::{ACCESS_KEY, CredentialStore};
use tracing::{debug, instrument, warn};
use transport::{HttpRequest, HttpResponse, Transport};
use uuid::Uuid;

use crate::coordinator::RefreshCoordinator;
use crate::error::{Error, Result};
use crate::invalidator::SessionInvalidator;

pub struct AuthenticatedExecutor {
    store: Arc<dyn CredentialStore>,
    transport: Arc<dyn Transport>,
    coordinator: Arc<RefreshCoordinator>,
    invalidator: Arc<dyn SessionInvalidator>,
}

impl AuthenticatedExecutor {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        transport: Arc<dyn Transport>,
        coordinator: Arc<RefreshCoordinator>,
        invalidator: Arc<dyn SessionInvalidator>,
    ) -> Self {
        Self {
            store,
            transport,
            coordinator,
            invalidator,
        }
    }

    /// Perform `request` with the current access credential.
    ///
    /// Any `Authorization` header already on `request` is replaced. Fails with
    /// a session-level error when there is no credential to send or the
    /// credential could not be refreshed; everything else, including the
    /// replay's own outcome, comes back as the transport produced it.
    #[instrument(
        skip_all,
        fields(request_id = %Uuid::new_v4(), method = %request.method, url = %request.url)
    )]
    pub async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        // Taken before the credential is read, so a 401 that lands after a
        // newer refresh has settled reuses that refresh
        let seen = self.coordinator.generation();
        let Some(access) = self.store.get(ACCESS_KEY).map(Secret::new) else {
            warn!("no access credential, invalidating session");
            self.invalidator.invalidate();
            crate::metrics::record_invalidation("no_access_credential");
            return Err(Error::NoAccessCredential);
        };

        let first = request.with_bearer(access.expose())?;
        let response = self.transport.perform(&first).await?;
        if !response.is_unauthorized() {
            debug!(status = %response.status, "request completed");
            return Ok(response);
        }

        debug!("access credential rejected, awaiting refresh");
        let refreshed = self
            .coordinator
            .acquire_refreshed_credential_since(seen)
            .await
            .map_err(|e| Error::SessionExpired(e.to_string()))?;

        let replay = request.with_bearer(refreshed.expose())?;
        let response = self.transport.perform(&replay).await?;
        debug!(status = %response.status, "replay completed");
        Ok(response)
    }

    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.execute(HttpRequest::get(url)).await
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<HttpResponse> {
        self.execute(HttpRequest::post(url).json(body)?).await
    }
}
