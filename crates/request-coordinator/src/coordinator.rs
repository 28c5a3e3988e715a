//! Single-flight credential refresh
//!
//! However many callers see a 401 at once, exactly one refresh exchange is in
//! flight. The first caller to find the coordinator `Idle` becomes the leader
//! and performs the exchange itself; everyone arriving while it runs is queued
//! as a waiter and resumed, in arrival order, with the leader's outcome.
//!
//! Transitions:
//! - Idle → Refreshing (first caller, becomes leader)
//! - Refreshing → Refreshing (later callers, queued as waiters)
//! - Refreshing → Idle (leader settles: waiters get the outcome)
//!
//! The state lock is never held across an `.await`. If the leader's future is
//! dropped before it settles, its drop guard fails the waiters and returns the
//! coordinator to `Idle`, so nobody hangs on a refresh that will never finish.
//!
//! Each settled episode bumps a generation counter and keeps its outcome. A
//! caller whose 401 belongs to a credential older than the last settled
//! episode gets that outcome instead of starting another exchange. On failure
//! the session is invalidated while the state is still `Refreshing`, so no new
//! episode can begin until the invalidation has happened.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use common::Secret;
use session_auth::{ACCESS_KEY, AuthEndpoints, CredentialStore, REFRESH_KEY};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use transport::Transport;

use crate::error::{Error, Result};
use crate::invalidator::SessionInvalidator;

/// Why a refresh episode failed, as broadcast to every waiter.
#[derive(Debug, Clone)]
enum RefreshFailure {
    NoRefreshCredential,
    Exchange(String),
    Abandoned,
}

impl RefreshFailure {
    fn label(&self) -> &'static str {
        match self {
            RefreshFailure::NoRefreshCredential => "no_refresh_credential",
            RefreshFailure::Exchange(_) => "refresh_rejected",
            RefreshFailure::Abandoned => "abandoned",
        }
    }
}

impl From<RefreshFailure> for Error {
    fn from(failure: RefreshFailure) -> Self {
        match failure {
            RefreshFailure::NoRefreshCredential => Error::NoRefreshCredential,
            RefreshFailure::Exchange(msg) => Error::RefreshExchangeFailed(msg),
            RefreshFailure::Abandoned => Error::RefreshAbandoned,
        }
    }
}

type Outcome = std::result::Result<Secret<String>, RefreshFailure>;

enum RefreshState {
    Idle,
    Refreshing {
        waiters: VecDeque<oneshot::Sender<Outcome>>,
    },
}

enum Role {
    Leader,
    Waiter(oneshot::Receiver<Outcome>),
    Settled(Outcome),
}

struct Inner {
    state: RefreshState,
    /// Episodes settled so far. Abandoned episodes do not count.
    generation: u64,
    last_outcome: Option<Outcome>,
}

/// Serializes credential refresh for one session.
pub struct RefreshCoordinator {
    store: Arc<dyn CredentialStore>,
    transport: Arc<dyn Transport>,
    endpoints: AuthEndpoints,
    invalidator: Arc<dyn SessionInvalidator>,
    refresh_timeout: Option<Duration>,
    inner: Mutex<Inner>,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        transport: Arc<dyn Transport>,
        endpoints: AuthEndpoints,
        invalidator: Arc<dyn SessionInvalidator>,
    ) -> Self {
        Self {
            store,
            transport,
            endpoints,
            invalidator,
            refresh_timeout: None,
            inner: Mutex::new(Inner {
                state: RefreshState::Idle,
                generation: 0,
                last_outcome: None,
            }),
        }
    }

    /// Bound the refresh exchange. A timed-out exchange counts as a failed
    /// refresh: waiters fail and the session is invalidated.
    ///
    /// Without a bound, a hung exchange holds every waiter indefinitely.
    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = Some(timeout);
        self
    }

    /// Get a freshly refreshed access credential.
    ///
    /// Starts the refresh exchange if none is in flight, otherwise waits for
    /// the one that is. All callers of one episode receive the same
    /// credential, or the same failure.
    pub async fn acquire_refreshed_credential(&self) -> Result<Secret<String>> {
        self.acquire(None).await
    }

    /// Like [`acquire_refreshed_credential`](Self::acquire_refreshed_credential),
    /// for a caller whose rejected credential was read when the coordinator
    /// was at generation `seen`.
    ///
    /// If an episode has settled since then, the caller's 401 is already
    /// answered: it gets that episode's credential or failure, and no new
    /// exchange starts.
    pub async fn acquire_refreshed_credential_since(&self, seen: u64) -> Result<Secret<String>> {
        self.acquire(Some(seen)).await
    }

    /// Number of refresh episodes settled so far.
    ///
    /// Read it before reading the access credential and pass it to
    /// [`acquire_refreshed_credential_since`](Self::acquire_refreshed_credential_since)
    /// if that credential is rejected.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    async fn acquire(&self, seen: Option<u64>) -> Result<Secret<String>> {
        let role = {
            let mut inner = self.lock();
            let settled = match (seen, &inner.last_outcome) {
                (Some(seen), Some(outcome)) if inner.generation > seen => Some(outcome.clone()),
                _ => None,
            };
            if let Some(outcome) = settled {
                debug!(seen, "refresh already settled since credential was read");
                Role::Settled(outcome)
            } else {
                match &mut inner.state {
                    RefreshState::Idle => {
                        inner.state = RefreshState::Refreshing {
                            waiters: VecDeque::new(),
                        };
                        Role::Leader
                    }
                    RefreshState::Refreshing { waiters } => {
                        let (tx, rx) = oneshot::channel();
                        waiters.push_back(tx);
                        debug!(position = waiters.len(), "refresh in flight, queued");
                        Role::Waiter(rx)
                    }
                }
            }
        };

        match role {
            Role::Leader => self.lead().await,
            Role::Waiter(rx) => match rx.await {
                Ok(outcome) => outcome.map_err(Error::from),
                Err(_) => Err(Error::RefreshAbandoned),
            },
            Role::Settled(outcome) => outcome.map_err(Error::from),
        }
    }

    /// Whether a refresh exchange is in flight.
    pub fn is_refreshing(&self) -> bool {
        matches!(self.lock().state, RefreshState::Refreshing { .. })
    }

    /// Callers currently queued behind the in-flight exchange.
    pub fn waiter_count(&self) -> usize {
        match &self.lock().state {
            RefreshState::Idle => 0,
            RefreshState::Refreshing { waiters } => waiters.len(),
        }
    }

    async fn lead(&self) -> Result<Secret<String>> {
        let mut flight = Flight {
            coordinator: self,
            settled: false,
        };
        debug!("starting refresh exchange");
        let outcome = self.exchange().await;

        // Invalidate before settling: the episode stays in flight until the
        // session is cleared
        if let Err(failure) = &outcome {
            crate::metrics::record_refresh(failure.label());
            warn!(reason = failure.label(), "refresh failed, invalidating session");
            self.invalidator.invalidate();
            crate::metrics::record_invalidation(failure.label());
        }
        let resumed = flight.settle(&outcome);

        match outcome {
            Ok(credential) => {
                crate::metrics::record_refresh("success");
                info!(waiters = resumed, "access credential refreshed");
                Ok(credential)
            }
            Err(failure) => {
                debug!(waiters = resumed, "refresh failure delivered");
                Err(failure.into())
            }
        }
    }

    async fn exchange(&self) -> Outcome {
        let refresh = self
            .store
            .get(REFRESH_KEY)
            .map(Secret::new)
            .ok_or(RefreshFailure::NoRefreshCredential)?;

        let exchange =
            session_auth::refresh_access(self.transport.as_ref(), &self.endpoints, refresh.expose());
        let result = match self.refresh_timeout {
            Some(limit) => tokio::time::timeout(limit, exchange).await.map_err(|_| {
                RefreshFailure::Exchange(format!(
                    "refresh exchange timed out after {}ms",
                    limit.as_millis()
                ))
            })?,
            None => exchange.await,
        };

        let response = result.map_err(|e| RefreshFailure::Exchange(e.to_string()))?;
        self.store.set(ACCESS_KEY, &response.access);
        if let Some(rotated) = &response.refresh {
            self.store.set(REFRESH_KEY, rotated);
        }
        Ok(Secret::new(response.access))
    }

    /// Return to `Idle`, handing back whoever was queued. A settled outcome
    /// starts the next generation.
    fn finish(&self, settled: Option<&Outcome>) -> VecDeque<oneshot::Sender<Outcome>> {
        let mut inner = self.lock();
        if let Some(outcome) = settled {
            inner.generation += 1;
            inner.last_outcome = Some(outcome.clone());
        }
        match std::mem::replace(&mut inner.state, RefreshState::Idle) {
            RefreshState::Idle => VecDeque::new(),
            RefreshState::Refreshing { waiters } => waiters,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Leader's hold on the in-flight refresh.
struct Flight<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl Flight<'_> {
    /// Resume every waiter, oldest first, with `outcome`. Returns how many
    /// were resumed.
    fn settle(&mut self, outcome: &Outcome) -> usize {
        self.settled = true;
        let waiters = self.coordinator.finish(Some(outcome));
        let count = waiters.len();
        for waiter in waiters {
            // A waiter whose caller went away has nothing to resume
            let _ = waiter.send(outcome.clone());
        }
        count
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let waiters = self.coordinator.finish(None);
        warn!(
            waiters = waiters.len(),
            "refresh leader dropped before completion, failing waiters"
        );
        crate::metrics::record_refresh(RefreshFailure::Abandoned.label());
        for waiter in waiters {
            let _ = waiter.send(Err(RefreshFailure::Abandoned));
        }
    }
}
