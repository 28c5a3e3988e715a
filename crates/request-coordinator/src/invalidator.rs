//! Session invalidation boundary
//!
//! The coordinator calls `invalidate()` once per failed refresh episode and
//! never waits on it. What invalidation means (clearing storage, navigating to
//! a login flow) belongs to the caller; `ClearSession` is the stock
//! implementation used by the client binary.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use session_auth::{
    ACCESS_KEY, CredentialStore, REDIRECT_AFTER_LOGIN_KEY, REFRESH_KEY, USER_KEY,
};
use tracing::{debug, info};

/// Called when the session can't be recovered.
pub trait SessionInvalidator: Send + Sync {
    fn invalidate(&self);
}

impl<F> SessionInvalidator for F
where
    F: Fn() + Send + Sync,
{
    fn invalidate(&self) {
        self()
    }
}

type LocationFn = Box<dyn Fn() -> Option<String> + Send + Sync>;
type LogoutFn = Box<dyn Fn() + Send + Sync>;

/// Clears stored credentials and hands control to a login flow.
///
/// Safe to call repeatedly: storage is cleared every time, but the logout
/// callback fires once until `rearm()` is called after the next login.
pub struct ClearSession {
    store: Arc<dyn CredentialStore>,
    login_route: String,
    current_location: LocationFn,
    on_logout: LogoutFn,
    armed: AtomicBool,
}

impl ClearSession {
    pub fn new(store: Arc<dyn CredentialStore>, login_route: impl Into<String>) -> Self {
        Self {
            store,
            login_route: login_route.into(),
            current_location: Box::new(|| None),
            on_logout: Box::new(|| {}),
            armed: AtomicBool::new(true),
        }
    }

    /// Where the user currently is; remembered so login can return there.
    pub fn with_location(mut self, f: impl Fn() -> Option<String> + Send + Sync + 'static) -> Self {
        self.current_location = Box::new(f);
        self
    }

    /// Navigation hook, e.g. redirect to the login route.
    pub fn on_logout(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_logout = Box::new(f);
        self
    }

    pub fn login_route(&self) -> &str {
        &self.login_route
    }

    /// Allow the logout callback to fire again.
    pub fn rearm(&self) {
        self.armed.store(true, Ordering::Release);
    }
}

impl SessionInvalidator for ClearSession {
    fn invalidate(&self) {
        for key in [ACCESS_KEY, REFRESH_KEY, USER_KEY] {
            self.store.remove(key);
        }

        if let Some(location) = (self.current_location)()
            && location != self.login_route
        {
            self.store.set(REDIRECT_AFTER_LOGIN_KEY, &location);
        }

        if self.armed.swap(false, Ordering::AcqRel) {
            info!(login_route = %self.login_route, "session invalidated");
            (self.on_logout)();
        } else {
            debug!("session already invalidated, storage cleared again");
        }
    }
}
