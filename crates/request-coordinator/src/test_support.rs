//! Scripted transport and invalidator shared by the unit tests.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use session_auth::AuthEndpoints;
use tokio::sync::Notify;
use transport::{HttpRequest, HttpResponse, StatusCode, Transport, TransportError};

use crate::invalidator::SessionInvalidator;

pub const BASE_URL: &str = "http://api.test";

pub fn endpoints() -> AuthEndpoints {
    AuthEndpoints::from_base(BASE_URL)
}

pub fn api_url(path: &str) -> String {
    format!("{BASE_URL}{path}")
}

/// Fake backend: an API that accepts exactly one bearer credential, plus the
/// auth endpoints.
///
/// API requests carrying the accepted credential get `api_status` with the
/// request body echoed back; anything else gets 401.
pub struct ScriptedTransport {
    accepted: String,
    api_status: StatusCode,
    always_unauthorized: bool,
    fail_accepted: bool,
    refresh: (StatusCode, String),
    login: (StatusCode, String),
    logout_status: StatusCode,
    gate: Option<Arc<Notify>>,
    held_api: Option<(String, Arc<Notify>)>,
    refresh_calls: AtomicUsize,
    logout_calls: AtomicUsize,
    refresh_bodies: Mutex<Vec<serde_json::Value>>,
    api_requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new(accepted: &str) -> Self {
        Self {
            accepted: accepted.to_string(),
            api_status: StatusCode::OK,
            always_unauthorized: false,
            fail_accepted: false,
            refresh: (StatusCode::INTERNAL_SERVER_ERROR, String::new()),
            login: (StatusCode::UNAUTHORIZED, String::new()),
            logout_status: StatusCode::OK,
            gate: None,
            held_api: None,
            refresh_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            refresh_bodies: Mutex::new(Vec::new()),
            api_requests: Mutex::new(Vec::new()),
        }
    }

    pub fn refresh_ok(mut self, body: &str) -> Self {
        self.refresh = (StatusCode::OK, body.to_string());
        self
    }

    pub fn refresh_fails(mut self, status: u16) -> Self {
        let status = StatusCode::from_u16(status).unwrap();
        self.refresh = (status, r#"{"detail":"Token is invalid or expired"}"#.to_string());
        self
    }

    pub fn login_ok(mut self, body: &str) -> Self {
        self.login = (StatusCode::OK, body.to_string());
        self
    }

    pub fn logout_status(mut self, status: u16) -> Self {
        self.logout_status = StatusCode::from_u16(status).unwrap();
        self
    }

    /// Refresh exchanges wait for `gate` before answering.
    pub fn hold_refresh(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// The first request to API `path` waits for `gate` before answering.
    pub fn hold_api(mut self, path: &str, gate: Arc<Notify>) -> Self {
        self.held_api = Some((api_url(path), gate));
        self
    }

    /// Status returned for requests carrying the accepted credential.
    pub fn api_status(mut self, status: u16) -> Self {
        self.api_status = StatusCode::from_u16(status).unwrap();
        self
    }

    /// Reject every API request, whatever it carries.
    pub fn always_unauthorized(mut self) -> Self {
        self.always_unauthorized = true;
        self
    }

    /// Requests carrying the accepted credential fail at the network level.
    pub fn fail_accepted(mut self) -> Self {
        self.fail_accepted = true;
        self
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    pub fn last_refresh_body(&self) -> Option<serde_json::Value> {
        self.refresh_bodies.lock().unwrap().last().cloned()
    }

    pub fn api_requests(&self) -> Vec<HttpRequest> {
        self.api_requests.lock().unwrap().clone()
    }

    async fn answer(&self, request: &HttpRequest) -> transport::Result<HttpResponse> {
        let endpoints = endpoints();
        if request.url == endpoints.refresh_url {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(body) = &request.body {
                self.refresh_bodies
                    .lock()
                    .unwrap()
                    .push(serde_json::from_slice(body).unwrap());
            }
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            let (status, body) = &self.refresh;
            return Ok(HttpResponse::new(*status, body.clone()));
        }
        if request.url == endpoints.login_url {
            let (status, body) = &self.login;
            return Ok(HttpResponse::new(*status, body.clone()));
        }
        if request.url == endpoints.logout_url {
            self.logout_calls.fetch_add(1, Ordering::SeqCst);
            return Ok(HttpResponse::new(self.logout_status, ""));
        }

        let first_to_url = {
            let mut sent = self.api_requests.lock().unwrap();
            let first = !sent.iter().any(|r| r.url == request.url);
            sent.push(request.clone());
            first
        };
        if let Some((url, gate)) = &self.held_api
            && first_to_url
            && request.url == *url
        {
            gate.notified().await;
        }
        let accepted =
            !self.always_unauthorized && request.bearer() == Some(self.accepted.as_str());
        if !accepted {
            return Ok(HttpResponse::new(
                StatusCode::UNAUTHORIZED,
                r#"{"code":"token_not_valid"}"#,
            ));
        }
        if self.fail_accepted {
            return Err(TransportError::Connect("connection reset".into()));
        }
        Ok(HttpResponse::new(
            self.api_status,
            request.body.clone().unwrap_or_default(),
        ))
    }
}

impl Transport for ScriptedTransport {
    fn perform<'a>(
        &'a self,
        request: &'a HttpRequest,
    ) -> Pin<Box<dyn Future<Output = transport::Result<HttpResponse>> + Send + 'a>> {
        Box::pin(self.answer(request))
    }
}

/// Counts `invalidate()` calls.
#[derive(Default)]
pub struct CountingInvalidator {
    calls: AtomicUsize,
}

impl CountingInvalidator {
    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SessionInvalidator for CountingInvalidator {
    fn invalidate(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}
