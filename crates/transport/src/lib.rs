//! Single-exchange HTTP transport
//!
//! Defines the `Transport` trait that decouples request coordination from the
//! HTTP client. A transport performs exactly one exchange per call: it never
//! retries and never inspects status codes. Deciding what a 401 means is the
//! caller's job.
//!
//! `ReqwestTransport` is the production implementation; tests substitute
//! scripted fakes behind `Arc<dyn Transport>`.

pub mod http;

pub use http::ReqwestTransport;
pub use reqwest::header;
pub use reqwest::{Method, StatusCode};

use bytes::Bytes;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::pin::Pin;

/// Errors from a single HTTP exchange.
///
/// These are request-level failures. They are surfaced to callers as-is and
/// never trigger credential refresh.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("failed to decode response: {0}")]
    Decode(String),
}

/// Result alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// An outbound request, captured once and replayable.
///
/// Replays go through `with_bearer`, which returns a copy differing only in
/// the `Authorization` header.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    /// Add or replace a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set a raw body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `value` as the JSON body and set `Content-Type`.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self> {
        let encoded = serde_json::to_vec(value)
            .map_err(|e| TransportError::InvalidRequest(format!("encoding JSON body: {e}")))?;
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Some(Bytes::from(encoded));
        Ok(self)
    }

    /// Copy of this request carrying `Authorization: Bearer <token>`.
    ///
    /// Any existing `Authorization` header is replaced. The header is marked
    /// sensitive so it is omitted from `Debug` output.
    pub fn with_bearer(&self, token: &str) -> Result<Self> {
        let mut value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
            TransportError::InvalidRequest(format!("credential is not a valid header value: {e}"))
        })?;
        value.set_sensitive(true);

        let mut request = self.clone();
        request.headers.insert(AUTHORIZATION, value);
        Ok(request)
    }

    /// The bearer token on this request, if any.
    pub fn bearer(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
    }
}

/// A completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Whether the server rejected the credential (HTTP 401).
    pub fn is_unauthorized(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED
    }

    /// Body as UTF-8, lossily.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

/// Performs one HTTP exchange.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn Transport>`).
pub trait Transport: Send + Sync {
    fn perform<'a>(
        &'a self,
        request: &'a HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse>> + Send + 'a>>;
}
