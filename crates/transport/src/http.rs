//! reqwest-backed transport
//!
//! Forwards the request verbatim and returns the response verbatim, including
//! error status codes. No retries happen here.

use crate::{HttpRequest, HttpResponse, Result, Transport, TransportError};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;

pub struct ReqwestTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

impl Transport for ReqwestTransport {
    fn perform<'a>(
        &'a self,
        request: &'a HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse>> + Send + 'a>> {
        Box::pin(async move {
            let mut builder = self
                .client
                .request(request.method.clone(), &request.url)
                .headers(request.headers.clone())
                .timeout(self.timeout);
            if let Some(body) = &request.body {
                builder = builder.body(body.clone());
            }

            let response = builder.send().await.map_err(classify)?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response
                .bytes()
                .await
                .map_err(|e| TransportError::Body(e.to_string()))?;

            debug!(
                method = %request.method,
                url = %request.url,
                status = status.as_u16(),
                bytes = body.len(),
                "exchange complete"
            );

            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        })
    }
}

fn classify(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Request(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use std::net::SocketAddr;

    async fn echo_auth(headers: HeaderMap) -> (StatusCode, String) {
        match headers.get("authorization").and_then(|v| v.to_str().ok()) {
            Some("Bearer T2") => (StatusCode::OK, "firms".into()),
            _ => (StatusCode::UNAUTHORIZED, r#"{"detail":"token expired"}"#.into()),
        }
    }

    async fn echo_body(body: String) -> String {
        body
    }

    async fn slow() -> &'static str {
        tokio::time::sleep(Duration::from_secs(5)).await;
        "late"
    }

    /// Bind an in-process server on an ephemeral port.
    async fn spawn_server() -> SocketAddr {
        let app = Router::new()
            .route("/api/LLM/firms/list/", get(echo_auth))
            .route("/echo", post(echo_body))
            .route("/slow", get(slow));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn transport(timeout: Duration) -> ReqwestTransport {
        ReqwestTransport::new(reqwest::Client::new(), timeout)
    }

    #[tokio::test]
    async fn returns_unauthorized_without_retrying() {
        let addr = spawn_server().await;
        let request = HttpRequest::get(format!("http://{addr}/api/LLM/firms/list/"))
            .with_bearer("T1")
            .unwrap();

        let response = transport(Duration::from_secs(5))
            .perform(&request)
            .await
            .unwrap();

        assert!(response.is_unauthorized());
        assert!(response.text().contains("token expired"));
    }

    #[tokio::test]
    async fn forwards_authorization_header() {
        let addr = spawn_server().await;
        let request = HttpRequest::get(format!("http://{addr}/api/LLM/firms/list/"))
            .with_bearer("T2")
            .unwrap();

        let response = transport(Duration::from_secs(5))
            .perform(&request)
            .await
            .unwrap();

        assert_eq!(response.status.as_u16(), 200);
        assert_eq!(response.text(), "firms");
    }

    #[tokio::test]
    async fn forwards_body_verbatim() {
        let addr = spawn_server().await;
        let request = HttpRequest::post(format!("http://{addr}/echo")).body("hello firm");

        let response = transport(Duration::from_secs(5))
            .perform(&request)
            .await
            .unwrap();

        assert_eq!(response.text(), "hello firm");
    }

    #[tokio::test]
    async fn slow_upstream_maps_to_timeout() {
        let addr = spawn_server().await;
        let request = HttpRequest::get(format!("http://{addr}/slow"));

        let err = transport(Duration::from_millis(100))
            .perform(&request)
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::Timeout(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn refused_connection_maps_to_connect() {
        // Bind then drop to get a port nothing listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let request = HttpRequest::get(format!("http://{addr}/"));
        let err = transport(Duration::from_secs(5))
            .perform(&request)
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::Connect(_)), "got: {err:?}");
    }
}
