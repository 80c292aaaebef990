//! HTTP client for the analyzer backends.
//!
//! Every analyzer speaks the same contract: `POST /analyze {"code": ...}`
//! returns a JSON payload, `GET /health` returns 2xx when the service is up.
//! This client enforces the per-service deadline and classifies every
//! failure so callers can treat a failed backend as data.

use crate::models::{FailureKind, ServiceDescriptor, ServiceFailure, ServiceOutcome};
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Longest response body excerpt kept in an error message.
const MAX_ERROR_BODY: usize = 200;

/// Errors produced by a single backend call.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("could not connect: {0}")]
    Unreachable(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("unexpected error: {0}")]
    Unknown(String),
}

impl BackendError {
    pub fn kind(&self) -> FailureKind {
        match self {
            BackendError::Timeout(_) => FailureKind::Timeout,
            BackendError::Unreachable(_) => FailureKind::ConnectionError,
            BackendError::Protocol(_) => FailureKind::ProtocolError,
            BackendError::Unknown(_) => FailureKind::Unknown,
        }
    }

    /// Classify a transport error from reqwest.
    fn from_reqwest(err: reqwest::Error, deadline: Duration) -> Self {
        if err.is_timeout() {
            BackendError::Timeout(deadline)
        } else if err.is_connect() {
            BackendError::Unreachable(err.to_string())
        } else if err.is_decode() || err.is_body() || err.is_status() {
            BackendError::Protocol(err.to_string())
        } else {
            BackendError::Unknown(err.to_string())
        }
    }
}

impl From<BackendError> for ServiceFailure {
    fn from(err: BackendError) -> Self {
        ServiceFailure {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Request body sent to every analyzer.
#[derive(Debug, Serialize)]
struct AnalyzeBody<'a> {
    code: &'a str,
}

/// Stateless client shared by the dispatcher and the health aggregator.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    probe_timeout: Duration,
}

impl BackendClient {
    /// Create a client. `probe_timeout` bounds each `/health` request.
    pub fn new(probe_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("scangate/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            probe_timeout,
        })
    }

    /// Send `code` to one analyzer. Never fails; errors become `Failure`.
    pub async fn call(&self, service: &ServiceDescriptor, code: &str) -> ServiceOutcome {
        let started = Instant::now();

        // The outer deadline covers body streaming too; a response that
        // arrives after it is dropped with the future.
        let result = match tokio::time::timeout(service.timeout, self.send(service, code)).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout(service.timeout)),
        };

        match result {
            Ok(payload) => {
                debug!(
                    service = service.name(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Analyzer responded"
                );
                ServiceOutcome::Success(payload)
            }
            Err(err) => {
                warn!(
                    service = service.name(),
                    kind = %err.kind(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Analyzer call failed: {}",
                    err
                );
                ServiceOutcome::Failure(err.into())
            }
        }
    }

    async fn send(&self, service: &ServiceDescriptor, code: &str) -> Result<Value, BackendError> {
        let url = service.endpoint("analyze");

        let response = self
            .http
            .post(&url)
            .timeout(service.timeout)
            .json(&AnalyzeBody { code })
            .send()
            .await
            .map_err(|e| BackendError::from_reqwest(e, service.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Protocol(format!(
                "HTTP {}: {}",
                status,
                excerpt(&body)
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| BackendError::from_reqwest(e, service.timeout))?;

        let payload: Value = serde_json::from_slice(&bytes)
            .map_err(|e| BackendError::Protocol(format!("malformed response body: {}", e)))?;

        // Analyzers report their own failures inside a 2xx envelope.
        if payload.get("status").and_then(Value::as_str) == Some("error") {
            let message = payload
                .get("error")
                .or_else(|| payload.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("analyzer reported an error");
            return Err(BackendError::Protocol(message.to_string()));
        }

        Ok(payload)
    }

    /// Check `GET /health`. Healthy iff the status is 2xx.
    pub async fn probe(&self, service: &ServiceDescriptor) -> bool {
        let url = service.endpoint("health");

        match self.http.get(&url).timeout(self.probe_timeout).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(
                    service = service.name(),
                    "Health check returned {}",
                    response.status()
                );
                false
            }
            Err(e) => {
                let err = BackendError::from_reqwest(e, self.probe_timeout);
                warn!(
                    service = service.name(),
                    kind = %err.kind(),
                    "Health check failed: {}",
                    err
                );
                false
            }
        }
    }
}

fn excerpt(body: &str) -> &str {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ServiceKind;
    use crate::test_support::{
        descriptor, spawn_backend, spawn_backend_with_health, static_payload, unreachable_url,
        Reply,
    };
    use axum::http::StatusCode;
    use serde_json::json;

    fn client() -> BackendClient {
        BackendClient::new(Duration::from_secs(5)).unwrap()
    }

    fn failure_kind(outcome: &ServiceOutcome) -> Option<FailureKind> {
        match outcome {
            ServiceOutcome::Failure(f) => Some(f.kind),
            ServiceOutcome::Success(_) => None,
        }
    }

    #[tokio::test]
    async fn test_call_success_returns_payload() {
        let backend = spawn_backend(Reply::Json(static_payload(3))).await;
        let service = descriptor(ServiceKind::Static, &backend.url, Duration::from_secs(2));

        let outcome = client().call(&service, "import os").await;

        assert_eq!(outcome, ServiceOutcome::Success(static_payload(3)));
        assert_eq!(backend.hits(), 1);
    }

    #[tokio::test]
    async fn test_call_timeout() {
        let backend = spawn_backend(Reply::Delayed(Duration::from_secs(2), json!({}))).await;
        let service = descriptor(ServiceKind::Ai, &backend.url, Duration::from_millis(150));

        let started = Instant::now();
        let outcome = client().call(&service, "x = 1").await;

        assert_eq!(failure_kind(&outcome), Some(FailureKind::Timeout));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_call_connection_refused() {
        let url = unreachable_url().await;
        let service = descriptor(ServiceKind::Dependency, &url, Duration::from_secs(2));

        let outcome = client().call(&service, "x = 1").await;

        assert_eq!(failure_kind(&outcome), Some(FailureKind::ConnectionError));
    }

    #[tokio::test]
    async fn test_call_non_2xx_is_protocol_error() {
        let backend = spawn_backend(Reply::Status(
            StatusCode::INTERNAL_SERVER_ERROR,
            "boom".to_string(),
        ))
        .await;
        let service = descriptor(ServiceKind::Static, &backend.url, Duration::from_secs(2));

        let outcome = client().call(&service, "x = 1").await;

        match outcome {
            ServiceOutcome::Failure(f) => {
                assert_eq!(f.kind, FailureKind::ProtocolError);
                assert!(f.message.contains("500"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_call_malformed_body_is_protocol_error() {
        let backend = spawn_backend(Reply::Garbage).await;
        let service = descriptor(ServiceKind::Static, &backend.url, Duration::from_secs(2));

        let outcome = client().call(&service, "x = 1").await;

        assert_eq!(failure_kind(&outcome), Some(FailureKind::ProtocolError));
    }

    #[tokio::test]
    async fn test_call_error_envelope_is_protocol_error() {
        let backend = spawn_backend(Reply::Json(
            json!({"status": "error", "error": "No results found"}),
        ))
        .await;
        let service = descriptor(ServiceKind::Static, &backend.url, Duration::from_secs(2));

        let outcome = client().call(&service, "x = 1").await;

        match outcome {
            ServiceOutcome::Failure(f) => {
                assert_eq!(f.kind, FailureKind::ProtocolError);
                assert_eq!(f.message, "protocol error: No results found");
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_probe() {
        let up = spawn_backend(Reply::Json(json!({}))).await;
        let down = spawn_backend_with_health(Reply::Json(json!({})), StatusCode::SERVICE_UNAVAILABLE)
            .await;
        let gone = unreachable_url().await;

        let client = client();
        let timeout = Duration::from_secs(1);
        assert!(client.probe(&descriptor(ServiceKind::Static, &up.url, timeout)).await);
        assert!(!client.probe(&descriptor(ServiceKind::Static, &down.url, timeout)).await);
        assert!(!client.probe(&descriptor(ServiceKind::Static, &gone, timeout)).await);
    }

    #[test]
    fn test_excerpt_truncates_on_char_boundary() {
        let long = "é".repeat(MAX_ERROR_BODY + 10);
        assert_eq!(excerpt(&long).chars().count(), MAX_ERROR_BODY);
        assert_eq!(excerpt("short"), "short");
    }
}
