//! Shared fixtures for unit tests: in-process fake analyzers and stores.

use crate::models::{CombinedResult, ScanRecord, ServiceDescriptor, ServiceKind, Services};
use crate::store::{ScanStore, StoreError};
use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// How a fake analyzer answers `POST /analyze`.
#[derive(Debug, Clone)]
pub enum Reply {
    Json(Value),
    Status(StatusCode, String),
    Garbage,
    Delayed(Duration, Value),
}

impl Reply {
    async fn respond(&self) -> Response {
        match self {
            Reply::Json(body) => Json(body.clone()).into_response(),
            Reply::Status(code, body) => (*code, body.clone()).into_response(),
            Reply::Garbage => (StatusCode::OK, "<html>definitely not json</html>").into_response(),
            Reply::Delayed(delay, body) => {
                tokio::time::sleep(*delay).await;
                Json(body.clone()).into_response()
            }
        }
    }
}

/// Handle to a running fake analyzer.
pub struct FakeBackend {
    pub url: String,
    hits: Arc<AtomicUsize>,
}

impl FakeBackend {
    /// Number of `POST /analyze` requests received.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Spawn a fake analyzer whose `/health` answers 200.
pub async fn spawn_backend(reply: Reply) -> FakeBackend {
    spawn_backend_with_health(reply, StatusCode::OK).await
}

/// Spawn a fake analyzer with a fixed `/health` status.
pub async fn spawn_backend_with_health(reply: Reply, health: StatusCode) -> FakeBackend {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let reply = Arc::new(reply);

    let app = Router::new()
        .route(
            "/analyze",
            post(move || {
                let reply = reply.clone();
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    reply.respond().await
                }
            }),
        )
        .route("/health", get(move || async move { health }));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    FakeBackend {
        url: format!("http://{}", addr),
        hits,
    }
}

/// A URL on which nothing is listening.
pub async fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

pub fn descriptor(kind: ServiceKind, url: &str, timeout: Duration) -> ServiceDescriptor {
    let weight = match kind {
        ServiceKind::Static => 0.2,
        ServiceKind::Dependency => 0.3,
        ServiceKind::Ai => 0.5,
    };
    ServiceDescriptor {
        kind,
        base_url: url.to_string(),
        weight,
        timeout,
    }
}

pub fn services(static_url: &str, dependency_url: &str, ai_url: &str, timeout: Duration) -> Services {
    Services {
        static_analysis: descriptor(ServiceKind::Static, static_url, timeout),
        dependency: descriptor(ServiceKind::Dependency, dependency_url, timeout),
        ai: descriptor(ServiceKind::Ai, ai_url, timeout),
    }
}

pub fn static_payload(total_issues: u64) -> Value {
    json!({
        "status": "success",
        "static_analyzer": {
            "pylint": [],
            "bandit": [],
            "summary": { "total_issues": total_issues }
        }
    })
}

pub fn dependency_payload(total_vulnerabilities: u64) -> Value {
    json!({
        "status": "success",
        "dependency_analyzer": {
            "dependencies": ["requests"],
            "total_vulnerabilities_found": total_vulnerabilities
        }
    })
}

pub fn ai_payload(risk_score: f64) -> Value {
    json!({
        "status": "success",
        "data": { "findings": [], "risk_score": risk_score }
    })
}

/// A store whose every operation fails.
pub struct FailingStore;

#[async_trait]
impl ScanStore for FailingStore {
    fn name(&self) -> &str {
        "mongodb"
    }

    async fn save(&self, _code: &str, _combined: &CombinedResult) -> Result<String, StoreError> {
        Err(StoreError::Write("disk full".to_string()))
    }

    async fn list_recent(&self, _limit: usize) -> Result<Vec<ScanRecord>, StoreError> {
        Err(StoreError::Read("cursor closed".to_string()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("no primary".to_string()))
    }
}
