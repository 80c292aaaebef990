//! Fan-out of one analyze request to every analyzer.
//!
//! The three backend calls share nothing and run concurrently, so a request
//! costs the slowest configured deadline rather than the sum of them. A
//! failed backend is recorded in the result, never raised.

use crate::analysis::aggregator::ScoreModel;
use crate::analysis::normalizer::normalize;
use crate::backend::BackendClient;
use crate::models::{CombinedResult, OverallStatus, Services};
use crate::session::SessionCache;
use crate::store::ScanStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

pub struct Dispatcher {
    client: Arc<BackendClient>,
    services: Services,
    scoring: ScoreModel,
    store: Arc<dyn ScanStore>,
    sessions: Arc<SessionCache>,
}

impl Dispatcher {
    pub fn new(
        client: Arc<BackendClient>,
        services: Services,
        scoring: ScoreModel,
        store: Arc<dyn ScanStore>,
        sessions: Arc<SessionCache>,
    ) -> Self {
        info!(
            "Dispatcher ready: {} analyzers, worst-case latency {}ms",
            services.iter().count(),
            services.max_timeout().as_millis()
        );

        Self {
            client,
            services,
            scoring,
            store,
            sessions,
        }
    }

    /// Call all analyzers concurrently and combine their answers.
    pub async fn dispatch(&self, code: &str) -> CombinedResult {
        let started = Instant::now();
        let services = &self.services;

        let (static_outcome, dependency_outcome, ai_outcome) = tokio::join!(
            self.client.call(&services.static_analysis, code),
            self.client.call(&services.dependency, code),
            self.client.call(&services.ai, code),
        );

        let static_analysis = normalize(&services.static_analysis, static_outcome);
        let dependency_analysis = normalize(&services.dependency, dependency_outcome);
        let ai_analysis = normalize(&services.ai, ai_outcome);

        let status = OverallStatus::from_flags(&[
            static_analysis.ok,
            dependency_analysis.ok,
            ai_analysis.ok,
        ]);
        let overall_score = self
            .scoring
            .aggregate(&static_analysis, &dependency_analysis, &ai_analysis);

        info!(
            status = %status,
            score = overall_score,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Analysis complete"
        );

        CombinedResult {
            static_analysis,
            dependency_analysis,
            ai_analysis,
            status,
            overall_score,
            scan_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Dispatch, persist (best-effort) and remember the result for `session_id`.
    pub async fn analyze(&self, code: &str, session_id: &str) -> CombinedResult {
        let mut combined = self.dispatch(code).await;

        match self.store.save(code, &combined).await {
            Ok(scan_id) => combined.scan_id = Some(scan_id),
            Err(e) => warn!(datastore = self.store.name(), "Failed to store scan result: {}", e),
        }

        self.sessions.put(session_id, combined.clone());
        combined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FailureKind, ServiceKind};
    use crate::store::MemoryScanStore;
    use crate::test_support::{
        ai_payload, dependency_payload, services, spawn_backend, static_payload, unreachable_url,
        FailingStore, Reply,
    };
    use axum::http::StatusCode;
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;

    fn dispatcher(services: Services, store: Arc<dyn ScanStore>) -> (Dispatcher, Arc<SessionCache>) {
        let sessions = Arc::new(SessionCache::new(ChronoDuration::minutes(5)));
        let client = Arc::new(BackendClient::new(Duration::from_secs(1)).unwrap());
        let dispatcher = Dispatcher::new(
            client,
            services,
            ScoreModel::default(),
            store,
            sessions.clone(),
        );
        (dispatcher, sessions)
    }

    #[tokio::test]
    async fn test_all_success() {
        let s = spawn_backend(Reply::Json(static_payload(5))).await;
        let d = spawn_backend(Reply::Json(dependency_payload(2))).await;
        let a = spawn_backend(Reply::Json(ai_payload(7.0))).await;

        let (dispatcher, _) = dispatcher(
            services(&s.url, &d.url, &a.url, Duration::from_secs(2)),
            Arc::new(MemoryScanStore::new()),
        );
        let result = dispatcher.dispatch("import requests").await;

        assert_eq!(result.status, OverallStatus::Success);
        assert_eq!(result.static_analysis.issue_count, 5);
        assert_eq!(result.dependency_analysis.vulnerability_count, 2);
        assert_eq!(result.ai_analysis.risk_score, 7.0);
        assert_eq!(result.overall_score, 66.0);
        assert!(result.scan_id.is_none());
        assert_eq!((s.hits(), d.hits(), a.hits()), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_one_failure_is_partial() {
        let s = spawn_backend(Reply::Json(static_payload(0))).await;
        let d = spawn_backend(Reply::Status(StatusCode::BAD_GATEWAY, "down".to_string())).await;
        let a = spawn_backend(Reply::Json(ai_payload(5.0))).await;

        let (dispatcher, _) = dispatcher(
            services(&s.url, &d.url, &a.url, Duration::from_secs(2)),
            Arc::new(MemoryScanStore::new()),
        );
        let result = dispatcher.dispatch("x = 1").await;

        assert_eq!(result.status, OverallStatus::Partial);
        assert!(!result.dependency_analysis.ok);
        assert_eq!(
            result.dependency_analysis.error.as_ref().map(|e| e.kind),
            Some(FailureKind::ProtocolError)
        );
        // static 100, dependency default 100, ai 60
        assert_eq!(result.overall_score, 80.0);
    }

    #[tokio::test]
    async fn test_all_failures_is_error_with_optimistic_score() {
        let gone = unreachable_url().await;

        let (dispatcher, _) = dispatcher(
            services(&gone, &gone, &gone, Duration::from_secs(2)),
            Arc::new(MemoryScanStore::new()),
        );
        let result = dispatcher.dispatch("x = 1").await;

        assert_eq!(result.status, OverallStatus::Error);
        assert_eq!(result.overall_score, 100.0);
        for kind in ServiceKind::ALL {
            let service = result.service(kind);
            assert!(!service.ok);
            assert_eq!(
                service.error.as_ref().map(|e| e.kind),
                Some(FailureKind::ConnectionError)
            );
        }
    }

    #[tokio::test]
    async fn test_latency_is_bounded_by_slowest_deadline() {
        let s = spawn_backend(Reply::Delayed(Duration::from_millis(250), static_payload(1))).await;
        let d = spawn_backend(Reply::Delayed(Duration::from_millis(250), dependency_payload(1))).await;
        let a = spawn_backend(Reply::Delayed(Duration::from_secs(3), ai_payload(9.0))).await;

        let mut services = services(&s.url, &d.url, &a.url, Duration::from_secs(2));
        services.ai.timeout = Duration::from_millis(400);

        let (dispatcher, _) = dispatcher(services, Arc::new(MemoryScanStore::new()));

        let started = Instant::now();
        let result = dispatcher.dispatch("x = 1").await;
        let elapsed = started.elapsed();

        // Sequential calls would take at least 250 + 250 + 400ms.
        assert!(elapsed >= Duration::from_millis(400), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(850), "elapsed {:?}", elapsed);
        assert_eq!(result.status, OverallStatus::Partial);
        assert!(result.static_analysis.ok);
        assert!(result.dependency_analysis.ok);
        assert_eq!(
            result.ai_analysis.error.as_ref().map(|e| e.kind),
            Some(FailureKind::Timeout)
        );
        // The late AI answer must not leak into the result.
        assert_eq!(result.ai_analysis.risk_score, 0.0);
    }

    #[tokio::test]
    async fn test_analyze_persists_and_caches() {
        let s = spawn_backend(Reply::Json(static_payload(0))).await;
        let d = spawn_backend(Reply::Json(dependency_payload(0))).await;
        let a = spawn_backend(Reply::Json(ai_payload(0.0))).await;
        let store = Arc::new(MemoryScanStore::new());

        let (dispatcher, sessions) = dispatcher(
            services(&s.url, &d.url, &a.url, Duration::from_secs(2)),
            store.clone(),
        );
        let result = dispatcher.analyze("print('hi')", "session-1").await;

        let scan_id = result.scan_id.clone().expect("scan id attached");
        let recent = store.list_recent(1).await.unwrap();
        assert_eq!(recent[0].id, scan_id);
        assert_eq!(recent[0].source_code, "print('hi')");

        let cached = sessions.get("session-1").unwrap();
        assert_eq!(*cached, result);
    }

    #[tokio::test]
    async fn test_storage_failure_only_drops_scan_id() {
        let s = spawn_backend(Reply::Json(static_payload(2))).await;
        let d = spawn_backend(Reply::Json(dependency_payload(0))).await;
        let gone = unreachable_url().await;

        let (dispatcher, sessions) = dispatcher(
            services(&s.url, &d.url, &gone, Duration::from_secs(2)),
            Arc::new(FailingStore),
        );
        let result = dispatcher.analyze("x = 1", "session-2").await;

        assert_eq!(result.status, OverallStatus::Partial);
        assert!(result.scan_id.is_none());
        assert_eq!(result.overall_score, 98.8);
        assert!(sessions.get("session-2").is_some());
    }
}
