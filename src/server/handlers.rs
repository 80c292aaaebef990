//! Request handlers.

use super::AppState;
use crate::error::GatewayError;
use crate::models::{CombinedResult, HealthReport, HealthVerdict, NormalizedResult, ScanRecord, ServiceKind};
use crate::store::clamp_limit;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    #[serde(default)]
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct RecentQuery {
    limit: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct HealthResponse {
    status: HealthVerdict,
    services: BTreeMap<String, bool>,
}

impl From<HealthReport> for HealthResponse {
    fn from(report: HealthReport) -> Self {
        let mut services = report.services;
        services.insert(report.datastore_name, report.datastore);
        Self {
            status: report.overall,
            services,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ServiceDetails {
    analysis_type: &'static str,
    results: NormalizedResult,
    overall_score: f64,
}

/// Extract and check the code to analyze.
fn parse_code(body: &[u8]) -> Result<String, GatewayError> {
    let request: AnalyzeRequest = serde_json::from_slice(body).map_err(|_| {
        GatewayError::Validation("Request body must be a JSON object with a 'code' string".to_string())
    })?;

    match request.code {
        Some(code) if !code.trim().is_empty() => Ok(code),
        _ => Err(GatewayError::Validation("No code provided".to_string())),
    }
}

/// Requested `/recent-scan` size. Anything unparsable falls back to the default.
fn recent_limit(raw: Option<&str>, default: usize) -> usize {
    raw.and_then(|value| value.trim().parse::<i64>().ok())
        .map_or_else(|| clamp_limit(default as i64), clamp_limit)
}

/// The caller's session id, if it sent a well-formed one.
///
/// Ids are unsigned bearer tokens: any UUID the client presents is accepted,
/// and only gives access to results stored under that same id.
fn session_id(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .and_then(|(_, value)| Uuid::parse_str(value).ok())
        .map(|id| id.to_string())
}

fn last_result(state: &AppState, headers: &HeaderMap) -> Result<Arc<CombinedResult>, GatewayError> {
    session_id(headers, &state.cookie_name)
        .and_then(|id| state.sessions.get(&id))
        .ok_or_else(|| GatewayError::NotFound("No analysis found for this session".to_string()))
}

/// `POST /analyze`
pub(super) async fn analyze(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let code = parse_code(&body)?;
    let session_id = session_id(&headers, &state.cookie_name)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    debug!("Analyzing {} bytes of code", code.len());
    let combined = state.dispatcher.analyze(&code, &session_id).await;

    // Re-issued on every request so the browser's expiry tracks the cache.
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        state.cookie_name,
        session_id,
        state.sessions.lifetime().num_seconds()
    );

    Ok(([(header::SET_COOKIE, cookie)], Json(combined)).into_response())
}

/// `GET /health`
pub(super) async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let report = state.health.check_all().await;
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(HealthResponse::from(report)))
}

/// `GET /recent-scan?limit=N`
pub(super) async fn recent_scan(
    State(state): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> Result<Json<Vec<ScanRecord>>, GatewayError> {
    let limit = recent_limit(query.limit.as_deref(), state.recent_limit);
    let records = state.store.list_recent(limit).await?;
    Ok(Json(records))
}

/// `GET /last-analysis`
pub(super) async fn last_analysis(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CombinedResult>, GatewayError> {
    let last = last_result(&state, &headers)?;
    Ok(Json(last.as_ref().clone()))
}

fn service_details(
    state: &AppState,
    headers: &HeaderMap,
    kind: ServiceKind,
) -> Result<Json<ServiceDetails>, GatewayError> {
    let last = last_result(state, headers)?;
    Ok(Json(ServiceDetails {
        analysis_type: kind.label(),
        results: last.service(kind).clone(),
        overall_score: last.overall_score,
    }))
}

/// `GET /static-analysis`
pub(super) async fn static_details(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ServiceDetails>, GatewayError> {
    service_details(&state, &headers, ServiceKind::Static)
}

/// `GET /dependency-analysis`
pub(super) async fn dependency_details(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ServiceDetails>, GatewayError> {
    service_details(&state, &headers, ServiceKind::Dependency)
}

/// `GET /ai-analysis`
pub(super) async fn ai_details(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ServiceDetails>, GatewayError> {
    service_details(&state, &headers, ServiceKind::Ai)
}
