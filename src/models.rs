//! Data models for the scan gateway.
//!
//! This module contains the core data structures shared by the backend
//! client, the dispatcher, the result store and the HTTP layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// One of the three analysis backends consulted per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    /// Style and security linting.
    Static,
    /// Package extraction and vulnerability lookups.
    Dependency,
    /// Model-driven review.
    Ai,
}

impl ServiceKind {
    /// All backends, in dispatch order.
    pub const ALL: [ServiceKind; 3] = [ServiceKind::Static, ServiceKind::Dependency, ServiceKind::Ai];

    /// Short machine name, used in config keys, logs and health output.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Static => "static",
            ServiceKind::Dependency => "dependency",
            ServiceKind::Ai => "ai",
        }
    }

    /// Human-readable label for detail views.
    pub fn label(&self) -> &'static str {
        match self {
            ServiceKind::Static => "Static Analysis",
            ServiceKind::Dependency => "Dependency Analysis",
            ServiceKind::Ai => "AI Analysis",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Static description of a backend service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDescriptor {
    /// Which backend this is.
    pub kind: ServiceKind,
    /// Base URL, without the `/analyze` suffix.
    pub base_url: String,
    /// Contribution of this service to the composite score.
    pub weight: f64,
    /// Hard deadline for one analyze call.
    pub timeout: Duration,
}

impl ServiceDescriptor {
    pub fn name(&self) -> &'static str {
        self.kind.as_str()
    }

    /// Join a path onto the base URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// The three configured backends.
#[derive(Debug, Clone)]
pub struct Services {
    pub static_analysis: ServiceDescriptor,
    pub dependency: ServiceDescriptor,
    pub ai: ServiceDescriptor,
}

impl Services {
    /// Iterate over the descriptors in dispatch order.
    pub fn iter(&self) -> impl Iterator<Item = &ServiceDescriptor> {
        [&self.static_analysis, &self.dependency, &self.ai].into_iter()
    }

    /// The longest per-service timeout; bounds a whole dispatch.
    pub fn max_timeout(&self) -> Duration {
        self.iter().map(|s| s.timeout).max().unwrap_or_default()
    }
}

/// Why a backend call produced no usable payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    ConnectionError,
    ProtocolError,
    Unknown,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::ConnectionError => write!(f, "connection error"),
            FailureKind::ProtocolError => write!(f, "protocol error"),
            FailureKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// Failure details retained on a normalized result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceFailure {
    pub kind: FailureKind,
    pub message: String,
}

/// Outcome of a single backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceOutcome {
    Success(Value),
    Failure(ServiceFailure),
}

/// Canonical per-service shape used for scoring and display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedResult {
    pub service: ServiceKind,
    /// Whether the backend answered with a usable payload.
    pub ok: bool,
    pub issue_count: u64,
    pub vulnerability_count: u64,
    pub risk_score: f64,
    /// Raw backend payload, or the canonical default when the call failed.
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ServiceFailure>,
}

impl NormalizedResult {
    /// The number this service is penalised by.
    pub fn metric(&self) -> f64 {
        match self.service {
            ServiceKind::Static => self.issue_count as f64,
            ServiceKind::Dependency => self.vulnerability_count as f64,
            ServiceKind::Ai => self.risk_score,
        }
    }
}

/// Overall classification of a fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    /// Every backend answered.
    Success,
    /// Some, but not all, backends answered.
    Partial,
    /// No backend answered.
    Error,
}

impl OverallStatus {
    /// Classify from per-service success flags.
    pub fn from_flags(flags: &[bool]) -> Self {
        let succeeded = flags.iter().filter(|ok| **ok).count();
        if succeeded == flags.len() {
            OverallStatus::Success
        } else if succeeded == 0 {
            OverallStatus::Error
        } else {
            OverallStatus::Partial
        }
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverallStatus::Success => write!(f, "success"),
            OverallStatus::Partial => write!(f, "partial"),
            OverallStatus::Error => write!(f, "error"),
        }
    }
}

/// The result of one analyze request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedResult {
    pub static_analysis: NormalizedResult,
    pub dependency_analysis: NormalizedResult,
    pub ai_analysis: NormalizedResult,
    pub status: OverallStatus,
    /// Weighted composite in `[0, 100]`, two decimals.
    pub overall_score: f64,
    /// Set once the result has been persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl CombinedResult {
    /// The normalized result for one service.
    pub fn service(&self, kind: ServiceKind) -> &NormalizedResult {
        match kind {
            ServiceKind::Static => &self.static_analysis,
            ServiceKind::Dependency => &self.dependency_analysis,
            ServiceKind::Ai => &self.ai_analysis,
        }
    }
}

/// Durable form of a combined result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecord {
    pub id: String,
    /// Assigned by the store at save time.
    pub timestamp: DateTime<Utc>,
    pub source_code: String,
    pub static_analysis: NormalizedResult,
    pub dependency_analysis: NormalizedResult,
    pub ai_analysis: NormalizedResult,
    pub status: OverallStatus,
    pub overall_score: f64,
}

impl ScanRecord {
    /// Build a record from a combined result and the store-assigned identity.
    pub fn from_combined(
        id: String,
        timestamp: DateTime<Utc>,
        code: &str,
        combined: &CombinedResult,
    ) -> Self {
        Self {
            id,
            timestamp,
            source_code: code.to_string(),
            static_analysis: combined.static_analysis.clone(),
            dependency_analysis: combined.dependency_analysis.clone(),
            ai_analysis: combined.ai_analysis.clone(),
            status: combined.status,
            overall_score: combined.overall_score,
        }
    }
}

/// Overall health verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthVerdict {
    Healthy,
    Degraded,
}

/// Result of probing every dependency of the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthReport {
    /// Per backend, keyed by service name.
    pub services: BTreeMap<String, bool>,
    /// Name of the datastore, used as its key in health output.
    pub datastore_name: String,
    pub datastore: bool,
    pub overall: HealthVerdict,
}

impl HealthReport {
    /// Reduce individual probe results to a report.
    pub fn from_probes(
        services: BTreeMap<String, bool>,
        datastore_name: String,
        datastore: bool,
    ) -> Self {
        let overall = if datastore && services.values().all(|up| *up) {
            HealthVerdict::Healthy
        } else {
            HealthVerdict::Degraded
        };

        Self {
            services,
            datastore_name,
            datastore,
            overall,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.overall == HealthVerdict::Healthy
    }
}
