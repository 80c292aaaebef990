//! Normalization of analyzer responses.
//!
//! Each analyzer answers with its own JSON shape. This module maps a
//! [`ServiceOutcome`] onto a [`NormalizedResult`] so scoring never has to
//! care whether a backend answered, what it answered, or why it failed.

use crate::models::{NormalizedResult, ServiceDescriptor, ServiceKind, ServiceOutcome};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};

/// Static analyzer: `{"static_analyzer": {"summary": {"total_issues": N}}}`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StaticEnvelope {
    #[serde(deserialize_with = "or_default")]
    static_analyzer: StaticReport,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StaticReport {
    #[serde(deserialize_with = "or_default")]
    summary: StaticSummary,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StaticSummary {
    #[serde(deserialize_with = "lenient_count")]
    total_issues: u64,
}

/// Dependency analyzer: `{"dependency_analyzer": {"total_vulnerabilities_found": N}}`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DependencyEnvelope {
    #[serde(deserialize_with = "or_default")]
    dependency_analyzer: DependencyReport,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DependencyReport {
    #[serde(deserialize_with = "lenient_count")]
    total_vulnerabilities_found: u64,
}

/// AI analyzer: `{"data": {"risk_score": 1..10}}`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AiEnvelope {
    #[serde(deserialize_with = "or_default")]
    data: AiReport,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AiReport {
    #[serde(deserialize_with = "lenient_score")]
    risk_score: f64,
}

/// Accept any JSON for a nested object; fall back to the default if it
/// does not have the expected shape.
fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

fn lenient_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(number_from(&value).round() as u64)
}

fn lenient_score<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(number_from(&value))
}

/// A non-negative finite number from a JSON number or numeric string, else 0.
fn number_from(value: &Value) -> f64 {
    let n = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };

    if n.is_finite() && n > 0.0 {
        n
    } else {
        0.0
    }
}

/// The zero-valued payload reported for a backend that did not answer.
pub fn default_payload(kind: ServiceKind) -> Value {
    match kind {
        ServiceKind::Static => json!({
            "issues": [],
            "summary": { "total_issues": 0 }
        }),
        ServiceKind::Dependency => json!({
            "vulnerable_packages": [],
            "total_vulnerabilities": 0
        }),
        ServiceKind::Ai => json!({
            "findings": [],
            "risk_score": 0
        }),
    }
}

fn empty(kind: ServiceKind) -> NormalizedResult {
    NormalizedResult {
        service: kind,
        ok: false,
        issue_count: 0,
        vulnerability_count: 0,
        risk_score: 0.0,
        payload: default_payload(kind),
        error: None,
    }
}

fn parse<T: DeserializeOwned + Default>(payload: &Value) -> T {
    T::deserialize(payload).unwrap_or_default()
}

/// Map one backend outcome onto the canonical result shape.
pub fn normalize(service: &ServiceDescriptor, outcome: ServiceOutcome) -> NormalizedResult {
    let mut result = empty(service.kind);

    match outcome {
        ServiceOutcome::Success(payload) => {
            match service.kind {
                ServiceKind::Static => {
                    let envelope: StaticEnvelope = parse(&payload);
                    result.issue_count = envelope.static_analyzer.summary.total_issues;
                }
                ServiceKind::Dependency => {
                    let envelope: DependencyEnvelope = parse(&payload);
                    result.vulnerability_count =
                        envelope.dependency_analyzer.total_vulnerabilities_found;
                }
                ServiceKind::Ai => {
                    let envelope: AiEnvelope = parse(&payload);
                    result.risk_score = envelope.data.risk_score;
                }
            }
            result.ok = true;
            result.payload = payload;
        }
        ServiceOutcome::Failure(failure) => {
            result.error = Some(failure);
        }
    }

    result
}
