//! Configuration file handling.
//!
//! This module handles loading, merging and validating configuration from
//! `.scangate.toml` files, environment variables and CLI flags.

use crate::analysis::default_penalty;
use crate::health::DEFAULT_PROBE_TIMEOUT_SECS;
use crate::models::{ServiceDescriptor, ServiceKind, Services};
use crate::session::DEFAULT_LIFETIME_SECS;
use crate::store::{DEFAULT_RECENT_LIMIT, MAX_RECENT_LIMIT};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use std::time::Duration;

/// Name of the config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".scangate.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Analyzer backends.
    #[serde(default)]
    pub services: ServicesConfig,

    /// Score penalties.
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Result persistence.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Session cache settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Health probe settings.
    #[serde(default)]
    pub health: HealthConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on.
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:5000".to_string()
}

/// One analyzer backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceConfig {
    /// Base URL of the analyzer.
    pub url: String,

    /// Share of the composite score (0.0 - 1.0).
    pub weight: f64,

    /// Deadline for one analyze call, in seconds.
    pub timeout_seconds: u64,
}

/// A `[services.*]` section as written; missing keys keep that service's default.
#[derive(Debug, Deserialize)]
struct ServiceSection {
    url: Option<String>,
    weight: Option<f64>,
    timeout_seconds: Option<u64>,
}

impl ServiceSection {
    fn over(self, base: ServiceConfig) -> ServiceConfig {
        ServiceConfig {
            url: self.url.unwrap_or(base.url),
            weight: self.weight.unwrap_or(base.weight),
            timeout_seconds: self.timeout_seconds.unwrap_or(base.timeout_seconds),
        }
    }
}

fn static_section<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ServiceConfig, D::Error> {
    Ok(ServiceSection::deserialize(deserializer)?.over(default_static_service()))
}

fn dependency_section<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<ServiceConfig, D::Error> {
    Ok(ServiceSection::deserialize(deserializer)?.over(default_dependency_service()))
}

fn ai_section<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ServiceConfig, D::Error> {
    Ok(ServiceSection::deserialize(deserializer)?.over(default_ai_service()))
}

fn default_service_timeout() -> u64 {
    30
}

/// The three analyzer backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(
        default = "default_static_service",
        rename = "static",
        deserialize_with = "static_section"
    )]
    pub static_analysis: ServiceConfig,

    #[serde(
        default = "default_dependency_service",
        deserialize_with = "dependency_section"
    )]
    pub dependency: ServiceConfig,

    #[serde(default = "default_ai_service", deserialize_with = "ai_section")]
    pub ai: ServiceConfig,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            static_analysis: default_static_service(),
            dependency: default_dependency_service(),
            ai: default_ai_service(),
        }
    }
}

fn default_static_service() -> ServiceConfig {
    ServiceConfig {
        url: "http://static-analyzer:5003".to_string(),
        weight: 0.2,
        timeout_seconds: default_service_timeout(),
    }
}

fn default_dependency_service() -> ServiceConfig {
    ServiceConfig {
        url: "http://dependency-analyzer:5004".to_string(),
        weight: 0.3,
        timeout_seconds: default_service_timeout(),
    }
}

fn default_ai_service() -> ServiceConfig {
    ServiceConfig {
        url: "http://ai-analyzer:5001".to_string(),
        weight: 0.5,
        timeout_seconds: default_service_timeout(),
    }
}

impl ServicesConfig {
    fn get(&self, kind: ServiceKind) -> &ServiceConfig {
        match kind {
            ServiceKind::Static => &self.static_analysis,
            ServiceKind::Dependency => &self.dependency,
            ServiceKind::Ai => &self.ai,
        }
    }

    fn get_mut(&mut self, kind: ServiceKind) -> &mut ServiceConfig {
        match kind {
            ServiceKind::Static => &mut self.static_analysis,
            ServiceKind::Dependency => &mut self.dependency,
            ServiceKind::Ai => &mut self.ai,
        }
    }

    fn descriptor(&self, kind: ServiceKind) -> ServiceDescriptor {
        let service = self.get(kind);
        ServiceDescriptor {
            kind,
            base_url: service.url.clone(),
            weight: service.weight,
            timeout: Duration::from_secs(service.timeout_seconds),
        }
    }

    /// Build the runtime descriptors.
    pub fn descriptors(&self) -> Services {
        Services {
            static_analysis: self.descriptor(ServiceKind::Static),
            dependency: self.descriptor(ServiceKind::Dependency),
            ai: self.descriptor(ServiceKind::Ai),
        }
    }
}

/// Points deducted per unit of each service's metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Per static-analysis issue.
    #[serde(default = "default_static_penalty")]
    pub static_penalty: f64,

    /// Per known vulnerability.
    #[serde(default = "default_dependency_penalty")]
    pub dependency_penalty: f64,

    /// Per AI risk point (1-10 scale).
    #[serde(default = "default_ai_penalty")]
    pub ai_penalty: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            static_penalty: default_static_penalty(),
            dependency_penalty: default_dependency_penalty(),
            ai_penalty: default_ai_penalty(),
        }
    }
}

fn default_static_penalty() -> f64 {
    default_penalty(ServiceKind::Static)
}

fn default_dependency_penalty() -> f64 {
    default_penalty(ServiceKind::Dependency)
}

fn default_ai_penalty() -> f64 {
    default_penalty(ServiceKind::Ai)
}

impl ScoringConfig {
    pub fn penalties(&self) -> [f64; 3] {
        [self.static_penalty, self.dependency_penalty, self.ai_penalty]
    }
}

/// Which datastore holds scan records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// MongoDB document store (default)
    #[default]
    Mongodb,
    /// In-process store, lost on restart
    Memory,
}

/// Result persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Datastore kind.
    #[serde(default)]
    pub backend: StoreBackend,

    /// MongoDB connection string.
    #[serde(default = "default_mongodb_url")]
    pub url: String,

    /// Database name.
    #[serde(default = "default_database")]
    pub database: String,

    /// Collection holding scan records.
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Default number of records for `/recent-scan`.
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            url: default_mongodb_url(),
            database: default_database(),
            collection: default_collection(),
            recent_limit: default_recent_limit(),
        }
    }
}

fn default_mongodb_url() -> String {
    "mongodb://mongodb-service:27017".to_string()
}

fn default_database() -> String {
    "security_scanner".to_string()
}

fn default_collection() -> String {
    "scan_results".to_string()
}

fn default_recent_limit() -> usize {
    DEFAULT_RECENT_LIMIT
}

/// Session cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Seconds a session keeps its last result.
    #[serde(default = "default_session_lifetime")]
    pub lifetime_seconds: u64,

    /// Cookie carrying the session id.
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// How often expired sessions are swept, in seconds.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lifetime_seconds: default_session_lifetime(),
            cookie_name: default_cookie_name(),
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

fn default_session_lifetime() -> u64 {
    DEFAULT_LIFETIME_SECS
}

fn default_cookie_name() -> String {
    "scangate_session".to_string()
}

fn default_sweep_interval() -> u64 {
    60
}

/// Health probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Deadline for each probe, in seconds.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_seconds: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_timeout_seconds: default_probe_timeout(),
        }
    }
}

fn default_probe_timeout() -> u64 {
    DEFAULT_PROBE_TIMEOUT_SECS
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments and their env fallbacks.
    ///
    /// Only values that were actually provided override the file.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref bind) = args.bind {
            self.server.bind = bind.clone();
        }

        let urls = [
            (ServiceKind::Static, &args.static_url),
            (ServiceKind::Dependency, &args.dependency_url),
            (ServiceKind::Ai, &args.ai_url),
        ];
        for (kind, url) in urls {
            if let Some(url) = url {
                self.services.get_mut(kind).url = url.clone();
            }
        }

        if let Some(timeout) = args.timeout {
            for kind in ServiceKind::ALL {
                self.services.get_mut(kind).timeout_seconds = timeout;
            }
        }

        if let Some(backend) = args.store {
            self.storage.backend = backend;
        }
        if let Some(ref url) = args.mongodb_url {
            self.storage.url = url.clone();
        }
    }

    /// Check the merged configuration once at startup.
    pub fn validate(&self) -> Result<()> {
        for kind in ServiceKind::ALL {
            let service = self.services.get(kind);

            if !service.url.starts_with("http://") && !service.url.starts_with("https://") {
                bail!(
                    "{} analyzer URL must start with 'http://' or 'https://': {}",
                    kind,
                    service.url
                );
            }
            if !(0.0..=1.0).contains(&service.weight) {
                bail!("{} analyzer weight must be between 0.0 and 1.0", kind);
            }
            if service.timeout_seconds == 0 {
                bail!("{} analyzer timeout must be at least 1 second", kind);
            }
        }

        for (name, penalty) in ["static", "dependency", "ai"]
            .iter()
            .zip(self.scoring.penalties())
        {
            if !penalty.is_finite() || penalty < 0.0 {
                bail!("{} penalty must be a non-negative number", name);
            }
        }

        if self.storage.backend == StoreBackend::Mongodb {
            if !self.storage.url.starts_with("mongodb://")
                && !self.storage.url.starts_with("mongodb+srv://")
            {
                bail!("MongoDB URL must start with 'mongodb://' or 'mongodb+srv://'");
            }
            if self.storage.database.is_empty() || self.storage.collection.is_empty() {
                bail!("MongoDB database and collection names must not be empty");
            }
        }

        if self.storage.recent_limit == 0 || self.storage.recent_limit > MAX_RECENT_LIMIT {
            bail!("Recent scan limit must be between 1 and {}", MAX_RECENT_LIMIT);
        }
        if self.session.lifetime_seconds == 0 {
            bail!("Session lifetime must be at least 1 second");
        }
        if self.session.cookie_name.is_empty() {
            bail!("Session cookie name must not be empty");
        }
        if self.session.sweep_interval_seconds == 0 {
            bail!("Session sweep interval must be at least 1 second");
        }
        if self.health.probe_timeout_seconds == 0 {
            bail!("Health probe timeout must be at least 1 second");
        }

        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.bind, "0.0.0.0:5000");
        assert_eq!(config.services.ai.url, "http://ai-analyzer:5001");
        assert_eq!(config.services.ai.weight, 0.5);
        assert_eq!(config.scoring.penalties(), [3.0, 5.0, 8.0]);
        assert_eq!(config.storage.backend, StoreBackend::Mongodb);
        assert_eq!(config.session.lifetime_seconds, 300);
        assert_eq!(config.health.probe_timeout_seconds, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[server]
bind = "127.0.0.1:8080"

[services.static]
url = "http://localhost:5003"
weight = 0.25
timeout_seconds = 10

[services.ai]
url = "http://localhost:5001"
weight = 0.45

[scoring]
ai_penalty = 10.0

[storage]
backend = "memory"
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(config.services.static_analysis.weight, 0.25);
        assert_eq!(config.services.static_analysis.timeout_seconds, 10);
        assert_eq!(config.services.ai.timeout_seconds, 30);
        assert_eq!(config.services.dependency, default_dependency_service());
        assert_eq!(config.scoring.penalties(), [3.0, 5.0, 10.0]);
        assert_eq!(config.storage.backend, StoreBackend::Memory);
        assert_eq!(config.storage.database, "security_scanner");
    }

    #[test]
    fn test_partial_service_section_keeps_its_defaults() {
        let config: Config = toml::from_str("[services.ai]\ntimeout_seconds = 60\n").unwrap();
        assert_eq!(config.services.ai.timeout_seconds, 60);
        assert_eq!(config.services.ai.url, "http://ai-analyzer:5001");
        assert_eq!(config.services.ai.weight, 0.5);
        assert_eq!(config.services.static_analysis, default_static_service());

        let config: Config =
            toml::from_str("[services.dependency]\nurl = \"http://localhost:5004\"\n").unwrap();
        assert_eq!(config.services.dependency.url, "http://localhost:5004");
        assert_eq!(config.services.dependency.weight, 0.3);
        assert_eq!(config.services.dependency.timeout_seconds, 30);
    }

    #[test]
    fn test_descriptors() {
        let services = Config::default().services.descriptors();
        assert_eq!(services.static_analysis.kind, ServiceKind::Static);
        assert_eq!(services.dependency.base_url, "http://dependency-analyzer:5004");
        assert_eq!(services.ai.timeout, Duration::from_secs(30));
        assert_eq!(services.max_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.services.dependency.url = "dependency-analyzer:5004".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.services.ai.weight = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.services.static_analysis.timeout_seconds = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.storage.url = "postgres://db".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scoring.static_penalty = -1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.session.lifetime_seconds = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.storage.recent_limit = 5000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_memory_backend_ignores_mongodb_url() {
        let mut config = Config::default();
        config.storage.backend = StoreBackend::Memory;
        config.storage.url = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[server]"));
        assert!(toml_str.contains("[services.static]"));
        assert!(toml_str.contains("[storage]"));

        let reparsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(reparsed.services.ai.url, "http://ai-analyzer:5001");
    }
}
