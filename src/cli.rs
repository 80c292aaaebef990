//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and environment fallbacks.

use crate::config::StoreBackend;
use clap::Parser;
use std::path::PathBuf;

/// ScanGate - security scan gateway
///
/// Fans submitted code out to the static, dependency and AI analyzers,
/// blends their findings into one 0-100 security score and records every
/// scan.
///
/// Examples:
///   scangate
///   scangate --config ./scangate.toml --verbose
///   scangate --store memory --ai-url http://localhost:5001
///   scangate --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to configuration file
    ///
    /// If not specified, looks for .scangate.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Address to listen on (e.g. 0.0.0.0:5000)
    #[arg(short, long, value_name = "ADDR", env = "SCANGATE_BIND")]
    pub bind: Option<String>,

    /// Static analyzer base URL
    #[arg(long, value_name = "URL", env = "STATIC_ANALYZER_URL")]
    pub static_url: Option<String>,

    /// Dependency analyzer base URL
    #[arg(long, value_name = "URL", env = "DEPENDENCY_SCANNER_URL")]
    pub dependency_url: Option<String>,

    /// AI analyzer base URL
    #[arg(long, value_name = "URL", env = "AI_ANALYZER_URL")]
    pub ai_url: Option<String>,

    /// Per-analyzer request timeout in seconds (applies to all three)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Datastore for scan records
    #[arg(long, value_name = "BACKEND")]
    pub store: Option<StoreBackend>,

    /// MongoDB connection string
    #[arg(long, value_name = "URL", env = "MONGODB_URL")]
    pub mongodb_url: Option<String>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .scangate.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        // Validate timeout if provided
        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        // Validate the config path if provided
        if let Some(ref path) = self.config {
            if !path.is_file() {
                return Err(format!("Config file does not exist: {}", path.display()));
            }
        }

        if let Some(ref bind) = self.bind {
            if bind.parse::<std::net::SocketAddr>().is_err() {
                return Err(format!("Invalid listen address: {}", bind));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
