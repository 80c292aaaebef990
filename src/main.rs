//! ScanGate - security scan gateway
//!
//! An HTTP service that fans submitted source code out to three analysis
//! backends, blends their findings into one security score, records each
//! scan and remembers the last result per browser session.
//!
//! Exit codes:
//!   0 - Clean shutdown
//!   1 - Startup error (bad config, invalid MongoDB URL, bind failure)

mod analysis;
mod backend;
mod cli;
mod config;
mod error;
mod health;
mod models;
mod server;
mod session;
mod store;

#[cfg(test)]
mod test_support;

use analysis::{Dispatcher, ScoreModel};
use anyhow::{Context, Result};
use backend::BackendClient;
use cli::Args;
use config::{Config, StoreBackend, DEFAULT_CONFIG_FILE};
use health::HealthAggregator;
use server::AppState;
use session::SessionCache;
use std::sync::Arc;
use std::time::Duration;
use store::{MemoryScanStore, MongoScanStore, ScanStore};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args)?;

    info!("ScanGate v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    if let Err(e) = run_gateway(args).await {
        error!("Gateway failed: {:#}", e);
        eprintln!("\nError: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Handle --init-config: generate a default .scangate.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "{} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to customize analyzer URLs, weights, storage and sessions.");
    Ok(())
}

/// Initialize logging. `RUST_LOG` takes precedence over the verbosity flags.
fn init_logging(args: &Args) -> Result<()> {
    let builder = FmtSubscriber::builder()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact();

    let result = match EnvFilter::try_from_default_env() {
        Ok(filter) => tracing::subscriber::set_global_default(
            builder.with_env_filter(filter).finish(),
        ),
        Err(_) => tracing::subscriber::set_global_default(
            builder.with_max_level(args.log_level()).finish(),
        ),
    };

    result.context("Failed to set tracing subscriber")
}

/// Build every component and serve until shutdown.
async fn run_gateway(args: Args) -> Result<()> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);
    config.validate()?;

    let services = config.services.descriptors();
    for service in services.iter() {
        info!(
            "Analyzer {}: {} (weight {}, timeout {}s)",
            service.name(),
            service.base_url,
            service.weight,
            service.timeout.as_secs()
        );
    }

    let probe_timeout = Duration::from_secs(config.health.probe_timeout_seconds);
    let client = Arc::new(BackendClient::new(probe_timeout)?);

    let store = open_store(&config).await?;

    let sessions = Arc::new(SessionCache::new(chrono::Duration::seconds(
        config.session.lifetime_seconds as i64,
    )));
    spawn_session_sweeper(
        sessions.clone(),
        Duration::from_secs(config.session.sweep_interval_seconds),
    );

    let scoring = ScoreModel::new(&services, config.scoring.penalties());
    let dispatcher = Arc::new(Dispatcher::new(
        client.clone(),
        services.clone(),
        scoring,
        store.clone(),
        sessions.clone(),
    ));
    let health = Arc::new(HealthAggregator::new(
        client,
        services,
        store.clone(),
        probe_timeout,
    ));

    let state = AppState {
        dispatcher,
        health,
        store,
        sessions,
        cookie_name: config.session.cookie_name.clone(),
        recent_limit: config.storage.recent_limit,
    };

    let listener = TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;

    server::serve(listener, state).await?;
    info!("Gateway stopped");
    Ok(())
}

/// Open the configured datastore.
async fn open_store(config: &Config) -> Result<Arc<dyn ScanStore>> {
    match config.storage.backend {
        StoreBackend::Mongodb => {
            let store = MongoScanStore::connect(
                &config.storage.url,
                &config.storage.database,
                &config.storage.collection,
            )
            .await
            .context("Failed to open MongoDB store")?;
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => {
            warn!("Using in-memory store; scan history is lost on restart");
            Ok(Arc::new(MemoryScanStore::new()))
        }
    }
}

/// Periodically drop expired sessions.
fn spawn_session_sweeper(sessions: Arc<SessionCache>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let purged = sessions.purge_expired();
            if purged > 0 {
                debug!("Purged {} expired sessions, {} live", purged, sessions.len());
            }
        }
    });
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location; a file that exists but does not parse is fatal
    match Config::load_default()? {
        Some(config) => {
            info!("Loaded default config from {}", DEFAULT_CONFIG_FILE);
            Ok(config)
        }
        None => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
    }
}
