//! HTTP surface of the gateway.
//!
//! Thin axum layer over the dispatcher, the health aggregator, the result
//! store and the session cache. All shared state is built at startup and
//! injected through [`AppState`].

mod handlers;

use crate::analysis::Dispatcher;
use crate::health::HealthAggregator;
use crate::session::SessionCache;
use crate::store::ScanStore;
use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Shared handles for request handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub health: Arc<HealthAggregator>,
    pub store: Arc<dyn ScanStore>,
    pub sessions: Arc<SessionCache>,
    /// Cookie carrying the session id.
    pub cookie_name: String,
    /// Default for `/recent-scan` when no limit is given.
    pub recent_limit: usize,
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/analyze", post(handlers::analyze))
        .route("/health", get(handlers::health))
        .route("/recent-scan", get(handlers::recent_scan))
        .route("/last-analysis", get(handlers::last_analysis))
        .route("/static-analysis", get(handlers::static_details))
        .route("/dependency-analysis", get(handlers::dependency_details))
        .route("/ai-analysis", get(handlers::ai_details))
        .with_state(state)
}

/// Serve until Ctrl-C.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    let addr = listener.local_addr().context("Failed to read listen address")?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!("Cannot listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
