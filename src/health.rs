//! Health aggregation across the analyzers and the datastore.

use crate::backend::BackendClient;
use crate::models::{HealthReport, Services};
use crate::store::ScanStore;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default deadline for each individual probe.
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;

/// Probes every dependency concurrently and reduces the results.
pub struct HealthAggregator {
    client: Arc<BackendClient>,
    services: Services,
    store: Arc<dyn ScanStore>,
    probe_timeout: Duration,
}

impl HealthAggregator {
    pub fn new(
        client: Arc<BackendClient>,
        services: Services,
        store: Arc<dyn ScanStore>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            client,
            services,
            store,
            probe_timeout,
        }
    }

    /// Probe all analyzers and the datastore. Never fails.
    pub async fn check_all(&self) -> HealthReport {
        let probes = join_all(self.services.iter().map(|service| async move {
            (service.name().to_string(), self.client.probe(service).await)
        }));

        let (services, datastore) = tokio::join!(probes, self.ping_store());
        let services: BTreeMap<String, bool> = services.into_iter().collect();

        let report = HealthReport::from_probes(services, self.store.name().to_string(), datastore);
        debug!(
            overall = ?report.overall,
            datastore = report.datastore,
            "Health check complete"
        );
        report
    }

    async fn ping_store(&self) -> bool {
        match tokio::time::timeout(self.probe_timeout, self.store.ping()).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(datastore = self.store.name(), "Health check failed: {}", e);
                false
            }
            Err(_) => {
                warn!(
                    datastore = self.store.name(),
                    "Health check timed out after {}ms",
                    self.probe_timeout.as_millis()
                );
                false
            }
        }
    }
}
