//! MongoDB-backed scan store.
//!
//! Records go to a single collection (default `security_scanner.scan_results`)
//! with the server-side timestamp used for recency ordering.

use super::{ScanStore, StoreError};
use crate::models::{CombinedResult, NormalizedResult, OverallStatus, ScanRecord};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, DateTime as BsonDateTime};
use mongodb::options::{ClientOptions, FindOptions};
use mongodb::{Client, Collection};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// How long the driver waits for a usable server before failing an operation.
const SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Document layout in the collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredScan {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    timestamp: BsonDateTime,
    source_code: String,
    static_analysis: NormalizedResult,
    dependency_analysis: NormalizedResult,
    ai_analysis: NormalizedResult,
    status: OverallStatus,
    overall_security_score: f64,
}

impl StoredScan {
    fn new(code: &str, combined: &CombinedResult, timestamp: chrono::DateTime<Utc>) -> Self {
        Self {
            id: None,
            timestamp: BsonDateTime::from_millis(timestamp.timestamp_millis()),
            source_code: code.to_string(),
            static_analysis: combined.static_analysis.clone(),
            dependency_analysis: combined.dependency_analysis.clone(),
            ai_analysis: combined.ai_analysis.clone(),
            status: combined.status,
            overall_security_score: combined.overall_score,
        }
    }

    fn into_record(self) -> ScanRecord {
        let timestamp = Utc
            .timestamp_millis_opt(self.timestamp.timestamp_millis())
            .single()
            .unwrap_or_default();

        ScanRecord {
            id: self.id.map(|id| id.to_hex()).unwrap_or_default(),
            timestamp,
            source_code: self.source_code,
            static_analysis: self.static_analysis,
            dependency_analysis: self.dependency_analysis,
            ai_analysis: self.ai_analysis,
            status: self.status,
            overall_score: self.overall_security_score,
        }
    }
}

pub struct MongoScanStore {
    client: Client,
    collection: Collection<StoredScan>,
}

impl MongoScanStore {
    /// Build a client for `url`. The driver connects lazily, so an
    /// unreachable server surfaces on first use rather than here.
    pub async fn connect(url: &str, database: &str, collection: &str) -> Result<Self, StoreError> {
        let mut options = ClientOptions::parse(url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        options.app_name = Some("scangate".to_string());
        options.server_selection_timeout = Some(SERVER_SELECTION_TIMEOUT);

        let client =
            Client::with_options(options).map_err(|e| StoreError::Connection(e.to_string()))?;
        let handle = client.database(database).collection::<StoredScan>(collection);

        info!("Using MongoDB collection {}.{}", database, collection);
        Ok(Self {
            client,
            collection: handle,
        })
    }
}

#[async_trait]
impl ScanStore for MongoScanStore {
    fn name(&self) -> &str {
        "mongodb"
    }

    async fn save(&self, code: &str, combined: &CombinedResult) -> Result<String, StoreError> {
        let stored = StoredScan::new(code, combined, Utc::now());

        let result = self
            .collection
            .insert_one(&stored, None)
            .await
            .map_err(|e| StoreError::Write(e.to_string()))?;

        let id = result
            .inserted_id
            .as_object_id()
            .map(|id| id.to_hex())
            .unwrap_or_else(|| result.inserted_id.to_string());

        debug!("Stored scan {}", id);
        Ok(id)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<ScanRecord>, StoreError> {
        let mut options = FindOptions::default();
        options.sort = Some(doc! { "timestamp": -1 });
        options.limit = Some(limit as i64);

        let mut cursor = self
            .collection
            .find(None, options)
            .await
            .map_err(|e| StoreError::Read(e.to_string()))?;

        let mut records = Vec::new();
        while let Some(stored) = cursor
            .try_next()
            .await
            .map_err(|e| StoreError::Read(e.to_string()))?
        {
            records.push(stored.into_record());
        }

        Ok(records)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map(|_| ())
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}
