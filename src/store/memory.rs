//! In-process scan store.

use super::{ScanStore, StoreError};
use crate::models::{CombinedResult, ScanRecord};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Keeps records in insertion order; lost on restart.
#[derive(Debug, Default)]
pub struct MemoryScanStore {
    records: RwLock<Vec<ScanRecord>>,
}

impl MemoryScanStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScanStore for MemoryScanStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn save(&self, code: &str, combined: &CombinedResult) -> Result<String, StoreError> {
        let id = Uuid::new_v4().simple().to_string();
        let record = ScanRecord::from_combined(id.clone(), Utc::now(), code, combined);
        self.records.write().await.push(record);
        Ok(id)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<ScanRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(records.iter().rev().take(limit).cloned().collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
