//! Durable storage of scan results.
//!
//! The gateway only needs three things from a datastore: insert a record
//! and get its id back, list the most recent records, and a liveness ping.
//! [`ScanStore`] captures that contract; MongoDB and in-memory
//! implementations are provided.

pub mod memory;
pub mod mongo;

use crate::models::{CombinedResult, ScanRecord};
use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryScanStore;
pub use mongo::MongoScanStore;

/// Default number of records returned by `list_recent`.
pub const DEFAULT_RECENT_LIMIT: usize = 10;

/// Upper bound on `list_recent` requests.
pub const MAX_RECENT_LIMIT: usize = 100;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to connect to datastore: {0}")]
    Connection(String),

    #[error("failed to write scan record: {0}")]
    Write(String),

    #[error("failed to read scan records: {0}")]
    Read(String),

    #[error("datastore unavailable: {0}")]
    Unavailable(String),
}

/// Persistence for combined results.
#[async_trait]
pub trait ScanStore: Send + Sync {
    /// Name used as the datastore key in health output.
    fn name(&self) -> &str;

    /// Persist `combined` with its source code. Returns the new record id.
    async fn save(&self, code: &str, combined: &CombinedResult) -> Result<String, StoreError>;

    /// Most recent records first, at most `limit`.
    async fn list_recent(&self, limit: usize) -> Result<Vec<ScanRecord>, StoreError>;

    /// Cheap liveness check.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Clamp a requested limit to `[1, MAX_RECENT_LIMIT]`.
pub fn clamp_limit(limit: i64) -> usize {
    limit.clamp(1, MAX_RECENT_LIMIT as i64) as usize
}
