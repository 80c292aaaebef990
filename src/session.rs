//! Per-session cache of the last analysis result.
//!
//! Entries live for a fixed window after the most recent write. Values are
//! stored behind an `Arc` and replaced whole, so a concurrent reader sees
//! either the previous result or the new one, never a mix.

use crate::models::CombinedResult;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Default lifetime of a session entry.
pub const DEFAULT_LIFETIME_SECS: u64 = 300;

#[derive(Debug, Clone)]
struct SessionEntry {
    result: Arc<CombinedResult>,
    expires_at: DateTime<Utc>,
}

/// Last combined result per session id.
#[derive(Debug)]
pub struct SessionCache {
    entries: DashMap<String, SessionEntry>,
    lifetime: Duration,
}

impl SessionCache {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            lifetime,
        }
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Store `result` for `session_id`, restarting the full expiry window.
    pub fn put(&self, session_id: &str, result: CombinedResult) {
        self.put_at(session_id, result, Utc::now());
    }

    /// The session's last result, if it has not expired.
    pub fn get(&self, session_id: &str) -> Option<Arc<CombinedResult>> {
        self.get_at(session_id, Utc::now())
    }

    pub(crate) fn put_at(&self, session_id: &str, result: CombinedResult, now: DateTime<Utc>) {
        let entry = SessionEntry {
            result: Arc::new(result),
            expires_at: now + self.lifetime,
        };
        self.entries.insert(session_id.to_string(), entry);
    }

    pub(crate) fn get_at(&self, session_id: &str, now: DateTime<Utc>) -> Option<Arc<CombinedResult>> {
        let expired_at = {
            let entry = self.entries.get(session_id)?;
            if now < entry.expires_at {
                return Some(entry.result.clone());
            }
            entry.expires_at
        };

        // Drop it unless a writer renewed it in the meantime.
        self.entries
            .remove_if(session_id, |_, entry| entry.expires_at == expired_at);
        None
    }

    /// Remove every expired entry. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now())
    }

    pub(crate) fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| now < entry.expires_at);
        let purged = before.saturating_sub(self.entries.len());
        if purged > 0 {
            debug!("Purged {} expired sessions", purged);
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
