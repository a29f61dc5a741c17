//! In-memory freshness cache with per-entry expiry.

use async_trait::async_trait;
use concierge_core::cache::{CacheKey, FreshnessCache};
use concierge_core::error::CacheError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

struct Entry {
    data: serde_json::Value,
    expires_at: Instant,
}

/// A TTL cache held in process memory.
///
/// Expired entries are dropped lazily on the next `get` for their key.
#[derive(Clone)]
pub struct InMemoryFreshnessCache {
    entries: Arc<RwLock<HashMap<CacheKey, Entry>>>,
}

impl InMemoryFreshnessCache {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of stored entries, including ones that expired but were not read since.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for InMemoryFreshnessCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FreshnessCache for InMemoryFreshnessCache {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<serde_json::Value>, CacheError> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => return Ok(Some(entry.data.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        // Expired: re-check under the write lock, a concurrent put may have refreshed it.
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|e| e.expires_at <= now) {
            entries.remove(key);
            debug!(key = %key, "Cache entry expired");
        }
        Ok(None)
    }

    async fn put(
        &self,
        key: &CacheKey,
        data: serde_json::Value,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let entry = Entry {
            data,
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().await.insert(key.clone(), entry);
        Ok(())
    }

    async fn invalidate(&self, user_id: &str, resource_type: &str) -> Result<usize, CacheError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|k, _| !(k.user_id == user_id && k.resource_type == resource_type));
        Ok(before - entries.len())
    }
}
