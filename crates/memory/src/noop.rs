//! No-op backends: disable caching or memory persistence entirely.

use async_trait::async_trait;
use concierge_core::cache::{CacheKey, FreshnessCache};
use concierge_core::entities::{EntityKind, EntityStore, RelationKind};
use concierge_core::error::{CacheError, EntityStoreError, FactStoreError};
use concierge_core::facts::{FactCategory, FactStore};
use std::collections::BTreeMap;
use std::time::Duration;

/// A cache that never hits.
pub struct NoopCache;

#[async_trait]
impl FreshnessCache for NoopCache {
    fn name(&self) -> &str { "none" }

    async fn get(&self, _key: &CacheKey) -> Result<Option<serde_json::Value>, CacheError> {
        Ok(None)
    }

    async fn put(&self, _key: &CacheKey, _data: serde_json::Value, _ttl: Duration) -> Result<(), CacheError> {
        Ok(())
    }

    async fn invalidate(&self, _user_id: &str, _resource_type: &str) -> Result<usize, CacheError> {
        Ok(0)
    }
}

/// A fact store that discards every write and recalls nothing.
pub struct NoopFactStore;

#[async_trait]
impl FactStore for NoopFactStore {
    fn name(&self) -> &str { "none" }

    async fn write(&self, _user_id: &str, _category: FactCategory, _content: &str) -> Result<(), FactStoreError> {
        Ok(())
    }
}

/// An entity store that discards every write and recalls nothing.
pub struct NoopEntityStore;

#[async_trait]
impl EntityStore for NoopEntityStore {
    fn name(&self) -> &str { "none" }

    async fn upsert(
        &self,
        _user_id: &str,
        _name: &str,
        _kind: EntityKind,
        _properties: &BTreeMap<String, String>,
    ) -> Result<bool, EntityStoreError> {
        Ok(false)
    }

    async fn relate(
        &self,
        _user_id: &str,
        _source: &str,
        _kind: RelationKind,
        _target: &str,
    ) -> Result<bool, EntityStoreError> {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_stores_remember_nothing() {
        NoopFactStore.write("u1", FactCategory::Fact, "Lives in Milan").await.unwrap();
        assert!(NoopFactStore.recall("u1", "Milan", 5).await.unwrap().is_empty());

        let created = NoopEntityStore
            .upsert("u1", "Milan", EntityKind::Location, &BTreeMap::new())
            .await
            .unwrap();
        assert!(!created);
        assert!(NoopEntityStore.recall("u1", "Milan", 5).await.unwrap().is_empty());
    }
}
