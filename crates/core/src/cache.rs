//! Freshness cache trait: TTL-bounded short-circuit for capability calls.
//!
//! Entries are keyed by `(user_id, capability, resource_type)`, narrowed by
//! an optional request scope for capabilities whose answer depends on
//! the query (search, lookups). A hit lets
//! the execution layer skip the handler entirely; the cached payload is
//! treated exactly like a live success. Backends are expected to provide
//! their own per-key atomicity.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use crate::error::CacheError;

/// Key of one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub user_id: String,
    pub capability: String,
    pub resource_type: String,

    /// Request discriminator; `None` means one entry per resource type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl CacheKey {
    pub fn new(
        user_id: impl Into<String>,
        capability: impl Into<String>,
        resource_type: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            capability: capability.into(),
            resource_type: resource_type.into(),
            scope: None,
        }
    }

    /// Narrow the key to one request, e.g. a normalized search query.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cache:{}:{}:{}", self.resource_type, self.capability, self.user_id)?;
        if let Some(scope) = &self.scope {
            write!(f, ":{scope}")?;
        }
        Ok(())
    }
}

/// The freshness cache contract.
#[async_trait]
pub trait FreshnessCache: Send + Sync {
    /// The backend name (e.g., "in_memory", "none").
    fn name(&self) -> &str;

    /// Return the cached payload if it is still fresh.
    async fn get(&self, key: &CacheKey) -> std::result::Result<Option<serde_json::Value>, CacheError>;

    /// Store a payload for `ttl`.
    async fn put(
        &self,
        key: &CacheKey,
        data: serde_json::Value,
        ttl: Duration,
    ) -> std::result::Result<(), CacheError>;

    /// Drop every entry for a user and resource type, whatever its scope.
    /// Returns how many were removed.
    async fn invalidate(&self, user_id: &str, resource_type: &str) -> std::result::Result<usize, CacheError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_display() {
        let key = CacheKey::new("u42", "calendar", "calendar");
        assert_eq!(key.to_string(), "cache:calendar:calendar:u42");
    }

    #[test]
    fn cache_keys_distinguish_users() {
        let a = CacheKey::new("u1", "mail", "email");
        let b = CacheKey::new("u2", "mail", "email");
        assert_ne!(a, b);
    }

    #[test]
    fn scoped_keys_distinguish_queries() {
        let rome = CacheKey::new("u1", "web", "web").with_scope("weather in rome");
        let cup = CacheKey::new("u1", "web", "web").with_scope("who won the cup");
        assert_ne!(rome, cup);
        assert_ne!(rome, CacheKey::new("u1", "web", "web"));
        assert_eq!(rome.to_string(), "cache:web:web:u1:weather in rome");
    }
}
