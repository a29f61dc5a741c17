//! Storage backends for Concierge.
//!
//! - [`InMemoryFreshnessCache`]: TTL cache for capability results
//! - [`InMemoryFactStore`]: facts mined from conversations, keyword recall
//! - [`InMemoryEntityStore`]: per-user knowledge graph of named entities
//! - [`InMemoryHistoryStore`]: bounded per-user message history
//! - [`NoopCache`] / [`NoopFactStore`] / [`NoopEntityStore`]: disable caching
//!   or memory persistence

pub mod entities;
pub mod facts;
pub mod freshness;
pub mod history;
pub mod noop;

use std::sync::Arc;

use concierge_config::CacheConfig;
use concierge_core::cache::FreshnessCache;
use tracing::warn;

pub use entities::InMemoryEntityStore;
pub use facts::InMemoryFactStore;
pub use freshness::InMemoryFreshnessCache;
pub use history::InMemoryHistoryStore;
pub use noop::{NoopCache, NoopEntityStore, NoopFactStore};

/// Lowercased words of at least 3 chars.
pub(crate) fn keywords(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 3)
        .map(str::to_lowercase)
        .collect()
}

/// Build the freshness cache named by `config.backend`.
///
/// Unknown backends fall back to the in-memory cache.
pub fn cache_from_config(config: &CacheConfig) -> Arc<dyn FreshnessCache> {
    match config.backend.as_str() {
        "none" | "noop" => Arc::new(NoopCache),
        "in_memory" => Arc::new(InMemoryFreshnessCache::new()),
        other => {
            warn!(backend = other, "Unknown cache backend, using in_memory");
            Arc::new(InMemoryFreshnessCache::new())
        }
    }
}
