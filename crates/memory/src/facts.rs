//! In-memory fact store: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use chrono::Utc;
use concierge_core::error::FactStoreError;
use concierge_core::facts::{Fact, FactCategory, FactStore};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::keywords;

/// Stores facts in a Vec and recalls them by keyword overlap.
#[derive(Clone)]
pub struct InMemoryFactStore {
    facts: Arc<RwLock<Vec<Fact>>>,
}

impl InMemoryFactStore {
    pub fn new() -> Self {
        Self {
            facts: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// All facts stored for a user, oldest first.
    pub async fn facts_for(&self, user_id: &str) -> Vec<Fact> {
        self.facts
            .read()
            .await
            .iter()
            .filter(|f| f.user_id == user_id)
            .cloned()
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.facts.read().await.len()
    }
}

impl Default for InMemoryFactStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FactStore for InMemoryFactStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn write(
        &self,
        user_id: &str,
        category: FactCategory,
        content: &str,
    ) -> Result<(), FactStoreError> {
        let content = content.trim();
        let mut facts = self.facts.write().await;

        let duplicate = facts
            .iter()
            .any(|f| f.user_id == user_id && f.content.eq_ignore_ascii_case(content));
        if !duplicate {
            facts.push(Fact {
                user_id: user_id.to_string(),
                category,
                content: content.to_string(),
                created_at: Utc::now(),
            });
        }
        Ok(())
    }

    async fn recall(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Fact>, FactStoreError> {
        let terms = keywords(query);
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let facts = self.facts.read().await;
        let mut scored: Vec<(usize, &Fact)> = facts
            .iter()
            .filter(|f| f.user_id == user_id)
            .filter_map(|f| {
                let words = keywords(&f.content);
                let hits = terms.iter().filter(|t| words.contains(t)).count();
                (hits > 0).then_some((hits, f))
            })
            .collect();

        // Most matching terms first, newest first on ties.
        scored.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then_with(|| b.1.created_at.cmp(&a.1.created_at))
        });

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(_, f)| f.clone())
            .collect())
    }
}
