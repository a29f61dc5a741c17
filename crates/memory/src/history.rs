//! In-memory conversation history, capped per user.

use async_trait::async_trait;
use concierge_core::error::HistoryError;
use concierge_core::history::HistoryStore;
use concierge_core::message::Message;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Keeps the last `capacity` messages of every user.
#[derive(Clone)]
pub struct InMemoryHistoryStore {
    capacity: usize,
    histories: Arc<RwLock<HashMap<String, VecDeque<Message>>>>,
}

impl InMemoryHistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            histories: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self::new(50)
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn recent(&self, user_id: &str, limit: usize) -> Result<Vec<Message>, HistoryError> {
        let histories = self.histories.read().await;
        let Some(history) = histories.get(user_id) else {
            return Ok(Vec::new());
        };
        let skip = history.len().saturating_sub(limit);
        Ok(history.iter().skip(skip).cloned().collect())
    }

    async fn append(&self, user_id: &str, message: Message) -> Result<(), HistoryError> {
        let mut histories = self.histories.write().await;
        let history = histories.entry(user_id.to_string()).or_default();
        history.push_back(message);
        while history.len() > self.capacity {
            history.pop_front();
        }
        Ok(())
    }
}
