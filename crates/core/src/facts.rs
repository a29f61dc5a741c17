//! Fact store trait: durable facts derived from conversations.
//!
//! The memory extractor writes facts here after each exchange; the
//! pipeline may recall relevant ones as historical context for the next
//! response. Recall is optional: the default implementation returns
//! nothing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use crate::error::FactStoreError;

/// Category of a stored fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactCategory {
    /// A user preference ("dislikes meetings on Friday")
    Preference,
    /// An objective fact about the user ("works in tech")
    Fact,
    /// Something that happened ("met Marco on 15 January")
    Episode,
    /// A task or reminder ("must call the client by Friday")
    Task,
}

impl FactCategory {
    pub const ALL: [FactCategory; 4] = [
        FactCategory::Preference,
        FactCategory::Fact,
        FactCategory::Episode,
        FactCategory::Task,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FactCategory::Preference => "preference",
            FactCategory::Fact => "fact",
            FactCategory::Episode => "episode",
            FactCategory::Task => "task",
        }
    }
}

impl fmt::Display for FactCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FactCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s.trim())
            .ok_or_else(|| format!("unknown fact category '{s}'"))
    }
}

/// A stored fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    pub user_id: String,
    pub category: FactCategory,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// The fact store contract.
#[async_trait]
pub trait FactStore: Send + Sync {
    /// The backend name.
    fn name(&self) -> &str;

    /// Persist one fact.
    async fn write(
        &self,
        user_id: &str,
        category: FactCategory,
        content: &str,
    ) -> std::result::Result<(), FactStoreError>;

    /// Facts relevant to `query`, best first.
    async fn recall(
        &self,
        _user_id: &str,
        _query: &str,
        _limit: usize,
    ) -> std::result::Result<Vec<Fact>, FactStoreError> {
        Ok(Vec::new())
    }
}
