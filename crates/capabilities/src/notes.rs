//! Notes capability: the user's personal knowledge base.
//!
//! Goals asking to save or remember something store the step input as a
//! note; anything else searches saved notes by keyword. Results are
//! never cached: notes change as the user writes them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use concierge_core::capability::{Capability, CapabilityRequest};
use concierge_core::error::CapabilityError;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{mentions_any, words};

const SAVE_WORDS: &[&str] = &["save", "remember", "note", "store", "salva", "ricorda", "memorizza"];

#[derive(Debug, Clone, Serialize)]
pub struct Note {
    pub content: String,
    pub created_at: DateTime<Utc>,
}

pub struct NotesCapability {
    notes: Arc<RwLock<HashMap<String, Vec<Note>>>>,
}

impl NotesCapability {
    pub fn new() -> Self {
        Self {
            notes: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for NotesCapability {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Capability for NotesCapability {
    fn name(&self) -> &str {
        "notes"
    }

    fn description(&self) -> &str {
        "Save notes to and search the user's personal knowledge base."
    }

    async fn execute(
        &self,
        request: &CapabilityRequest,
    ) -> Result<serde_json::Value, CapabilityError> {
        if mentions_any(&request.goal, SAVE_WORDS) {
            let note = Note {
                content: request.input.trim().to_string(),
                created_at: Utc::now(),
            };
            if note.content.is_empty() {
                return Err(CapabilityError::InvalidInput("note is empty".into()));
            }
            let mut notes = self.notes.write().await;
            let user_notes = notes.entry(request.user_id.clone()).or_default();
            user_notes.push(note.clone());
            return Ok(serde_json::json!({ "saved": note, "total": user_notes.len() }));
        }

        let terms: Vec<String> = words(&request.input).into_iter().filter(|w| w.len() >= 3).collect();
        let notes = self.notes.read().await;
        let matches: Vec<&Note> = notes
            .get(&request.user_id)
            .map(|user_notes| {
                user_notes
                    .iter()
                    .filter(|n| words(&n.content).iter().any(|w| terms.contains(w)))
                    .collect()
            })
            .unwrap_or_default();

        Ok(serde_json::json!({ "notes": matches }))
    }
}
