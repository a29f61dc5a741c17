//! Calendar capability: an in-process demo calendar.
//!
//! Each user starts with a small seeded agenda. Requests whose goal asks
//! to create or schedule something add an event; everything else lists
//! upcoming events, filtered by the words of the request when any match.
//!
//! The calendar declares no resource type: a create must always reach
//! the handler, and listings must reflect it immediately.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use concierge_core::capability::{Capability, CapabilityRequest};
use concierge_core::error::CapabilityError;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::{mentions_any, words};

const CREATE_WORDS: &[&str] = &[
    "create", "schedule", "add", "book", "crea", "fissa", "aggiungi", "prenota",
];

#[derive(Debug, Clone, Serialize)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

pub struct CalendarCapability {
    events: Arc<RwLock<HashMap<String, Vec<CalendarEvent>>>>,
}

impl CalendarCapability {
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn seed(user_id: &str) -> Vec<CalendarEvent> {
        let base = Utc::now() + Duration::days(1);
        [("Team standup", 0), ("Budget review", 26), ("Dentist", 50)]
            .into_iter()
            .enumerate()
            .map(|(i, (title, offset_hours))| {
                let start = base + Duration::hours(offset_hours);
                CalendarEvent {
                    id: format!("evt_{user_id}_{i}"),
                    title: title.to_string(),
                    start,
                    end: start + Duration::hours(1),
                }
            })
            .collect()
    }

    async fn create(&self, request: &CapabilityRequest) -> CalendarEvent {
        let mut events = self.events.write().await;
        let agenda = events
            .entry(request.user_id.clone())
            .or_insert_with(|| Self::seed(&request.user_id));

        let start = Utc::now() + Duration::days(1);
        let event = CalendarEvent {
            id: format!("evt_{}_{}", request.user_id, agenda.len()),
            title: request.goal.trim().to_string(),
            start,
            end: start + Duration::hours(1),
        };
        agenda.push(event.clone());
        event
    }

    async fn list(&self, request: &CapabilityRequest) -> Vec<CalendarEvent> {
        let mut events = self.events.write().await;
        let agenda = events
            .entry(request.user_id.clone())
            .or_insert_with(|| Self::seed(&request.user_id));

        let terms = words(&request.input);
        let matching: Vec<CalendarEvent> = agenda
            .iter()
            .filter(|e| words(&e.title).iter().any(|w| terms.contains(w)))
            .cloned()
            .collect();

        if matching.is_empty() {
            agenda.clone()
        } else {
            matching
        }
    }
}

impl Default for CalendarCapability {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Capability for CalendarCapability {
    fn name(&self) -> &str {
        "calendar"
    }

    fn description(&self) -> &str {
        "Read, search and create events in the user's calendar."
    }

    async fn execute(
        &self,
        request: &CapabilityRequest,
    ) -> Result<serde_json::Value, CapabilityError> {
        if mentions_any(&request.goal, CREATE_WORDS) {
            let event = self.create(request).await;
            debug!(user_id = %request.user_id, event_id = %event.id, "Calendar event created");
            return Ok(serde_json::json!({ "created": event }));
        }

        let events = self.list(request).await;
        Ok(serde_json::json!({ "events": events }))
    }
}
