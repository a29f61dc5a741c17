//! Mail capability: searches a seeded demo inbox.
//!
//! In production this would call the mail provider's API. The stub keeps
//! a fixed inbox per process so plans that read mail behave the same on
//! every run.

use async_trait::async_trait;
use concierge_core::capability::{Capability, CapabilityRequest};
use concierge_core::error::CapabilityError;
use serde::Serialize;

use crate::{normalized_query, words};

#[derive(Debug, Clone, Serialize)]
pub struct MailMessage {
    pub id: String,
    pub from: String,
    pub subject: String,
    pub snippet: String,
}

pub struct MailCapability {
    inbox: Vec<MailMessage>,
}

impl MailCapability {
    pub fn new() -> Self {
        Self::with_inbox(vec![
            MailMessage {
                id: "msg_001".into(),
                from: "Marco Rossi <marco@example.com>".into(),
                subject: "Project kickoff".into(),
                snippet: "Can we meet Thursday at 10 to kick off the project?".into(),
            },
            MailMessage {
                id: "msg_002".into(),
                from: "Billing <billing@example.com>".into(),
                subject: "Your invoice is ready".into(),
                snippet: "Invoice 2024-118 for the annual plan is attached.".into(),
            },
            MailMessage {
                id: "msg_003".into(),
                from: "Giulia Bianchi <giulia@example.com>".into(),
                subject: "Dinner on Saturday".into(),
                snippet: "Are we still on for dinner? I booked for 8pm.".into(),
            },
        ])
    }

    pub fn with_inbox(inbox: Vec<MailMessage>) -> Self {
        Self { inbox }
    }

    fn search(&self, query: &str, limit: usize) -> Vec<MailMessage> {
        let terms: Vec<String> = words(query).into_iter().filter(|w| w.len() >= 3).collect();
        let mut scored: Vec<(usize, &MailMessage)> = self
            .inbox
            .iter()
            .map(|m| {
                let haystack = words(&format!("{} {} {}", m.from, m.subject, m.snippet));
                (terms.iter().filter(|t| haystack.contains(t)).count(), m)
            })
            .filter(|(hits, _)| *hits > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().take(limit).map(|(_, m)| m.clone()).collect()
    }
}

impl Default for MailCapability {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Capability for MailCapability {
    fn name(&self) -> &str {
        "mail"
    }

    fn description(&self) -> &str {
        "Search and read the user's email inbox."
    }

    fn resource_type(&self) -> Option<&str> {
        Some("email")
    }

    fn cache_scope(&self, request: &CapabilityRequest) -> Option<String> {
        Some(normalized_query(&format!("{} {}", request.goal, request.input)))
    }

    async fn execute(
        &self,
        request: &CapabilityRequest,
    ) -> Result<serde_json::Value, CapabilityError> {
        let query = format!("{} {}", request.goal, request.input);
        let mut messages = self.search(&query, 5);
        if messages.is_empty() {
            // Nothing specific asked for: the latest messages.
            messages = self.inbox.iter().take(5).cloned().collect();
        }
        Ok(serde_json::json!({ "messages": messages }))
    }
}
