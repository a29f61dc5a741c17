//! Built-in capability handlers for Concierge.
//!
//! Capabilities give the assistant the ability to act for the user:
//! read and create calendar events, search mail, look things up on the
//! web, and query saved notes.
//!
//! The handlers here are offline stand-ins backed by process memory or
//! deterministic mock data, so the orchestrator can be driven end-to-end
//! from the CLI and tested without network access or OAuth.

pub mod calendar;
pub mod mail;
pub mod notes;
pub mod web;

use std::sync::Arc;

use concierge_core::capability::CapabilityRegistry;

pub use calendar::CalendarCapability;
pub use mail::MailCapability;
pub use notes::NotesCapability;
pub use web::WebCapability;

/// Lowercased words of the text, punctuation stripped.
pub(crate) fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Lowercased, whitespace-collapsed form of a query, used as a cache scope.
pub(crate) fn normalized_query(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether any of `needles` appears as a word of `text`.
pub(crate) fn mentions_any(text: &str, needles: &[&str]) -> bool {
    let words = words(text);
    needles.iter().any(|n| words.iter().any(|w| w == n))
}

/// Create a registry with all built-in capabilities, in planner order.
pub fn default_registry() -> CapabilityRegistry {
    CapabilityRegistry::new()
        .with(Arc::new(CalendarCapability::new()))
        .with(Arc::new(MailCapability::new()))
        .with(Arc::new(WebCapability))
        .with(Arc::new(NotesCapability::new()))
}
