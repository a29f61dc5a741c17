//! Web capability: stub that returns mock search results.
//!
//! In production this would call a search API. The stub returns
//! plausible results derived from the query so multi-step plans can be
//! exercised without network access.

use async_trait::async_trait;
use concierge_core::capability::{Capability, CapabilityRequest};
use concierge_core::error::CapabilityError;
use serde::Serialize;

use crate::normalized_query;

pub struct WebCapability;

#[async_trait]
impl Capability for WebCapability {
    fn name(&self) -> &str {
        "web"
    }

    fn description(&self) -> &str {
        "Search the web for facts, news, weather and general information."
    }

    fn resource_type(&self) -> Option<&str> {
        Some("web")
    }

    fn cache_scope(&self, request: &CapabilityRequest) -> Option<String> {
        Some(normalized_query(&request.input))
    }

    async fn execute(
        &self,
        request: &CapabilityRequest,
    ) -> Result<serde_json::Value, CapabilityError> {
        let query = request.input.trim();
        if query.is_empty() {
            return Err(CapabilityError::InvalidInput("search query is empty".into()));
        }
        let results = mock_results(query, 3);
        Ok(serde_json::json!({ "query": query, "results": results }))
    }
}

#[derive(Debug, Clone, Serialize)]
struct SearchResult {
    title: String,
    url: String,
    snippet: String,
}

fn mock_results(query: &str, count: usize) -> Vec<SearchResult> {
    let q = query.to_lowercase();

    if q.contains("weather") || q.contains("meteo") {
        return vec![SearchResult {
            title: "Local forecast".into(),
            url: "https://weather.example.com/".into(),
            snippet: "Mostly sunny, highs of 21°C, light wind from the west.".into(),
        }];
    }

    (0..count)
        .map(|i| SearchResult {
            title: format!("Result {} for: {}", i + 1, query),
            url: format!("https://example.com/search?q={}&p={}", query.replace(' ', "+"), i + 1),
            snippet: format!("Mock search result for '{query}'."),
        })
        .collect()
}
