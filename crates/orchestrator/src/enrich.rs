//! Query enrichment: rewrite a step's working context so it stands alone.

use async_trait::async_trait;
use concierge_core::message::Message;
use tracing::{debug, warn};

use crate::llm::ModelClient;
use crate::prompts;

#[async_trait]
pub trait QueryEnricher: Send + Sync {
    /// Rewrite `context` using `history`. Must return `context` unchanged
    /// when it cannot do better.
    async fn enrich(&self, context: &str, history: &[Message]) -> String;
}

/// Leaves the context as it is.
pub struct PassthroughEnricher;

#[async_trait]
impl QueryEnricher for PassthroughEnricher {
    async fn enrich(&self, context: &str, _history: &[Message]) -> String {
        context.to_string()
    }
}

/// Resolves references ("him", "that email") with one model call.
pub struct LlmQueryEnricher {
    llm: ModelClient,
    turns: usize,
    turn_chars: usize,
}

impl LlmQueryEnricher {
    pub fn new(llm: ModelClient, turns: usize, turn_chars: usize) -> Self {
        Self {
            llm,
            turns,
            turn_chars,
        }
    }
}

#[async_trait]
impl QueryEnricher for LlmQueryEnricher {
    async fn enrich(&self, context: &str, history: &[Message]) -> String {
        if history.is_empty() || self.turns == 0 {
            return context.to_string();
        }

        let skip = history.len().saturating_sub(self.turns);
        let recent = history[skip..]
            .iter()
            .map(|m| m.render_line(self.turn_chars))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!("Recent messages:\n{recent}\n\nRequest:\n{context}");

        match self.llm.generate(prompts::ENRICHER, &prompt, 0.0).await {
            Ok(rewritten) if !rewritten.trim().is_empty() => {
                let rewritten = rewritten.trim().to_string();
                debug!(original = context, enriched = %rewritten, "Query enriched");
                rewritten
            }
            Ok(_) => context.to_string(),
            Err(e) => {
                warn!(error = %e, "Query enrichment failed, using original context");
                context.to_string()
            }
        }
    }
}
