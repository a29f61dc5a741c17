//! Thin text-in, text-out wrapper over a [`Provider`].

use concierge_core::error::ProviderError;
use concierge_core::message::Message;
use concierge_core::provider::{Provider, ProviderRequest};
use std::sync::Arc;
use tracing::debug;

/// A provider bound to one model.
///
/// Every model call the orchestrator makes (planning, replanning,
/// enrichment, responses, fact extraction) goes through here.
#[derive(Clone)]
pub struct ModelClient {
    provider: Arc<dyn Provider>,
    model: String,
    max_tokens: Option<u32>,
}

impl ModelClient {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            max_tokens: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// One system prompt plus one user prompt.
    pub async fn generate(
        &self,
        system: &str,
        prompt: &str,
        temperature: f32,
    ) -> Result<String, ProviderError> {
        self.chat(vec![Message::system(system), Message::user(prompt)], temperature)
            .await
    }

    /// A full message list.
    pub async fn chat(
        &self,
        messages: Vec<Message>,
        temperature: f32,
    ) -> Result<String, ProviderError> {
        let request = ProviderRequest {
            model: self.model.clone(),
            messages,
            temperature,
            max_tokens: self.max_tokens,
        };

        let response = self.provider.complete(request).await?;
        if let Some(usage) = &response.usage {
            debug!(
                model = %response.model,
                total_tokens = usage.total_tokens,
                "Model call completed"
            );
        }
        Ok(response.message.content)
    }
}
