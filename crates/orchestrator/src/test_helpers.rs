//! Shared test helpers: scripted providers, embedders and capabilities.

use async_trait::async_trait;
use concierge_config::OrchestratorConfig;
use concierge_core::cache::{CacheKey, FreshnessCache};
use concierge_core::capability::{Capability, CapabilityRegistry, CapabilityRequest};
use concierge_core::error::{CacheError, CapabilityError, ProviderError};
use concierge_core::message::Message;
use concierge_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::router::Embedder;

enum Reply {
    Text(String),
    Fail,
}

/// A mock provider that answers by system prompt.
///
/// Each rule matches when the request's system message contains its
/// needle; the first matching rule wins. Unmatched requests fail.
pub struct ScriptedProvider {
    rules: Vec<(String, Reply)>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn on(mut self, system_needle: &str, reply: &str) -> Self {
        self.rules.push((system_needle.to_string(), Reply::Text(reply.to_string())));
        self
    }

    pub fn fail_on(mut self, system_needle: &str) -> Self {
        self.rules.push((system_needle.to_string(), Reply::Fail));
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<ProviderRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    pub fn last_temperature(&self) -> Option<f32> {
        self.last_request().map(|r| r.temperature)
    }

    /// Content of the final message of the last request sent with this system prompt.
    pub fn last_prompt_for(&self, system_needle: &str) -> Option<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| system_of(r).contains(system_needle))
            .and_then(|r| r.messages.last().map(|m| m.content.clone()))
    }
}

fn system_of(request: &ProviderRequest) -> &str {
    request
        .messages
        .first()
        .map(|m| m.content.as_str())
        .unwrap_or_default()
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let reply = self
            .rules
            .iter()
            .find(|(needle, _)| system_of(&request).contains(needle.as_str()))
            .map(|(_, reply)| match reply {
                Reply::Text(text) => Ok(text.clone()),
                Reply::Fail => Err(ProviderError::Network("scripted failure".into())),
            })
            .unwrap_or_else(|| Err(ProviderError::InvalidResponse("no scripted reply".into())));

        self.requests.lock().unwrap().push(request);

        Ok(make_text_response(&reply?))
    }
}

/// Create a simple text response.
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

const VOCABULARY: &[&str] = &[
    "hello", "ciao", "thanks", "check", "mail", "email", "calendar", "event", "weather", "marco",
    "create",
];

/// Bag-of-keywords embeddings over a fixed vocabulary. Counts calls.
pub struct KeywordEmbedder {
    calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .map(str::to_lowercase)
            .collect();
        VOCABULARY
            .iter()
            .map(|v| words.iter().filter(|w| w == v).count() as f32)
            .collect()
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Err(ProviderError::Network("embedding service unreachable".into()))
    }
}

/// Always succeeds with fixed data. Records calls and inputs.
pub struct StaticCapability {
    name: String,
    data: serde_json::Value,
    resource_type: Option<String>,
    inputs: Mutex<Vec<String>>,
}

impl StaticCapability {
    pub fn new(name: &str, data: serde_json::Value) -> Self {
        Self {
            name: name.to_string(),
            data,
            resource_type: None,
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn with_resource_type(mut self, resource_type: &str) -> Self {
        self.resource_type = Some(resource_type.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.inputs.lock().unwrap().len()
    }

    pub fn last_input(&self) -> Option<String> {
        self.inputs.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Capability for StaticCapability {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "static test capability"
    }

    fn resource_type(&self) -> Option<&str> {
        self.resource_type.as_deref()
    }

    async fn execute(&self, request: &CapabilityRequest) -> Result<serde_json::Value, CapabilityError> {
        self.inputs.lock().unwrap().push(request.input.clone());
        Ok(self.data.clone())
    }
}

/// Always fails with the same reason.
pub struct FailingCapability {
    name: String,
    reason: String,
    resource_type: Option<String>,
}

impl FailingCapability {
    pub fn new(name: &str, reason: &str) -> Self {
        Self {
            name: name.to_string(),
            reason: reason.to_string(),
            resource_type: None,
        }
    }

    pub fn with_resource_type(mut self, resource_type: &str) -> Self {
        self.resource_type = Some(resource_type.to_string());
        self
    }
}

#[async_trait]
impl Capability for FailingCapability {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "failing test capability"
    }

    fn resource_type(&self) -> Option<&str> {
        self.resource_type.as_deref()
    }

    async fn execute(&self, _request: &CapabilityRequest) -> Result<serde_json::Value, CapabilityError> {
        Err(CapabilityError::ExecutionFailed {
            capability: self.name.clone(),
            reason: self.reason.clone(),
        })
    }
}

/// Fails the first `failures` calls, then succeeds.
pub struct FlakyCapability {
    name: String,
    failures: usize,
    data: serde_json::Value,
    calls: AtomicUsize,
}

impl FlakyCapability {
    pub fn new(name: &str, failures: usize, data: serde_json::Value) -> Self {
        Self {
            name: name.to_string(),
            failures,
            data,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Capability for FlakyCapability {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "flaky test capability"
    }

    async fn execute(&self, _request: &CapabilityRequest) -> Result<serde_json::Value, CapabilityError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(CapabilityError::Timeout {
                capability: self.name.clone(),
                timeout_secs: 30,
            });
        }
        Ok(self.data.clone())
    }
}

pub struct PanickingCapability {
    name: String,
}

impl PanickingCapability {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string() }
    }
}

#[async_trait]
impl Capability for PanickingCapability {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "panicking test capability"
    }

    async fn execute(&self, _request: &CapabilityRequest) -> Result<serde_json::Value, CapabilityError> {
        panic!("handler exploded");
    }
}

/// A cache whose every operation fails.
pub struct BrokenCache;

#[async_trait]
impl FreshnessCache for BrokenCache {
    fn name(&self) -> &str {
        "broken"
    }

    async fn get(&self, _key: &CacheKey) -> Result<Option<serde_json::Value>, CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn put(&self, _key: &CacheKey, _data: serde_json::Value, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn invalidate(&self, _user_id: &str, _resource_type: &str) -> Result<usize, CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }
}

pub fn registry_with(capabilities: Vec<Arc<dyn Capability>>) -> CapabilityRegistry {
    let mut registry = CapabilityRegistry::new();
    for capability in capabilities {
        registry.register(capability);
    }
    registry
}

/// A registry of static capabilities named `names`.
pub fn registry_of(names: &[&str]) -> CapabilityRegistry {
    registry_with(
        names
            .iter()
            .map(|n| Arc::new(StaticCapability::new(n, serde_json::json!(format!("{n} ok")))) as Arc<dyn Capability>)
            .collect(),
    )
}

pub fn test_config() -> OrchestratorConfig {
    OrchestratorConfig::default()
}
