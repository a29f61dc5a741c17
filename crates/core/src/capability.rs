//! Capability trait: the abstraction over external integrations.
//!
//! Capabilities are what let the assistant act in the world: read the
//! calendar, search mail, query the web or the user's notes. Each
//! capability is a trait object registered once in the
//! [`CapabilityRegistry`] at startup. Plans carry resolved
//! [`CapabilityHandle`]s, so nothing re-looks-up a handler by name at
//! execution time.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use crate::error::CapabilityError;

/// Input handed to a capability handler for one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityRequest {
    /// The user the request is made on behalf of
    pub user_id: String,

    /// The step's working context (utterance plus prior step summaries,
    /// possibly rewritten by the enricher)
    pub input: String,

    /// The goal of the step this invocation serves
    pub goal: String,
}

/// The outcome of one capability invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityResult {
    /// Which capability produced this result
    pub capability: String,

    /// Whether the invocation succeeded
    pub success: bool,

    /// Structured payload on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    /// Error message on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Whether the payload was served from the freshness cache
    #[serde(default)]
    pub from_cache: bool,
}

impl CapabilityResult {
    /// A successful live result.
    pub fn ok(capability: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            capability: capability.into(),
            success: true,
            data: Some(data),
            error: None,
            from_cache: false,
        }
    }

    /// A successful result served from cache.
    pub fn cached(capability: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            from_cache: true,
            ..Self::ok(capability, data)
        }
    }

    /// A failed result.
    pub fn failed(capability: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            capability: capability.into(),
            success: false,
            data: None,
            error: Some(error.into()),
            from_cache: false,
        }
    }
}

/// Static `{name, description}` pair shown to the planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub name: String,
    pub description: String,
}

/// The core Capability trait.
///
/// One implementation per capability name. Handlers return their payload
/// as JSON; errors are converted into failed [`CapabilityResult`]s by the
/// execution layer and never abort sibling invocations.
#[async_trait]
pub trait Capability: Send + Sync {
    /// The unique name of this capability (e.g., "calendar", "mail").
    fn name(&self) -> &str;

    /// What this capability can do (sent to the planner).
    fn description(&self) -> &str;

    /// The resource type used for freshness-cache keys.
    ///
    /// `None` means results are never cached.
    fn resource_type(&self) -> Option<&str> {
        None
    }

    /// Narrows the cache key to this request.
    ///
    /// Capabilities whose answer depends on the query return a
    /// normalized form of it, so different queries never share an entry.
    /// Ignored when `resource_type` is `None`.
    fn cache_scope(&self, _request: &CapabilityRequest) -> Option<String> {
        None
    }

    /// Execute the capability for one step.
    async fn execute(
        &self,
        request: &CapabilityRequest,
    ) -> std::result::Result<serde_json::Value, CapabilityError>;

    /// The descriptor advertised to the planner.
    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
        }
    }
}

/// A capability name paired with its resolved handler.
#[derive(Clone)]
pub struct CapabilityHandle {
    name: String,
    handler: Arc<dyn Capability>,
}

impl CapabilityHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handler(&self) -> &Arc<dyn Capability> {
        &self.handler
    }
}

impl fmt::Debug for CapabilityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CapabilityHandle").field(&self.name).finish()
    }
}

impl PartialEq for CapabilityHandle {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for CapabilityHandle {}

/// A registry of available capabilities.
///
/// Populated at process start and read-only afterwards; share it behind
/// an `Arc`. Descriptors keep registration order so planner prompts are
/// deterministic.
pub struct CapabilityRegistry {
    handlers: HashMap<String, Arc<dyn Capability>>,
    descriptors: Vec<CapabilityDescriptor>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            descriptors: Vec::new(),
        }
    }

    /// Register a capability. Replaces any existing capability with the same name.
    pub fn register(&mut self, capability: Arc<dyn Capability>) {
        let descriptor = capability.descriptor();
        match self.descriptors.iter_mut().find(|d| d.name == descriptor.name) {
            Some(existing) => *existing = descriptor.clone(),
            None => self.descriptors.push(descriptor.clone()),
        }
        self.handlers.insert(descriptor.name, capability);
    }

    /// Builder-style registration.
    pub fn with(mut self, capability: Arc<dyn Capability>) -> Self {
        self.register(capability);
        self
    }

    /// Resolve a name into a handle, or `None` for unknown names.
    pub fn resolve(&self, name: &str) -> Option<CapabilityHandle> {
        self.handlers.get(name).map(|handler| CapabilityHandle {
            name: name.to_string(),
            handler: handler.clone(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Descriptors in registration order.
    pub fn descriptors(&self) -> &[CapabilityDescriptor] {
        &self.descriptors
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.descriptors.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoCapability;

    #[async_trait]
    impl Capability for EchoCapability {
        fn name(&self) -> &str { "echo" }
        fn description(&self) -> &str { "Echoes back the input" }
        async fn execute(&self, request: &CapabilityRequest) -> Result<serde_json::Value, CapabilityError> {
            Ok(serde_json::json!({ "echo": request.input }))
        }
    }

    struct NamedCapability(&'static str, &'static str);

    #[async_trait]
    impl Capability for NamedCapability {
        fn name(&self) -> &str { self.0 }
        fn description(&self) -> &str { self.1 }
        async fn execute(&self, _request: &CapabilityRequest) -> Result<serde_json::Value, CapabilityError> {
            Ok(serde_json::Value::Null)
        }
    }

    #[test]
    fn registry_register_and_resolve() {
        let registry = CapabilityRegistry::new().with(Arc::new(EchoCapability));
        assert!(registry.resolve("echo").is_some());
        assert!(registry.resolve("nonexistent").is_none());
        assert!(registry.contains("echo"));
    }

    #[test]
    fn registry_keeps_registration_order() {
        let registry = CapabilityRegistry::new()
            .with(Arc::new(NamedCapability("mail", "Mail")))
            .with(Arc::new(NamedCapability("calendar", "Calendar")))
            .with(Arc::new(NamedCapability("web", "Web")));
        assert_eq!(registry.names(), vec!["mail", "calendar", "web"]);
    }

    #[test]
    fn registry_replaces_same_name_in_place() {
        let registry = CapabilityRegistry::new()
            .with(Arc::new(NamedCapability("mail", "Old")))
            .with(Arc::new(NamedCapability("web", "Web")))
            .with(Arc::new(NamedCapability("mail", "New")));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.descriptors()[0].description, "New");
    }

    #[tokio::test]
    async fn resolved_handle_executes() {
        let registry = CapabilityRegistry::new().with(Arc::new(EchoCapability));
        let handle = registry.resolve("echo").unwrap();
        let request = CapabilityRequest {
            user_id: "u1".into(),
            input: "hello".into(),
            goal: "echo".into(),
        };
        let data = handle.handler().execute(&request).await.unwrap();
        assert_eq!(data["echo"], "hello");
        assert_eq!(handle.name(), "echo");
    }

    #[test]
    fn result_constructors() {
        let ok = CapabilityResult::ok("web", serde_json::json!([1]));
        assert!(ok.success && !ok.from_cache && ok.error.is_none());
        let cached = CapabilityResult::cached("web", serde_json::json!([1]));
        assert!(cached.success && cached.from_cache);
        let failed = CapabilityResult::failed("web", "boom");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("boom"));
    }
}
