//! Configuration loading, validation, and management for Concierge.
//!
//! Loads configuration from `~/.concierge/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.concierge/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default model provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default completion model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Embedding model used by the intent router
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Default max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Orchestration limits and prompt shaping
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Freshness cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Memory extraction and recall configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_max_tokens() -> u32 {
    1024
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("embedding_model", &self.embedding_model)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("orchestrator", &self.orchestrator)
            .field("cache", &self.cache)
            .field("memory", &self.memory)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

/// Limits and prompt-shaping knobs for the orchestration state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum number of plan steps kept from the planner
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// Retries (with replanning) allowed per failed step
    #[serde(default = "default_max_retries")]
    pub max_retries_per_step: u32,

    /// Minimum similarity for the router to trust a category
    #[serde(default = "default_router_threshold")]
    pub router_confidence_threshold: f32,

    /// History turns shown to the planner and the enricher
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Per-result truncation in step summaries and Step Result summaries
    #[serde(default = "default_step_summary_chars")]
    pub step_summary_chars: usize,

    /// Per-turn truncation of history in planner prompts
    #[serde(default = "default_history_turn_chars")]
    pub history_turn_chars: usize,

    /// Per-turn truncation of history in enrichment prompts
    #[serde(default = "default_enrich_turn_chars")]
    pub enrich_turn_chars: usize,

    /// Sampling temperature for planning and replanning
    #[serde(default = "default_planner_temperature")]
    pub planner_temperature: f32,

    /// Sampling temperature for the final reply
    #[serde(default = "default_response_temperature")]
    pub response_temperature: f32,

    /// Whether to rewrite step contexts with the model before execution
    #[serde(default = "default_true")]
    pub enrich_queries: bool,
}

fn default_max_steps() -> usize {
    3
}
fn default_max_retries() -> u32 {
    2
}
fn default_router_threshold() -> f32 {
    0.75
}
fn default_history_window() -> usize {
    4
}
fn default_step_summary_chars() -> usize {
    500
}
fn default_history_turn_chars() -> usize {
    200
}
fn default_enrich_turn_chars() -> usize {
    300
}
fn default_planner_temperature() -> f32 {
    0.1
}
fn default_response_temperature() -> f32 {
    0.7
}
fn default_true() -> bool {
    true
}

impl OrchestratorConfig {
    /// Hard ceiling on capability-execution rounds per conversation.
    pub fn max_rounds(&self) -> usize {
        self.max_steps * (self.max_retries_per_step as usize + 1)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_retries_per_step: default_max_retries(),
            router_confidence_threshold: default_router_threshold(),
            history_window: default_history_window(),
            step_summary_chars: default_step_summary_chars(),
            history_turn_chars: default_history_turn_chars(),
            enrich_turn_chars: default_enrich_turn_chars(),
            planner_temperature: default_planner_temperature(),
            response_temperature: default_response_temperature(),
            enrich_queries: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// "in_memory" or "none"
    #[serde(default = "default_cache_backend")]
    pub backend: String,

    /// TTL for resource types without an explicit entry
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// TTL per resource type, in seconds
    #[serde(default = "default_resource_ttls")]
    pub ttl_secs: HashMap<String, u64>,
}

fn default_cache_backend() -> String {
    "in_memory".into()
}
fn default_ttl_secs() -> u64 {
    300
}
fn default_resource_ttls() -> HashMap<String, u64> {
    HashMap::from([
        ("calendar".to_string(), 300),
        ("email".to_string(), 60),
        ("web".to_string(), 3600),
    ])
}

impl CacheConfig {
    /// TTL for a resource type.
    pub fn ttl_for(&self, resource_type: &str) -> Duration {
        let secs = self
            .ttl_secs
            .get(resource_type)
            .copied()
            .unwrap_or(self.default_ttl_secs);
        Duration::from_secs(secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: default_cache_backend(),
            default_ttl_secs: default_ttl_secs(),
            ttl_secs: default_resource_ttls(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Whether completed exchanges are mined for facts
    #[serde(default = "default_true")]
    pub extraction_enabled: bool,

    /// Maximum simultaneous extraction calls to the model
    #[serde(default = "default_extraction_concurrency")]
    pub extraction_concurrency: usize,

    /// Pending extraction jobs before new ones are dropped
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Facts recalled into the response prompt
    #[serde(default = "default_recall_limit")]
    pub recall_limit: usize,

    /// Messages kept per user by the in-memory history store
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

fn default_extraction_concurrency() -> usize {
    3
}
fn default_queue_capacity() -> usize {
    64
}
fn default_recall_limit() -> usize {
    5
}
fn default_history_capacity() -> usize {
    50
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            extraction_enabled: true,
            extraction_concurrency: default_extraction_concurrency(),
            queue_capacity: default_queue_capacity(),
            recall_limit: default_recall_limit(),
            history_capacity: default_history_capacity(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.concierge/config.toml).
    ///
    /// Also checks environment variables:
    /// - `CONCIERGE_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `CONCIERGE_PROVIDER`, `CONCIERGE_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("CONCIERGE_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(provider) = std::env::var("CONCIERGE_PROVIDER") {
            config.default_provider = provider;
        }

        if let Ok(model) = std::env::var("CONCIERGE_MODEL") {
            config.default_model = model;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".concierge")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let o = &self.orchestrator;

        if o.max_steps == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.max_steps must be at least 1".into(),
            ));
        }

        if !(0.0..=1.0).contains(&o.router_confidence_threshold) {
            return Err(ConfigError::ValidationError(
                "orchestrator.router_confidence_threshold must be between 0.0 and 1.0".into(),
            ));
        }

        for (name, t) in [
            ("planner_temperature", o.planner_temperature),
            ("response_temperature", o.response_temperature),
        ] {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::ValidationError(format!(
                    "orchestrator.{name} must be between 0.0 and 2.0"
                )));
            }
        }

        if self.memory.extraction_concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "memory.extraction_concurrency must be at least 1".into(),
            ));
        }

        if self.memory.queue_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "memory.queue_capacity must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            embedding_model: default_embedding_model(),
            default_max_tokens: default_max_tokens(),
            orchestrator: OrchestratorConfig::default(),
            cache: CacheConfig::default(),
            memory: MemoryConfig::default(),
            providers: HashMap::new(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
