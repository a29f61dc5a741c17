//! Error types for the Concierge domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Concierge operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Capability errors ---
    #[error("Capability error: {0}")]
    Capability(#[from] CapabilityError),

    // --- Cache errors ---
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    // --- Fact store errors ---
    #[error("Fact store error: {0}")]
    FactStore(#[from] FactStoreError),

    // --- Entity store errors ---
    #[error("Entity store error: {0}")]
    EntityStore(#[from] EntityStoreError),

    // --- History errors ---
    #[error("History error: {0}")]
    History(#[from] HistoryError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Error)]
pub enum CapabilityError {
    #[error("Capability not found: {0}")]
    NotFound(String),

    #[error("Capability execution failed: {capability}: {reason}")]
    ExecutionFailed { capability: String, reason: String },

    #[error("Capability timed out: {capability} after {timeout_secs}s")]
    Timeout { capability: String, timeout_secs: u64 },

    #[error("Invalid capability input: {0}")]
    InvalidInput(String),

    #[error("Capability panicked: {capability}: {message}")]
    Panicked { capability: String, message: String },
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),

    #[error("Cached value could not be decoded: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum FactStoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),
}

#[derive(Debug, Error)]
pub enum EntityStoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Unknown entity: {0}")]
    UnknownEntity(String),
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("History storage error: {0}")]
    Storage(String),
}
