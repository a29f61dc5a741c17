//! Errors that cross the orchestrator boundary.
//!
//! Almost every failure inside a pipeline run degrades instead of
//! propagating: planning falls back to an empty plan, capability errors
//! become failed step results, extraction errors are logged. Intent
//! classification is the exception.

use concierge_core::error::ProviderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("Failed to embed text for routing: {0}")]
    Embedding(#[from] ProviderError),

    #[error("Embedding provider returned {got} vectors for {expected} inputs")]
    EmbeddingCount { expected: usize, got: usize },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Intent classification failed: {0}")]
    Classification(#[from] RouterError),
}
