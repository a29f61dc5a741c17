//! # Concierge Core
//!
//! Domain types, traits, and error definitions for the Concierge
//! orchestration engine. This crate has **zero framework dependencies**;
//! it defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator of the orchestrator is a trait here:
//! the language model and embedding provider, capability handlers, the
//! freshness cache, the fact and entity stores, and the conversation
//! history store.
//! Implementations live in their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with scripted/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod message;
pub mod provider;
pub mod capability;
pub mod cache;
pub mod facts;
pub mod entities;
pub mod history;
pub mod event;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use message::{Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse};
pub use capability::{
    Capability, CapabilityDescriptor, CapabilityHandle, CapabilityRegistry, CapabilityRequest,
    CapabilityResult,
};
pub use cache::{CacheKey, FreshnessCache};
pub use facts::{Fact, FactCategory, FactStore};
pub use entities::{Entity, EntityContext, EntityKind, EntityStore, RelatedEntity, RelationKind};
pub use history::HistoryStore;
pub use event::{EventBus, PipelineEvent};
