//! The orchestration pipeline: the heart of Concierge.
//!
//! Every utterance goes through **Route → Plan → Execute → Respond**:
//!
//! 1. **Route**: the [`SemanticRouter`] classifies the utterance by
//!    embedding similarity against a bank of example phrases
//! 2. **Plan**: the [`Planner`] asks the model for an ordered list of
//!    steps, each naming the capabilities to run together
//! 3. **Execute**: the [`StepExecutor`] drives the steps through a small
//!    state machine, fanning each step out over its capabilities and
//!    replanning failed steps within a retry budget
//! 4. **Respond**: the [`ResponseGenerator`] writes the reply from the
//!    step results, always stating what could not be done
//!
//! Small talk skips steps 2 and 3. Facts and known entities recalled
//! for the user ground the reply. After the reply, the exchange is handed
//! to the [`MemoryExtractor`], which mines facts and entities in the
//! background.

pub mod enrich;
pub mod error;
pub mod execution;
pub mod extractor;
pub mod json;
pub mod llm;
pub mod pipeline;
pub mod planner;
pub mod prompts;
pub mod response;
pub mod router;
pub mod state;
pub mod step_executor;

#[cfg(test)]
mod test_helpers;

pub use enrich::{LlmQueryEnricher, PassthroughEnricher, QueryEnricher};
pub use error::{PipelineError, RouterError};
pub use execution::{AgentExecutor, CacheMode};
pub use extractor::{
    EntityExtractor, ExtractedGraph, ExtractionJob, ExtractionWorker, FactExtractor, MemoryExtractor,
};
pub use llm::ModelClient;
pub use pipeline::{Assistant, AssistantBuilder, Outcome};
pub use planner::{Plan, Planner, Step};
pub use response::ResponseGenerator;
pub use router::{Classification, Embedder, Intent, ProviderEmbedder, SemanticRouter};
pub use state::{ConversationState, StepResult};
pub use step_executor::StepExecutor;
