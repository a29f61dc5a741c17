//! The assistant: one entry point wiring every stage together.

use chrono::Utc;
use concierge_config::{AppConfig, OrchestratorConfig};
use concierge_core::cache::FreshnessCache;
use concierge_core::capability::CapabilityRegistry;
use concierge_core::event::{EventBus, PipelineEvent};
use concierge_core::entities::{EntityContext, EntityStore};
use concierge_core::facts::{Fact, FactStore};
use concierge_core::history::HistoryStore;
use concierge_core::message::Message;
use concierge_core::provider::Provider;
use concierge_memory::{InMemoryEntityStore, InMemoryFactStore, InMemoryHistoryStore};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::enrich::{LlmQueryEnricher, PassthroughEnricher, QueryEnricher};
use crate::error::PipelineError;
use crate::execution::AgentExecutor;
use crate::extractor::{EntityExtractor, ExtractionWorker, FactExtractor, MemoryExtractor};
use crate::llm::ModelClient;
use crate::planner::Planner;
use crate::response::ResponseGenerator;
use crate::router::{Classification, Embedder, Intent, ProviderEmbedder, SemanticRouter};
use crate::state::{ConversationState, StepResult};
use crate::step_executor::StepExecutor;

/// What one call to [`Assistant::run`] produced.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub reply: String,
    pub classification: Classification,
    /// Steps the planner kept; zero on the chit-chat path
    pub steps_planned: usize,
    pub step_results: Vec<StepResult>,
}

impl Outcome {
    /// Whether the step executor ran.
    pub fn executed(&self) -> bool {
        self.steps_planned > 0
    }
}

/// Collects collaborators for an [`Assistant`]; anything not set gets an
/// in-process default.
pub struct AssistantBuilder {
    provider: Arc<dyn Provider>,
    registry: Arc<CapabilityRegistry>,
    config: AppConfig,
    router: Option<SemanticRouter>,
    embedder: Option<Arc<dyn Embedder>>,
    cache: Option<Arc<dyn FreshnessCache>>,
    facts: Option<Arc<dyn FactStore>>,
    entities: Option<Arc<dyn EntityStore>>,
    history: Option<Arc<dyn HistoryStore>>,
    enricher: Option<Arc<dyn QueryEnricher>>,
    events: Option<Arc<EventBus>>,
}

impl AssistantBuilder {
    pub fn new(provider: Arc<dyn Provider>, registry: Arc<CapabilityRegistry>) -> Self {
        Self {
            provider,
            registry,
            config: AppConfig::default(),
            router: None,
            embedder: None,
            cache: None,
            facts: None,
            entities: None,
            history: None,
            enricher: None,
            events: None,
        }
    }

    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a ready-made router. Takes precedence over [`Self::embedder`].
    pub fn router(mut self, router: SemanticRouter) -> Self {
        self.router = Some(router);
        self
    }

    /// Embed with `embedder` instead of the provider's embedding endpoint.
    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn FreshnessCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn fact_store(mut self, facts: Arc<dyn FactStore>) -> Self {
        self.facts = Some(facts);
        self
    }

    pub fn entity_store(mut self, entities: Arc<dyn EntityStore>) -> Self {
        self.entities = Some(entities);
        self
    }

    pub fn history_store(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn enricher(mut self, enricher: Arc<dyn QueryEnricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    pub fn events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Assemble the assistant.
    ///
    /// Starts the memory extractor when extraction is enabled, so this must
    /// run inside a tokio runtime.
    pub fn build(self) -> Assistant {
        let config = self.config;
        let orchestrator = config.orchestrator.clone();
        let llm = ModelClient::new(self.provider.clone(), config.default_model.clone())
            .with_max_tokens(config.default_max_tokens);
        let events = self.events.unwrap_or_default();

        let router = self.router.unwrap_or_else(|| {
            let embedder = self.embedder.unwrap_or_else(|| {
                Arc::new(ProviderEmbedder::new(
                    self.provider.clone(),
                    config.embedding_model.clone(),
                ))
            });
            SemanticRouter::new(embedder, orchestrator.router_confidence_threshold)
        });

        let cache = self
            .cache
            .unwrap_or_else(|| concierge_memory::cache_from_config(&config.cache));
        let facts: Arc<dyn FactStore> = self
            .facts
            .unwrap_or_else(|| Arc::new(InMemoryFactStore::new()));
        let entities: Arc<dyn EntityStore> = self
            .entities
            .unwrap_or_else(|| Arc::new(InMemoryEntityStore::new()));
        let history: Arc<dyn HistoryStore> = self
            .history
            .unwrap_or_else(|| Arc::new(InMemoryHistoryStore::new(config.memory.history_capacity)));

        let enricher: Arc<dyn QueryEnricher> = match self.enricher {
            Some(enricher) => enricher,
            None if orchestrator.enrich_queries => Arc::new(LlmQueryEnricher::new(
                llm.clone(),
                orchestrator.history_window,
                orchestrator.enrich_turn_chars,
            )),
            None => Arc::new(PassthroughEnricher),
        };

        let planner = Arc::new(Planner::new(llm.clone(), self.registry, &orchestrator));
        let step_executor = StepExecutor::new(
            planner.clone(),
            AgentExecutor::new(cache, config.cache.clone()),
            enricher,
            events.clone(),
            orchestrator.step_summary_chars,
            orchestrator.max_rounds(),
        );
        let responder = ResponseGenerator::new(
            llm.clone(),
            orchestrator.response_temperature,
            orchestrator.history_window,
            orchestrator.history_turn_chars,
        );

        let extractor = config.memory.extraction_enabled.then(|| {
            let workers: Vec<Arc<dyn ExtractionWorker>> = vec![
                Arc::new(FactExtractor::new(llm.clone(), facts.clone()).with_events(events.clone())),
                Arc::new(EntityExtractor::new(llm, entities.clone()).with_events(events.clone())),
            ];
            let (extractor, _dispatcher) = MemoryExtractor::spawn(
                workers,
                config.memory.extraction_concurrency,
                config.memory.queue_capacity,
            );
            extractor
        });

        info!(
            model = %config.default_model,
            extraction = extractor.is_some(),
            "Assistant ready"
        );

        Assistant {
            recall_limit: config.memory.recall_limit,
            config: orchestrator,
            router,
            planner,
            step_executor,
            responder,
            facts,
            entities,
            history,
            extractor,
            events,
        }
    }
}

/// Routes, plans, executes and answers one utterance at a time.
///
/// Shareable across tasks; each call owns its own [`ConversationState`].
pub struct Assistant {
    config: OrchestratorConfig,
    recall_limit: usize,
    router: SemanticRouter,
    planner: Arc<Planner>,
    step_executor: StepExecutor,
    responder: ResponseGenerator,
    facts: Arc<dyn FactStore>,
    entities: Arc<dyn EntityStore>,
    history: Arc<dyn HistoryStore>,
    extractor: Option<MemoryExtractor>,
    events: Arc<EventBus>,
}

impl Assistant {
    pub fn builder(provider: Arc<dyn Provider>, registry: Arc<CapabilityRegistry>) -> AssistantBuilder {
        AssistantBuilder::new(provider, registry)
    }

    pub fn router(&self) -> &SemanticRouter {
        &self.router
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Answer `utterance`. Only a classification failure is an error.
    pub async fn process(&self, user_id: &str, utterance: &str) -> Result<String, PipelineError> {
        Ok(self.run(user_id, utterance).await?.reply)
    }

    /// Like [`Self::process`], but reports what happened along the way.
    pub async fn run(&self, user_id: &str, utterance: &str) -> Result<Outcome, PipelineError> {
        let history = match self.history.recent(user_id, self.config.history_window).await {
            Ok(history) => history,
            Err(e) => {
                warn!(user_id, error = %e, "Failed to load history, continuing without it");
                Vec::new()
            }
        };

        let classification = self.router.classify(utterance).await?;
        info!(
            user_id,
            intent = %classification.intent,
            confidence = classification.confidence,
            "Processing message"
        );
        self.events.publish(PipelineEvent::IntentClassified {
            user_id: user_id.to_string(),
            intent: classification.intent.to_string(),
            confidence: classification.confidence,
            timestamp: Utc::now(),
        });

        let mut state = ConversationState::new(user_id, utterance, history, &self.config);
        state.set_classification(classification);

        let confident = classification.confidence >= self.router.threshold();
        let small_talk = confident && classification.intent == Intent::Chitchat;
        if !small_talk {
            let hint = confident.then(|| classification.intent.capability()).flatten();
            let plan = self
                .planner
                .plan(utterance, user_id, &state.history, hint)
                .await;
            self.events.publish(PipelineEvent::PlanCreated {
                user_id: user_id.to_string(),
                steps: plan.steps.len(),
                capabilities: plan.capability_names().iter().map(|n| n.to_string()).collect(),
                timestamp: Utc::now(),
            });
            state.set_plan(plan);
        }

        (state.facts, state.entities) = tokio::join!(
            self.recall_facts(user_id, utterance),
            self.recall_entities(user_id, utterance),
        );

        let reply = if state.plan.is_empty() {
            debug!(user_id, "No steps to run, answering directly");
            self.responder
                .chitchat(utterance, &state.history, &state.facts, &state.entities)
                .await
        } else {
            self.step_executor.run(&mut state).await;
            self.responder.respond(&state).await
        };
        state.response = Some(reply.clone());

        self.events.publish(PipelineEvent::ResponseGenerated {
            user_id: user_id.to_string(),
            chars: reply.chars().count(),
            timestamp: Utc::now(),
        });

        let steps_planned = state.plan.len();
        self.remember(&mut state, &reply).await;

        Ok(Outcome {
            reply,
            classification,
            steps_planned,
            step_results: state.step_results,
        })
    }

    async fn recall_facts(&self, user_id: &str, utterance: &str) -> Vec<Fact> {
        if self.recall_limit == 0 {
            return Vec::new();
        }
        match self.facts.recall(user_id, utterance, self.recall_limit).await {
            Ok(facts) => facts,
            Err(e) => {
                warn!(user_id, error = %e, "Fact recall failed");
                Vec::new()
            }
        }
    }

    async fn recall_entities(&self, user_id: &str, utterance: &str) -> Vec<EntityContext> {
        if self.recall_limit == 0 {
            return Vec::new();
        }
        match self.entities.recall(user_id, utterance, self.recall_limit).await {
            Ok(entities) => entities,
            Err(e) => {
                warn!(user_id, error = %e, "Entity recall failed");
                Vec::new()
            }
        }
    }

    /// Append the exchange to history and hand it to the extractor.
    async fn remember(&self, state: &mut ConversationState, reply: &str) {
        let exchange = [Message::user(state.utterance.as_str()), Message::assistant(reply)];
        for message in &exchange {
            if let Err(e) = self.history.append(&state.user_id, message.clone()).await {
                warn!(user_id = %state.user_id, error = %e, "Failed to append history");
            }
        }

        if let Some(extractor) = &self.extractor {
            let mut messages = std::mem::take(&mut state.history);
            messages.extend(exchange);
            extractor.submit(&state.user_id, messages);
        }
    }
}
