//! Background memory extraction.
//!
//! After every exchange the pipeline submits the conversation here and
//! moves on. Jobs go into a bounded queue; a dispatcher task pulls them
//! and hands each one to every registered worker (facts, entities). Each
//! worker run holds a permit from one shared counting semaphore, so at
//! most `concurrency` extractions are in flight across all users and
//! workers. Submission never blocks: a full queue drops the job.

use async_trait::async_trait;
use chrono::Utc;
use concierge_core::entities::{EntityKind, EntityStore, RelationKind};
use concierge_core::event::{EventBus, PipelineEvent};
use concierge_core::facts::{FactCategory, FactStore};
use concierge_core::message::Message;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::json;
use crate::llm::ModelClient;
use crate::prompts;

/// Messages considered per fact extraction.
const EXTRACTION_WINDOW: usize = 4;
const EXTRACTION_TEMPERATURE: f32 = 0.3;
const MIN_FACT_CHARS: usize = 3;

/// Messages considered per entity extraction.
const ENTITY_WINDOW: usize = 5;
const ENTITY_TEMPERATURE: f32 = 0.1;
const MIN_ENTITY_CONFIDENCE: f64 = 0.4;
const DEFAULT_CONFIDENCE: f64 = 0.5;
const MIN_ENTITY_NAME_CHARS: usize = 2;

/// One completed exchange to mine.
#[derive(Debug, Clone)]
pub struct ExtractionJob {
    pub user_id: String,
    pub messages: Vec<Message>,
}

/// Does the actual work for one job. Must swallow its own failures.
#[async_trait]
pub trait ExtractionWorker: Send + Sync {
    async fn extract(&self, job: ExtractionJob);
}

/// Handle for submitting jobs. Cheap to clone.
#[derive(Clone)]
pub struct MemoryExtractor {
    sender: mpsc::Sender<ExtractionJob>,
    concurrency: usize,
}

impl MemoryExtractor {
    /// Start the dispatcher. Must be called inside a tokio runtime.
    ///
    /// Every job goes to every worker, in order; all workers share the
    /// same `concurrency` gate.
    pub fn spawn(
        workers: Vec<Arc<dyn ExtractionWorker>>,
        concurrency: usize,
        queue_capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let concurrency = concurrency.max(1);
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        let gate = Arc::new(Semaphore::new(concurrency));
        let handle = tokio::spawn(dispatch(receiver, workers, gate));
        (
            Self {
                sender,
                concurrency,
            },
            handle,
        )
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Queue an exchange for extraction. Returns whether it was accepted.
    ///
    /// Exchanges with fewer than two messages are not worth a model call.
    pub fn submit(&self, user_id: &str, messages: Vec<Message>) -> bool {
        if messages.len() < 2 {
            return false;
        }

        let job = ExtractionJob {
            user_id: user_id.to_string(),
            messages,
        };
        match self.sender.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                warn!(user_id = %job.user_id, "Extraction queue full, dropping job");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("Extraction dispatcher stopped, dropping job");
                false
            }
        }
    }
}

async fn dispatch(
    mut receiver: mpsc::Receiver<ExtractionJob>,
    workers: Vec<Arc<dyn ExtractionWorker>>,
    gate: Arc<Semaphore>,
) {
    'jobs: while let Some(job) = receiver.recv().await {
        for worker in &workers {
            let Ok(permit) = gate.clone().acquire_owned().await else {
                break 'jobs;
            };
            let worker = worker.clone();
            let job = job.clone();
            tokio::spawn(async move {
                worker.extract(job).await;
                drop(permit);
            });
        }
    }
    debug!("Extraction dispatcher finished");
}

/// Render the last `window` messages as `Role: content` lines.
fn transcript(messages: &[Message], window: usize) -> String {
    let skip = messages.len().saturating_sub(window);
    messages[skip..]
        .iter()
        .map(|m| format!("{}: {}", m.role.label(), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Extracts facts with one model call and writes them to a [`FactStore`].
pub struct FactExtractor {
    llm: ModelClient,
    store: Arc<dyn FactStore>,
    events: Option<Arc<EventBus>>,
}

impl FactExtractor {
    pub fn new(llm: ModelClient, store: Arc<dyn FactStore>) -> Self {
        Self {
            llm,
            store,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Valid `(category, fact)` pairs from model output.
    pub fn parse_facts(text: &str) -> Vec<(FactCategory, String)> {
        let items = json::parse_array(text).or_else(|| {
            json::parse_object(text)
                .and_then(|obj| obj.get("facts").and_then(Value::as_array).cloned())
        });

        items
            .unwrap_or_default()
            .iter()
            .filter_map(|item| {
                let fact = item.get("fact")?.as_str()?.trim();
                let category = item.get("category")?.as_str()?.parse::<FactCategory>().ok()?;
                (fact.chars().count() >= MIN_FACT_CHARS).then(|| (category, fact.to_string()))
            })
            .collect()
    }

    async fn run(&self, job: &ExtractionJob) -> usize {
        let conversation = transcript(&job.messages, EXTRACTION_WINDOW);

        let text = match self
            .llm
            .generate(prompts::EXTRACTOR, &conversation, EXTRACTION_TEMPERATURE)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!(user_id = %job.user_id, error = %e, "Fact extraction call failed");
                return 0;
            }
        };

        let mut saved = 0;
        for (category, fact) in Self::parse_facts(&text) {
            match self.store.write(&job.user_id, category, &fact).await {
                Ok(()) => saved += 1,
                Err(e) => warn!(user_id = %job.user_id, error = %e, "Failed to store fact"),
            }
        }
        saved
    }
}

#[async_trait]
impl ExtractionWorker for FactExtractor {
    async fn extract(&self, job: ExtractionJob) {
        let saved = self.run(&job).await;
        if saved > 0 {
            info!(user_id = %job.user_id, saved, "Facts extracted");
        }
        if let Some(events) = &self.events {
            events.publish(PipelineEvent::FactsExtracted {
                user_id: job.user_id.clone(),
                saved,
                timestamp: Utc::now(),
            });
        }
    }
}

/// An entity as validated from model output.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedEntity {
    pub name: String,
    pub kind: EntityKind,
    pub properties: BTreeMap<String, String>,
}

/// A relationship whose endpoints are both among the extracted entities.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedRelationship {
    pub source: String,
    pub kind: RelationKind,
    pub target: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedGraph {
    pub entities: Vec<ExtractedEntity>,
    pub relationships: Vec<ExtractedRelationship>,
}

/// Extracts entities and relationships with one model call and writes
/// them to an [`EntityStore`].
pub struct EntityExtractor {
    llm: ModelClient,
    store: Arc<dyn EntityStore>,
    events: Option<Arc<EventBus>>,
}

impl EntityExtractor {
    pub fn new(llm: ModelClient, store: Arc<dyn EntityStore>) -> Self {
        Self {
            llm,
            store,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Valid entities and relationships from model output.
    ///
    /// Entries with an unknown type, a name under two characters or a
    /// confidence below 0.4 are dropped. Relationships must connect two
    /// distinct entities that survived validation.
    pub fn parse_entities(text: &str) -> ExtractedGraph {
        let Some(obj) = json::parse_object(text) else {
            return ExtractedGraph::default();
        };

        let mut names = HashSet::new();
        let entities: Vec<ExtractedEntity> = array(&obj, "entities")
            .filter_map(|item| {
                let name = str_field(item, &["name", "canonical_name"])?;
                let kind = str_field(item, &["type", "entity_type"])?
                    .parse::<EntityKind>()
                    .ok()?;
                if name.chars().count() < MIN_ENTITY_NAME_CHARS || !confident(item) {
                    return None;
                }
                names.insert(name.to_lowercase()).then(|| ExtractedEntity {
                    name: name.to_string(),
                    kind,
                    properties: properties(item),
                })
            })
            .collect();

        let relationships = array(&obj, "relationships")
            .filter_map(|item| {
                let source = str_field(item, &["source"])?;
                let target = str_field(item, &["target"])?;
                let kind = str_field(item, &["type", "relationship_type"])?
                    .parse::<RelationKind>()
                    .ok()?;
                let (s, t) = (source.to_lowercase(), target.to_lowercase());
                let known = names.contains(&s) && names.contains(&t) && s != t;
                (known && confident(item)).then(|| ExtractedRelationship {
                    source: source.to_string(),
                    kind,
                    target: target.to_string(),
                })
            })
            .collect();

        ExtractedGraph {
            entities,
            relationships,
        }
    }

    /// Returns `(entities stored, relationships created)`.
    async fn run(&self, job: &ExtractionJob) -> (usize, usize) {
        let conversation = transcript(&job.messages, ENTITY_WINDOW);

        let text = match self
            .llm
            .generate(prompts::ENTITY_EXTRACTOR, &conversation, ENTITY_TEMPERATURE)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!(user_id = %job.user_id, error = %e, "Entity extraction call failed");
                return (0, 0);
            }
        };

        let graph = Self::parse_entities(&text);
        let mut stored = 0;
        for entity in &graph.entities {
            match self
                .store
                .upsert(&job.user_id, &entity.name, entity.kind, &entity.properties)
                .await
            {
                Ok(_) => stored += 1,
                Err(e) => warn!(user_id = %job.user_id, entity = %entity.name, error = %e, "Failed to store entity"),
            }
        }

        let mut related = 0;
        for rel in &graph.relationships {
            match self
                .store
                .relate(&job.user_id, &rel.source, rel.kind, &rel.target)
                .await
            {
                Ok(true) => related += 1,
                Ok(false) => {}
                Err(e) => debug!(user_id = %job.user_id, error = %e, "Skipping relationship"),
            }
        }
        (stored, related)
    }
}

#[async_trait]
impl ExtractionWorker for EntityExtractor {
    async fn extract(&self, job: ExtractionJob) {
        let (entities, relationships) = self.run(&job).await;
        if entities > 0 {
            info!(user_id = %job.user_id, entities, relationships, "Entities extracted");
        }
        if let Some(events) = &self.events {
            events.publish(PipelineEvent::EntitiesExtracted {
                user_id: job.user_id.clone(),
                entities,
                relationships,
                timestamp: Utc::now(),
            });
        }
    }
}

fn array<'a>(obj: &'a Map<String, Value>, key: &str) -> impl Iterator<Item = &'a Value> {
    obj.get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

/// The first of `keys` holding a non-blank string, trimmed.
fn str_field<'a>(item: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| item.get(*k)?.as_str())
        .map(str::trim)
        .find(|v| !v.is_empty())
}

fn confident(item: &Value) -> bool {
    let confidence = item
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(DEFAULT_CONFIDENCE);
    confidence >= MIN_ENTITY_CONFIDENCE
}

/// Scalar properties as strings; nested values are skipped.
fn properties(item: &Value) -> BTreeMap<String, String> {
    item.get("properties")
        .or_else(|| item.get("attributes"))
        .and_then(Value::as_object)
        .into_iter()
        .flatten()
        .filter_map(|(k, v)| {
            let value = match v {
                Value::String(s) => s.trim().to_string(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            (!value.is_empty()).then(|| (k.clone(), value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::ScriptedProvider;
    use concierge_memory::{InMemoryEntityStore, InMemoryFactStore};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Gauge {
        in_flight: AtomicUsize,
        max_seen: AtomicUsize,
    }

    struct GaugeWorker {
        gauge: Arc<Gauge>,
        done: mpsc::UnboundedSender<()>,
    }

    impl GaugeWorker {
        fn new(gauge: &Arc<Gauge>, done: &mpsc::UnboundedSender<()>) -> Arc<dyn ExtractionWorker> {
            Arc::new(Self {
                gauge: gauge.clone(),
                done: done.clone(),
            })
        }
    }

    #[async_trait]
    impl ExtractionWorker for GaugeWorker {
        async fn extract(&self, _job: ExtractionJob) {
            let now = self.gauge.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.gauge.max_seen.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.gauge.in_flight.fetch_sub(1, Ordering::SeqCst);
            let _ = self.done.send(());
        }
    }

    fn exchange() -> Vec<Message> {
        vec![Message::user("I hate Friday meetings"), Message::assistant("Noted.")]
    }

    #[tokio::test]
    async fn never_more_than_gate_in_flight() {
        let gate = 3;
        let gauge = Arc::new(Gauge::default());
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        let (extractor, _handle) =
            MemoryExtractor::spawn(vec![GaugeWorker::new(&gauge, &done_tx)], gate, 64);

        for i in 0..gate + 5 {
            assert!(extractor.submit(&format!("u{i}"), exchange()));
        }
        for _ in 0..gate + 5 {
            done_rx.recv().await.unwrap();
        }

        assert_eq!(gauge.max_seen.load(Ordering::SeqCst), gate);
        assert_eq!(gauge.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn workers_share_one_gate() {
        let gauge = Arc::new(Gauge::default());
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        let workers = vec![
            GaugeWorker::new(&gauge, &done_tx),
            GaugeWorker::new(&gauge, &done_tx),
        ];
        let (extractor, _handle) = MemoryExtractor::spawn(workers, 2, 64);

        for i in 0..4 {
            assert!(extractor.submit(&format!("u{i}"), exchange()));
        }
        // Every job reaches both workers.
        for _ in 0..8 {
            done_rx.recv().await.unwrap();
        }

        assert_eq!(gauge.max_seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn short_exchanges_are_not_submitted() {
        let gauge = Arc::new(Gauge::default());
        let (done_tx, _done_rx) = mpsc::unbounded_channel();
        let (extractor, _handle) =
            MemoryExtractor::spawn(vec![GaugeWorker::new(&gauge, &done_tx)], 1, 4);
        assert!(!extractor.submit("u1", vec![Message::user("hi")]));
    }

    #[tokio::test]
    async fn full_queue_drops_jobs() {
        struct Stuck;
        #[async_trait]
        impl ExtractionWorker for Stuck {
            async fn extract(&self, _job: ExtractionJob) {
                std::future::pending::<()>().await;
            }
        }

        let (extractor, _handle) = MemoryExtractor::spawn(vec![Arc::new(Stuck) as Arc<dyn ExtractionWorker>], 1, 1);
        let accepted = (0..10).filter(|_| extractor.submit("u1", exchange())).count();
        assert!(accepted < 10);
    }

    #[test]
    fn parse_facts_filters_invalid_entries() {
        let text = r#"Here you go:
        ```json
        [
            {"fact": "Dislikes meetings on Friday", "category": "preference"},
            {"fact": "ok", "category": "fact"},
            {"fact": "Has a sister", "category": "gossip"},
            {"category": "task"},
            {"fact": "Must call the client by Friday", "category": "task"}
        ]
        ```"#;
        let facts = FactExtractor::parse_facts(text);
        assert_eq!(
            facts,
            vec![
                (FactCategory::Preference, "Dislikes meetings on Friday".to_string()),
                (FactCategory::Task, "Must call the client by Friday".to_string()),
            ]
        );
    }

    #[test]
    fn parse_facts_accepts_wrapped_object_and_garbage() {
        let wrapped = r#"{"facts": [{"fact": "Works in tech", "category": "fact"}]}"#;
        assert_eq!(FactExtractor::parse_facts(wrapped).len(), 1);
        assert!(FactExtractor::parse_facts("nothing to remember").is_empty());
    }

    #[tokio::test]
    async fn extraction_writes_facts_and_publishes_event() {
        let provider = Arc::new(ScriptedProvider::new().on(
            prompts::EXTRACTOR,
            r#"[{"fact": "Dislikes meetings on Friday", "category": "preference"}]"#,
        ));
        let store = Arc::new(InMemoryFactStore::new());
        let events = Arc::new(EventBus::default());
        let mut rx = events.subscribe();
        let extractor = FactExtractor::new(ModelClient::new(provider.clone(), "mock-model"), store.clone())
            .with_events(events);

        extractor
            .extract(ExtractionJob {
                user_id: "u1".into(),
                messages: exchange(),
            })
            .await;

        let facts = store.facts_for("u1").await;
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].category, FactCategory::Preference);
        assert_eq!(provider.last_temperature(), Some(0.3));
        assert!(matches!(
            rx.recv().await.unwrap().as_ref(),
            PipelineEvent::FactsExtracted { saved: 1, .. }
        ));
    }

    #[tokio::test]
    async fn extraction_failure_is_swallowed() {
        let provider = Arc::new(ScriptedProvider::new().fail_on(prompts::EXTRACTOR));
        let store = Arc::new(InMemoryFactStore::new());
        let extractor = FactExtractor::new(ModelClient::new(provider, "mock-model"), store.clone());

        extractor
            .extract(ExtractionJob {
                user_id: "u1".into(),
                messages: exchange(),
            })
            .await;
        assert_eq!(store.count().await, 0);
    }

    #[test]
    fn parse_entities_validates_types_and_endpoints() {
        let text = r#"```json
        {
            "entities": [
                {"name": "Marco Rossi", "type": "person", "properties": {"role": "manager", "age": 41, "tags": ["x"]}, "confidence": 0.9},
                {"name": "Acme", "type": "company", "confidence": 0.8},
                {"name": "Zeus", "type": "deity", "confidence": 0.9},
                {"name": "X", "type": "person"},
                {"name": "Someone", "type": "person", "confidence": 0.2},
                {"canonical_name": "Milan", "entity_type": "city"}
            ],
            "relationships": [
                {"source": "Marco Rossi", "target": "acme", "type": "works_at", "confidence": 0.8},
                {"source": "Marco Rossi", "target": "Zeus", "type": "knows"},
                {"source": "Acme", "target": "Milan", "type": "headquartered_in"},
                {"source": "Acme", "target": "Acme", "type": "related_to"},
                {"source": "Marco Rossi", "target": "Milan", "type": "lives_in", "confidence": 0.1}
            ]
        }
        ```"#;

        let graph = EntityExtractor::parse_entities(text);
        let names: Vec<&str> = graph.entities.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Marco Rossi", "Acme", "Milan"]);
        assert_eq!(graph.entities[1].kind, EntityKind::Organization);
        assert_eq!(graph.entities[2].kind, EntityKind::Location);
        assert_eq!(graph.entities[0].properties.get("age").map(String::as_str), Some("41"));
        assert!(!graph.entities[0].properties.contains_key("tags"));

        assert_eq!(
            graph.relationships,
            vec![ExtractedRelationship {
                source: "Marco Rossi".into(),
                kind: RelationKind::WorksFor,
                target: "acme".into(),
            }]
        );
    }

    #[test]
    fn parse_entities_tolerates_garbage() {
        assert_eq!(EntityExtractor::parse_entities("no names here"), ExtractedGraph::default());
        assert!(EntityExtractor::parse_entities(r#"{"entities": "none"}"#).entities.is_empty());
    }

    #[tokio::test]
    async fn entity_extraction_builds_the_graph() {
        let provider = Arc::new(ScriptedProvider::new().on(
            prompts::ENTITY_EXTRACTOR,
            r#"{"entities": [{"name": "Marco", "type": "person"}, {"name": "Acme", "type": "organization"}],
                "relationships": [{"source": "Marco", "target": "Acme", "type": "works_for"}]}"#,
        ));
        let store = Arc::new(InMemoryEntityStore::new());
        let events = Arc::new(EventBus::default());
        let mut rx = events.subscribe();
        let extractor = EntityExtractor::new(ModelClient::new(provider.clone(), "mock-model"), store.clone())
            .with_events(events);

        extractor
            .extract(ExtractionJob {
                user_id: "u1".into(),
                messages: vec![
                    Message::user("Marco from Acme wants a call"),
                    Message::assistant("I'll set it up."),
                ],
            })
            .await;

        assert_eq!(store.entities_for("u1").await.len(), 2);
        assert_eq!(store.relationship_count("u1").await, 1);
        assert_eq!(provider.last_temperature(), Some(0.1));
        assert!(matches!(
            rx.recv().await.unwrap().as_ref(),
            PipelineEvent::EntitiesExtracted { entities: 2, relationships: 1, .. }
        ));
    }

    #[tokio::test]
    async fn entity_extraction_failure_is_swallowed() {
        let provider = Arc::new(ScriptedProvider::new().fail_on(prompts::ENTITY_EXTRACTOR));
        let store = Arc::new(InMemoryEntityStore::new());
        let extractor = EntityExtractor::new(ModelClient::new(provider, "mock-model"), store.clone());

        extractor
            .extract(ExtractionJob {
                user_id: "u1".into(),
                messages: exchange(),
            })
            .await;
        assert!(store.entities_for("u1").await.is_empty());
    }
}
