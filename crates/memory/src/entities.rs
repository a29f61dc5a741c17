//! In-memory entity store: a per-user knowledge graph held in process memory.

use async_trait::async_trait;
use chrono::Utc;
use concierge_core::entities::{
    Entity, EntityContext, EntityKind, EntityStore, RelatedEntity, RelationKind,
};
use concierge_core::error::EntityStoreError;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::keywords;

#[derive(Debug, Clone)]
struct Edge {
    source: String,
    kind: RelationKind,
    target: String,
}

#[derive(Default)]
struct Graph {
    entities: Vec<Entity>,
    edges: Vec<Edge>,
}

impl Graph {
    fn find(&self, name: &str) -> Option<usize> {
        let name = name.trim();
        self.entities
            .iter()
            .position(|e| e.name.eq_ignore_ascii_case(name))
    }

    fn context(&self, entity: &Entity) -> EntityContext {
        let relationships = self
            .edges
            .iter()
            .filter_map(|edge| {
                if edge.source.eq_ignore_ascii_case(&entity.name) {
                    Some(RelatedEntity {
                        kind: edge.kind,
                        name: edge.target.clone(),
                        outgoing: true,
                    })
                } else if edge.target.eq_ignore_ascii_case(&entity.name) {
                    Some(RelatedEntity {
                        kind: edge.kind,
                        name: edge.source.clone(),
                        outgoing: false,
                    })
                } else {
                    None
                }
            })
            .collect();

        EntityContext {
            entity: entity.clone(),
            relationships,
        }
    }
}

/// Entities and relationships per user, recalled by keyword overlap.
#[derive(Clone)]
pub struct InMemoryEntityStore {
    graphs: Arc<RwLock<HashMap<String, Graph>>>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self {
            graphs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// All entities stored for a user, in insertion order.
    pub async fn entities_for(&self, user_id: &str) -> Vec<Entity> {
        self.graphs
            .read()
            .await
            .get(user_id)
            .map(|g| g.entities.clone())
            .unwrap_or_default()
    }

    /// Number of relationships stored for a user.
    pub async fn relationship_count(&self, user_id: &str) -> usize {
        self.graphs
            .read()
            .await
            .get(user_id)
            .map_or(0, |g| g.edges.len())
    }
}

impl Default for InMemoryEntityStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn upsert(
        &self,
        user_id: &str,
        name: &str,
        kind: EntityKind,
        properties: &BTreeMap<String, String>,
    ) -> Result<bool, EntityStoreError> {
        let name = name.trim();
        let mut graphs = self.graphs.write().await;
        let graph = graphs.entry(user_id.to_string()).or_default();

        if let Some(index) = graph.find(name) {
            let entity = &mut graph.entities[index];
            entity
                .properties
                .extend(properties.iter().map(|(k, v)| (k.clone(), v.clone())));
            entity.updated_at = Utc::now();
            return Ok(false);
        }

        graph.entities.push(Entity {
            user_id: user_id.to_string(),
            name: name.to_string(),
            kind,
            properties: properties.clone(),
            updated_at: Utc::now(),
        });
        Ok(true)
    }

    async fn relate(
        &self,
        user_id: &str,
        source: &str,
        kind: RelationKind,
        target: &str,
    ) -> Result<bool, EntityStoreError> {
        let mut graphs = self.graphs.write().await;
        let graph = graphs
            .get_mut(user_id)
            .ok_or_else(|| EntityStoreError::UnknownEntity(source.to_string()))?;

        let source = graph
            .find(source)
            .map(|i| graph.entities[i].name.clone())
            .ok_or_else(|| EntityStoreError::UnknownEntity(source.to_string()))?;
        let target = graph
            .find(target)
            .map(|i| graph.entities[i].name.clone())
            .ok_or_else(|| EntityStoreError::UnknownEntity(target.to_string()))?;

        let exists = graph
            .edges
            .iter()
            .any(|e| e.source == source && e.kind == kind && e.target == target);
        if !exists {
            graph.edges.push(Edge {
                source,
                kind,
                target,
            });
        }
        Ok(!exists)
    }

    async fn recall(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<EntityContext>, EntityStoreError> {
        let terms = keywords(query);
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let graphs = self.graphs.read().await;
        let Some(graph) = graphs.get(user_id) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<(usize, &Entity)> = graph
            .entities
            .iter()
            .filter_map(|entity| {
                let mut words = keywords(&entity.name);
                for value in entity.properties.values() {
                    words.extend(keywords(value));
                }
                let hits = terms.iter().filter(|t| words.contains(t)).count();
                (hits > 0).then_some((hits, entity))
            })
            .collect();

        // Most matching terms first, most recently touched first on ties.
        scored.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then_with(|| b.1.updated_at.cmp(&a.1.updated_at))
        });

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(_, entity)| graph.context(entity))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn upsert_merges_by_name() {
        let store = InMemoryEntityStore::new();
        let created = store
            .upsert("u1", "Marco Rossi", EntityKind::Person, &props(&[("role", "manager")]))
            .await
            .unwrap();
        let again = store
            .upsert("u1", "marco rossi", EntityKind::Person, &props(&[("city", "Milan")]))
            .await
            .unwrap();

        assert!(created);
        assert!(!again);
        let entities = store.entities_for("u1").await;
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].properties.len(), 2);
        assert!(store.entities_for("u2").await.is_empty());
    }

    #[tokio::test]
    async fn relate_requires_known_endpoints() {
        let store = InMemoryEntityStore::new();
        store.upsert("u1", "Marco", EntityKind::Person, &BTreeMap::new()).await.unwrap();
        store.upsert("u1", "Acme", EntityKind::Organization, &BTreeMap::new()).await.unwrap();

        assert!(store.relate("u1", "marco", RelationKind::WorksFor, "ACME").await.unwrap());
        assert!(!store.relate("u1", "Marco", RelationKind::WorksFor, "Acme").await.unwrap());
        assert!(matches!(
            store.relate("u1", "Marco", RelationKind::Knows, "Giulia").await,
            Err(EntityStoreError::UnknownEntity(name)) if name == "Giulia"
        ));
        assert_eq!(store.relationship_count("u1").await, 1);
    }

    #[tokio::test]
    async fn recall_matches_names_and_includes_edges() {
        let store = InMemoryEntityStore::new();
        store
            .upsert("u1", "Marco Rossi", EntityKind::Person, &props(&[("role", "manager")]))
            .await
            .unwrap();
        store.upsert("u1", "Acme", EntityKind::Organization, &BTreeMap::new()).await.unwrap();
        store.upsert("u1", "Rome", EntityKind::Location, &BTreeMap::new()).await.unwrap();
        store.relate("u1", "Marco Rossi", RelationKind::WorksFor, "Acme").await.unwrap();

        let recalled = store.recall("u1", "email Marco about the offsite", 5).await.unwrap();
        assert_eq!(recalled.len(), 1);
        assert_eq!(recalled[0].entity.name, "Marco Rossi");
        assert_eq!(
            recalled[0].relationships,
            vec![RelatedEntity {
                kind: RelationKind::WorksFor,
                name: "Acme".into(),
                outgoing: true,
            }]
        );

        let acme = store.recall("u1", "news about acme", 5).await.unwrap();
        assert!(!acme[0].relationships[0].outgoing);
        assert!(store.recall("u2", "Marco", 5).await.unwrap().is_empty());
    }
}
