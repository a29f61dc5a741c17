//! Entity store trait: the people, organizations and places a user talks about.
//!
//! Alongside facts, the memory extractor builds a small knowledge graph per
//! user: named entities with properties, and typed relationships between
//! them. The pipeline recalls the entities relevant to an utterance so the
//! response can refer to them by what the assistant already knows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use crate::error::EntityStoreError;

/// Relationships rendered per entity in prompts.
pub const RELATIONSHIPS_PER_ENTITY: usize = 3;

/// What kind of thing an entity is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Person,
    Organization,
    Project,
    Location,
    Event,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Person,
        EntityKind::Organization,
        EntityKind::Project,
        EntityKind::Location,
        EntityKind::Event,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Person => "person",
            EntityKind::Organization => "organization",
            EntityKind::Project => "project",
            EntityKind::Location => "location",
            EntityKind::Event => "event",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    /// Canonical names plus the synonyms models tend to produce.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase();
        let canonical = match name.as_str() {
            "company" | "firm" | "corp" | "corporation" => "organization",
            "individual" => "person",
            "place" | "city" | "country" => "location",
            "meeting" => "event",
            other => other,
        };
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == canonical)
            .ok_or_else(|| format!("unknown entity type '{s}'"))
    }
}

/// The type of a directed relationship between two entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    ReportsTo,
    CollaboratesWith,
    Knows,
    IsFamilyOf,
    WorksFor,
    IsClientOf,
    IsPartnerOf,
    Owns,
    Leads,
    WorksOn,
    Created,
    LocatedIn,
    LivesIn,
    Attended,
    Organized,
    SubsidiaryOf,
    CompetesWith,
    RelatedTo,
}

impl RelationKind {
    pub const ALL: [RelationKind; 18] = [
        RelationKind::ReportsTo,
        RelationKind::CollaboratesWith,
        RelationKind::Knows,
        RelationKind::IsFamilyOf,
        RelationKind::WorksFor,
        RelationKind::IsClientOf,
        RelationKind::IsPartnerOf,
        RelationKind::Owns,
        RelationKind::Leads,
        RelationKind::WorksOn,
        RelationKind::Created,
        RelationKind::LocatedIn,
        RelationKind::LivesIn,
        RelationKind::Attended,
        RelationKind::Organized,
        RelationKind::SubsidiaryOf,
        RelationKind::CompetesWith,
        RelationKind::RelatedTo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::ReportsTo => "reports_to",
            RelationKind::CollaboratesWith => "collaborates_with",
            RelationKind::Knows => "knows",
            RelationKind::IsFamilyOf => "is_family_of",
            RelationKind::WorksFor => "works_for",
            RelationKind::IsClientOf => "is_client_of",
            RelationKind::IsPartnerOf => "is_partner_of",
            RelationKind::Owns => "owns",
            RelationKind::Leads => "leads",
            RelationKind::WorksOn => "works_on",
            RelationKind::Created => "created",
            RelationKind::LocatedIn => "located_in",
            RelationKind::LivesIn => "lives_in",
            RelationKind::Attended => "attended",
            RelationKind::Organized => "organized",
            RelationKind::SubsidiaryOf => "subsidiary_of",
            RelationKind::CompetesWith => "competes_with",
            RelationKind::RelatedTo => "related_to",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase().replace([' ', '-'], "_");
        let canonical = match name.as_str() {
            "employed_by" | "works_at" | "member_of" | "belongs_to" => "works_for",
            "manages" => "leads",
            "based_in" | "located_at" => "located_in",
            "part_of" => "subsidiary_of",
            other => other,
        };
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == canonical)
            .ok_or_else(|| format!("unknown relationship type '{s}'"))
    }
}

/// A stored entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub user_id: String,
    pub name: String,
    pub kind: EntityKind,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    pub updated_at: DateTime<Utc>,
}

/// One edge as seen from a recalled entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedEntity {
    pub kind: RelationKind,
    pub name: String,
    /// `true` when the recalled entity is the source of the edge
    pub outgoing: bool,
}

/// A recalled entity with its nearby edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityContext {
    pub entity: Entity,
    #[serde(default)]
    pub relationships: Vec<RelatedEntity>,
}

impl EntityContext {
    /// `* Marco Rossi (person)` plus indented info and relationship lines.
    pub fn render(&self) -> String {
        let mut text = format!("* {} ({})", self.entity.name, self.entity.kind);

        if !self.entity.properties.is_empty() {
            let props: Vec<String> = self
                .entity
                .properties
                .iter()
                .map(|(k, v)| format!("{k}: {v}"))
                .collect();
            text.push_str(&format!("\n  Info: {}", props.join(", ")));
        }

        let edges: Vec<String> = self
            .relationships
            .iter()
            .take(RELATIONSHIPS_PER_ENTITY)
            .map(|r| {
                if r.outgoing {
                    format!("{} -> {}", r.kind, r.name)
                } else {
                    format!("{} -> {}", r.name, r.kind)
                }
            })
            .collect();
        if !edges.is_empty() {
            text.push_str(&format!("\n  Relations: {}", edges.join(", ")));
        }
        text
    }
}

/// The entity store contract.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// The backend name.
    fn name(&self) -> &str;

    /// Insert an entity or merge properties into the one with the same
    /// name (case-insensitive). Returns `true` if it was new.
    async fn upsert(
        &self,
        user_id: &str,
        name: &str,
        kind: EntityKind,
        properties: &BTreeMap<String, String>,
    ) -> std::result::Result<bool, EntityStoreError>;

    /// Record `source -[kind]-> target` between two stored entities.
    /// Returns `true` if the edge was new.
    async fn relate(
        &self,
        user_id: &str,
        source: &str,
        kind: RelationKind,
        target: &str,
    ) -> std::result::Result<bool, EntityStoreError>;

    /// Entities relevant to `query`, best first.
    async fn recall(
        &self,
        _user_id: &str,
        _query: &str,
        _limit: usize,
    ) -> std::result::Result<Vec<EntityContext>, EntityStoreError> {
        Ok(Vec::new())
    }
}
