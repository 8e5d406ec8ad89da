/// Core entity types mirroring the drug/target graph schema.
/// These are the Rust representations of the nodes and edges the
/// enrichment pipeline reads and writes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Drug names are the primary key of Drug nodes and are stored lower-cased.
pub fn normalize_drug_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Target names keep their case (gene symbols are conventionally upper-case).
pub fn normalize_target_name(name: &str) -> String {
    name.trim().to_string()
}

// ---------------------------------------------------------------------------
// Drug / Target (owned by upstream ingestion, read-only here)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Drug {
    pub name: String,
    pub mechanism_of_action: Option<String>,
    pub development_phase: Option<String>,
    pub smiles: Option<String>,
}

impl Drug {
    pub fn new(name: &str) -> Self {
        Self { name: normalize_drug_name(name), ..Default::default() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Target {
    pub name: String,
    pub organism: Option<String>,
}

impl Target {
    pub fn new(name: &str) -> Self {
        Self { name: normalize_target_name(name), organism: None }
    }
}

// ---------------------------------------------------------------------------
// TargetsEdge (Drug -> Target) and its classification payload
// ---------------------------------------------------------------------------

/// AI-derived annotation of a drug->target edge.
///
/// Always written as a whole; an edge either carries a complete
/// `Classification` or none at all.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Classification {
    pub relationship_type: String,
    pub target_class: String,
    pub target_subclass: String,
    pub mechanism: String,
    pub confidence: f64,
    pub reasoning: String,
    /// Provenance tag of the AI service that produced this classification.
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetsEdge {
    pub drug: String,
    pub target: String,
    pub classification: Option<Classification>,
}

impl TargetsEdge {
    pub fn unclassified(drug: &str, target: &str) -> Self {
        Self {
            drug: normalize_drug_name(drug),
            target: normalize_target_name(target),
            classification: None,
        }
    }

    pub fn is_classified(&self) -> bool {
        self.classification.is_some()
    }
}

// ---------------------------------------------------------------------------
// Effect entities and downstream edges
// ---------------------------------------------------------------------------

/// Deterministic id for an effect entity: UUIDv5 over the case-folded
/// (type, name) pair, so the same semantic entity always maps to one node.
pub fn effect_entity_id(name: &str, entity_type: &str) -> Uuid {
    let key = format!(
        "{}:{}",
        entity_type.trim().to_lowercase(),
        name.trim().to_lowercase()
    );
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes())
}

/// A downstream biological entity (pathway, gene, metabolite, phenotype, …).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EffectEntity {
    pub id: Uuid,
    pub name: String,
    pub entity_type: String,
}

impl EffectEntity {
    pub fn new(name: &str, entity_type: &str) -> Self {
        Self {
            id: effect_entity_id(name, entity_type),
            name: name.trim().to_string(),
            entity_type: entity_type.trim().to_string(),
        }
    }
}

/// Source endpoint of a downstream edge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "key", rename_all = "snake_case")]
pub enum NodeRef {
    Target(String),
    Entity(Uuid),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DownstreamEdge {
    pub source: NodeRef,
    pub destination: Uuid,
    pub effect_type: String,
    pub confidence: f64,
    pub reasoning: String,
    /// Hop count from the originating target (1 = direct).
    pub depth: u8,
    pub drug_context: String,
    pub predicted_by: String,
    pub timestamp: DateTime<Utc>,
}

/// Uniqueness key of a downstream edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EdgeIdentity {
    pub source: NodeRef,
    pub destination: Uuid,
    pub drug_context: String,
    pub predicted_by: String,
}

impl DownstreamEdge {
    pub fn identity(&self) -> EdgeIdentity {
        EdgeIdentity {
            source: self.source.clone(),
            destination: self.destination,
            drug_context: self.drug_context.clone(),
            predicted_by: self.predicted_by.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Cascade attempt marker
// ---------------------------------------------------------------------------

/// Records that a cascade prediction ran for (drug, target, predicted_by),
/// so "predicted, found nothing" is distinguishable from "never predicted".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CascadeAttempt {
    pub drug: String,
    pub target: String,
    pub predicted_by: String,
    pub depth: u8,
    pub direct_effects: usize,
    /// False when at least one deeper branch failed.
    pub complete: bool,
    pub attempted_at: DateTime<Utc>,
}
