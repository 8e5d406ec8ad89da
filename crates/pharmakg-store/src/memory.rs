//! In-memory graph store.
//!
//! Backs local runs (seeded from a JSON file) and every test in the
//! workspace. All mutations happen under a single write lock, so each
//! write is atomic with respect to concurrent readers.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use pharmakg_common::entities::{normalize_drug_name, normalize_target_name};
use pharmakg_common::{
    CascadeAttempt, Classification, DownstreamEdge, Drug, EdgeIdentity, EffectEntity, NodeRef,
    Target, TargetsEdge,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::store::GraphStore;

/// Seed data for the in-memory store, as produced by upstream ingestion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSeed {
    #[serde(default)]
    pub drugs: Vec<Drug>,
    #[serde(default)]
    pub targets: Vec<Target>,
    #[serde(default)]
    pub edges: Vec<SeedEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedEdge {
    pub drug: String,
    pub target: String,
}

type AttemptKey = (String, String, String);

#[derive(Debug, Default)]
struct GraphState {
    drugs: HashMap<String, Drug>,
    targets: HashMap<String, Target>,
    edges: HashMap<(String, String), TargetsEdge>,
    entities: HashMap<Uuid, EffectEntity>,
    // insertion order is kept so read-back is deterministic
    downstream: Vec<DownstreamEdge>,
    downstream_index: HashMap<EdgeIdentity, usize>,
    attempts: HashMap<AttemptKey, CascadeAttempt>,
}

#[derive(Debug, Default)]
pub struct MemoryGraphStore {
    state: RwLock<GraphState>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn from_seed(seed: GraphSeed) -> Self {
        let store = Self::new();
        for drug in seed.drugs {
            store.insert_drug(drug).await;
        }
        for target in seed.targets {
            store.insert_target(target).await;
        }
        for edge in seed.edges {
            store.insert_targets_edge(&edge.drug, &edge.target).await;
        }
        store
    }

    /// Load a JSON seed file (`{"drugs": [...], "targets": [...], "edges": [...]}`).
    pub async fn from_seed_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        let seed: GraphSeed = serde_json::from_str(&content)?;
        tracing::info!(
            drugs = seed.drugs.len(),
            targets = seed.targets.len(),
            edges = seed.edges.len(),
            "Loaded graph seed"
        );
        Ok(Self::from_seed(seed).await)
    }

    pub async fn insert_drug(&self, mut drug: Drug) {
        drug.name = normalize_drug_name(&drug.name);
        self.state.write().await.drugs.insert(drug.name.clone(), drug);
    }

    pub async fn insert_target(&self, mut target: Target) {
        target.name = normalize_target_name(&target.name);
        self.state.write().await.targets.insert(target.name.clone(), target);
    }

    /// Create an unclassified Drug->Target edge, creating bare nodes as needed.
    /// An existing edge is left untouched.
    pub async fn insert_targets_edge(&self, drug: &str, target: &str) {
        let drug = normalize_drug_name(drug);
        let target = normalize_target_name(target);
        let mut state = self.state.write().await;
        state.drugs.entry(drug.clone()).or_insert_with(|| Drug::new(&drug));
        state.targets.entry(target.clone()).or_insert_with(|| Target::new(&target));
        state
            .edges
            .entry((drug.clone(), target.clone()))
            .or_insert_with(|| TargetsEdge::unclassified(&drug, &target));
    }

    pub async fn downstream_edge_count(&self) -> usize {
        self.state.read().await.downstream.len()
    }

    pub async fn entity_count(&self) -> usize {
        self.state.read().await.entities.len()
    }

    /// Snapshot of every downstream edge, in creation order.
    pub async fn all_downstream_edges(&self) -> Vec<DownstreamEdge> {
        self.state.read().await.downstream.clone()
    }
}

fn edge_key(drug: &str, target: &str) -> (String, String) {
    (normalize_drug_name(drug), normalize_target_name(target))
}

fn attempt_key(drug: &str, target: &str, predicted_by: &str) -> AttemptKey {
    (
        normalize_drug_name(drug),
        normalize_target_name(target),
        predicted_by.to_string(),
    )
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn get_drug(&self, name: &str) -> Result<Option<Drug>> {
        let state = self.state.read().await;
        Ok(state.drugs.get(&normalize_drug_name(name)).cloned())
    }

    async fn get_edge(&self, drug: &str, target: &str) -> Result<Option<TargetsEdge>> {
        let state = self.state.read().await;
        Ok(state.edges.get(&edge_key(drug, target)).cloned())
    }

    async fn write_classification(
        &self,
        drug: &str,
        target: &str,
        classification: &Classification,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let edge = state
            .edges
            .get_mut(&edge_key(drug, target))
            .ok_or_else(|| StoreError::NotFound(format!("TARGETS edge {drug} -> {target}")))?;
        edge.classification = Some(classification.clone());
        Ok(())
    }

    async fn get_or_create_entity(&self, name: &str, entity_type: &str) -> Result<EffectEntity> {
        let candidate = EffectEntity::new(name, entity_type);
        if candidate.name.is_empty() || candidate.entity_type.is_empty() {
            return Err(StoreError::InvalidRecord(
                "effect entity requires a name and a type".to_string(),
            ));
        }
        let mut state = self.state.write().await;
        let entity = state.entities.entry(candidate.id).or_insert(candidate);
        Ok(entity.clone())
    }

    async fn get_entity(&self, id: Uuid) -> Result<Option<EffectEntity>> {
        Ok(self.state.read().await.entities.get(&id).cloned())
    }

    async fn get_or_create_downstream_edge(&self, edge: &DownstreamEdge) -> Result<bool> {
        let mut state = self.state.write().await;

        match &edge.source {
            NodeRef::Target(name) if !state.targets.contains_key(&normalize_target_name(name)) => {
                return Err(StoreError::NotFound(format!("Target {name}")));
            }
            NodeRef::Entity(id) if !state.entities.contains_key(id) => {
                return Err(StoreError::NotFound(format!("EffectEntity {id}")));
            }
            _ => {}
        }
        if !state.entities.contains_key(&edge.destination) {
            return Err(StoreError::NotFound(format!("EffectEntity {}", edge.destination)));
        }

        let mut edge = edge.clone();
        edge.drug_context = normalize_drug_name(&edge.drug_context);
        if let NodeRef::Target(name) = &edge.source {
            edge.source = NodeRef::Target(normalize_target_name(name));
        }
        let identity = edge.identity();
        if state.downstream_index.contains_key(&identity) {
            return Ok(false);
        }
        let idx = state.downstream.len();
        state.downstream.push(edge);
        state.downstream_index.insert(identity, idx);
        Ok(true)
    }

    async fn count_downstream_edges(
        &self,
        target: &str,
        drug_context: &str,
        predicted_by: &str,
    ) -> Result<u64> {
        let source = NodeRef::Target(normalize_target_name(target));
        let drug_context = normalize_drug_name(drug_context);
        let state = self.state.read().await;
        let n = state
            .downstream
            .iter()
            .filter(|e| {
                e.source == source && e.drug_context == drug_context && e.predicted_by == predicted_by
            })
            .count();
        Ok(n as u64)
    }

    async fn downstream_edges_from(
        &self,
        source: &NodeRef,
        drug_context: &str,
        predicted_by: &str,
    ) -> Result<Vec<DownstreamEdge>> {
        let source = match source {
            NodeRef::Target(name) => NodeRef::Target(normalize_target_name(name)),
            other => other.clone(),
        };
        let drug_context = normalize_drug_name(drug_context);
        let state = self.state.read().await;
        Ok(state
            .downstream
            .iter()
            .filter(|e| {
                e.source == source && e.drug_context == drug_context && e.predicted_by == predicted_by
            })
            .cloned()
            .collect())
    }

    async fn record_cascade_attempt(&self, attempt: &CascadeAttempt) -> Result<()> {
        let key = attempt_key(&attempt.drug, &attempt.target, &attempt.predicted_by);
        self.state.write().await.attempts.insert(key, attempt.clone());
        Ok(())
    }

    async fn get_cascade_attempt(
        &self,
        drug: &str,
        target: &str,
        predicted_by: &str,
    ) -> Result<Option<CascadeAttempt>> {
        let key = attempt_key(drug, target, predicted_by);
        Ok(self.state.read().await.attempts.get(&key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn classification(confidence: f64) -> Classification {
        Classification {
            relationship_type: "Primary/On-Target".to_string(),
            target_class: "Enzyme".to_string(),
            target_subclass: "Cyclooxygenase".to_string(),
            mechanism: "Inhibitor".to_string(),
            confidence,
            reasoning: "Irreversible acetylation of Ser530".to_string(),
            source: "test-model".to_string(),
            timestamp: Utc::now(),
        }
    }

    fn edge(source: NodeRef, destination: Uuid, depth: u8) -> DownstreamEdge {
        DownstreamEdge {
            source,
            destination,
            effect_type: "decreases".to_string(),
            confidence: 0.8,
            reasoning: String::new(),
            depth,
            drug_context: "aspirin".to_string(),
            predicted_by: "test-model".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_write_classification_requires_edge() {
        let store = MemoryGraphStore::new();
        let err = store
            .write_classification("aspirin", "PTGS1", &classification(0.9))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_edge_lookup_normalizes_drug_case() {
        let store = MemoryGraphStore::new();
        store.insert_targets_edge("Aspirin", "PTGS1").await;
        store
            .write_classification("ASPIRIN", "PTGS1", &classification(0.95))
            .await
            .unwrap();
        let edge = store.get_edge("aspirin", " PTGS1").await.unwrap().unwrap();
        assert!(edge.is_classified());
        assert_eq!(edge.classification.unwrap().confidence, 0.95);
    }

    #[tokio::test]
    async fn test_entities_are_not_duplicated() {
        let store = MemoryGraphStore::new();
        let a = store.get_or_create_entity("Thromboxane A2", "Metabolite").await.unwrap();
        let b = store.get_or_create_entity("thromboxane a2", "metabolite").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.entity_count().await, 1);
    }

    #[tokio::test]
    async fn test_downstream_edge_identity_dedup() {
        let store = MemoryGraphStore::new();
        store.insert_targets_edge("aspirin", "PTGS1").await;
        let e = store.get_or_create_entity("Thromboxane A2", "Metabolite").await.unwrap();

        let first = edge(NodeRef::Target("PTGS1".to_string()), e.id, 1);
        assert!(store.get_or_create_downstream_edge(&first).await.unwrap());

        // Same identity, different payload: still a no-op
        let mut second = first.clone();
        second.confidence = 0.2;
        assert!(!store.get_or_create_downstream_edge(&second).await.unwrap());

        // Different provenance is a different edge
        let mut third = first.clone();
        third.predicted_by = "other-model".to_string();
        assert!(store.get_or_create_downstream_edge(&third).await.unwrap());

        assert_eq!(store.downstream_edge_count().await, 2);
        assert_eq!(store.count_downstream_edges("PTGS1", "aspirin", "test-model").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_downstream_edge_requires_endpoints() {
        let store = MemoryGraphStore::new();
        let e = store.get_or_create_entity("Platelet aggregation", "Phenotype").await.unwrap();
        let dangling = edge(NodeRef::Target("PTGS1".to_string()), e.id, 1);
        assert!(store.get_or_create_downstream_edge(&dangling).await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_writers_store_one_edge() {
        let store = std::sync::Arc::new(MemoryGraphStore::new());
        store.insert_targets_edge("aspirin", "PTGS1").await;
        let e = store.get_or_create_entity("Thromboxane A2", "Metabolite").await.unwrap();

        let writers: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let edge = edge(NodeRef::Target("PTGS1".into()), e.id, 1);
                tokio::spawn(async move { store.get_or_create_downstream_edge(&edge).await.unwrap() })
            })
            .collect();
        let mut created = 0;
        for writer in writers {
            if writer.await.unwrap() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(store.downstream_edge_count().await, 1);
    }

    #[tokio::test]
    async fn test_count_only_includes_edges_from_target() {
        let store = MemoryGraphStore::new();
        store.insert_targets_edge("aspirin", "PTGS1").await;
        let a = store.get_or_create_entity("Thromboxane A2", "Metabolite").await.unwrap();
        let b = store.get_or_create_entity("Platelet aggregation", "Phenotype").await.unwrap();
        store
            .get_or_create_downstream_edge(&edge(NodeRef::Target("PTGS1".into()), a.id, 1))
            .await
            .unwrap();
        store
            .get_or_create_downstream_edge(&edge(NodeRef::Entity(a.id), b.id, 2))
            .await
            .unwrap();
        assert_eq!(store.count_downstream_edges("PTGS1", "aspirin", "test-model").await.unwrap(), 1);
        let from_a = store
            .downstream_edges_from(&NodeRef::Entity(a.id), "aspirin", "test-model")
            .await
            .unwrap();
        assert_eq!(from_a.len(), 1);
        assert_eq!(from_a[0].destination, b.id);
    }

    #[tokio::test]
    async fn test_seed_creates_unclassified_edges() {
        let seed: GraphSeed = serde_json::from_str(
            r#"{
                "drugs": [{"name": "Aspirin", "mechanism_of_action": "COX inhibitor"}],
                "edges": [{"drug": "aspirin", "target": "PTGS1"}, {"drug": "aspirin", "target": "PTGS2"}]
            }"#,
        )
        .unwrap();
        let store = MemoryGraphStore::from_seed(seed).await;
        let drug = store.get_drug("ASPIRIN").await.unwrap().unwrap();
        assert_eq!(drug.mechanism_of_action.as_deref(), Some("COX inhibitor"));
        let edge = store.get_edge("aspirin", "PTGS2").await.unwrap().unwrap();
        assert!(!edge.is_classified());
    }

    #[tokio::test]
    async fn test_attempt_marker_roundtrip() {
        let store = MemoryGraphStore::new();
        let attempt = CascadeAttempt {
            drug: "aspirin".to_string(),
            target: "PTGS1".to_string(),
            predicted_by: "test-model".to_string(),
            depth: 2,
            direct_effects: 0,
            complete: true,
            attempted_at: Utc::now(),
        };
        store.record_cascade_attempt(&attempt).await.unwrap();
        let got = store.get_cascade_attempt("Aspirin", "PTGS1", "test-model").await.unwrap();
        assert_eq!(got, Some(attempt));
        assert!(store.get_cascade_attempt("aspirin", "PTGS1", "other").await.unwrap().is_none());
    }
}
