//! Idempotency gates: decide whether an AI call is needed for a fact that
//! may already be persisted. Neither gate writes anything.

use std::sync::Arc;

use pharmakg_common::entities::{normalize_drug_name, normalize_target_name};
use pharmakg_common::{CascadeAttempt, Classification, EnrichError, Result, TargetsEdge};
use pharmakg_store::GraphStore;

/// Classification cache gate.
#[derive(Clone)]
pub struct ClassificationGate {
    store: Arc<dyn GraphStore>,
}

impl ClassificationGate {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    async fn edge(&self, drug: &str, target: &str) -> Result<TargetsEdge> {
        self.store
            .get_edge(drug, target)
            .await?
            .ok_or_else(|| {
                EnrichError::relationship_not_found(
                    &normalize_drug_name(drug),
                    &normalize_target_name(target),
                )
            })
    }

    /// True iff the edge exists and carries no classification.
    /// A missing edge is `RelationshipNotFound`, not "needs classification".
    pub async fn needs_classification(&self, drug: &str, target: &str) -> Result<bool> {
        Ok(!self.edge(drug, target).await?.is_classified())
    }

    /// The stored classification, if the edge has one.
    pub async fn cached_classification(
        &self,
        drug: &str,
        target: &str,
    ) -> Result<Option<Classification>> {
        Ok(self.edge(drug, target).await?.classification)
    }
}

/// Cascade cache gate.
#[derive(Clone)]
pub struct CascadeGate {
    store: Arc<dyn GraphStore>,
}

impl CascadeGate {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Number of depth-1 edges already stored for (target, drug, predicted_by).
    /// Zero reads as "prediction needed" whether or not a run ever happened.
    pub async fn cascade_exists(&self, drug: &str, target: &str, predicted_by: &str) -> Result<u64> {
        Ok(self
            .store
            .count_downstream_edges(
                &normalize_target_name(target),
                &normalize_drug_name(drug),
                predicted_by,
            )
            .await?)
    }

    pub async fn attempt(
        &self,
        drug: &str,
        target: &str,
        predicted_by: &str,
    ) -> Result<Option<CascadeAttempt>> {
        Ok(self
            .store
            .get_cascade_attempt(&normalize_drug_name(drug), &normalize_target_name(target), predicted_by)
            .await?)
    }

    /// Combines the edge count with the attempt marker.
    ///
    /// With a marker: needed only if the earlier run was shallower than
    /// `depth` or lost branches. Without one (edges written by an older or
    /// external process): needed iff no edges exist.
    pub async fn needs_prediction(
        &self,
        drug: &str,
        target: &str,
        predicted_by: &str,
        depth: u8,
    ) -> Result<bool> {
        match self.attempt(drug, target, predicted_by).await? {
            Some(marker) => Ok(marker.depth < depth || !marker.complete),
            None => Ok(self.cascade_exists(drug, target, predicted_by).await? == 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pharmakg_common::{DownstreamEdge, NodeRef};
    use pharmakg_store::MemoryGraphStore;

    async fn store() -> Arc<MemoryGraphStore> {
        let store = MemoryGraphStore::new();
        store.insert_targets_edge("aspirin", "PTGS1").await;
        Arc::new(store)
    }

    fn classification() -> Classification {
        Classification {
            relationship_type: "Primary/On-Target".into(),
            target_class: "Enzyme".into(),
            target_subclass: "Cyclooxygenase".into(),
            mechanism: "Inhibitor".into(),
            confidence: 0.95,
            reasoning: "".into(),
            source: "m".into(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_needs_classification_lifecycle() {
        let store = store().await;
        let gate = ClassificationGate::new(store.clone());
        assert!(gate.needs_classification("Aspirin", "PTGS1").await.unwrap());
        store.write_classification("aspirin", "PTGS1", &classification()).await.unwrap();
        assert!(!gate.needs_classification("aspirin", "PTGS1").await.unwrap());
        assert_eq!(
            gate.cached_classification("aspirin", "PTGS1").await.unwrap().map(|c| c.confidence),
            Some(0.95)
        );
    }

    #[tokio::test]
    async fn test_missing_edge_is_not_found() {
        let gate = ClassificationGate::new(store().await);
        let err = gate.needs_classification("aspirin", "PTGS2").await.unwrap_err();
        assert_eq!(err, EnrichError::relationship_not_found("aspirin", "PTGS2"));
    }

    #[tokio::test]
    async fn test_needs_prediction_uses_marker() {
        let store = store().await;
        let gate = CascadeGate::new(store.clone());
        assert!(gate.needs_prediction("aspirin", "PTGS1", "m", 1).await.unwrap());

        // Ran at depth 1, found nothing: not needed again at depth 1, needed at 2.
        let marker = CascadeAttempt {
            drug: "aspirin".into(),
            target: "PTGS1".into(),
            predicted_by: "m".into(),
            depth: 1,
            direct_effects: 0,
            complete: true,
            attempted_at: Utc::now(),
        };
        store.record_cascade_attempt(&marker).await.unwrap();
        assert_eq!(gate.cascade_exists("aspirin", "PTGS1", "m").await.unwrap(), 0);
        assert!(!gate.needs_prediction("aspirin", "PTGS1", "m", 1).await.unwrap());
        assert!(gate.needs_prediction("aspirin", "PTGS1", "m", 2).await.unwrap());
        // Another provenance tag has its own marker.
        assert!(gate.needs_prediction("aspirin", "PTGS1", "other", 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_edges_without_marker_count_as_predicted() {
        let store = store().await;
        let entity = store.get_or_create_entity("Thromboxane A2", "Metabolite").await.unwrap();
        store
            .get_or_create_downstream_edge(&DownstreamEdge {
                source: NodeRef::Target("PTGS1".into()),
                destination: entity.id,
                effect_type: "decreases".into(),
                confidence: 0.9,
                reasoning: String::new(),
                depth: 1,
                drug_context: "aspirin".into(),
                predicted_by: "m".into(),
                timestamp: Utc::now(),
            })
            .await
            .unwrap();
        let gate = CascadeGate::new(store);
        assert_eq!(gate.cascade_exists("ASPIRIN", "PTGS1", "m").await.unwrap(), 1);
        assert!(!gate.needs_prediction("aspirin", "PTGS1", "m", 3).await.unwrap());
    }
}
