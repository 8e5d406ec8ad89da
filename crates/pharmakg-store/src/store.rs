//! Graph store contract consumed by the enrichment pipeline.
//!
//! Drug and Target nodes and the Drug->Target `TARGETS` edges are created by
//! upstream ingestion; through this trait the pipeline only reads them and
//! writes classification payloads, effect entities, downstream edges, and
//! cascade attempt markers. Every write is atomic on its own.

use async_trait::async_trait;
use pharmakg_common::{
    CascadeAttempt, Classification, DownstreamEdge, Drug, EffectEntity, NodeRef, TargetsEdge,
};
use uuid::Uuid;

use crate::error::Result;

#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Read-only reference attributes of a drug, if the node exists.
    async fn get_drug(&self, name: &str) -> Result<Option<Drug>>;

    /// The Drug->Target edge, or `None` when the pair is not in the graph.
    async fn get_edge(&self, drug: &str, target: &str) -> Result<Option<TargetsEdge>>;

    /// Write the full classification payload and mark the edge classified.
    /// Fails with `StoreError::NotFound` if the edge does not exist.
    async fn write_classification(
        &self,
        drug: &str,
        target: &str,
        classification: &Classification,
    ) -> Result<()>;

    /// Return the existing entity with this (name, type), creating it if absent.
    async fn get_or_create_entity(&self, name: &str, entity_type: &str) -> Result<EffectEntity>;

    async fn get_entity(&self, id: Uuid) -> Result<Option<EffectEntity>>;

    /// Create the edge unless one with the same identity already exists.
    /// Returns `true` when a new edge was written.
    async fn get_or_create_downstream_edge(&self, edge: &DownstreamEdge) -> Result<bool>;

    /// Count edges leaving `target` with the given drug context and provenance.
    async fn count_downstream_edges(
        &self,
        target: &str,
        drug_context: &str,
        predicted_by: &str,
    ) -> Result<u64>;

    /// All edges leaving `source` with the given drug context and provenance.
    async fn downstream_edges_from(
        &self,
        source: &NodeRef,
        drug_context: &str,
        predicted_by: &str,
    ) -> Result<Vec<DownstreamEdge>>;

    /// Insert or replace the attempt marker for (drug, target, predicted_by).
    async fn record_cascade_attempt(&self, attempt: &CascadeAttempt) -> Result<()>;

    async fn get_cascade_attempt(
        &self,
        drug: &str,
        target: &str,
        predicted_by: &str,
    ) -> Result<Option<CascadeAttempt>>;
}
