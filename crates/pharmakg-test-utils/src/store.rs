//! Fault-injecting graph store.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pharmakg_common::{
    CascadeAttempt, Classification, DownstreamEdge, Drug, EffectEntity, NodeRef, TargetsEdge,
};
use pharmakg_store::{GraphStore, MemoryGraphStore, Result, StoreError};
use uuid::Uuid;

/// Wraps a `MemoryGraphStore` and rejects selected writes, or attempt-marker
/// reads. The inner store stays reachable so tests can inspect it afterwards.
pub struct FaultyStore {
    inner: Arc<MemoryGraphStore>,
    fail_classification_writes: AtomicBool,
    fail_attempt_writes: AtomicBool,
    fail_attempt_reads: AtomicBool,
    // lower-cased entity names whose incoming edges are rejected
    fail_edges_to: Mutex<HashSet<String>>,
}

impl FaultyStore {
    pub fn new(inner: Arc<MemoryGraphStore>) -> Self {
        Self {
            inner,
            fail_classification_writes: AtomicBool::new(false),
            fail_attempt_writes: AtomicBool::new(false),
            fail_attempt_reads: AtomicBool::new(false),
            fail_edges_to: Mutex::new(HashSet::new()),
        }
    }

    pub fn inner(&self) -> &Arc<MemoryGraphStore> {
        &self.inner
    }

    pub fn fail_classification_writes(&self, fail: bool) {
        self.fail_classification_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_attempt_writes(&self, fail: bool) {
        self.fail_attempt_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_attempt_reads(&self, fail: bool) {
        self.fail_attempt_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_edges_to(&self, entity_name: &str) {
        self.fail_edges_to
            .lock()
            .unwrap()
            .insert(entity_name.trim().to_lowercase());
    }
}

#[async_trait]
impl GraphStore for FaultyStore {
    async fn get_drug(&self, name: &str) -> Result<Option<Drug>> {
        self.inner.get_drug(name).await
    }

    async fn get_edge(&self, drug: &str, target: &str) -> Result<Option<TargetsEdge>> {
        self.inner.get_edge(drug, target).await
    }

    async fn write_classification(
        &self,
        drug: &str,
        target: &str,
        classification: &Classification,
    ) -> Result<()> {
        if self.fail_classification_writes.load(Ordering::SeqCst) {
            return Err(StoreError::WriteRejected(format!("injected fault on {drug} -> {target}")));
        }
        self.inner.write_classification(drug, target, classification).await
    }

    async fn get_or_create_entity(&self, name: &str, entity_type: &str) -> Result<EffectEntity> {
        self.inner.get_or_create_entity(name, entity_type).await
    }

    async fn get_entity(&self, id: Uuid) -> Result<Option<EffectEntity>> {
        self.inner.get_entity(id).await
    }

    async fn get_or_create_downstream_edge(&self, edge: &DownstreamEdge) -> Result<bool> {
        if let Some(entity) = self.inner.get_entity(edge.destination).await? {
            let blocked = self
                .fail_edges_to
                .lock()
                .unwrap()
                .contains(&entity.name.to_lowercase());
            if blocked {
                return Err(StoreError::WriteRejected(format!("injected fault on edge to {}", entity.name)));
            }
        }
        self.inner.get_or_create_downstream_edge(edge).await
    }

    async fn count_downstream_edges(
        &self,
        target: &str,
        drug_context: &str,
        predicted_by: &str,
    ) -> Result<u64> {
        self.inner.count_downstream_edges(target, drug_context, predicted_by).await
    }

    async fn downstream_edges_from(
        &self,
        source: &NodeRef,
        drug_context: &str,
        predicted_by: &str,
    ) -> Result<Vec<DownstreamEdge>> {
        self.inner.downstream_edges_from(source, drug_context, predicted_by).await
    }

    async fn record_cascade_attempt(&self, attempt: &CascadeAttempt) -> Result<()> {
        if self.fail_attempt_writes.load(Ordering::SeqCst) {
            return Err(StoreError::WriteRejected("injected fault on cascade attempt".to_string()));
        }
        self.inner.record_cascade_attempt(attempt).await
    }

    async fn get_cascade_attempt(
        &self,
        drug: &str,
        target: &str,
        predicted_by: &str,
    ) -> Result<Option<CascadeAttempt>> {
        if self.fail_attempt_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::other(format!(
                "injected read fault on attempt {drug} -> {target}"
            ))));
        }
        self.inner.get_cascade_attempt(drug, target, predicted_by).await
    }
}
