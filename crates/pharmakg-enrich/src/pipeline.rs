//! Enrichment pipeline facade.
//!
//! This is the surface upstream callers use. It wires the gates, the
//! classifier, the batch orchestrator, and the cascade predictor over one
//! shared store and one shared, rate-limited AI service, and applies the
//! idempotency gates before anything reaches the AI service.

use std::sync::Arc;
use std::time::Duration;

use pharmakg_common::entities::{normalize_drug_name, normalize_target_name};
use pharmakg_common::{CascadeAttempt, Classification, EnrichError, Result};
use pharmakg_llm::LlmBackend;
use pharmakg_store::GraphStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::ai::AiService;
use crate::batch::{BatchOrchestrator, BatchResult};
use crate::cascade::{CascadePredictor, CascadeResult, MAX_DEPTH, MIN_DEPTH};
use crate::classifier::{ClassificationResult, RelationshipClassifier};
use crate::gate::{CascadeGate, ClassificationGate};
use crate::scheduler::{CallScheduler, FixedDelay, Unthrottled};

#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    /// Provenance tag stamped on classifications and cascade edges.
    pub predicted_by: String,
    /// Minimum spacing between two AI calls.
    pub inter_call_delay: Duration,
    /// Upper bound for a single AI call.
    pub call_timeout: Duration,
    pub max_effects_per_call: usize,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            predicted_by: "pharmakg".to_string(),
            inter_call_delay: Duration::from_secs(3),
            call_timeout: Duration::from_secs(60),
            max_effects_per_call: 8,
            max_tokens: Some(1024),
            temperature: Some(0.0),
        }
    }
}

/// What the graph already holds for one pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnrichmentStatus {
    pub drug: String,
    pub target: String,
    pub classified: bool,
    pub classification: Option<Classification>,
    pub cascade_edges: u64,
    pub cascade_attempt: Option<CascadeAttempt>,
}

impl EnrichmentStatus {
    pub fn is_enriched(&self) -> bool {
        self.classified && (self.cascade_attempt.is_some() || self.cascade_edges > 0)
    }
}

pub struct EnrichmentPipeline {
    classification_gate: ClassificationGate,
    cascade_gate: CascadeGate,
    classifier: Arc<RelationshipClassifier>,
    batch: BatchOrchestrator,
    predictor: CascadePredictor,
    config: EnrichmentConfig,
}

impl EnrichmentPipeline {
    /// Pipeline with the default fixed-delay scheduler.
    pub fn new(
        store: Arc<dyn GraphStore>,
        backend: Arc<dyn LlmBackend>,
        config: EnrichmentConfig,
    ) -> Self {
        let scheduler: Arc<dyn CallScheduler> = if config.inter_call_delay.is_zero() {
            Arc::new(Unthrottled)
        } else {
            Arc::new(FixedDelay::new(config.inter_call_delay))
        };
        Self::with_scheduler(store, backend, config, scheduler)
    }

    pub fn with_scheduler(
        store: Arc<dyn GraphStore>,
        backend: Arc<dyn LlmBackend>,
        config: EnrichmentConfig,
        scheduler: Arc<dyn CallScheduler>,
    ) -> Self {
        let ai = AiService::new(backend, scheduler, config.call_timeout)
            .with_generation(config.max_tokens, config.temperature);
        let classification_gate = ClassificationGate::new(store.clone());
        let classifier = Arc::new(RelationshipClassifier::new(
            store.clone(),
            ai.clone(),
            config.predicted_by.clone(),
        ));
        let batch = BatchOrchestrator::new(classification_gate.clone(), classifier.clone());
        let predictor = CascadePredictor::new(
            store.clone(),
            ai,
            config.predicted_by.clone(),
            config.max_effects_per_call,
        );
        Self {
            classification_gate,
            cascade_gate: CascadeGate::new(store),
            classifier,
            batch,
            predictor,
            config,
        }
    }

    pub fn config(&self) -> &EnrichmentConfig {
        &self.config
    }

    /// Classify one pair unless it is already classified.
    ///
    /// A stored classification is returned as-is with `cached = true` and no
    /// AI call; `force` bypasses the gate and overwrites it.
    #[instrument(skip(self, context))]
    pub async fn classify(
        &self,
        drug: &str,
        target: &str,
        context: Option<&str>,
        force: bool,
    ) -> Result<ClassificationResult> {
        if !force {
            if let Some(existing) = self.classification_gate.cached_classification(drug, target).await? {
                debug!("Classification already stored");
                return Ok(ClassificationResult {
                    drug: normalize_drug_name(drug),
                    target: normalize_target_name(target),
                    classification: existing,
                    stored: true,
                    cached: true,
                });
            }
        }
        self.classifier.classify(drug, target, context).await
    }

    #[instrument(skip(self, targets, context), fields(targets = targets.len()))]
    pub async fn batch_classify(
        &self,
        drug: &str,
        targets: &[String],
        context: Option<&str>,
        force: bool,
    ) -> BatchResult {
        self.batch.batch_classify(drug, targets, context, force).await
    }

    /// Predict a cascade unless a sufficient one is already stored, in which
    /// case it is read back with `cached = true`. A complete but shallower
    /// stored cascade is extended from its deepest level.
    #[instrument(skip(self, context))]
    pub async fn predict_cascade(
        &self,
        drug: &str,
        target: &str,
        depth: u8,
        context: Option<&str>,
        force: bool,
    ) -> Result<CascadeResult> {
        if !(MIN_DEPTH..=MAX_DEPTH).contains(&depth) {
            return Err(EnrichError::Validation(format!(
                "cascade depth {depth} is outside {MIN_DEPTH}..={MAX_DEPTH}"
            )));
        }
        if !force {
            if !self.needs_prediction(drug, target, depth).await? {
                info!("Cascade already stored, reading it back");
                return self.predictor.stored_cascade(drug, target, depth).await;
            }
            let predicted_by = &self.config.predicted_by;
            if let Some(marker) = self.cascade_gate.attempt(drug, target, predicted_by).await? {
                if marker.complete && marker.depth < depth {
                    return self.predictor.extend(drug, target, marker.depth, depth, context).await;
                }
            }
        }
        self.predictor.predict(drug, target, depth, context).await
    }

    pub async fn needs_classification(&self, drug: &str, target: &str) -> Result<bool> {
        self.classification_gate.needs_classification(drug, target).await
    }

    /// Stored direct-effect edge count for the pair under `predicted_by`.
    pub async fn cascade_exists(&self, drug: &str, target: &str, predicted_by: &str) -> Result<u64> {
        self.cascade_gate.cascade_exists(drug, target, predicted_by).await
    }

    /// Whether a cascade of `depth` would have to be predicted under this
    /// pipeline's provenance tag.
    pub async fn needs_prediction(&self, drug: &str, target: &str, depth: u8) -> Result<bool> {
        self.cascade_gate
            .needs_prediction(drug, target, &self.config.predicted_by, depth)
            .await
    }

    pub async fn status(&self, drug: &str, target: &str) -> Result<EnrichmentStatus> {
        let classification = self.classification_gate.cached_classification(drug, target).await?;
        let predicted_by = &self.config.predicted_by;
        Ok(EnrichmentStatus {
            drug: normalize_drug_name(drug),
            target: normalize_target_name(target),
            classified: classification.is_some(),
            classification,
            cascade_edges: self.cascade_gate.cascade_exists(drug, target, predicted_by).await?,
            cascade_attempt: self.cascade_gate.attempt(drug, target, predicted_by).await?,
        })
    }

    /// Classified and cascaded under this pipeline's provenance tag.
    pub async fn is_enriched(&self, drug: &str, target: &str) -> Result<bool> {
        Ok(self.status(drug, target).await?.is_enriched())
    }

    /// Read the stored cascade for the pair without any AI call.
    pub async fn stored_cascade(&self, drug: &str, target: &str, depth: u8) -> Result<CascadeResult> {
        self.predictor.stored_cascade(drug, target, depth).await
    }
}
