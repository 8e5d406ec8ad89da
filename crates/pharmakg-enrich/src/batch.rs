//! Batch classification orchestrator.
//!
//! Targets are processed one at a time in the order given. The AI service's
//! call budget is enforced by the scheduler inside `AiService`, so spacing
//! between consecutive classifications holds whether the previous item
//! succeeded or failed. One item's failure never stops the batch.

use std::collections::HashSet;
use std::sync::Arc;

use pharmakg_common::entities::{normalize_drug_name, normalize_target_name};
use pharmakg_common::{Classification, EnrichError};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::classifier::RelationshipClassifier;
use crate::gate::ClassificationGate;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Success,
    Failed,
}

/// Outcome for one attempted target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchItemResult {
    pub target_name: String,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl BatchItemResult {
    fn success(target_name: String, classification: Classification) -> Self {
        Self {
            target_name,
            status: ItemStatus::Success,
            classification: Some(classification),
            error: None,
            error_kind: None,
        }
    }

    fn failed(target_name: String, err: &EnrichError) -> Self {
        Self {
            target_name,
            status: ItemStatus::Failed,
            classification: None,
            error: Some(err.to_string()),
            error_kind: Some(err.kind().to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyClassified,
    /// The target appeared earlier in the same batch.
    Duplicate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkippedTarget {
    pub target_name: String,
    pub reason: SkipReason,
}

/// Summary of one batch run. `total` counts attempted targets only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchResult {
    pub drug_name: String,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<BatchItemResult>,
    pub skipped: Vec<SkippedTarget>,
}

impl BatchResult {
    fn new(drug_name: String) -> Self {
        Self {
            drug_name,
            total: 0,
            successful: 0,
            failed: 0,
            results: Vec::new(),
            skipped: Vec::new(),
        }
    }

    fn push(&mut self, item: BatchItemResult) {
        match item.status {
            ItemStatus::Success => self.successful += 1,
            ItemStatus::Failed => self.failed += 1,
        }
        self.total += 1;
        self.results.push(item);
    }

    fn skip(&mut self, target_name: String, reason: SkipReason) {
        self.skipped.push(SkippedTarget { target_name, reason });
    }
}

pub struct BatchOrchestrator {
    gate: ClassificationGate,
    classifier: Arc<RelationshipClassifier>,
}

impl BatchOrchestrator {
    pub fn new(gate: ClassificationGate, classifier: Arc<RelationshipClassifier>) -> Self {
        Self { gate, classifier }
    }

    pub async fn batch_classify(
        &self,
        drug: &str,
        targets: &[String],
        context: Option<&str>,
        force_reclassify: bool,
    ) -> BatchResult {
        let drug = normalize_drug_name(drug);
        let mut result = BatchResult::new(drug.clone());
        let mut seen = HashSet::new();

        info!(drug = %drug, targets = targets.len(), force_reclassify, "Starting batch classification");

        for raw in targets {
            let target = normalize_target_name(raw);
            if !seen.insert(target.clone()) {
                result.skip(target, SkipReason::Duplicate);
                continue;
            }

            // The gate also catches missing edges before any AI call is spent.
            match self.gate.needs_classification(&drug, &target).await {
                Ok(false) if !force_reclassify => {
                    result.skip(target, SkipReason::AlreadyClassified);
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(drug = %drug, target = %target, error = %e, "Batch item not attempted");
                    result.push(BatchItemResult::failed(target, &e));
                    continue;
                }
            }

            match self.classifier.classify(&drug, &target, context).await {
                Ok(classified) => {
                    result.push(BatchItemResult::success(target, classified.classification))
                }
                Err(e) => {
                    warn!(drug = %drug, target = %target, error = %e, "Batch item failed");
                    result.push(BatchItemResult::failed(target, &e));
                }
            }
        }

        info!(
            drug = %drug,
            total = result.total,
            successful = result.successful,
            failed = result.failed,
            skipped = result.skipped.len(),
            "Batch classification finished"
        );
        result
    }
}
