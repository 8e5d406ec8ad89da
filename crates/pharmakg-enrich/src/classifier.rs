//! Relationship classifier: one AI call for one (drug, target) pair.

use std::sync::Arc;

use pharmakg_common::entities::{normalize_drug_name, normalize_target_name};
use pharmakg_common::{Classification, Drug, EnrichError, Result};
use pharmakg_store::GraphStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::ai::AiService;
use crate::prompts::classification_request;
use crate::response::parse_classification;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassificationResult {
    pub drug: String,
    pub target: String,
    #[serde(flatten)]
    pub classification: Classification,
    /// The classification is persisted on the edge.
    pub stored: bool,
    /// Served from the graph without an AI call.
    pub cached: bool,
}

pub struct RelationshipClassifier {
    store: Arc<dyn GraphStore>,
    ai: AiService,
    source: String,
}

impl RelationshipClassifier {
    /// `source` is the provenance tag written on every classification.
    pub fn new(store: Arc<dyn GraphStore>, ai: AiService, source: impl Into<String>) -> Self {
        Self { store, ai, source: source.into() }
    }

    /// Classify one pair and persist the result.
    ///
    /// Does not consult the cache gate; callers decide whether a call is
    /// needed. Either the whole classification is written or the edge is
    /// left as it was.
    pub async fn classify(
        &self,
        drug: &str,
        target: &str,
        context: Option<&str>,
    ) -> Result<ClassificationResult> {
        let drug = normalize_drug_name(drug);
        let target = normalize_target_name(target);

        if self.store.get_edge(&drug, &target).await?.is_none() {
            return Err(EnrichError::relationship_not_found(&drug, &target));
        }
        let drug_info = self
            .store
            .get_drug(&drug)
            .await?
            .unwrap_or_else(|| Drug::new(&drug));

        let request = classification_request(&drug_info, &target, context);
        let response = self.ai.call("classification", request).await?;

        let classification = parse_classification(&response.content, &self.source).map_err(|e| {
            warn!(drug = %drug, target = %target, error = %e, "Rejected classification response");
            e
        })?;
        debug!(
            drug = %drug,
            target = %target,
            relationship_type = %classification.relationship_type,
            confidence = classification.confidence,
            "Parsed classification"
        );

        self.store
            .write_classification(&drug, &target, &classification)
            .await
            .map_err(|e| {
                warn!(drug = %drug, target = %target, error = %e, "Classification write failed");
                EnrichError::from(e)
            })?;

        info!(drug = %drug, target = %target, "Classification stored");
        Ok(ClassificationResult {
            drug,
            target,
            classification,
            stored: true,
            cached: false,
        })
    }
}
