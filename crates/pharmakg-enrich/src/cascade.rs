//! Cascade predictor: expands the downstream effects of a drug acting on a
//! target, level by level, up to depth 3.
//!
//! Level 1 asks the AI service for entities directly affected at the target.
//! Each further level expands every entity found one level up, once. New
//! entities and edges are created only if absent, so repeated runs never
//! duplicate stored effects. A failed level-1 call aborts the run; failures
//! below that are recorded per branch and never roll back what was stored.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use pharmakg_common::confidence::cascade_confidence;
use pharmakg_common::entities::{effect_entity_id, normalize_drug_name, normalize_target_name};
use pharmakg_common::{
    CascadeAttempt, DownstreamEdge, Drug, EffectEntity, EnrichError, NodeRef, Result, TargetsEdge,
};
use pharmakg_store::GraphStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ai::AiService;
use crate::prompts::{direct_effects_request, downstream_effects_request};
use crate::response::{parse_effects, ParsedEffects, PredictedEffect};

pub const MIN_DEPTH: u8 = 1;
pub const MAX_DEPTH: u8 = 3;

/// One effect discovered (or read back) in a cascade.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CascadeEffect {
    pub entity_id: Uuid,
    pub entity_name: String,
    pub entity_type: String,
    pub effect_type: String,
    pub confidence: f64,
    pub reasoning: String,
    pub depth: u8,
    /// Anchor entity this effect was derived from; `None` at depth 1.
    pub parent: Option<Uuid>,
    /// Product of edge confidences from the target down to this effect.
    pub path_confidence: f64,
    /// False when an identical edge was already stored.
    pub newly_created: bool,
}

/// A branch whose expansion or persistence failed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BranchFailure {
    /// Target name for level 1, otherwise the anchor entity's name.
    pub anchor: String,
    pub anchor_id: Option<Uuid>,
    /// Depth of the effects that could not be produced or stored.
    pub depth: u8,
    pub error: String,
    pub error_kind: String,
}

impl BranchFailure {
    fn new(anchor: &str, anchor_id: Option<Uuid>, depth: u8, err: &EnrichError) -> Self {
        Self {
            anchor: anchor.to_string(),
            anchor_id,
            depth,
            error: err.to_string(),
            error_kind: err.kind().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CascadeResult {
    pub drug: String,
    pub target: String,
    pub predicted_by: String,
    pub depth: u8,
    pub direct_effects: Vec<CascadeEffect>,
    pub secondary_effects: Vec<CascadeEffect>,
    pub tertiary_effects: Vec<CascadeEffect>,
    pub failed_branches: Vec<BranchFailure>,
    /// Malformed or surplus items dropped from otherwise valid responses.
    pub rejected_effects: usize,
    pub total_confidence: f64,
    pub stored_in_db: bool,
    /// Read back from the graph without any AI call.
    pub cached: bool,
}

impl CascadeResult {
    pub fn effect_count(&self) -> usize {
        self.direct_effects.len() + self.secondary_effects.len() + self.tertiary_effects.len()
    }

    pub fn all_effects(&self) -> impl Iterator<Item = &CascadeEffect> {
        self.direct_effects
            .iter()
            .chain(&self.secondary_effects)
            .chain(&self.tertiary_effects)
    }
}

/// Effects that have no child in the same result.
fn leaf_paths(levels: &[Vec<CascadeEffect>]) -> Vec<f64> {
    let expanded: HashSet<(Uuid, u8)> = levels
        .iter()
        .flatten()
        .filter_map(|e| e.parent.map(|p| (p, e.depth - 1)))
        .collect();
    levels
        .iter()
        .flatten()
        .filter(|e| !expanded.contains(&(e.entity_id, e.depth)))
        .map(|e| e.path_confidence)
        .collect()
}

fn origin_confidence(edge: &TargetsEdge) -> f64 {
    edge.classification.as_ref().map(|c| c.confidence).unwrap_or(1.0)
}

#[derive(Default)]
struct Run {
    failed_branches: Vec<BranchFailure>,
    rejected_effects: usize,
    persistence_failed: bool,
}

/// Inputs shared by every AI call of one cascade run.
struct Scope<'a> {
    drug: &'a str,
    target: &'a str,
    drug_info: &'a Drug,
    context: Option<&'a str>,
}

fn validate_depth(depth: u8) -> Result<()> {
    if !(MIN_DEPTH..=MAX_DEPTH).contains(&depth) {
        return Err(EnrichError::Validation(format!(
            "cascade depth {depth} is outside {MIN_DEPTH}..={MAX_DEPTH}"
        )));
    }
    Ok(())
}

pub struct CascadePredictor {
    store: Arc<dyn GraphStore>,
    ai: AiService,
    predicted_by: String,
    max_effects_per_call: usize,
}

impl CascadePredictor {
    pub fn new(
        store: Arc<dyn GraphStore>,
        ai: AiService,
        predicted_by: impl Into<String>,
        max_effects_per_call: usize,
    ) -> Self {
        Self {
            store,
            ai,
            predicted_by: predicted_by.into(),
            max_effects_per_call,
        }
    }

    async fn load_edge(&self, drug: &str, target: &str) -> Result<TargetsEdge> {
        self.store
            .get_edge(drug, target)
            .await?
            .ok_or_else(|| EnrichError::relationship_not_found(drug, target))
    }

    async fn load_drug(&self, drug: &str) -> Result<Drug> {
        Ok(self.store.get_drug(drug).await?.unwrap_or_else(|| Drug::new(drug)))
    }

    /// Run a cascade prediction and persist everything it finds.
    pub async fn predict(
        &self,
        drug: &str,
        target: &str,
        depth: u8,
        context: Option<&str>,
    ) -> Result<CascadeResult> {
        validate_depth(depth)?;
        let drug = normalize_drug_name(drug);
        let target = normalize_target_name(target);

        let edge = self.load_edge(&drug, &target).await?;
        let drug_info = self.load_drug(&drug).await?;
        let scope = Scope { drug: &drug, target: &target, drug_info: &drug_info, context };
        let mut run = Run::default();

        // Level 1. Any failure here aborts: nothing has been stored yet.
        let request = direct_effects_request(
            &drug_info,
            &target,
            edge.classification.as_ref(),
            context,
            self.max_effects_per_call,
        );
        let response = self.ai.call("cascade:depth1", request).await?;
        let parsed = parse_effects(&response.content, self.max_effects_per_call)?;
        let direct = self
            .persist_branch(&mut run, &drug, &NodeRef::Target(target.clone()), &target, None, parsed, 1)
            .await;
        info!(drug = %drug, target = %target, direct = direct.len(), "Direct effects stored");

        let mut levels = vec![direct];
        self.expand(&mut run, &scope, &mut levels, HashSet::new(), depth).await;
        Ok(self.finish(run, &scope, &edge, levels, depth).await)
    }

    /// Grow a complete stored cascade of `stored_depth` down to `depth`.
    ///
    /// Stored levels are read back from the graph; the AI service is only
    /// asked about the anchors on the stored frontier.
    pub async fn extend(
        &self,
        drug: &str,
        target: &str,
        stored_depth: u8,
        depth: u8,
        context: Option<&str>,
    ) -> Result<CascadeResult> {
        validate_depth(depth)?;
        if stored_depth >= depth {
            return self.stored_cascade(drug, target, depth).await;
        }
        let drug = normalize_drug_name(drug);
        let target = normalize_target_name(target);

        let edge = self.load_edge(&drug, &target).await?;
        let drug_info = self.load_drug(&drug).await?;
        let scope = Scope { drug: &drug, target: &target, drug_info: &drug_info, context };

        let stored = self.stored_cascade(&drug, &target, stored_depth).await?;
        let mut levels = vec![stored.direct_effects, stored.secondary_effects, stored.tertiary_effects];
        levels.truncate(stored_depth.max(MIN_DEPTH) as usize);

        // Everything above the frontier was expanded when it was stored.
        let expanded: HashSet<Uuid> = levels[..levels.len() - 1]
            .iter()
            .flatten()
            .map(|e| e.entity_id)
            .collect();
        info!(
            drug = %drug,
            target = %target,
            from = stored_depth,
            to = depth,
            frontier = levels.last().map(Vec::len).unwrap_or(0),
            "Extending stored cascade"
        );

        let mut run = Run::default();
        self.expand(&mut run, &scope, &mut levels, expanded, depth).await;
        Ok(self.finish(run, &scope, &edge, levels, depth).await)
    }

    /// Expand the last level of `levels` until `depth` levels exist.
    async fn expand(
        &self,
        run: &mut Run,
        scope: &Scope<'_>,
        levels: &mut Vec<Vec<CascadeEffect>>,
        mut expanded: HashSet<Uuid>,
        depth: u8,
    ) {
        let first = levels.len() as u8 + 1;
        for level in first..=depth {
            let anchors = levels.last().cloned().unwrap_or_default();
            let mut next = Vec::new();

            for anchor in anchors {
                if !expanded.insert(anchor.entity_id) {
                    continue;
                }
                let entity = EffectEntity {
                    id: anchor.entity_id,
                    name: anchor.entity_name.clone(),
                    entity_type: anchor.entity_type.clone(),
                };
                let request = downstream_effects_request(
                    scope.drug_info,
                    scope.target,
                    &entity,
                    level,
                    scope.context,
                    self.max_effects_per_call,
                );
                let parsed = match self.ai.call(&format!("cascade:depth{level}"), request).await {
                    Ok(resp) => parse_effects(&resp.content, self.max_effects_per_call),
                    Err(e) => Err(e),
                };
                match parsed {
                    Ok(parsed) => {
                        let children = self
                            .persist_branch(
                                run,
                                scope.drug,
                                &NodeRef::Entity(anchor.entity_id),
                                &anchor.entity_name,
                                Some(&anchor),
                                parsed,
                                level,
                            )
                            .await;
                        next.extend(children);
                    }
                    Err(e) => {
                        warn!(
                            drug = %scope.drug,
                            target = %scope.target,
                            anchor = %anchor.entity_name,
                            depth = level,
                            error = %e,
                            "Cascade branch failed"
                        );
                        run.failed_branches.push(BranchFailure::new(
                            &anchor.entity_name,
                            Some(anchor.entity_id),
                            level,
                            &e,
                        ));
                    }
                }
            }
            debug!(drug = %scope.drug, target = %scope.target, depth = level, effects = next.len(), "Cascade level done");
            levels.push(next);
        }
    }

    /// Score the run, record the attempt marker and assemble the result.
    async fn finish(
        &self,
        run: Run,
        scope: &Scope<'_>,
        edge: &TargetsEdge,
        levels: Vec<Vec<CascadeEffect>>,
        depth: u8,
    ) -> CascadeResult {
        let total_confidence = cascade_confidence(origin_confidence(edge), &leaf_paths(&levels));
        let complete = run.failed_branches.is_empty();

        let previous = match self
            .store
            .get_cascade_attempt(scope.drug, scope.target, &self.predicted_by)
            .await
        {
            Ok(previous) => previous,
            Err(e) => {
                warn!(drug = %scope.drug, target = %scope.target, error = %e, "Could not read previous cascade attempt");
                None
            }
        };
        let depth_reached = match previous {
            Some(p) if p.complete && p.depth > depth => p.depth,
            _ => depth,
        };
        let marker = CascadeAttempt {
            drug: scope.drug.to_string(),
            target: scope.target.to_string(),
            predicted_by: self.predicted_by.clone(),
            depth: depth_reached,
            direct_effects: levels.first().map(Vec::len).unwrap_or(0),
            complete,
            attempted_at: Utc::now(),
        };
        let marker_written = match self.store.record_cascade_attempt(&marker).await {
            Ok(()) => true,
            Err(e) => {
                warn!(drug = %scope.drug, target = %scope.target, error = %e, "Could not record cascade attempt");
                false
            }
        };

        let mut levels = levels.into_iter();
        let result = CascadeResult {
            drug: scope.drug.to_string(),
            target: scope.target.to_string(),
            predicted_by: self.predicted_by.clone(),
            depth,
            direct_effects: levels.next().unwrap_or_default(),
            secondary_effects: levels.next().unwrap_or_default(),
            tertiary_effects: levels.next().unwrap_or_default(),
            failed_branches: run.failed_branches,
            rejected_effects: run.rejected_effects,
            total_confidence,
            stored_in_db: marker_written && !run.persistence_failed,
            cached: false,
        };
        info!(
            drug = %result.drug,
            target = %result.target,
            effects = result.effect_count(),
            failed_branches = result.failed_branches.len(),
            total_confidence = result.total_confidence,
            "Cascade prediction finished"
        );
        result
    }

    /// Persist the effects of one AI answer under `source`.
    /// Returns the effects whose edge is now in the store.
    #[allow(clippy::too_many_arguments)]
    async fn persist_branch(
        &self,
        run: &mut Run,
        drug: &str,
        source: &NodeRef,
        source_name: &str,
        parent: Option<&CascadeEffect>,
        parsed: ParsedEffects,
        depth: u8,
    ) -> Vec<CascadeEffect> {
        run.rejected_effects += parsed.rejected.len();
        for note in &parsed.rejected {
            debug!(anchor = %source_name, depth, note = %note, "Dropped effect");
        }

        let mut seen = HashSet::new();
        let mut stored = Vec::new();
        for effect in parsed.effects {
            let id = effect_entity_id(&effect.entity_name, &effect.entity_type);
            if parent.map(|p| p.entity_id) == Some(id) {
                debug!(entity = %effect.entity_name, "Skipping self-loop");
                run.rejected_effects += 1;
                continue;
            }
            if !seen.insert(id) {
                continue;
            }
            match self.persist_effect(drug, source, parent, effect, depth).await {
                Ok(e) => stored.push(e),
                Err(e) => {
                    warn!(anchor = %source_name, depth, error = %e, "Effect not stored");
                    run.persistence_failed = true;
                    run.failed_branches.push(BranchFailure::new(
                        source_name,
                        parent.map(|p| p.entity_id),
                        depth,
                        &e,
                    ));
                }
            }
        }
        stored
    }

    /// Store one effect. When an edge with the same identity already exists
    /// the effect reports the stored payload, not the new answer.
    async fn persist_effect(
        &self,
        drug: &str,
        source: &NodeRef,
        parent: Option<&CascadeEffect>,
        effect: PredictedEffect,
        depth: u8,
    ) -> Result<CascadeEffect> {
        let entity = self
            .store
            .get_or_create_entity(&effect.entity_name, &effect.entity_type)
            .await?;
        let mut edge = DownstreamEdge {
            source: source.clone(),
            destination: entity.id,
            effect_type: effect.effect_type,
            confidence: effect.confidence,
            reasoning: effect.reasoning,
            depth,
            drug_context: drug.to_string(),
            predicted_by: self.predicted_by.clone(),
            timestamp: Utc::now(),
        };
        let newly_created = self.store.get_or_create_downstream_edge(&edge).await?;
        if !newly_created {
            match self.stored_edge(source, drug, entity.id).await? {
                Some(existing) => edge = existing,
                None => warn!(entity = %entity.name, "Existing downstream edge could not be read back"),
            }
        }

        Ok(CascadeEffect {
            entity_id: entity.id,
            entity_name: entity.name,
            entity_type: entity.entity_type,
            path_confidence: parent.map(|p| p.path_confidence).unwrap_or(1.0) * edge.confidence,
            effect_type: edge.effect_type,
            confidence: edge.confidence,
            reasoning: edge.reasoning,
            depth,
            parent: parent.map(|p| p.entity_id),
            newly_created,
        })
    }

    async fn stored_edge(
        &self,
        source: &NodeRef,
        drug: &str,
        destination: Uuid,
    ) -> Result<Option<DownstreamEdge>> {
        Ok(self
            .store
            .downstream_edges_from(source, drug, &self.predicted_by)
            .await?
            .into_iter()
            .find(|e| e.destination == destination))
    }

    /// Read a previously stored cascade back from the graph, down to `depth`.
    pub async fn stored_cascade(&self, drug: &str, target: &str, depth: u8) -> Result<CascadeResult> {
        let drug = normalize_drug_name(drug);
        let target = normalize_target_name(target);
        let edge = self.load_edge(&drug, &target).await?;
        let depth = depth.clamp(MIN_DEPTH, MAX_DEPTH);

        let mut levels: Vec<Vec<CascadeEffect>> = Vec::new();
        let mut expanded: HashSet<Uuid> = HashSet::new();

        let roots = self
            .store
            .downstream_edges_from(&NodeRef::Target(target.clone()), &drug, &self.predicted_by)
            .await?;
        levels.push(self.read_level(roots, None, 1).await?);

        for level in (MIN_DEPTH + 1)..=depth {
            let anchors = levels.last().cloned().unwrap_or_default();
            let mut next = Vec::new();
            for anchor in anchors {
                if !expanded.insert(anchor.entity_id) {
                    continue;
                }
                let edges = self
                    .store
                    .downstream_edges_from(&NodeRef::Entity(anchor.entity_id), &drug, &self.predicted_by)
                    .await?;
                next.extend(self.read_level(edges, Some(&anchor), level).await?);
            }
            levels.push(next);
        }

        let total_confidence = cascade_confidence(origin_confidence(&edge), &leaf_paths(&levels));
        let mut levels = levels.into_iter();
        Ok(CascadeResult {
            drug,
            target,
            predicted_by: self.predicted_by.clone(),
            depth,
            direct_effects: levels.next().unwrap_or_default(),
            secondary_effects: levels.next().unwrap_or_default(),
            tertiary_effects: levels.next().unwrap_or_default(),
            failed_branches: Vec::new(),
            rejected_effects: 0,
            total_confidence,
            stored_in_db: true,
            cached: true,
        })
    }

    async fn read_level(
        &self,
        edges: Vec<DownstreamEdge>,
        parent: Option<&CascadeEffect>,
        depth: u8,
    ) -> Result<Vec<CascadeEffect>> {
        let mut effects = Vec::new();
        for edge in edges.into_iter().filter(|e| e.depth == depth) {
            let Some(entity) = self.store.get_entity(edge.destination).await? else {
                warn!(entity_id = %edge.destination, "Downstream edge points at a missing entity");
                continue;
            };
            effects.push(CascadeEffect {
                entity_id: entity.id,
                entity_name: entity.name,
                entity_type: entity.entity_type,
                effect_type: edge.effect_type,
                confidence: edge.confidence,
                reasoning: edge.reasoning,
                depth,
                parent: parent.map(|p| p.entity_id),
                path_confidence: parent.map(|p| p.path_confidence).unwrap_or(1.0) * edge.confidence,
                newly_created: false,
            });
        }
        Ok(effects)
    }
}
