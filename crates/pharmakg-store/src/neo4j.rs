//! Neo4j-backed graph store.
//!
//! Schema (owned by upstream ingestion, not migrated here):
//!   (:Drug {name})-[:TARGETS {classified, relationship_type, …}]->(:Target {name})
//!   (:Target|:EffectEntity)-[:DOWNSTREAM {effect_type, confidence, depth,
//!                                         drug_context, predicted_by, …}]->(:EffectEntity {id, name, entity_type})
//!   (:CascadeAttempt {drug, target, predicted_by, …})-[:ATTEMPTED_ON]->(:Target)
//!
//! Each write is a single Cypher statement, which Neo4j runs in its own
//! transaction, so a classification or edge is written completely or not at all.
//!
//! `MERGE` alone does not stop two concurrent runs from creating the same
//! node twice. The database must carry these constraints:
//!
//! ```cypher
//! CREATE CONSTRAINT effect_entity_id IF NOT EXISTS
//!   FOR (e:EffectEntity) REQUIRE e.id IS UNIQUE;
//! CREATE CONSTRAINT cascade_attempt_key IF NOT EXISTS
//!   FOR (a:CascadeAttempt) REQUIRE (a.drug, a.target, a.predicted_by) IS UNIQUE;
//! ```
//!
//! Relationship identity cannot be constrained the same way. A `DOWNSTREAM`
//! write first takes the write lock on its source node, which serializes
//! concurrent MERGEs of the same relationship.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use neo4rs::{query, ConfigBuilder, Graph, Query, Row};
use pharmakg_common::entities::{normalize_drug_name, normalize_target_name};
use pharmakg_common::{
    CascadeAttempt, Classification, DownstreamEdge, Drug, EffectEntity, NodeRef, TargetsEdge,
};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::store::GraphStore;

/// Configuration for the Neo4j connection.
#[derive(Debug, Clone)]
pub struct Neo4jConfig {
    pub uri: String,
    pub username: String,
    pub password: String,
    pub database: Option<String>,
    pub pool_size: usize,
    pub connection_retry_count: u32,
    pub connection_retry_delay: Duration,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri: "neo4j://localhost:7687".to_string(),
            username: "neo4j".to_string(),
            password: "password".to_string(),
            database: None,
            pool_size: 8,
            connection_retry_count: 3,
            connection_retry_delay: Duration::from_secs(2),
        }
    }
}

pub struct Neo4jGraphStore {
    graph: Graph,
}

impl Neo4jGraphStore {
    /// Connect with retries; fails if the server never answers `RETURN 1`.
    pub async fn connect(config: Neo4jConfig) -> Result<Self> {
        let mut builder = ConfigBuilder::default()
            .uri(config.uri.as_str())
            .user(config.username.as_str())
            .password(config.password.as_str())
            .max_connections(config.pool_size);
        if let Some(db) = &config.database {
            builder = builder.db(db.as_str());
        }
        let neo4j_config = builder.build()?;

        let mut last_error = None;
        for attempt in 1..=config.connection_retry_count.max(1) {
            match Graph::connect(neo4j_config.clone()).await {
                Ok(graph) => match graph.run(query("RETURN 1")).await {
                    Ok(()) => {
                        info!("Connected to Neo4j at {} (attempt {})", config.uri, attempt);
                        return Ok(Self { graph });
                    }
                    Err(e) => {
                        error!("Neo4j connection test failed: {}", e);
                        last_error = Some(e.to_string());
                    }
                },
                Err(e) => {
                    error!("Failed to connect to Neo4j (attempt {}): {}", attempt, e);
                    last_error = Some(e.to_string());
                }
            }
            if attempt < config.connection_retry_count {
                tokio::time::sleep(config.connection_retry_delay).await;
            }
        }

        Err(StoreError::Neo4j(format!(
            "could not connect to {}: {}",
            config.uri,
            last_error.unwrap_or_else(|| "unknown error".to_string())
        )))
    }

    async fn fetch_one(&self, q: Query) -> Result<Option<Row>> {
        let mut stream = self.graph.execute(q).await?;
        Ok(stream.next().await?)
    }

    async fn fetch_all(&self, q: Query) -> Result<Vec<Row>> {
        let mut stream = self.graph.execute(q).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }
}

fn get_string(row: &Row, key: &str) -> Result<String> {
    row.get::<String>(key)
        .map_err(|e| StoreError::InvalidRecord(format!("{key}: {e}")))
}

fn get_opt_string(row: &Row, key: &str) -> Option<String> {
    row.get::<String>(key).ok()
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::InvalidRecord(format!("timestamp {raw:?}: {e}")))
}

fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| StoreError::InvalidRecord(format!("id {raw:?}: {e}")))
}

fn source_match(source: &NodeRef) -> (&'static str, String) {
    match source {
        NodeRef::Target(name) => ("MATCH (s:Target {name: $source})", normalize_target_name(name)),
        NodeRef::Entity(id) => ("MATCH (s:EffectEntity {id: $source})", id.to_string()),
    }
}

fn row_to_downstream_edge(row: &Row, source: &NodeRef) -> Result<DownstreamEdge> {
    let depth = row
        .get::<i64>("depth")
        .map_err(|e| StoreError::InvalidRecord(format!("depth: {e}")))?;
    Ok(DownstreamEdge {
        source: source.clone(),
        destination: parse_uuid(&get_string(row, "destination")?)?,
        effect_type: get_string(row, "effect_type")?,
        confidence: row
            .get::<f64>("confidence")
            .map_err(|e| StoreError::InvalidRecord(format!("confidence: {e}")))?,
        reasoning: get_opt_string(row, "reasoning").unwrap_or_default(),
        depth: u8::try_from(depth)
            .map_err(|_| StoreError::InvalidRecord(format!("depth {depth} out of range")))?,
        drug_context: get_string(row, "drug_context")?,
        predicted_by: get_string(row, "predicted_by")?,
        timestamp: parse_timestamp(&get_string(row, "timestamp")?)?,
    })
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    async fn get_drug(&self, name: &str) -> Result<Option<Drug>> {
        let q = query(
            "MATCH (d:Drug {name: $name}) \
             RETURN d.name AS name, d.mechanism_of_action AS moa, \
                    d.development_phase AS phase, d.smiles AS smiles",
        )
        .param("name", normalize_drug_name(name));
        let Some(row) = self.fetch_one(q).await? else { return Ok(None) };
        Ok(Some(Drug {
            name: get_string(&row, "name")?,
            mechanism_of_action: get_opt_string(&row, "moa"),
            development_phase: get_opt_string(&row, "phase"),
            smiles: get_opt_string(&row, "smiles"),
        }))
    }

    async fn get_edge(&self, drug: &str, target: &str) -> Result<Option<TargetsEdge>> {
        let drug = normalize_drug_name(drug);
        let target = normalize_target_name(target);
        let q = query(
            "MATCH (:Drug {name: $drug})-[r:TARGETS]->(:Target {name: $target}) \
             RETURN coalesce(r.classified, false) AS classified, \
                    r.relationship_type AS relationship_type, r.target_class AS target_class, \
                    r.target_subclass AS target_subclass, r.mechanism AS mechanism, \
                    r.confidence AS confidence, r.reasoning AS reasoning, \
                    r.source AS source, r.timestamp AS timestamp",
        )
        .param("drug", drug.as_str())
        .param("target", target.as_str());

        let Some(row) = self.fetch_one(q).await? else { return Ok(None) };
        let classified = row.get::<bool>("classified").unwrap_or(false);

        // Leftovers from an interrupted legacy write are treated as unclassified.
        let classification = if classified {
            Some(Classification {
                relationship_type: get_string(&row, "relationship_type")?,
                target_class: get_opt_string(&row, "target_class").unwrap_or_default(),
                target_subclass: get_opt_string(&row, "target_subclass").unwrap_or_default(),
                mechanism: get_string(&row, "mechanism")?,
                confidence: row
                    .get::<f64>("confidence")
                    .map_err(|e| StoreError::InvalidRecord(format!("confidence: {e}")))?,
                reasoning: get_opt_string(&row, "reasoning").unwrap_or_default(),
                source: get_opt_string(&row, "source").unwrap_or_default(),
                timestamp: parse_timestamp(&get_string(&row, "timestamp")?)?,
            })
        } else {
            None
        };

        Ok(Some(TargetsEdge { drug, target, classification }))
    }

    async fn write_classification(
        &self,
        drug: &str,
        target: &str,
        c: &Classification,
    ) -> Result<()> {
        let q = query(
            "MATCH (:Drug {name: $drug})-[r:TARGETS]->(:Target {name: $target}) \
             SET r.classified = true, r.relationship_type = $relationship_type, \
                 r.target_class = $target_class, r.target_subclass = $target_subclass, \
                 r.mechanism = $mechanism, r.confidence = $confidence, \
                 r.reasoning = $reasoning, r.source = $source, r.timestamp = $timestamp \
             RETURN count(r) AS updated",
        )
        .param("drug", normalize_drug_name(drug))
        .param("target", normalize_target_name(target))
        .param("relationship_type", c.relationship_type.as_str())
        .param("target_class", c.target_class.as_str())
        .param("target_subclass", c.target_subclass.as_str())
        .param("mechanism", c.mechanism.as_str())
        .param("confidence", c.confidence)
        .param("reasoning", c.reasoning.as_str())
        .param("source", c.source.as_str())
        .param("timestamp", c.timestamp.to_rfc3339());

        let updated = match self.fetch_one(q).await? {
            Some(row) => row.get::<i64>("updated").unwrap_or(0),
            None => 0,
        };
        if updated == 0 {
            return Err(StoreError::NotFound(format!("TARGETS edge {drug} -> {target}")));
        }
        debug!(drug, target, "Classification written");
        Ok(())
    }

    async fn get_or_create_entity(&self, name: &str, entity_type: &str) -> Result<EffectEntity> {
        let candidate = EffectEntity::new(name, entity_type);
        if candidate.name.is_empty() || candidate.entity_type.is_empty() {
            return Err(StoreError::InvalidRecord(
                "effect entity requires a name and a type".to_string(),
            ));
        }
        let q = query(
            "MERGE (e:EffectEntity {id: $id}) \
             ON CREATE SET e.name = $name, e.entity_type = $entity_type \
             RETURN e.name AS name, e.entity_type AS entity_type",
        )
        .param("id", candidate.id.to_string())
        .param("name", candidate.name.as_str())
        .param("entity_type", candidate.entity_type.as_str());

        let row = self
            .fetch_one(q)
            .await?
            .ok_or_else(|| StoreError::Neo4j("MERGE returned no row".to_string()))?;
        Ok(EffectEntity {
            id: candidate.id,
            name: get_string(&row, "name")?,
            entity_type: get_string(&row, "entity_type")?,
        })
    }

    async fn get_entity(&self, id: Uuid) -> Result<Option<EffectEntity>> {
        let q = query(
            "MATCH (e:EffectEntity {id: $id}) RETURN e.name AS name, e.entity_type AS entity_type",
        )
        .param("id", id.to_string());
        let Some(row) = self.fetch_one(q).await? else { return Ok(None) };
        Ok(Some(EffectEntity {
            id,
            name: get_string(&row, "name")?,
            entity_type: get_string(&row, "entity_type")?,
        }))
    }

    async fn get_or_create_downstream_edge(&self, edge: &DownstreamEdge) -> Result<bool> {
        let (match_source, source_key) = source_match(&edge.source);
        // The nonce is only set when MERGE creates the relationship.
        let nonce = Uuid::new_v4().to_string();
        let cypher = format!(
            "{match_source} \
             MATCH (e:EffectEntity {{id: $destination}}) \
             SET s._lock = true REMOVE s._lock \
             MERGE (s)-[r:DOWNSTREAM {{drug_context: $drug_context, predicted_by: $predicted_by}}]->(e) \
             ON CREATE SET r.effect_type = $effect_type, r.confidence = $confidence, \
                           r.reasoning = $reasoning, r.depth = $depth, \
                           r.timestamp = $timestamp, r.nonce = $nonce \
             RETURN r.nonce = $nonce AS created"
        );
        let q = query(&cypher)
            .param("source", source_key)
            .param("destination", edge.destination.to_string())
            .param("drug_context", normalize_drug_name(&edge.drug_context))
            .param("predicted_by", edge.predicted_by.as_str())
            .param("effect_type", edge.effect_type.as_str())
            .param("confidence", edge.confidence)
            .param("reasoning", edge.reasoning.as_str())
            .param("depth", edge.depth as i64)
            .param("timestamp", edge.timestamp.to_rfc3339())
            .param("nonce", nonce.as_str());

        match self.fetch_one(q).await? {
            Some(row) => Ok(row.get::<bool>("created").unwrap_or(false)),
            None => Err(StoreError::NotFound(format!(
                "endpoints of downstream edge {:?} -> {}",
                edge.source, edge.destination
            ))),
        }
    }

    async fn count_downstream_edges(
        &self,
        target: &str,
        drug_context: &str,
        predicted_by: &str,
    ) -> Result<u64> {
        let q = query(
            "MATCH (:Target {name: $target})-[r:DOWNSTREAM {drug_context: $drug_context, predicted_by: $predicted_by}]->(:EffectEntity) \
             RETURN count(r) AS n",
        )
        .param("target", normalize_target_name(target))
        .param("drug_context", normalize_drug_name(drug_context))
        .param("predicted_by", predicted_by);
        let n = match self.fetch_one(q).await? {
            Some(row) => row.get::<i64>("n").unwrap_or(0),
            None => 0,
        };
        Ok(n.max(0) as u64)
    }

    async fn downstream_edges_from(
        &self,
        source: &NodeRef,
        drug_context: &str,
        predicted_by: &str,
    ) -> Result<Vec<DownstreamEdge>> {
        let (match_source, source_key) = source_match(source);
        let cypher = format!(
            "{match_source} \
             MATCH (s)-[r:DOWNSTREAM {{drug_context: $drug_context, predicted_by: $predicted_by}}]->(e:EffectEntity) \
             RETURN e.id AS destination, r.effect_type AS effect_type, r.confidence AS confidence, \
                    r.reasoning AS reasoning, r.depth AS depth, r.drug_context AS drug_context, \
                    r.predicted_by AS predicted_by, r.timestamp AS timestamp \
             ORDER BY r.timestamp"
        );
        let q = query(&cypher)
            .param("source", source_key)
            .param("drug_context", normalize_drug_name(drug_context))
            .param("predicted_by", predicted_by);

        self.fetch_all(q)
            .await?
            .iter()
            .map(|row| row_to_downstream_edge(row, source))
            .collect()
    }

    async fn record_cascade_attempt(&self, a: &CascadeAttempt) -> Result<()> {
        let q = query(
            "MATCH (t:Target {name: $target}) \
             MERGE (a:CascadeAttempt {drug: $drug, target: $target, predicted_by: $predicted_by}) \
             SET a.depth = $depth, a.direct_effects = $direct_effects, \
                 a.complete = $complete, a.attempted_at = $attempted_at \
             MERGE (a)-[:ATTEMPTED_ON]->(t) \
             RETURN count(a) AS written",
        )
        .param("drug", normalize_drug_name(&a.drug))
        .param("target", normalize_target_name(&a.target))
        .param("predicted_by", a.predicted_by.as_str())
        .param("depth", a.depth as i64)
        .param("direct_effects", a.direct_effects as i64)
        .param("complete", a.complete)
        .param("attempted_at", a.attempted_at.to_rfc3339());

        match self.fetch_one(q).await? {
            Some(row) if row.get::<i64>("written").unwrap_or(0) > 0 => Ok(()),
            _ => Err(StoreError::NotFound(format!("Target {}", a.target))),
        }
    }

    async fn get_cascade_attempt(
        &self,
        drug: &str,
        target: &str,
        predicted_by: &str,
    ) -> Result<Option<CascadeAttempt>> {
        let drug = normalize_drug_name(drug);
        let target = normalize_target_name(target);
        let q = query(
            "MATCH (a:CascadeAttempt {drug: $drug, target: $target, predicted_by: $predicted_by}) \
             RETURN a.depth AS depth, a.direct_effects AS direct_effects, \
                    a.complete AS complete, a.attempted_at AS attempted_at",
        )
        .param("drug", drug.as_str())
        .param("target", target.as_str())
        .param("predicted_by", predicted_by);

        let Some(row) = self.fetch_one(q).await? else { return Ok(None) };
        let depth = row.get::<i64>("depth").unwrap_or(0);
        Ok(Some(CascadeAttempt {
            drug,
            target,
            predicted_by: predicted_by.to_string(),
            depth: u8::try_from(depth).unwrap_or(0),
            direct_effects: row.get::<i64>("direct_effects").unwrap_or(0).max(0) as usize,
            complete: row.get::<bool>("complete").unwrap_or(false),
            attempted_at: parse_timestamp(&get_string(&row, "attempted_at")?)?,
        }))
    }
}
