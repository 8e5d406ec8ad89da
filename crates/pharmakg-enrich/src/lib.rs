//! pharmakg-enrich — AI enrichment of the drug/target graph.
//!
//! Classification of Drug->Target edges and multi-hop cascade prediction,
//! both gated on what the graph already stores so the AI service is never
//! asked twice for the same fact.

pub mod ai;
pub mod batch;
pub mod cascade;
pub mod classifier;
pub mod gate;
pub mod pipeline;
pub mod prompts;
pub mod response;
pub mod scheduler;

pub use batch::{BatchItemResult, BatchOrchestrator, BatchResult, ItemStatus, SkipReason, SkippedTarget};
pub use cascade::{BranchFailure, CascadeEffect, CascadePredictor, CascadeResult};
pub use classifier::{ClassificationResult, RelationshipClassifier};
pub use gate::{CascadeGate, ClassificationGate};
pub use pipeline::{EnrichmentConfig, EnrichmentPipeline, EnrichmentStatus};
pub use scheduler::{CallScheduler, FixedDelay, Unthrottled};
