//! pharmakg-test-utils — test doubles and fixtures shared by the workspace.

pub mod backend;
pub mod store;

use std::sync::Arc;

use pharmakg_common::{Drug, Target};
use pharmakg_store::MemoryGraphStore;
use serde_json::json;

pub use backend::{RecordedCall, Scripted, ScriptedBackend};
pub use store::FaultyStore;

/// Targets seeded for aspirin by `aspirin_store`.
pub const ASPIRIN_TARGETS: &[&str] = &["PTGS1", "PTGS2", "A", "B", "C"];

/// Store holding aspirin, its targets, and one unclassified edge per target.
pub async fn aspirin_store() -> Arc<MemoryGraphStore> {
    let store = MemoryGraphStore::new();
    store
        .insert_drug(Drug {
            name: "aspirin".to_string(),
            mechanism_of_action: Some("Irreversible COX-1/COX-2 inhibitor".to_string()),
            development_phase: Some("Approved".to_string()),
            smiles: Some("CC(=O)OC1=CC=CC=C1C(=O)O".to_string()),
        })
        .await;
    for target in ASPIRIN_TARGETS {
        store.insert_target(Target::new(target)).await;
        store.insert_targets_edge("aspirin", target).await;
    }
    Arc::new(store)
}

pub fn classification_json(relationship_type: &str, mechanism: &str, confidence: f64) -> String {
    json!({
        "relationship_type": relationship_type,
        "target_class": "Enzyme",
        "target_subclass": "Cyclooxygenase",
        "mechanism": mechanism,
        "confidence": confidence,
        "reasoning": "Scripted test answer."
    })
    .to_string()
}

/// The canonical aspirin / PTGS1 answer.
pub fn aspirin_ptgs1_json() -> String {
    classification_json("Primary/On-Target", "Inhibitor", 0.95)
}

/// `{"effects": [...]}` from (entity_name, entity_type, effect_type, confidence).
pub fn effects_json(effects: &[(&str, &str, &str, f64)]) -> String {
    let items: Vec<_> = effects
        .iter()
        .map(|(name, entity_type, effect_type, confidence)| {
            json!({
                "entity_name": name,
                "entity_type": entity_type,
                "effect_type": effect_type,
                "confidence": confidence,
                "reasoning": format!("{name} is affected."),
            })
        })
        .collect();
    json!({ "effects": items }).to_string()
}

/// Anchor entity name from a deeper cascade prompt, `None` for level 1.
pub fn anchor_of(prompt: &str) -> Option<String> {
    prompt
        .lines()
        .find_map(|l| l.strip_prefix("Anchor: "))
        .and_then(|rest| rest.split(" (").next())
        .map(str::to_string)
}
