#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use pharmakg_enrich::{EnrichmentConfig, EnrichmentPipeline, Unthrottled};
use pharmakg_llm::LlmRequest;
use pharmakg_store::GraphStore;
use pharmakg_test_utils::{anchor_of, effects_json, Scripted, ScriptedBackend};

pub const MODEL: &str = "scripted-model";

pub fn config() -> EnrichmentConfig {
    EnrichmentConfig {
        predicted_by: MODEL.to_string(),
        inter_call_delay: Duration::ZERO,
        call_timeout: Duration::from_secs(5),
        max_effects_per_call: 8,
        ..EnrichmentConfig::default()
    }
}

pub fn pipeline(store: Arc<dyn GraphStore>, backend: Arc<ScriptedBackend>) -> EnrichmentPipeline {
    EnrichmentPipeline::with_scheduler(store, backend, config(), Arc::new(Unthrottled))
}

/// Aspirin / PTGS1 cascade:
///
/// ```text
/// PTGS1 -> Thromboxane A2 (0.9)   -> Platelet aggregation (0.85) -> Thrombosis (0.6)
///       -> Prostaglandin E2 (0.8) -> Inflammation (0.7)          -> Pain (0.5)
/// ```
pub fn aspirin_cascade(req: &LlmRequest, failing_anchor: Option<&str>) -> Scripted {
    let anchor = anchor_of(&req.user_text());
    if anchor.is_some() && anchor.as_deref() == failing_anchor {
        return Scripted::Fail("upstream 503".to_string());
    }
    let body = match anchor.as_deref() {
        None => effects_json(&[
            ("Thromboxane A2", "Metabolite", "decreases", 0.9),
            ("Prostaglandin E2", "Metabolite", "decreases", 0.8),
        ]),
        Some("Thromboxane A2") => {
            effects_json(&[("Platelet aggregation", "Phenotype", "decreases", 0.85)])
        }
        Some("Prostaglandin E2") => effects_json(&[("Inflammation", "Phenotype", "decreases", 0.7)]),
        Some("Platelet aggregation") => effects_json(&[("Thrombosis", "Phenotype", "decreases", 0.6)]),
        Some("Inflammation") => effects_json(&[("Pain", "Phenotype", "decreases", 0.5)]),
        Some(_) => effects_json(&[]),
    };
    Scripted::Reply(body)
}

pub fn cascade_backend(failing_anchor: Option<&'static str>) -> Arc<ScriptedBackend> {
    Arc::new(ScriptedBackend::with_responder(MODEL, move |req| {
        aspirin_cascade(req, failing_anchor)
    }))
}
