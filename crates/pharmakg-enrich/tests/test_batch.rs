//! Batch classification: ordering, per-item isolation, skipping, and the
//! inter-call delay.

mod common;

use std::sync::Arc;
use std::time::Duration;

use pharmakg_enrich::{EnrichmentConfig, EnrichmentPipeline, ItemStatus, SkipReason};
use pharmakg_test_utils::{aspirin_ptgs1_json, aspirin_store, Scripted, ScriptedBackend};
use pretty_assertions::assert_eq;

use common::{pipeline, MODEL};

fn targets(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Answers every classification except for `failing`.
fn backend_failing_on(failing: &'static [&'static str]) -> Arc<ScriptedBackend> {
    Arc::new(ScriptedBackend::with_responder(MODEL, move |req| {
        let text = req.user_text();
        if failing.iter().any(|t| text.contains(&format!("Target: {t}\n"))) {
            Scripted::Fail("service returned 503".to_string())
        } else {
            Scripted::Reply(aspirin_ptgs1_json())
        }
    }))
}

fn prompt_target(prompt: &str) -> String {
    prompt
        .lines()
        .find_map(|l| l.strip_prefix("Target: "))
        .unwrap_or_default()
        .to_string()
}

#[tokio::test]
async fn test_one_failure_does_not_abort_batch() {
    let backend = backend_failing_on(&["B"]);
    let pipeline = pipeline(aspirin_store().await, backend.clone());

    let result = pipeline
        .batch_classify("aspirin", &targets(&["A", "B", "C"]), None, false)
        .await;

    assert_eq!(result.drug_name, "aspirin");
    assert_eq!(result.total, 3);
    assert_eq!(result.successful, 2);
    assert_eq!(result.failed, 1);
    let outcome: Vec<_> = result
        .results
        .iter()
        .map(|r| (r.target_name.as_str(), r.status))
        .collect();
    assert_eq!(
        outcome,
        vec![("A", ItemStatus::Success), ("B", ItemStatus::Failed), ("C", ItemStatus::Success)]
    );
    assert_eq!(result.results[1].error_kind.as_deref(), Some("service_unavailable"));
    assert!(result.results[1].classification.is_none());
    assert!(result.results[0].classification.is_some());

    let order: Vec<_> = backend.calls().iter().map(|c| prompt_target(&c.prompt)).collect();
    assert_eq!(order, vec!["A", "B", "C"]);

    // B is still open, A and C are done.
    assert!(pipeline.needs_classification("aspirin", "B").await.unwrap());
    assert!(!pipeline.needs_classification("aspirin", "C").await.unwrap());
}

#[tokio::test]
async fn test_counts_always_add_up() {
    let backend = backend_failing_on(&["A", "C", "PTGS2"]);
    let pipeline = pipeline(aspirin_store().await, backend.clone());
    let input = targets(&["A", "EGFR", "B", "C", "PTGS1", "PTGS2"]);

    let result = pipeline.batch_classify("aspirin", &input, None, false).await;

    assert_eq!(result.results.len(), input.len());
    assert_eq!(result.total, result.results.len());
    assert_eq!(result.successful + result.failed, result.total);
    assert_eq!(result.successful, 2);

    // A missing edge fails its item without spending an AI call.
    let egfr = &result.results[1];
    assert_eq!(egfr.target_name, "EGFR");
    assert_eq!(egfr.status, ItemStatus::Failed);
    assert_eq!(egfr.error_kind.as_deref(), Some("relationship_not_found"));
    assert_eq!(backend.call_count(), 5);
}

#[tokio::test]
async fn test_classified_targets_are_skipped_not_failed() {
    let backend = backend_failing_on(&[]);
    let pipeline = pipeline(aspirin_store().await, backend.clone());
    pipeline.classify("aspirin", "PTGS1", None, false).await.unwrap();

    let result = pipeline
        .batch_classify("aspirin", &targets(&["PTGS1", "A"]), None, false)
        .await;
    assert_eq!(result.total, 1);
    assert_eq!(result.failed, 0);
    assert_eq!(result.skipped.len(), 1);
    assert_eq!(result.skipped[0].target_name, "PTGS1");
    assert_eq!(result.skipped[0].reason, SkipReason::AlreadyClassified);
    assert_eq!(backend.call_count(), 2);

    let forced = pipeline
        .batch_classify("aspirin", &targets(&["PTGS1", "A"]), None, true)
        .await;
    assert_eq!(forced.total, 2);
    assert!(forced.skipped.is_empty());
    assert_eq!(backend.call_count(), 4);
}

#[tokio::test]
async fn test_duplicate_targets_are_classified_once() {
    let backend = backend_failing_on(&[]);
    let pipeline = pipeline(aspirin_store().await, backend.clone());

    let result = pipeline
        .batch_classify("aspirin", &targets(&["A", "B", " A", "B"]), None, true)
        .await;

    assert_eq!(result.total, 2);
    assert_eq!(result.successful, 2);
    let skipped: Vec<_> = result
        .skipped
        .iter()
        .map(|s| (s.target_name.as_str(), s.reason))
        .collect();
    assert_eq!(skipped, vec![("A", SkipReason::Duplicate), ("B", SkipReason::Duplicate)]);
    assert_eq!(backend.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_calls_are_spaced_by_configured_delay() {
    let delay = Duration::from_secs(3);
    let backend = backend_failing_on(&["B"]);
    let config = EnrichmentConfig {
        predicted_by: MODEL.to_string(),
        inter_call_delay: delay,
        ..EnrichmentConfig::default()
    };
    let pipeline = EnrichmentPipeline::new(aspirin_store().await, backend.clone(), config);
    let input = targets(&["A", "B", "C", "PTGS1"]);

    let result = pipeline.batch_classify("aspirin", &input, None, false).await;
    assert_eq!(result.total, 4);

    let calls = backend.calls();
    assert_eq!(calls.len(), 4);
    for pair in calls.windows(2) {
        assert!(pair[1].at - pair[0].at >= delay);
    }
    let span = calls[3].at - calls[0].at;
    assert!(span >= delay * (input.len() as u32 - 1));
}
