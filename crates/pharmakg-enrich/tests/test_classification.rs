//! Classification through the pipeline facade: gating, persistence, and
//! failure modes.

mod common;

use std::sync::Arc;

use pharmakg_common::EnrichError;
use pharmakg_store::GraphStore;
use pharmakg_test_utils::{
    aspirin_ptgs1_json, aspirin_store, classification_json, FaultyStore, Scripted, ScriptedBackend,
};
use pretty_assertions::assert_eq;

use common::{pipeline, MODEL};

#[tokio::test]
async fn test_aspirin_ptgs1_is_classified_once() {
    let store = aspirin_store().await;
    let backend = Arc::new(ScriptedBackend::with_script(
        MODEL,
        [Scripted::Reply(aspirin_ptgs1_json())],
    ));
    let pipeline = pipeline(store.clone(), backend.clone());

    let first = pipeline.classify("aspirin", "PTGS1", None, false).await.unwrap();
    assert_eq!(first.classification.relationship_type, "Primary/On-Target");
    assert_eq!(first.classification.mechanism, "Inhibitor");
    assert_eq!(first.classification.confidence, 0.95);
    assert_eq!(first.classification.source, MODEL);
    assert!(first.stored);
    assert!(!first.cached);

    let edge = store.get_edge("aspirin", "PTGS1").await.unwrap().unwrap();
    assert!(edge.is_classified());
    assert_eq!(edge.classification.as_ref().map(|c| c.confidence), Some(0.95));

    let second = pipeline.classify("aspirin", "PTGS1", None, false).await.unwrap();
    assert!(second.cached);
    assert_eq!(second.classification, first.classification);
    assert_eq!(backend.call_count(), 1);
    assert!(!pipeline.needs_classification("aspirin", "PTGS1").await.unwrap());
}

#[tokio::test]
async fn test_drug_name_case_does_not_matter() {
    let store = aspirin_store().await;
    let backend = Arc::new(ScriptedBackend::with_script(
        MODEL,
        [Scripted::Reply(aspirin_ptgs1_json())],
    ));
    let pipeline = pipeline(store, backend.clone());

    let result = pipeline.classify("  Aspirin", "PTGS1", None, false).await.unwrap();
    assert_eq!(result.drug, "aspirin");
    assert!(pipeline.classify("ASPIRIN", "PTGS1", None, false).await.unwrap().cached);
    assert_eq!(backend.call_count(), 1);
}

#[tokio::test]
async fn test_prompt_carries_drug_attributes_and_context() {
    let backend = Arc::new(ScriptedBackend::with_script(
        MODEL,
        [Scripted::Reply(aspirin_ptgs1_json())],
    ));
    let pipeline = pipeline(aspirin_store().await, backend.clone());
    pipeline
        .classify("aspirin", "PTGS1", Some("low-dose cardioprotection"), false)
        .await
        .unwrap();

    let prompt = &backend.calls()[0].prompt;
    assert!(prompt.contains("Drug: aspirin"));
    assert!(prompt.contains("Target: PTGS1"));
    assert!(prompt.contains("COX-1/COX-2"));
    assert!(prompt.contains("low-dose cardioprotection"));
}

#[tokio::test]
async fn test_failed_write_leaves_edge_unclassified() {
    let faulty = Arc::new(FaultyStore::new(aspirin_store().await));
    faulty.fail_classification_writes(true);
    let backend = Arc::new(ScriptedBackend::with_script(
        MODEL,
        [
            Scripted::Reply(aspirin_ptgs1_json()),
            Scripted::Reply(aspirin_ptgs1_json()),
        ],
    ));
    let pipeline = pipeline(faulty.clone(), backend.clone());

    let err = pipeline.classify("aspirin", "PTGS1", None, false).await.unwrap_err();
    assert!(matches!(err, EnrichError::Persistence(_)));
    assert!(err.is_retryable());
    let edge = faulty.inner().get_edge("aspirin", "PTGS1").await.unwrap().unwrap();
    assert!(!edge.is_classified());
    assert!(pipeline.needs_classification("aspirin", "PTGS1").await.unwrap());

    // Store recovers: the retry calls the service again and succeeds.
    faulty.fail_classification_writes(false);
    let result = pipeline.classify("aspirin", "PTGS1", None, false).await.unwrap();
    assert!(!result.cached);
    assert_eq!(backend.call_count(), 2);
    assert!(!pipeline.needs_classification("aspirin", "PTGS1").await.unwrap());
}

#[tokio::test]
async fn test_out_of_range_confidence_is_never_persisted() {
    let store = aspirin_store().await;
    let backend = Arc::new(ScriptedBackend::with_script(
        MODEL,
        [
            Scripted::Reply(classification_json("Primary/On-Target", "Inhibitor", 1.3)),
            Scripted::Reply(classification_json("Primary/On-Target", "Inhibitor", -0.1)),
        ],
    ));
    let pipeline = pipeline(store.clone(), backend);

    for _ in 0..2 {
        let err = pipeline.classify("aspirin", "PTGS1", None, false).await.unwrap_err();
        assert!(matches!(err, EnrichError::Validation(_)));
        assert!(!err.is_retryable());
    }
    assert!(!store.get_edge("aspirin", "PTGS1").await.unwrap().unwrap().is_classified());
}

#[tokio::test]
async fn test_malformed_responses_are_validation_errors() {
    let store = aspirin_store().await;
    let backend = Arc::new(ScriptedBackend::with_script(
        MODEL,
        [
            Scripted::Reply("Aspirin inhibits COX-1.".to_string()),
            Scripted::Reply(r#"{"relationship_type": "Primary/On-Target", "confidence": 0.9}"#.to_string()),
            Scripted::Reply(classification_json("", "Inhibitor", 0.9)),
        ],
    ));
    let pipeline = pipeline(store.clone(), backend);

    for _ in 0..3 {
        let err = pipeline.classify("aspirin", "PTGS1", None, false).await.unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }
    assert!(pipeline.needs_classification("aspirin", "PTGS1").await.unwrap());
}

#[tokio::test]
async fn test_service_failure_is_retryable() {
    let backend = Arc::new(ScriptedBackend::with_script(
        MODEL,
        [Scripted::Fail("connection refused".to_string())],
    ));
    let pipeline = pipeline(aspirin_store().await, backend);
    let err = pipeline.classify("aspirin", "PTGS1", None, false).await.unwrap_err();
    assert!(matches!(err, EnrichError::ServiceUnavailable(_)));
    assert!(err.is_retryable());
}

#[tokio::test(start_paused = true)]
async fn test_hung_call_times_out() {
    let store = aspirin_store().await;
    let backend = Arc::new(ScriptedBackend::with_script(MODEL, [Scripted::Hang]));
    let pipeline = pipeline(store.clone(), backend);

    let err = pipeline.classify("aspirin", "PTGS1", None, false).await.unwrap_err();
    assert!(matches!(err, EnrichError::ServiceUnavailable(ref m) if m.contains("timed out")));
    assert!(!store.get_edge("aspirin", "PTGS1").await.unwrap().unwrap().is_classified());
}

#[tokio::test]
async fn test_missing_edge_makes_no_ai_call() {
    let backend = Arc::new(ScriptedBackend::with_script(
        MODEL,
        [Scripted::Reply(aspirin_ptgs1_json())],
    ));
    let pipeline = pipeline(aspirin_store().await, backend.clone());

    let err = pipeline.classify("aspirin", "EGFR", None, false).await.unwrap_err();
    assert_eq!(err, EnrichError::relationship_not_found("aspirin", "EGFR"));
    assert!(!err.is_retryable());
    let err = pipeline.classify("aspirin", "EGFR", None, true).await.unwrap_err();
    assert_eq!(err.kind(), "relationship_not_found");
    assert_eq!(backend.call_count(), 0);
    assert!(pipeline.needs_classification("aspirin", "EGFR").await.is_err());
}

#[tokio::test]
async fn test_force_reclassify_overwrites() {
    let store = aspirin_store().await;
    let backend = Arc::new(ScriptedBackend::with_script(
        MODEL,
        [
            Scripted::Reply(aspirin_ptgs1_json()),
            Scripted::Reply(classification_json("Primary/On-Target", "Irreversible inhibitor", 0.97)),
        ],
    ));
    let pipeline = pipeline(store.clone(), backend.clone());

    pipeline.classify("aspirin", "PTGS1", None, false).await.unwrap();
    let forced = pipeline.classify("aspirin", "PTGS1", None, true).await.unwrap();
    assert!(!forced.cached);
    assert_eq!(forced.classification.mechanism, "Irreversible inhibitor");

    let stored = store.get_edge("aspirin", "PTGS1").await.unwrap().unwrap();
    assert_eq!(stored.classification.map(|c| c.confidence), Some(0.97));
    assert_eq!(backend.call_count(), 2);
}
