//! Validation of raw AI responses.
//!
//! The services answer with free text that should contain one JSON value.
//! Nothing leaves this module unless it has been checked against the
//! classification / effect contracts; everything else is a
//! `EnrichError::Validation`.

use std::sync::OnceLock;

use chrono::Utc;
use pharmakg_common::confidence::validate_confidence;
use pharmakg_common::{Classification, EnrichError, Result};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

fn fenced_block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // ```json ... ``` or ``` ... ```
        Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").unwrap()
    })
}

/// Pull the JSON payload out of a model answer.
///
/// Accepts bare JSON, JSON inside a Markdown code fence, or JSON surrounded
/// by prose (outermost `{…}` / `[…]` span).
pub fn extract_json(text: &str) -> Result<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(EnrichError::Validation("empty response".to_string()));
    }
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        return Ok(v);
    }
    if let Some(cap) = fenced_block_regex().captures(trimmed) {
        if let Ok(v) = serde_json::from_str::<Value>(cap[1].trim()) {
            return Ok(v);
        }
    }
    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (trimmed.find(open), trimmed.rfind(close)) {
            if start < end {
                if let Ok(v) = serde_json::from_str::<Value>(&trimmed[start..=end]) {
                    return Ok(v);
                }
            }
        }
    }
    Err(EnrichError::Validation(
        "response does not contain a JSON value".to_string(),
    ))
}

fn required(field: &str, value: Option<String>) -> Result<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| EnrichError::Validation(format!("missing or empty field `{field}`")))
}

fn optional(value: Option<String>) -> String {
    value.map(|v| v.trim().to_string()).unwrap_or_default()
}

#[derive(Debug, Deserialize)]
struct RawClassification {
    relationship_type: Option<String>,
    target_class: Option<String>,
    target_subclass: Option<String>,
    mechanism: Option<String>,
    confidence: Option<f64>,
    reasoning: Option<String>,
}

/// Parse and validate a classification answer. `source` is the provenance
/// tag stamped on the result.
pub fn parse_classification(text: &str, source: &str) -> Result<Classification> {
    let value = extract_json(text)?;
    if !value.is_object() {
        return Err(EnrichError::Validation(
            "classification must be a JSON object".to_string(),
        ));
    }
    let raw: RawClassification = serde_json::from_value(value)
        .map_err(|e| EnrichError::Validation(format!("malformed classification: {e}")))?;

    let confidence = raw
        .confidence
        .ok_or_else(|| EnrichError::Validation("missing field `confidence`".to_string()))?;

    Ok(Classification {
        relationship_type: required("relationship_type", raw.relationship_type)?,
        mechanism: required("mechanism", raw.mechanism)?,
        confidence: validate_confidence(confidence)?,
        target_class: optional(raw.target_class),
        target_subclass: optional(raw.target_subclass),
        reasoning: optional(raw.reasoning),
        source: source.to_string(),
        timestamp: Utc::now(),
    })
}

/// One validated effect from a cascade answer.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictedEffect {
    pub entity_name: String,
    pub entity_type: String,
    pub effect_type: String,
    pub confidence: f64,
    pub reasoning: String,
}

/// Result of parsing a cascade answer: accepted effects plus a note for
/// each item that was dropped.
#[derive(Debug, Clone, Default)]
pub struct ParsedEffects {
    pub effects: Vec<PredictedEffect>,
    pub rejected: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawEffect {
    #[serde(alias = "name", alias = "entity")]
    entity_name: Option<String>,
    #[serde(alias = "type")]
    entity_type: Option<String>,
    #[serde(alias = "effect")]
    effect_type: Option<String>,
    confidence: Option<f64>,
    reasoning: Option<String>,
}

fn validate_effect(item: Value) -> Result<PredictedEffect> {
    let raw: RawEffect = serde_json::from_value(item)
        .map_err(|e| EnrichError::Validation(format!("malformed effect: {e}")))?;
    let confidence = raw
        .confidence
        .ok_or_else(|| EnrichError::Validation("missing field `confidence`".to_string()))?;
    Ok(PredictedEffect {
        entity_name: required("entity_name", raw.entity_name)?,
        entity_type: required("entity_type", raw.entity_type)?,
        effect_type: required("effect_type", raw.effect_type)?,
        confidence: validate_confidence(confidence)?,
        reasoning: optional(raw.reasoning),
    })
}

/// Parse a cascade answer: either `{"effects": [...]}` or a bare array.
///
/// A wrong top-level shape fails the whole branch; individually malformed
/// items are dropped and reported in `rejected`. At most `max_effects`
/// effects are kept.
pub fn parse_effects(text: &str, max_effects: usize) -> Result<ParsedEffects> {
    let items = match extract_json(text)? {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("effects") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(EnrichError::Validation(
                    "cascade response has no `effects` array".to_string(),
                ))
            }
        },
        _ => {
            return Err(EnrichError::Validation(
                "cascade response must be an object or array".to_string(),
            ))
        }
    };

    let mut parsed = ParsedEffects::default();
    for (i, item) in items.into_iter().enumerate() {
        match validate_effect(item) {
            Ok(effect) if parsed.effects.len() < max_effects => parsed.effects.push(effect),
            Ok(effect) => parsed
                .rejected
                .push(format!("item {i} ({}): over the limit of {max_effects}", effect.entity_name)),
            Err(e) => parsed.rejected.push(format!("item {i}: {e}")),
        }
    }
    Ok(parsed)
}
