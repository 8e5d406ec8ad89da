/// Confidence handling for classifications and cascade effects.
/// All persisted confidences live in [0.0, 1.0]; nothing here clamps.

use crate::error::{EnrichError, Result};

/// Accept a confidence only if it is a finite value in [0, 1].
pub fn validate_confidence(value: f64) -> Result<f64> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(EnrichError::Validation(format!(
            "confidence {value} is outside [0, 1]"
        )))
    }
}

/// Confidence of a multi-hop chain: the product of its hop confidences.
pub fn path_confidence(hops: &[f64]) -> f64 {
    hops.iter().product()
}

/// Aggregate confidence of a whole cascade.
///
/// `origin * mean(leaf path confidences)`; deeper leaves carry more
/// factors and are discounted accordingly. An empty cascade scores 0.
pub fn cascade_confidence(origin: f64, leaf_paths: &[f64]) -> f64 {
    if leaf_paths.is_empty() {
        return 0.0;
    }
    let mean = leaf_paths.iter().sum::<f64>() / leaf_paths.len() as f64;
    origin * mean
}
