//! Audit records for LLM calls.
//!
//! Each AI call made by the enrichment pipeline is summarised in an
//! `LlmAuditEntry`; the SHA-256 of the raw output ties a stored
//! classification back to the exact response it was parsed from.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::backend::{LlmBackend, LlmResponse};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmAuditEntry {
    pub id: Uuid,
    /// What the call was for, e.g. "classification" or "cascade:depth2".
    pub purpose: String,
    pub model: String,
    pub backend: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub output_hash: String,
    pub latency_ms: u64,
    pub called_at: chrono::DateTime<Utc>,
}

pub fn output_hash(output: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(output.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl LlmAuditEntry {
    pub fn new(
        purpose: impl Into<String>,
        model: String,
        backend: String,
        prompt_tokens: u32,
        completion_tokens: u32,
        output: &str,
        latency_ms: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            purpose: purpose.into(),
            model,
            backend,
            prompt_tokens,
            completion_tokens,
            output_hash: output_hash(output),
            latency_ms,
            called_at: Utc::now(),
        }
    }

    pub fn from_response(
        purpose: impl Into<String>,
        backend: &dyn LlmBackend,
        resp: &LlmResponse,
        latency_ms: u64,
    ) -> Self {
        Self::new(
            purpose,
            resp.model.clone(),
            backend.backend_name().to_string(),
            resp.prompt_tokens,
            resp.completion_tokens,
            &resp.content,
            latency_ms,
        )
    }

    /// Emit the entry on the `pharmakg::audit` tracing target.
    pub fn log(&self) {
        tracing::debug!(
            target: "pharmakg::audit",
            audit_id = %self.id,
            purpose = %self.purpose,
            model = %self.model,
            backend = %self.backend,
            prompt_tokens = self.prompt_tokens,
            completion_tokens = self.completion_tokens,
            output_hash = %self.output_hash,
            latency_ms = self.latency_ms,
            "LLM call completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_hash_is_stable_sha256() {
        let a = LlmAuditEntry::new("classification", "m".into(), "b".into(), 1, 2, "hello", 5);
        assert_eq!(
            a.output_hash,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(a.output_hash, output_hash("hello"));
    }
}
