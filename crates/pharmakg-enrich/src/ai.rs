//! Shared wrapper around the AI backend.
//!
//! Both the classifier and the cascade predictor go through `AiService`, so
//! every call is rate limited by the same scheduler, bounded by the same
//! timeout, and leaves an audit record.

use std::sync::Arc;
use std::time::Duration;

use pharmakg_common::{EnrichError, Result};
use pharmakg_llm::{LlmAuditEntry, LlmBackend, LlmRequest, LlmResponse};

use crate::scheduler::CallScheduler;

#[derive(Clone)]
pub struct AiService {
    backend: Arc<dyn LlmBackend>,
    scheduler: Arc<dyn CallScheduler>,
    timeout: Duration,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

impl AiService {
    pub fn new(
        backend: Arc<dyn LlmBackend>,
        scheduler: Arc<dyn CallScheduler>,
        timeout: Duration,
    ) -> Self {
        Self { backend, scheduler, timeout, max_tokens: None, temperature: None }
    }

    /// Generation settings applied to requests that leave them unset.
    pub fn with_generation(mut self, max_tokens: Option<u32>, temperature: Option<f32>) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    /// Run one single-shot completion. A timeout or backend failure is a
    /// `ServiceUnavailable`; nothing has been persisted at that point.
    pub async fn call(&self, purpose: &str, mut req: LlmRequest) -> Result<LlmResponse> {
        req.max_tokens = req.max_tokens.or(self.max_tokens);
        req.temperature = req.temperature.or(self.temperature);
        self.scheduler.before_call().await;

        let started = tokio::time::Instant::now();
        let resp = match tokio::time::timeout(self.timeout, self.backend.complete(req)).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => {
                tracing::warn!(purpose, backend = self.backend.backend_name(), error = %e, "AI call failed");
                return Err(e.into());
            }
            Err(_) => {
                tracing::warn!(purpose, timeout_ms = self.timeout.as_millis() as u64, "AI call timed out");
                return Err(EnrichError::ServiceUnavailable(format!(
                    "AI call timed out after {:?}",
                    self.timeout
                )));
            }
        };

        let latency_ms = started.elapsed().as_millis() as u64;
        LlmAuditEntry::from_response(purpose, self.backend.as_ref(), &resp, latency_ms).log();
        Ok(resp)
    }
}
