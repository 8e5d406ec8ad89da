//! pharmakg-llm — LLM backend abstraction layer.
//! Implements the LlmBackend trait, the concrete provider backends,
//! and per-call audit records.

pub mod backend;
pub mod audit;

pub use backend::{
    build_backend, BackendConfig, BackendKind, LlmBackend, LlmError, LlmRequest, LlmResponse,
    Message,
};
pub use audit::LlmAuditEntry;
