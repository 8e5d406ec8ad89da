use thiserror::Error;

/// Error taxonomy shared by every enrichment component.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EnrichError {
    /// The drug->target edge is absent from the graph.
    #[error("Relationship not found: {drug} -> {target}")]
    RelationshipNotFound { drug: String, target: String },

    /// The AI service failed or timed out. Nothing was written.
    #[error("AI service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The AI service answered with something we could not accept.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A valid result could not be written to the graph store.
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl EnrichError {
    pub fn relationship_not_found(drug: &str, target: &str) -> Self {
        EnrichError::RelationshipNotFound {
            drug: drug.to_string(),
            target: target.to_string(),
        }
    }

    /// Whether retrying the same call without outside intervention may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EnrichError::ServiceUnavailable(_) | EnrichError::Persistence(_)
        )
    }

    /// Short machine-readable label used in batch reports and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            EnrichError::RelationshipNotFound { .. } => "relationship_not_found",
            EnrichError::ServiceUnavailable(_)       => "service_unavailable",
            EnrichError::Validation(_)               => "validation_error",
            EnrichError::Persistence(_)              => "persistence_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, EnrichError>;
