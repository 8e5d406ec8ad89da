//! Store error types.

use pharmakg_common::EnrichError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Neo4j error: {0}")]
    Neo4j(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Write rejected: {0}")]
    WriteRejected(String),
}

#[cfg(feature = "neo4j")]
impl From<neo4rs::Error> for StoreError {
    fn from(err: neo4rs::Error) -> Self {
        StoreError::Neo4j(err.to_string())
    }
}

/// Any store failure inside the pipeline surfaces as a persistence error;
/// the classification or cascade edge it concerned was not written.
impl From<StoreError> for EnrichError {
    fn from(err: StoreError) -> Self {
        EnrichError::Persistence(err.to_string())
    }
}
