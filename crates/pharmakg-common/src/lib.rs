//! pharmakg-common — Shared types, errors, and confidence rules used across all PharmaKG crates.

pub mod error;
pub mod entities;
pub mod confidence;

// Re-export commonly used types
pub use error::{EnrichError, Result};
pub use entities::{
    CascadeAttempt, Classification, DownstreamEdge, Drug, EdgeIdentity, EffectEntity, NodeRef,
    Target, TargetsEdge,
};
