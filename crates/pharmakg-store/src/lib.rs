//! PharmaKG graph store layer
//!
//! This crate provides the provenance store adapter used by the enrichment
//! pipeline: the `GraphStore` trait plus two implementations.
//!
//! - `MemoryGraphStore` — in-process store, seeded from JSON; used for local
//!   runs and as the test fake.
//! - `Neo4jGraphStore` — Neo4j via Bolt (feature `neo4j`).
//!
//! # Example
//!
//! ```rust,no_run
//! use pharmakg_store::{GraphStore, MemoryGraphStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MemoryGraphStore::from_seed_file("./data/seed.json").await?;
//!     let edge = store.get_edge("aspirin", "PTGS1").await?;
//!     println!("classified: {:?}", edge.map(|e| e.is_classified()));
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod store;
pub mod memory;
#[cfg(feature = "neo4j")]
pub mod neo4j;

pub use error::{Result, StoreError};
pub use store::GraphStore;
pub use memory::{GraphSeed, MemoryGraphStore, SeedEdge};
#[cfg(feature = "neo4j")]
pub use neo4j::{Neo4jConfig, Neo4jGraphStore};
