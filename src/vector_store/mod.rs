//! File-backed vector store used for similarity retrieval.

pub mod store;
pub mod types;

pub use store::VectorStore;
pub use types::{ScoredChunk, StoredChunk, VectorStoreError};
