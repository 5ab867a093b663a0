//! Shared types used by the on-disk vector store.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors returned while reading, writing, or querying a vector store.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    /// Filesystem access failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path involved in the failing operation.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Persisted index could not be encoded or decoded.
    #[error("Corrupt vector store index: {0}")]
    Serialization(#[from] serde_json::Error),
    /// No persisted index exists at the expected location.
    #[error("Vector store not found at {0}")]
    NotFound(String),
    /// A vector's length disagrees with the store's dimension.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension fixed by the first inserted vector.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },
    /// A store cannot be built from zero chunks.
    #[error("Cannot build a vector store without any chunks")]
    Empty,
}

impl VectorStoreError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// A chunk persisted alongside its embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChunk {
    /// Random identifier assigned at insert time.
    pub id: Uuid,
    /// Chunk text.
    pub text: String,
    /// Filename the chunk was extracted from.
    pub source: String,
    /// Position of the chunk within its source document.
    pub chunk_index: usize,
    /// SHA-256 of the chunk text, used to skip re-ingesting identical content.
    pub chunk_hash: String,
    /// RFC3339 timestamp of ingestion.
    pub ingested_at: String,
    /// Embedding vector.
    pub vector: Vec<f32>,
}

/// A retrieval hit with its cosine similarity.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    /// Matching chunk (vector omitted).
    pub text: String,
    /// Filename the chunk came from.
    pub source: String,
    /// Position of the chunk within its source document.
    pub chunk_index: usize,
    /// Cosine similarity in `[-1, 1]`.
    pub score: f32,
}

/// On-disk layout of `index.json`.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct PersistedIndex {
    pub(crate) version: u32,
    pub(crate) name: String,
    pub(crate) dimension: usize,
    pub(crate) records: Vec<StoredChunk>,
}
