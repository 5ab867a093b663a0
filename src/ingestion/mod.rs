//! Document ingestion: text extraction, chunking, embedding, and vector store maintenance.

pub mod chunking;
pub mod extract;

pub use chunking::{ChunkingError, ChunkingOptions};
pub use extract::{DocumentFormat, ExtractionError};

use crate::embedding::{EmbeddingClient, EmbeddingClientError};
use crate::vector_store::{StoredChunk, VectorStore, VectorStoreError};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

const EMBEDDING_BATCH_SIZE: usize = 32;

/// Errors emitted by the ingestion pipeline.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Text could not be extracted from the uploaded file.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    /// Chunking step failed to segment the document.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding provider failed to produce vectors for the chunks.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// Vector store could not be built, read, or written.
    #[error(transparent)]
    VectorStore(#[from] VectorStoreError),
}

/// A unit of extracted document text ready for embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Chunk text.
    pub text: String,
    /// Filename the chunk was extracted from.
    pub source: String,
    /// Position of the chunk within its source document.
    pub chunk_index: usize,
    /// SHA-256 of the chunk text (hex).
    pub chunk_hash: String,
}

/// Counters reported after appending chunks to an existing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendSummary {
    /// Chunks embedded and written.
    pub added: usize,
    /// Chunks skipped because identical text is already stored.
    pub skipped_duplicates: usize,
}

/// Turns uploaded files into chunks and maintains the named vector store on disk.
pub struct DocumentIngestion {
    chunking: ChunkingOptions,
    embedder: Arc<dyn EmbeddingClient>,
    store_root: PathBuf,
}

impl DocumentIngestion {
    /// Build an ingestion pipeline writing stores under `store_root`.
    pub fn new(
        chunking: ChunkingOptions,
        embedder: Arc<dyn EmbeddingClient>,
        store_root: PathBuf,
    ) -> Self {
        Self {
            chunking,
            embedder,
            store_root,
        }
    }

    /// Extract and chunk a single document.
    ///
    /// Returns an empty vector when the document yields no text. Identical chunks within the
    /// document are kept once.
    pub async fn process_document(&self, path: &Path) -> Result<Vec<Chunk>, IngestionError> {
        let source = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();
        let format = DocumentFormat::from_filename(&source)?;
        let text = extract::extract_text(path, format).await?;
        tracing::debug!(source = %source, chars = text.len(), ?format, "Extracted text");

        let chunk_size = self.chunking.effective_chunk_size();
        let pieces = chunking::Splitter::from_options(&self.chunking)?.split(&text);

        let mut seen = HashSet::new();
        let mut chunks = Vec::with_capacity(pieces.len());
        for piece in pieces {
            let trimmed = piece.trim();
            if trimmed.is_empty() {
                continue;
            }
            let chunk_hash = compute_chunk_hash(trimmed);
            if !seen.insert(chunk_hash.clone()) {
                continue;
            }
            chunks.push(Chunk {
                text: trimmed.to_string(),
                source: source.clone(),
                chunk_index: chunks.len(),
                chunk_hash,
            });
        }

        tracing::info!(
            source = %source,
            chunks = chunks.len(),
            chunk_size,
            overlap = self.chunking.overlap,
            "Document chunked"
        );
        Ok(chunks)
    }

    /// Embed `chunks` into a brand new store named `name`, replacing any persisted index.
    pub async fn create_vector_store(
        &self,
        chunks: Vec<Chunk>,
        name: &str,
    ) -> Result<VectorStore, IngestionError> {
        let records = self.embed_chunks(chunks).await?;
        let store = VectorStore::from_records(name, &self.store_root, records)?;
        store.save().await?;
        tracing::info!(store = name, records = store.len(), "Created vector store");
        Ok(store)
    }

    /// Append `chunks` to the persisted store `name`, skipping already-stored text.
    pub async fn add_documents_to_existing_store(
        &self,
        chunks: Vec<Chunk>,
        name: &str,
    ) -> Result<AppendSummary, IngestionError> {
        let mut store = VectorStore::load(&self.store_root, name).await?;
        let offered = chunks.len();
        let fresh: Vec<Chunk> = {
            let existing = store.chunk_hashes();
            chunks
                .into_iter()
                .filter(|chunk| !existing.contains(chunk.chunk_hash.as_str()))
                .collect()
        };
        let summary = AppendSummary {
            added: fresh.len(),
            skipped_duplicates: offered - fresh.len(),
        };

        if !fresh.is_empty() {
            let records = self.embed_chunks(fresh).await?;
            store.extend(records)?;
            store.save().await?;
        }

        tracing::info!(
            store = name,
            added = summary.added,
            skipped_duplicates = summary.skipped_duplicates,
            records = store.len(),
            "Updated vector store"
        );
        Ok(summary)
    }

    /// Load the persisted store `name`.
    pub async fn load_vector_store(&self, name: &str) -> Result<VectorStore, IngestionError> {
        Ok(VectorStore::load(&self.store_root, name).await?)
    }

    async fn embed_chunks(&self, chunks: Vec<Chunk>) -> Result<Vec<StoredChunk>, IngestionError> {
        let ingested_at = current_timestamp_rfc3339();
        let mut records = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(EMBEDDING_BATCH_SIZE) {
            let texts = batch.iter().map(|chunk| chunk.text.clone()).collect();
            let vectors = self.embedder.generate_embeddings(texts).await?;
            if vectors.len() != batch.len() {
                return Err(EmbeddingClientError::GenerationFailed(format!(
                    "expected {} embeddings, received {}",
                    batch.len(),
                    vectors.len()
                ))
                .into());
            }
            records.extend(batch.iter().zip(vectors).map(|(chunk, vector)| StoredChunk {
                id: Uuid::new_v4(),
                text: chunk.text.clone(),
                source: chunk.source.clone(),
                chunk_index: chunk.chunk_index,
                chunk_hash: chunk.chunk_hash.clone(),
                ingested_at: ingested_at.clone(),
                vector,
            }));
        }

        Ok(records)
    }
}

/// Compute a deterministic SHA-256 hash for the chunk text.
pub fn compute_chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingProvider;
    use crate::embedding::HashingEmbeddingClient;

    fn pipeline(root: &Path) -> DocumentIngestion {
        DocumentIngestion::new(
            ChunkingOptions {
                chunk_size: Some(8),
                overlap: 0,
                provider: EmbeddingProvider::Hash,
                model: String::new(),
            },
            Arc::new(HashingEmbeddingClient::new(32)),
            root.to_path_buf(),
        )
    }

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn process_document_chunks_and_tags_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "biology.txt",
            "Cells are the basic unit of life. Mitochondria produce energy for the cell. \
             Ribosomes assemble proteins from amino acids.",
        );

        let chunks = pipeline(dir.path()).process_document(&path).await.unwrap();
        assert!(chunks.len() > 1);
        for (index, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.source, "biology.txt");
            assert_eq!(chunk.chunk_index, index);
            assert_eq!(chunk.chunk_hash, compute_chunk_hash(&chunk.text));
            assert!(chunk.text.split_whitespace().count() <= 8);
        }
    }

    #[tokio::test]
    async fn process_document_returns_nothing_for_blank_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "empty.txt", "  \n\n ");
        let chunks = pipeline(dir.path()).process_document(&path).await.unwrap();
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn process_document_rejects_unsupported_formats() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "slides.docx", "irrelevant");
        let error = pipeline(dir.path())
            .process_document(&path)
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            IngestionError::Extraction(ExtractionError::UnsupportedFormat(_))
        ));
    }

    #[tokio::test]
    async fn append_skips_chunks_already_stored() {
        let dir = tempfile::tempdir().unwrap();
        let ingestion = pipeline(dir.path());
        let first = write(dir.path(), "a.txt", "Photosynthesis happens in chloroplasts.");
        let second = write(dir.path(), "b.txt", "Osmosis moves water across membranes.");

        let chunks = ingestion.process_document(&first).await.unwrap();
        let created = ingestion
            .create_vector_store(chunks.clone(), "materials")
            .await
            .unwrap();
        assert_eq!(created.len(), chunks.len());

        let repeat = ingestion
            .add_documents_to_existing_store(chunks.clone(), "materials")
            .await
            .unwrap();
        assert_eq!(repeat.added, 0);
        assert_eq!(repeat.skipped_duplicates, chunks.len());

        let more = ingestion.process_document(&second).await.unwrap();
        let appended = ingestion
            .add_documents_to_existing_store(more.clone(), "materials")
            .await
            .unwrap();
        assert_eq!(appended.added, more.len());

        let reloaded = ingestion.load_vector_store("materials").await.unwrap();
        assert_eq!(reloaded.len(), chunks.len() + more.len());
        assert_eq!(
            reloaded.sources().into_iter().collect::<Vec<_>>(),
            vec!["a.txt", "b.txt"]
        );
    }

    #[tokio::test]
    async fn append_requires_existing_store() {
        let dir = tempfile::tempdir().unwrap();
        let error = pipeline(dir.path())
            .add_documents_to_existing_store(Vec::new(), "missing")
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            IngestionError::VectorStore(VectorStoreError::NotFound(_))
        ));
    }
}
