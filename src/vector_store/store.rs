//! Named, file-backed vector index with brute-force cosine retrieval.

use super::types::{PersistedIndex, ScoredChunk, StoredChunk, VectorStoreError};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

const INDEX_FILE: &str = "index.json";
const INDEX_VERSION: u32 = 1;

/// In-memory view of a persisted vector store.
///
/// A store lives in its own directory (`<root>/<name>/index.json`). Mutations happen on an
/// owned copy and become visible to readers only after [`VectorStore::save`] and a reload, so
/// an `Arc<VectorStore>` handed to a query is never modified underneath it.
#[derive(Debug, Clone)]
pub struct VectorStore {
    name: String,
    dir: PathBuf,
    dimension: usize,
    records: Vec<StoredChunk>,
}

impl VectorStore {
    /// Build a store from freshly embedded chunks. Fails when `records` is empty or the vectors
    /// disagree on dimension.
    pub fn from_records(
        name: &str,
        root: &Path,
        records: Vec<StoredChunk>,
    ) -> Result<Self, VectorStoreError> {
        let dimension = records
            .first()
            .map(|record| record.vector.len())
            .ok_or(VectorStoreError::Empty)?;
        let mut store = Self {
            name: name.to_string(),
            dir: root.join(name),
            dimension,
            records: Vec::with_capacity(records.len()),
        };
        store.extend(records)?;
        Ok(store)
    }

    /// Directory holding the persisted index for `name` under `root`.
    pub fn directory(root: &Path, name: &str) -> PathBuf {
        root.join(name)
    }

    /// Whether a persisted index exists for `name` under `root`.
    pub async fn exists(root: &Path, name: &str) -> bool {
        tokio::fs::try_exists(Self::directory(root, name).join(INDEX_FILE))
            .await
            .unwrap_or(false)
    }

    /// Load a persisted store from disk.
    pub async fn load(root: &Path, name: &str) -> Result<Self, VectorStoreError> {
        let dir = Self::directory(root, name);
        let path = dir.join(INDEX_FILE);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Err(VectorStoreError::NotFound(path.display().to_string()));
            }
            Err(error) => return Err(VectorStoreError::io(&path, error)),
        };
        let persisted: PersistedIndex = serde_json::from_slice(&bytes)?;
        if let Some(record) = persisted
            .records
            .iter()
            .find(|record| record.vector.len() != persisted.dimension)
        {
            return Err(VectorStoreError::DimensionMismatch {
                expected: persisted.dimension,
                actual: record.vector.len(),
            });
        }
        tracing::debug!(
            store = %persisted.name,
            version = persisted.version,
            records = persisted.records.len(),
            "Loaded vector store"
        );
        Ok(Self {
            name: persisted.name,
            dir,
            dimension: persisted.dimension,
            records: persisted.records,
        })
    }

    /// Persist the store, replacing any previous index atomically.
    pub async fn save(&self) -> Result<(), VectorStoreError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|error| VectorStoreError::io(&self.dir, error))?;

        let persisted = PersistedIndex {
            version: INDEX_VERSION,
            name: self.name.clone(),
            dimension: self.dimension,
            records: self.records.clone(),
        };
        let bytes = serde_json::to_vec(&persisted)?;
        let target = self.dir.join(INDEX_FILE);
        let staging = self.dir.join(format!("{INDEX_FILE}.tmp"));
        tokio::fs::write(&staging, bytes)
            .await
            .map_err(|error| VectorStoreError::io(&staging, error))?;
        tokio::fs::rename(&staging, &target)
            .await
            .map_err(|error| VectorStoreError::io(&target, error))?;
        tracing::debug!(store = %self.name, records = self.records.len(), "Persisted vector store");
        Ok(())
    }

    /// Delete the persisted index directory for `name`, if any.
    pub async fn remove(root: &Path, name: &str) -> Result<bool, VectorStoreError> {
        let dir = Self::directory(root, name);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(error) => Err(VectorStoreError::io(&dir, error)),
        }
    }

    /// Append records, enforcing the store's dimension.
    pub fn extend(&mut self, records: Vec<StoredChunk>) -> Result<(), VectorStoreError> {
        if let Some(record) = records
            .iter()
            .find(|record| record.vector.len() != self.dimension)
        {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.dimension,
                actual: record.vector.len(),
            });
        }
        self.records.extend(records);
        Ok(())
    }

    /// Return the `k` most similar chunks in descending score order.
    pub fn similarity_search(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>, VectorStoreError> {
        if query.len() != self.dimension {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let query_norm = l2_norm(query);
        let mut scored: Vec<(f32, &StoredChunk)> = self
            .records
            .iter()
            .map(|record| (cosine(query, query_norm, &record.vector), record))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, record)| ScoredChunk {
                text: record.text.clone(),
                source: record.source.clone(),
                chunk_index: record.chunk_index,
                score,
            })
            .collect())
    }

    /// Hashes of every stored chunk.
    pub fn chunk_hashes(&self) -> HashSet<&str> {
        self.records
            .iter()
            .map(|record| record.chunk_hash.as_str())
            .collect()
    }

    /// Distinct source filenames present in the store.
    pub fn sources(&self) -> BTreeSet<&str> {
        self.records
            .iter()
            .map(|record| record.source.as_str())
            .collect()
    }

    /// Store name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Vector dimension shared by every record.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored chunks.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|value| value * value).sum::<f32>().sqrt()
}

fn cosine(query: &[f32], query_norm: f32, candidate: &[f32]) -> f32 {
    let candidate_norm = l2_norm(candidate);
    if query_norm == 0.0 || candidate_norm == 0.0 {
        return 0.0;
    }
    let dot: f32 = query.iter().zip(candidate).map(|(a, b)| a * b).sum();
    dot / (query_norm * candidate_norm)
}
