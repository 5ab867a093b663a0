//! Retrieval-augmented answering over the active vector store.

mod prompts;

use crate::embedding::{EmbeddingClient, EmbeddingClientError};
use crate::llm::{GenerationRequest, LlmClient, LlmClientError};
use crate::vector_store::{ScoredChunk, VectorStore, VectorStoreError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

const EXCERPT_CHARS: usize = 200;
const DEFINITIONS_K: usize = 8;
const OVERVIEW_QUERY: &str = "main topics key concepts overview";

/// Errors raised while answering from the vector store.
#[derive(Debug, Error)]
pub enum RagError {
    /// Query could not be embedded.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// Similarity search failed.
    #[error(transparent)]
    VectorStore(#[from] VectorStoreError),
    /// Language model call failed.
    #[error(transparent)]
    Llm(#[from] LlmClientError),
    /// Embedding provider returned no vector for the query.
    #[error("Embedding provider returned no vector for the query")]
    EmptyEmbedding,
}

/// Summary flavors understood by [`RagEngine::summarize`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryType {
    /// Bullet-point digest.
    #[default]
    Bullets,
    /// Two or three sentences.
    Short,
    /// Structured long-form summary.
    Detailed,
    /// Explain like I'm fifteen.
    Eli15,
}

/// Reference to a retrieved chunk returned alongside generated text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRef {
    /// Filename the chunk came from.
    pub source: String,
    /// Position of the chunk within the file.
    pub chunk_index: usize,
    /// Cosine similarity to the query.
    pub score: f32,
    /// Leading characters of the chunk text.
    pub excerpt: String,
}

impl From<&ScoredChunk> for SourceRef {
    fn from(chunk: &ScoredChunk) -> Self {
        Self {
            source: chunk.source.clone(),
            chunk_index: chunk.chunk_index,
            score: chunk.score,
            excerpt: excerpt(&chunk.text, EXCERPT_CHARS),
        }
    }
}

/// Result of [`RagEngine::ask_question`].
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    /// Generated answer.
    pub answer: String,
    /// Chunks the answer was grounded on.
    pub sources: Vec<SourceRef>,
}

/// Result of [`RagEngine::summarize`].
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    /// Generated summary.
    pub summary: String,
    /// Flavor that was requested.
    pub summary_type: SummaryType,
    /// Optional focus topic.
    pub topic: Option<String>,
    /// Chunks the summary was built from.
    pub sources: Vec<SourceRef>,
}

/// Result of [`RagEngine::extract_definitions`].
#[derive(Debug, Clone, Serialize)]
pub struct Definitions {
    /// Generated `**Term**: definition` lines.
    pub definitions: String,
    /// Topic used for retrieval.
    pub topic: String,
    /// Chunks the definitions were extracted from.
    pub sources: Vec<SourceRef>,
}

/// Answers questions, summarizes, and extracts definitions from one vector store.
pub struct RagEngine {
    store: Arc<VectorStore>,
    embedder: Arc<dyn EmbeddingClient>,
    llm: Arc<dyn LlmClient>,
}

impl RagEngine {
    /// Bind an engine to a loaded store.
    pub fn new(
        store: Arc<VectorStore>,
        embedder: Arc<dyn EmbeddingClient>,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        Self {
            store,
            embedder,
            llm,
        }
    }

    /// Answer `question` from the `k` most relevant chunks.
    pub async fn ask_question(&self, question: &str, k: usize) -> Result<Answer, RagError> {
        let chunks = self.retrieve(question, k).await?;
        let prompt = prompts::answer_prompt(question, &prompts::format_context(&chunks));
        let answer = self.llm.generate(GenerationRequest::new(prompt)).await?;
        tracing::debug!(k, sources = chunks.len(), "Answered question");
        Ok(Answer {
            answer,
            sources: chunks.iter().map(SourceRef::from).collect(),
        })
    }

    /// Summarize the material, optionally focused on `topic`.
    pub async fn summarize(
        &self,
        topic: Option<&str>,
        summary_type: SummaryType,
        k: usize,
    ) -> Result<Summary, RagError> {
        let topic = topic.map(str::trim).filter(|topic| !topic.is_empty());
        let chunks = self.retrieve(topic.unwrap_or(OVERVIEW_QUERY), k).await?;
        let prompt =
            prompts::summary_prompt(summary_type, topic, &prompts::format_context(&chunks));
        let summary = self.llm.generate(GenerationRequest::new(prompt)).await?;
        Ok(Summary {
            summary,
            summary_type,
            topic: topic.map(str::to_string),
            sources: chunks.iter().map(SourceRef::from).collect(),
        })
    }

    /// Extract key terms and definitions related to `topic`.
    pub async fn extract_definitions(&self, topic: &str) -> Result<Definitions, RagError> {
        let chunks = self.retrieve(topic, DEFINITIONS_K).await?;
        let prompt = prompts::definitions_prompt(topic, &prompts::format_context(&chunks));
        let definitions = self
            .llm
            .generate(GenerationRequest::new(prompt).with_temperature(0.1))
            .await?;
        Ok(Definitions {
            definitions,
            topic: topic.to_string(),
            sources: chunks.iter().map(SourceRef::from).collect(),
        })
    }

    /// Embed `query` and return up to `k` chunks by descending similarity.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>, RagError> {
        retrieve(self.embedder.as_ref(), &self.store, query, k).await
    }
}

/// Shared retrieval step for the RAG and quiz engines.
pub(crate) async fn retrieve(
    embedder: &dyn EmbeddingClient,
    store: &VectorStore,
    query: &str,
    k: usize,
) -> Result<Vec<ScoredChunk>, RagError> {
    let mut vectors = embedder.generate_embeddings(vec![query.to_string()]).await?;
    let vector = vectors.pop().ok_or(RagError::EmptyEmbedding)?;
    let k = k.clamp(1, store.len().max(1));
    Ok(store.similarity_search(&vector, k)?)
}

/// First `max_chars` characters of `text`, with an ellipsis when truncated.
pub(crate) fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((offset, _)) => format!("{}...", &text[..offset]),
        None => text.to_string(),
    }
}
