//! Embedding client abstraction with an Ollama adapter and an offline hashing encoder.

use crate::config::{Config, EmbeddingProvider};
use crate::ollama::{OllamaTransport, TransportError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider could not be reached.
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied chunk of text.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

/// Offline encoder using signed feature hashing of lower-cased words.
///
/// Retrieval quality is lexical at best, but it lets the server run without a model runtime.
pub struct HashingEmbeddingClient {
    dimension: usize,
}

impl HashingEmbeddingClient {
    /// Construct an encoder producing vectors of `dimension` components.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];
        let words = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty());
        for word in words {
            let hash = fnv1a(&word.to_lowercase());
            let slot = (hash % self.dimension as u64) as usize;
            vector[slot] += if hash >> 63 == 0 { 1.0 } else { -1.0 };
        }

        let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|value| *value /= norm);
        }
        vector
    }
}

fn fnv1a(word: &str) -> u64 {
    word.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

#[async_trait]
impl EmbeddingClient for HashingEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }

        Ok(texts
            .iter()
            .map(|text| self.encode(text))
            .collect())
    }
}

/// Embedding client backed by the Ollama `/api/embed` endpoint, which accepts a batch of inputs.
pub struct OllamaEmbeddingClient {
    transport: OllamaTransport,
    model: String,
}

impl OllamaEmbeddingClient {
    /// Build a client targeting `base_url` with the given embedding model.
    pub fn new(base_url: String, model: String) -> Result<Self, EmbeddingClientError> {
        let transport = OllamaTransport::new(&base_url, "embed").map_err(transport_error)?;
        Ok(Self { transport, model })
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

fn transport_error(error: TransportError) -> EmbeddingClientError {
    match error {
        TransportError::Status { .. } | TransportError::Decode(_) => {
            EmbeddingClientError::GenerationFailed(error.to_string())
        }
        _ => EmbeddingClientError::ProviderUnavailable(error.to_string()),
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }
        tracing::debug!(model = %self.model, inputs = texts.len(), "Requesting embeddings");

        let request = EmbedRequest {
            model: &self.model,
            input: &texts,
        };
        let reply: EmbedResponse = self
            .transport
            .post_json("/api/embed", &self.model, &request)
            .await
            .map_err(transport_error)?;

        if reply.embeddings.len() != texts.len() {
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "expected {} embeddings, received {}",
                texts.len(),
                reply.embeddings.len()
            )));
        }
        Ok(reply.embeddings)
    }
}

/// Build an embedding client suitable for the supplied configuration.
pub fn embedding_client_from_config(
    config: &Config,
) -> Result<Arc<dyn EmbeddingClient>, EmbeddingClientError> {
    match config.embedding_provider {
        EmbeddingProvider::Ollama => Ok(Arc::new(OllamaEmbeddingClient::new(
            config.ollama_url.clone(),
            config.embedding_model.clone(),
        )?)),
        EmbeddingProvider::Hash => Ok(Arc::new(HashingEmbeddingClient::new(
            config.embedding_dimension,
        ))),
    }
}
