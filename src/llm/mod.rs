//! Text generation clients used by the RAG and quiz engines.
//!
//! The Ollama-backed client calls `/api/generate` with streaming disabled, so each request
//! yields exactly one completion.

use crate::config::Config;
use crate::ollama::{OllamaTransport, TransportError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced while generating text.
#[derive(Debug, Error)]
pub enum LlmClientError {
    /// Provider was unreachable or the model is missing.
    #[error("LLM provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate text: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Request payload passed to the generation provider.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Fully assembled prompt.
    pub prompt: String,
    /// Optional per-request temperature override.
    pub temperature: Option<f32>,
}

impl GenerationRequest {
    /// Build a request using the client's default temperature.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            temperature: None,
        }
    }

    /// Override the sampling temperature for this request.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Interface implemented by text generation providers.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a completion for the supplied prompt.
    async fn generate(&self, request: GenerationRequest) -> Result<String, LlmClientError>;

    /// Identifier of the model answering requests.
    fn model_name(&self) -> &str;
}

/// Build the generation client for the supplied configuration.
pub fn llm_client_from_config(config: &Config) -> Result<Arc<dyn LlmClient>, LlmClientError> {
    Ok(Arc::new(OllamaLlmClient::new(
        config.ollama_url.clone(),
        config.llm_model.clone(),
        config.llm_temperature,
    )?))
}

/// Generation client backed by a local Ollama runtime.
pub struct OllamaLlmClient {
    transport: OllamaTransport,
    model: String,
    temperature: f32,
}

impl OllamaLlmClient {
    /// Build a client targeting `base_url` with the given model and default temperature.
    pub fn new(base_url: String, model: String, temperature: f32) -> Result<Self, LlmClientError> {
        let transport = OllamaTransport::new(&base_url, "generate").map_err(transport_error)?;
        Ok(Self {
            transport,
            model,
            temperature,
        })
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
    done: bool,
}

fn transport_error(error: TransportError) -> LlmClientError {
    match error {
        TransportError::Status { .. } => LlmClientError::GenerationFailed(error.to_string()),
        TransportError::Decode(_) => LlmClientError::InvalidResponse(error.to_string()),
        _ => LlmClientError::ProviderUnavailable(error.to_string()),
    }
}

#[async_trait]
impl LlmClient for OllamaLlmClient {
    async fn generate(&self, request: GenerationRequest) -> Result<String, LlmClientError> {
        let temperature = request.temperature.unwrap_or(self.temperature);
        tracing::debug!(
            model = %self.model,
            temperature,
            prompt_chars = request.prompt.len(),
            "Requesting completion"
        );

        let body = GenerateRequest {
            model: &self.model,
            prompt: &request.prompt,
            stream: false,
            options: GenerateOptions { temperature },
        };
        let reply: GenerateResponse = self
            .transport
            .post_json("/api/generate", &self.model, &body)
            .await
            .map_err(transport_error)?;

        // stream=false must yield a single finished message
        if !reply.done {
            return Err(LlmClientError::InvalidResponse(
                "Ollama returned an unfinished completion".into(),
            ));
        }
        Ok(reply.response.trim().to_string())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;

    fn client_for(server: &MockServer) -> OllamaLlmClient {
        OllamaLlmClient::new(server.base_url(), "llama3.2".into(), 0.3).expect("client")
    }

    #[tokio::test]
    async fn ollama_client_handles_successful_response() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/generate")
                    .json_body_partial(r#"{"model":"llama3.2","stream":false}"#);
                then.status(200).json_body(json!({
                    "response": "  Answer text \n",
                    "done": true
                }));
            })
            .await;

        let text = client_for(&server)
            .generate(GenerationRequest::new("Explain"))
            .await
            .expect("completion");

        mock.assert();
        assert_eq!(text, "Answer text");
    }

    #[tokio::test]
    async fn ollama_client_forwards_temperature_override() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/generate")
                    .json_body_partial(r#"{"options":{"temperature":0.5}}"#);
                then.status(200)
                    .json_body(json!({ "response": "ok", "done": true }));
            })
            .await;

        client_for(&server)
            .generate(GenerationRequest::new("Quiz me").with_temperature(0.5))
            .await
            .expect("completion");
        mock.assert();
    }

    #[tokio::test]
    async fn ollama_client_handles_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(500).body("boom");
            })
            .await;

        let error = client_for(&server)
            .generate(GenerationRequest::new("Explain"))
            .await
            .expect_err("error response");

        assert!(
            matches!(error, LlmClientError::GenerationFailed(ref message) if message.contains("500"))
        );
    }

    #[tokio::test]
    async fn ollama_client_rejects_incomplete_response() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(200)
                    .json_body(json!({ "response": "partial", "done": false }));
            })
            .await;

        let error = client_for(&server)
            .generate(GenerationRequest::new("Explain"))
            .await
            .expect_err("incomplete");
        assert!(matches!(error, LlmClientError::InvalidResponse(_)));
    }
}
