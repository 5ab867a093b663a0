//! Shared HTTP transport for the Ollama runtime, used by the embedding and generation clients.

use reqwest::{Client, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

/// Failures talking to Ollama, before they are mapped into a client-specific error.
#[derive(Debug, Error)]
pub(crate) enum TransportError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),
    #[error("failed to reach Ollama at {url}: {detail}")]
    Unreachable { url: String, detail: String },
    #[error("Ollama returned 404 for model '{model}' (is it pulled?): {body}")]
    ModelMissing { model: String, body: String },
    #[error("Ollama returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("failed to decode Ollama response: {0}")]
    Decode(String),
}

/// Connection to one Ollama base URL.
pub(crate) struct OllamaTransport {
    http: Client,
    base_url: String,
}

impl OllamaTransport {
    pub(crate) fn new(base_url: &str, agent: &str) -> Result<Self, TransportError> {
        let http = Client::builder()
            .user_agent(format!("study-assistant/{agent}"))
            .build()
            .map_err(|error| TransportError::Client(error.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// POST `body` as JSON to `path` and decode the JSON reply.
    pub(crate) async fn post_json<B, R>(
        &self,
        path: &str,
        model: &str,
        body: &B,
    ) -> Result<R, TransportError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|error| TransportError::Unreachable {
                url: self.base_url.clone(),
                detail: error.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(if status == StatusCode::NOT_FOUND {
                TransportError::ModelMissing {
                    model: model.to_string(),
                    body,
                }
            } else {
                TransportError::Status { status, body }
            });
        }

        response
            .json()
            .await
            .map_err(|error| TransportError::Decode(error.to_string()))
    }
}
