use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_SERVER_PORT: u16 = 8000;
const DEFAULT_UPLOAD_DIR: &str = "data/uploads";
const DEFAULT_VECTOR_STORE_DIR: &str = "data/vector_store";
const DEFAULT_VECTOR_STORE_NAME: &str = "study_materials";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";
const DEFAULT_EMBEDDING_DIMENSION: usize = 384;
const DEFAULT_LLM_MODEL: &str = "llama3.2";
const DEFAULT_LLM_TEMPERATURE: f32 = 0.3;
const DEFAULT_CHUNK_OVERLAP: usize = 50;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the Study Assistant server.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Port the HTTP server binds to.
    pub server_port: u16,
    /// Directory receiving raw uploaded files.
    pub upload_dir: PathBuf,
    /// Parent directory of persisted vector stores.
    pub vector_store_dir: PathBuf,
    /// Name of the single vector store used by the server.
    pub vector_store_name: String,
    /// Base URL of the Ollama runtime.
    pub ollama_url: String,
    /// Embedding backend used to vectorize chunks and queries.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of vectors produced by the hashing encoder.
    pub embedding_dimension: usize,
    /// Generation model used for answers, summaries, and quizzes.
    pub llm_model: String,
    /// Sampling temperature for generation requests.
    pub llm_temperature: f32,
    /// Optional override for the automatic chunk size selection.
    pub text_splitter_chunk_size: Option<usize>,
    /// Token overlap between adjacent chunks.
    pub text_splitter_chunk_overlap: usize,
    /// Maximum accepted upload body size in bytes.
    pub max_upload_bytes: usize,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Deterministic in-process hashing encoder; needs no model server.
    Hash,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            server_port: parse_env_or("SERVER_PORT", DEFAULT_SERVER_PORT)?,
            upload_dir: load_env_optional("UPLOAD_DIR")
                .unwrap_or_else(|| DEFAULT_UPLOAD_DIR.to_string())
                .into(),
            vector_store_dir: load_env_optional("VECTOR_STORE_DIR")
                .unwrap_or_else(|| DEFAULT_VECTOR_STORE_DIR.to_string())
                .into(),
            vector_store_name: load_env_optional("VECTOR_STORE_NAME")
                .unwrap_or_else(|| DEFAULT_VECTOR_STORE_NAME.to_string()),
            ollama_url: load_env_optional("OLLAMA_URL")
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            embedding_provider: match load_env_optional("EMBEDDING_PROVIDER") {
                Some(value) => value.parse().map_err(|()| {
                    ConfigError::InvalidValue("EMBEDDING_PROVIDER".to_string())
                })?,
                None => EmbeddingProvider::Ollama,
            },
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            embedding_dimension: parse_env_or("EMBEDDING_DIMENSION", DEFAULT_EMBEDDING_DIMENSION)?,
            llm_model: load_env_optional("LLM_MODEL")
                .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            llm_temperature: parse_env_or("LLM_TEMPERATURE", DEFAULT_LLM_TEMPERATURE)?,
            text_splitter_chunk_size: load_env_optional("TEXT_SPLITTER_CHUNK_SIZE")
                .map(|value| {
                    value.parse().map_err(|_| {
                        ConfigError::InvalidValue("TEXT_SPLITTER_CHUNK_SIZE".to_string())
                    })
                })
                .transpose()?,
            text_splitter_chunk_overlap: parse_env_or(
                "TEXT_SPLITTER_CHUNK_OVERLAP",
                DEFAULT_CHUNK_OVERLAP,
            )?,
            max_upload_bytes: parse_env_or("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
        })
    }

    /// Directory holding the persisted index for the configured store name.
    pub fn vector_store_path(&self) -> PathBuf {
        self.vector_store_dir.join(&self.vector_store_name)
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match load_env_optional(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "hash" | "hashing" => Ok(Self::Hash),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        server_port = config.server_port,
        upload_dir = %config.upload_dir.display(),
        vector_store = %config.vector_store_path().display(),
        ollama_url = %config.ollama_url,
        embedding_provider = ?config.embedding_provider,
        llm_model = %config.llm_model,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
