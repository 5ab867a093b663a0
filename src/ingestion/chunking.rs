//! Token-budgeted splitting of extracted document text.
//!
//! `semchunk-rs` finds semantic boundaries (paragraphs, sentences, words) under a token budget;
//! a word-level overlap is then carried from each chunk into the next. Budgets are measured
//! with a `tiktoken-rs` encoding for Ollama models and with whitespace words for the hashing
//! encoder.

use crate::config::EmbeddingProvider;
use semchunk_rs::Chunker;
use std::sync::Arc;
use thiserror::Error;
use tiktoken_rs::CoreBPE;

const MIN_AUTOMATIC_CHUNK_SIZE: usize = 128;
const MAX_AUTOMATIC_CHUNK_SIZE: usize = 1024;
const HASH_ENCODER_WINDOW: usize = 2048;
const DEFAULT_OLLAMA_WINDOW: usize = 2048;

/// Context windows of common Ollama embedding models, matched by name prefix.
const OLLAMA_CONTEXT_WINDOWS: &[(&str, usize)] = &[
    ("nomic-embed-text", 8192),
    ("bge-m3", 8192),
    ("mxbai-embed-large", 512),
    ("snowflake-arctic-embed", 512),
    ("all-minilm", 256),
];

/// Errors produced while splitting text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// A zero token budget was requested.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// No tokenizer could be loaded for the embedding model.
    #[error("failed to initialize tokenizer for model '{model}': {source}")]
    Tokenizer {
        /// Embedding model the tokenizer was requested for.
        model: String,
        /// Error reported by `tiktoken-rs`.
        #[source]
        source: anyhow::Error,
    },
}

/// Chunking parameters resolved from configuration.
#[derive(Debug, Clone)]
pub struct ChunkingOptions {
    /// Explicit token budget per chunk; derived from the model when absent.
    pub chunk_size: Option<usize>,
    /// Tokens carried over from the end of one chunk into the next.
    pub overlap: usize,
    /// Embedding backend the chunks are destined for.
    pub provider: EmbeddingProvider,
    /// Embedding model identifier.
    pub model: String,
}

impl ChunkingOptions {
    /// Token budget per chunk: the explicit override, or a quarter of the model's context window
    /// clamped into `[128, 1024]`.
    pub fn effective_chunk_size(&self) -> usize {
        match self.chunk_size {
            Some(explicit) => explicit,
            None => (context_window(self.provider, &self.model) / 4)
                .clamp(MIN_AUTOMATIC_CHUNK_SIZE, MAX_AUTOMATIC_CHUNK_SIZE),
        }
    }
}

fn context_window(provider: EmbeddingProvider, model: &str) -> usize {
    match provider {
        EmbeddingProvider::Hash => HASH_ENCODER_WINDOW,
        EmbeddingProvider::Ollama => {
            let name = model.trim().to_lowercase();
            OLLAMA_CONTEXT_WINDOWS
                .iter()
                .find(|(prefix, _)| name.starts_with(prefix))
                .map(|(_, window)| *window)
                .unwrap_or_else(|| {
                    tracing::trace!(model, "Unknown embedding model; assuming default window");
                    DEFAULT_OLLAMA_WINDOW
                })
        }
    }
}

/// Measures text in the units a chunk budget is expressed in.
#[derive(Clone)]
pub(crate) enum Tokenizer {
    /// Whitespace-separated words.
    Words,
    /// Byte-pair encoding tokens.
    Bpe(Arc<CoreBPE>),
}

impl Tokenizer {
    /// Tokenizer for `provider`. Ollama models without a known encoding are measured with
    /// `cl100k_base`, and with whitespace words if even that fails to load.
    pub(crate) fn for_provider(provider: EmbeddingProvider, model: &str) -> Self {
        match provider {
            EmbeddingProvider::Hash => Self::Words,
            EmbeddingProvider::Ollama => match load_bpe(model) {
                Ok(bpe) => Self::Bpe(Arc::new(bpe)),
                Err(error) => {
                    tracing::warn!(
                        model,
                        error = %error,
                        "Tokenizer unavailable; measuring chunks in words"
                    );
                    Self::Words
                }
            },
        }
    }

    pub(crate) fn count(&self, text: &str) -> usize {
        match self {
            Self::Words => text.split_whitespace().count(),
            Self::Bpe(bpe) => bpe.encode_ordinary(text).len(),
        }
    }
}

fn load_bpe(model: &str) -> Result<CoreBPE, ChunkingError> {
    let model = model.trim();
    tiktoken_rs::get_bpe_from_model(model)
        .or_else(|_| tiktoken_rs::cl100k_base())
        .map_err(|source| ChunkingError::Tokenizer {
            model: model.to_string(),
            source,
        })
}

/// Splits text into overlapping chunks of at most `chunk_size` tokens.
pub(crate) struct Splitter {
    chunk_size: usize,
    overlap: usize,
    tokenizer: Tokenizer,
}

impl Splitter {
    pub(crate) fn new(
        chunk_size: usize,
        overlap: usize,
        tokenizer: Tokenizer,
    ) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        Ok(Self {
            chunk_size,
            overlap: overlap.min(chunk_size - 1),
            tokenizer,
        })
    }

    pub(crate) fn from_options(options: &ChunkingOptions) -> Result<Self, ChunkingError> {
        Self::new(
            options.effective_chunk_size(),
            options.overlap,
            Tokenizer::for_provider(options.provider, &options.model),
        )
    }

    /// Split `text`; whitespace-only input yields no chunks.
    pub(crate) fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let tokenizer = self.tokenizer.clone();
        let chunker = Chunker::new(
            self.chunk_size,
            Box::new(move |segment: &str| tokenizer.count(segment)),
        );
        let pieces = chunker.chunk(text);
        if self.overlap == 0 {
            return pieces;
        }

        let mut chunks = Vec::with_capacity(pieces.len());
        for (index, piece) in pieces.iter().enumerate() {
            let chunk = match index.checked_sub(1).map(|prior| pieces[prior].as_str()) {
                Some(previous) => self.with_carry(previous, piece),
                None => piece.clone(),
            };
            chunks.push(chunk);
        }
        chunks
    }

    /// Prefix `current` with trailing words of `previous`, staying within both budgets.
    fn with_carry(&self, previous: &str, current: &str) -> String {
        let words: Vec<&str> = previous.split_whitespace().collect();
        let mut start = words.len();
        while start > 0 && self.tokenizer.count(&words[start - 1..].join(" ")) <= self.overlap {
            start -= 1;
        }

        while start < words.len() {
            let candidate = format!("{} {}", words[start..].join(" "), current.trim_start());
            if self.tokenizer.count(&candidate) <= self.chunk_size {
                return candidate;
            }
            start += 1;
        }
        current.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(provider: EmbeddingProvider, model: &str, chunk_size: Option<usize>) -> ChunkingOptions {
        ChunkingOptions {
            chunk_size,
            overlap: 0,
            provider,
            model: model.to_string(),
        }
    }

    #[test]
    fn splits_on_word_budget() {
        let splitter = Splitter::new(2, 0, Tokenizer::Words).unwrap();
        assert_eq!(
            splitter.split("one two three four five"),
            vec!["one two", "three four", "five"]
        );
    }

    #[test]
    fn carries_trailing_words_into_next_chunk() {
        let splitter = Splitter::new(3, 1, Tokenizer::Words).unwrap();
        let chunks = splitter.split("one two three four five");
        assert_eq!(chunks, vec!["one two three", "three four five"]);
        assert!(chunks.iter().all(|chunk| Tokenizer::Words.count(chunk) <= 3));
    }

    #[test]
    fn overlap_is_dropped_when_next_chunk_is_full() {
        let splitter = Splitter::new(2, 1, Tokenizer::Words).unwrap();
        assert_eq!(splitter.with_carry("alpha beta", "gamma delta"), "gamma delta");
        assert_eq!(splitter.with_carry("alpha beta", "gamma"), "beta gamma");
    }

    #[test]
    fn whitespace_input_yields_nothing() {
        let splitter = Splitter::new(4, 0, Tokenizer::Words).unwrap();
        assert!(splitter.split("   \n ").is_empty());
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        assert!(matches!(
            Splitter::new(0, 0, Tokenizer::Words),
            Err(ChunkingError::InvalidChunkSize)
        ));
        let zero = options(EmbeddingProvider::Hash, "", Some(0));
        assert!(Splitter::from_options(&zero).is_err());
    }

    #[test]
    fn bpe_budget_is_respected_and_words_preserved() {
        let text = "The quick brown fox jumps over the lazy dog.";
        let tokenizer = Tokenizer::for_provider(EmbeddingProvider::Ollama, "nomic-embed-text");
        assert!(matches!(tokenizer, Tokenizer::Bpe(_)));

        let chunks = Splitter::new(5, 0, tokenizer.clone()).unwrap().split(text);
        assert!(chunks.iter().all(|chunk| tokenizer.count(chunk) <= 5));
        let words: Vec<&str> = chunks.iter().flat_map(|c| c.split_whitespace()).collect();
        assert_eq!(words, text.split_whitespace().collect::<Vec<_>>());
    }

    #[test]
    fn automatic_size_follows_model_window() {
        let size = |provider, model| options(provider, model, None).effective_chunk_size();
        assert_eq!(size(EmbeddingProvider::Ollama, "nomic-embed-text:latest"), 1024);
        assert_eq!(size(EmbeddingProvider::Ollama, "all-minilm"), 128);
        assert_eq!(size(EmbeddingProvider::Ollama, "custom-embedder"), 512);
        assert_eq!(size(EmbeddingProvider::Hash, ""), 512);
        assert_eq!(
            options(EmbeddingProvider::Ollama, "bge-m3", Some(42)).effective_chunk_size(),
            42
        );
    }
}
