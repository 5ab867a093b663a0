#![deny(missing_docs)]

//! Core library for the Study Assistant server: document upload, retrieval-augmented answers,
//! and quiz generation over a local vector index.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Text extraction, chunking, and vector store maintenance.
pub mod ingestion;
/// Text generation client abstraction and the Ollama adapter.
pub mod llm;
/// Structured logging and tracing setup.
pub mod logging;
/// Usage counters.
pub mod metrics;
mod ollama;
/// Quiz generation and grading.
pub mod quiz;
/// Retrieval-augmented answering, summaries, and definitions.
pub mod rag;
/// Upload, query, and reset orchestration shared by the HTTP surface.
pub mod service;
/// Active session holding the loaded index and its engines.
pub mod session;
/// File-backed vector store.
pub mod vector_store;
