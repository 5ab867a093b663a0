//! Study service coordinating uploads, the active session, and the query engines.

use crate::{
    config::Config,
    embedding::{EmbeddingClient, EmbeddingClientError, embedding_client_from_config},
    ingestion::{
        Chunk, ChunkingOptions, DocumentFormat, DocumentIngestion, IngestionError,
        extract::file_extension,
    },
    llm::{LlmClient, LlmClientError, llm_client_from_config},
    metrics::{MetricsSnapshot, UsageMetrics},
    quiz::{Difficulty, GradeReport, Quiz, QuizError, QuizQuestion},
    rag::{Answer, Definitions, RagError, Summary, SummaryType},
    session::{Session, SessionState},
    vector_store::{VectorStore, VectorStoreError},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use walkdir::WalkDir;

/// Largest quiz a single request may ask for.
pub const MAX_QUIZ_QUESTIONS: usize = 20;

/// Errors surfaced by [`StudyApi`] operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Uploaded file has an extension other than `.pdf` or `.txt`.
    #[error("Unsupported file type: {0}. Only .pdf and .txt are supported.")]
    UnsupportedFileType(String),
    /// Request parameters failed validation.
    #[error("{0}")]
    InvalidRequest(String),
    /// A query arrived before any document was indexed.
    #[error("No documents uploaded yet. Please upload documents first.")]
    NoDocuments,
    /// The uploaded document produced no chunks.
    #[error("Failed to extract content from document")]
    EmptyExtraction,
    /// Building or appending to the vector store failed.
    #[error("Failed to create/update vector store: {0}")]
    VectorStoreUpdate(#[source] IngestionError),
    /// Extraction or chunking failed.
    #[error(transparent)]
    Ingestion(#[from] IngestionError),
    /// Persisted index could not be removed.
    #[error(transparent)]
    VectorStore(#[from] VectorStoreError),
    /// Question answering, summarization, or definition extraction failed.
    #[error(transparent)]
    Rag(#[from] RagError),
    /// Quiz generation failed.
    #[error(transparent)]
    Quiz(#[from] QuizError),
    /// Embedding client could not be constructed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// Generation client could not be constructed.
    #[error(transparent)]
    Llm(#[from] LlmClientError),
    /// Filesystem access under the upload directory failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path involved in the failing operation.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Background task panicked or was cancelled.
    #[error("Background task failed: {0}")]
    TaskAborted(String),
}

impl ServiceError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Filesystem locations and endpoint details used by the service.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Directory receiving raw uploads.
    pub upload_dir: PathBuf,
    /// Parent directory of persisted vector stores.
    pub vector_store_dir: PathBuf,
    /// Name of the single active store.
    pub vector_store_name: String,
    /// Model server URL reported by the status endpoint.
    pub ollama_url: String,
}

impl ServiceSettings {
    /// Derive settings from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            upload_dir: config.upload_dir.clone(),
            vector_store_dir: config.vector_store_dir.clone(),
            vector_store_name: config.vector_store_name.clone(),
            ollama_url: config.ollama_url.clone(),
        }
    }
}

/// Snapshot reported by the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    /// Whether a session with indexed documents is active.
    pub documents_loaded: bool,
    /// Model server URL.
    pub ollama_url: String,
}

/// Counters returned after a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    /// Stored filename.
    pub filename: String,
    /// Chunks extracted from the document.
    pub chunks_created: usize,
    /// Chunks skipped because identical text was already indexed.
    pub skipped_duplicates: usize,
}

/// Abstraction over the study workflow used by the HTTP surface.
#[async_trait]
pub trait StudyApi: Send + Sync {
    /// Service liveness and whether documents are loaded.
    async fn status(&self) -> ServiceStatus;

    /// Persist an uploaded file, index it, and activate a fresh session.
    async fn upload(&self, filename: &str, bytes: &[u8]) -> Result<UploadOutcome, ServiceError>;

    /// Answer a question from the `k` most relevant chunks.
    async fn ask(&self, question: &str, k: usize) -> Result<Answer, ServiceError>;

    /// Summarize the material, optionally focused on a topic.
    async fn summarize(
        &self,
        topic: Option<&str>,
        summary_type: SummaryType,
        k: usize,
    ) -> Result<Summary, ServiceError>;

    /// Extract key terms and definitions.
    async fn definitions(&self, topic: &str) -> Result<Definitions, ServiceError>;

    /// Generate a multiple-choice quiz.
    async fn generate_quiz(
        &self,
        topic: &str,
        num_questions: usize,
        difficulty: Difficulty,
    ) -> Result<Quiz, ServiceError>;

    /// Grade submitted answers (question index to letter).
    async fn grade_quiz(
        &self,
        questions: &[QuizQuestion],
        user_answers: &HashMap<usize, String>,
    ) -> Result<GradeReport, ServiceError>;

    /// Sorted filenames present in the upload directory.
    async fn list_documents(&self) -> Result<Vec<String>, ServiceError>;

    /// Delete uploads and the persisted index, then clear the session.
    async fn reset(&self) -> Result<(), ServiceError>;

    /// Process-lifetime usage counters.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Owns the ingestion pipeline, model clients, and the active session.
///
/// Construct once at startup and share through an `Arc`; every handler works against the same
/// [`SessionState`].
pub struct StudyService {
    settings: ServiceSettings,
    ingestion: DocumentIngestion,
    embedder: Arc<dyn EmbeddingClient>,
    llm: Arc<dyn LlmClient>,
    session: SessionState,
    metrics: UsageMetrics,
}

impl StudyService {
    /// Assemble a service from explicit collaborators.
    pub fn new(
        settings: ServiceSettings,
        chunking: ChunkingOptions,
        embedder: Arc<dyn EmbeddingClient>,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        let ingestion = DocumentIngestion::new(
            chunking,
            embedder.clone(),
            settings.vector_store_dir.clone(),
        );
        Self {
            settings,
            ingestion,
            embedder,
            llm,
            session: SessionState::new(),
            metrics: UsageMetrics::new(),
        }
    }

    /// Build clients from `config` and restore any persisted index.
    pub async fn from_config(config: &Config) -> Result<Self, ServiceError> {
        tracing::info!(provider = ?config.embedding_provider, "Initializing embedding client");
        let embedder = embedding_client_from_config(config)?;
        let llm = llm_client_from_config(config)?;
        tracing::info!(model = llm.model_name(), "Generation client initialized");

        let chunking = ChunkingOptions {
            chunk_size: config.text_splitter_chunk_size,
            overlap: config.text_splitter_chunk_overlap,
            provider: config.embedding_provider,
            model: config.embedding_model.clone(),
        };
        let service = Self::new(ServiceSettings::from_config(config), chunking, embedder, llm);
        service.restore_session().await;
        Ok(service)
    }

    /// Load the persisted index, if present, and make it the active session.
    ///
    /// A missing or unreadable index leaves the service without a session.
    pub async fn restore_session(&self) -> bool {
        let name = &self.settings.vector_store_name;
        if !VectorStore::exists(&self.settings.vector_store_dir, name).await {
            tracing::debug!(store = %name, "No persisted index to restore");
            return false;
        }
        match self.ingestion.load_vector_store(name).await {
            Ok(store) if !store.is_empty() => {
                tracing::info!(
                    store = store.name(),
                    dimension = store.dimension(),
                    records = store.len(),
                    documents = store.sources().len(),
                    "Restored persisted index"
                );
                self.session.install(self.new_session(store)).await;
                true
            }
            Ok(_) => false,
            Err(error) => {
                tracing::warn!(store = %name, error = %error, "Ignoring unreadable persisted index");
                false
            }
        }
    }

    fn new_session(&self, store: VectorStore) -> Session {
        Session::new(store, self.embedder.clone(), self.llm.clone())
    }

    async fn active_session(&self) -> Result<Arc<Session>, ServiceError> {
        self.session.snapshot().await.ok_or(ServiceError::NoDocuments)
    }

    async fn build_or_extend_store(
        &self,
        chunks: Vec<Chunk>,
    ) -> Result<(VectorStore, usize), IngestionError> {
        let name = &self.settings.vector_store_name;
        if self.session.is_active().await {
            let summary = self
                .ingestion
                .add_documents_to_existing_store(chunks, name)
                .await?;
            let store = self.ingestion.load_vector_store(name).await?;
            Ok((store, summary.skipped_duplicates))
        } else {
            let store = self.ingestion.create_vector_store(chunks, name).await?;
            Ok((store, 0))
        }
    }
}

#[async_trait]
impl StudyApi for StudyService {
    async fn status(&self) -> ServiceStatus {
        ServiceStatus {
            documents_loaded: self.session.is_active().await,
            ollama_url: self.settings.ollama_url.clone(),
        }
    }

    async fn upload(&self, filename: &str, bytes: &[u8]) -> Result<UploadOutcome, ServiceError> {
        let filename = stored_filename(filename)?;
        DocumentFormat::from_filename(&filename)
            .map_err(|_| ServiceError::UnsupportedFileType(file_extension(&filename)))?;

        let _guard = self.session.begin_write().await;
        let upload_dir = &self.settings.upload_dir;
        tokio::fs::create_dir_all(upload_dir)
            .await
            .map_err(|error| ServiceError::io(upload_dir, error))?;
        let path = upload_dir.join(&filename);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|error| ServiceError::io(&path, error))?;
        tracing::info!(filename = %filename, bytes = bytes.len(), "Stored upload");

        let chunks = self.ingestion.process_document(&path).await?;
        if chunks.is_empty() {
            tracing::warn!(filename = %filename, "Upload produced no text");
            return Err(ServiceError::EmptyExtraction);
        }
        let chunks_created = chunks.len();

        let (store, skipped_duplicates) = self
            .build_or_extend_store(chunks)
            .await
            .map_err(ServiceError::VectorStoreUpdate)?;
        let records = store.len();
        self.session.install(self.new_session(store)).await;
        self.metrics.record_upload(chunks_created as u64);

        tracing::info!(
            filename = %filename,
            chunks_created,
            skipped_duplicates,
            records,
            "Document indexed"
        );
        Ok(UploadOutcome {
            filename,
            chunks_created,
            skipped_duplicates,
        })
    }

    async fn ask(&self, question: &str, k: usize) -> Result<Answer, ServiceError> {
        let session = self.active_session().await?;
        ensure_k(k)?;
        let answer = session.rag().ask_question(question, k).await?;
        self.metrics.record_question();
        Ok(answer)
    }

    async fn summarize(
        &self,
        topic: Option<&str>,
        summary_type: SummaryType,
        k: usize,
    ) -> Result<Summary, ServiceError> {
        let session = self.active_session().await?;
        ensure_k(k)?;
        Ok(session.rag().summarize(topic, summary_type, k).await?)
    }

    async fn definitions(&self, topic: &str) -> Result<Definitions, ServiceError> {
        let session = self.active_session().await?;
        Ok(session.rag().extract_definitions(topic).await?)
    }

    async fn generate_quiz(
        &self,
        topic: &str,
        num_questions: usize,
        difficulty: Difficulty,
    ) -> Result<Quiz, ServiceError> {
        let session = self.active_session().await?;
        if !(1..=MAX_QUIZ_QUESTIONS).contains(&num_questions) {
            return Err(ServiceError::InvalidRequest(format!(
                "num_questions must be between 1 and {MAX_QUIZ_QUESTIONS}"
            )));
        }
        let quiz = session
            .quiz()
            .generate_quiz(topic, num_questions, difficulty)
            .await?;
        self.metrics.record_quiz_generated();
        Ok(quiz)
    }

    async fn grade_quiz(
        &self,
        questions: &[QuizQuestion],
        user_answers: &HashMap<usize, String>,
    ) -> Result<GradeReport, ServiceError> {
        let session = self.active_session().await?;
        let report = session.quiz().grade_quiz(questions, user_answers);
        self.metrics.record_quiz_graded();
        tracing::debug!(
            correct = report.correct,
            total = report.total,
            score = report.score,
            "Graded quiz"
        );
        Ok(report)
    }

    async fn list_documents(&self) -> Result<Vec<String>, ServiceError> {
        let dir = self.settings.upload_dir.clone();
        tokio::task::spawn_blocking(move || list_files(&dir))
            .await
            .map_err(|error| ServiceError::TaskAborted(error.to_string()))?
    }

    async fn reset(&self) -> Result<(), ServiceError> {
        let _guard = self.session.begin_write().await;
        let removed_files = clear_directory(&self.settings.upload_dir).await?;
        let removed_index =
            VectorStore::remove(&self.settings.vector_store_dir, &self.settings.vector_store_name)
                .await?;
        self.session.clear().await;
        tracing::info!(removed_files, removed_index, "System reset");
        Ok(())
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

/// Keep only the final path component of a client-supplied filename.
fn stored_filename(raw: &str) -> Result<String, ServiceError> {
    let name = raw
        .rsplit(['/', '\\'])
        .next()
        .map(str::trim)
        .unwrap_or_default();
    if name.is_empty() || name == "." || name == ".." {
        return Err(ServiceError::InvalidRequest("No file provided".into()));
    }
    Ok(name.to_string())
}

fn ensure_k(k: usize) -> Result<(), ServiceError> {
    if k == 0 {
        return Err(ServiceError::InvalidRequest("k must be at least 1".into()));
    }
    Ok(())
}

fn list_files(dir: &Path) -> Result<Vec<String>, ServiceError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|error| {
            let path = error.path().unwrap_or(dir).to_path_buf();
            let source = error
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("directory walk failed"));
            ServiceError::io(&path, source)
        })?;
        if entry.file_type().is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

/// Remove every entry inside `dir`, leaving the directory itself. Returns the number removed.
async fn clear_directory(dir: &Path) -> Result<usize, ServiceError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(error) => return Err(ServiceError::io(dir, error)),
    };
    let mut removed = 0;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|error| ServiceError::io(dir, error))?
    {
        let path = entry.path();
        let file_type = entry
            .file_type()
            .await
            .map_err(|error| ServiceError::io(&path, error))?;
        let result = if file_type.is_dir() {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        result.map_err(|error| ServiceError::io(&path, error))?;
        removed += 1;
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingProvider;
    use crate::embedding::HashingEmbeddingClient;
    use crate::llm::GenerationRequest;

    struct CannedLlm;

    #[async_trait]
    impl LlmClient for CannedLlm {
        async fn generate(&self, _request: GenerationRequest) -> Result<String, LlmClientError> {
            Ok("canned".into())
        }

        fn model_name(&self) -> &str {
            "canned"
        }
    }

    fn service(root: &Path) -> StudyService {
        StudyService::new(
            ServiceSettings {
                upload_dir: root.join("uploads"),
                vector_store_dir: root.join("stores"),
                vector_store_name: "materials".into(),
                ollama_url: "http://localhost:11434".into(),
            },
            ChunkingOptions {
                chunk_size: Some(16),
                overlap: 0,
                provider: EmbeddingProvider::Hash,
                model: String::new(),
            },
            Arc::new(HashingEmbeddingClient::new(32)),
            Arc::new(CannedLlm),
        )
    }

    #[tokio::test]
    async fn unsupported_upload_never_touches_disk() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());

        let error = service.upload("notes.DOCX", b"data").await.unwrap_err();
        assert_eq!(
            error.to_string(),
            "Unsupported file type: .docx. Only .pdf and .txt are supported."
        );
        assert!(!dir.path().join("uploads").exists());
    }

    #[tokio::test]
    async fn upload_strips_directories_and_activates_session() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        assert!(!service.status().await.documents_loaded);

        let outcome = service
            .upload("../../etc/biology.txt", b"Cells divide by mitosis.")
            .await
            .unwrap();
        assert_eq!(outcome.filename, "biology.txt");
        assert_eq!(outcome.chunks_created, 1);
        assert!(dir.path().join("uploads/biology.txt").exists());
        assert!(service.status().await.documents_loaded);
        assert_eq!(service.metrics_snapshot().documents_uploaded, 1);
    }

    #[tokio::test]
    async fn blank_upload_is_an_extraction_failure() {
        let dir = tempfile::tempdir().unwrap();
        let error = service(dir.path())
            .upload("blank.txt", b"   \n")
            .await
            .unwrap_err();
        assert!(matches!(error, ServiceError::EmptyExtraction));
    }

    #[tokio::test]
    async fn queries_require_documents_and_valid_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        assert!(matches!(
            service.ask("anything", 5).await.unwrap_err(),
            ServiceError::NoDocuments
        ));

        service
            .upload("notes.txt", b"Photosynthesis converts light.")
            .await
            .unwrap();
        assert!(matches!(
            service.ask("anything", 0).await.unwrap_err(),
            ServiceError::InvalidRequest(_)
        ));
        assert!(matches!(
            service
                .generate_quiz("light", 21, Difficulty::Medium)
                .await
                .unwrap_err(),
            ServiceError::InvalidRequest(_)
        ));
        assert_eq!(service.ask("light?", 5).await.unwrap().answer, "canned");
    }

    #[tokio::test]
    async fn list_documents_handles_missing_directory_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        assert!(service.list_documents().await.unwrap().is_empty());

        std::fs::create_dir_all(dir.path().join("uploads/nested")).unwrap();
        std::fs::write(dir.path().join("uploads/b.txt"), "b").unwrap();
        std::fs::write(dir.path().join("uploads/a.pdf"), "a").unwrap();
        assert_eq!(service.list_documents().await.unwrap(), vec!["a.pdf", "b.txt"]);
    }

    #[tokio::test]
    async fn reset_clears_uploads_index_and_session() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        service
            .upload("notes.txt", b"Osmosis moves water.")
            .await
            .unwrap();

        service.reset().await.unwrap();
        assert!(service.list_documents().await.unwrap().is_empty());
        assert!(!VectorStore::exists(&dir.path().join("stores"), "materials").await);
        assert!(!service.status().await.documents_loaded);

        service.reset().await.unwrap();
    }

    #[tokio::test]
    async fn restore_session_picks_up_persisted_index() {
        let dir = tempfile::tempdir().unwrap();
        service(dir.path())
            .upload("notes.txt", b"Enzymes speed up reactions.")
            .await
            .unwrap();

        let restarted = service(dir.path());
        assert!(restarted.restore_session().await);
        assert!(restarted.status().await.documents_loaded);
    }

    #[tokio::test]
    async fn restore_session_ignores_corrupt_index() {
        let dir = tempfile::tempdir().unwrap();
        let store_dir = dir.path().join("stores/materials");
        std::fs::create_dir_all(&store_dir).unwrap();
        std::fs::write(store_dir.join("index.json"), "{not json").unwrap();

        let service = service(dir.path());
        assert!(!service.restore_session().await);
        assert!(!service.status().await.documents_loaded);
    }

    #[test]
    fn stored_filename_rejects_empty_names() {
        assert_eq!(stored_filename("dir\\a.txt").unwrap(), "a.txt");
        assert!(stored_filename("uploads/").is_err());
        assert!(stored_filename("..").is_err());
    }
}
