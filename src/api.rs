//! HTTP surface for the Study Assistant.
//!
//! - `GET /` – Liveness, whether documents are loaded, and the endpoint catalog.
//! - `POST /upload` – Multipart upload (field `file`) of a `.pdf` or `.txt` document; the file
//!   is stored, chunked, embedded, and becomes part of the active session.
//! - `POST /ask` – Answer a question from the most relevant chunks.
//! - `POST /summarize` – Summarize the material (`bullets`, `short`, `detailed`, `eli15`).
//! - `POST /definitions` – Extract key terms for the `topic` query parameter.
//! - `POST /quiz/generate` / `POST /quiz/grade` – Multiple-choice quizzes.
//! - `GET /documents` – Uploaded filenames.
//! - `DELETE /reset` – Remove uploads and the index.
//! - `GET /metrics` – Usage counters.
//!
//! Failures are returned as `{"detail": "<message>"}`.

use crate::metrics::MetricsSnapshot;
use crate::quiz::{Difficulty, GradeReport, Quiz, QuizError, QuizQuestion};
use crate::rag::{Answer, Definitions, Summary, SummaryType};
use crate::service::{ServiceError, StudyApi};
use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, Query, State,
        multipart::{MultipartError, MultipartRejection},
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

const DEFAULT_ASK_K: usize = 5;
const DEFAULT_SUMMARY_K: usize = 10;
const DEFAULT_QUIZ_QUESTIONS: usize = 10;
const DEFAULT_DEFINITIONS_TOPIC: &str = "definitions terms concepts";

/// Build the HTTP router. `max_upload_bytes` bounds request bodies on `POST /upload`.
pub fn create_router<S>(service: Arc<S>, max_upload_bytes: usize) -> Router
where
    S: StudyApi + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root::<S>))
        .route(
            "/upload",
            post(upload_document::<S>).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/ask", post(ask_question::<S>))
        .route("/summarize", post(summarize::<S>))
        .route("/definitions", post(extract_definitions::<S>))
        .route("/quiz/generate", post(generate_quiz::<S>))
        .route("/quiz/grade", post(grade_quiz::<S>))
        .route("/documents", get(list_documents::<S>))
        .route("/reset", delete(reset::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .with_state(service)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Service banner with the endpoint catalog.
async fn root<S>(State(service): State<Arc<S>>) -> Json<serde_json::Value>
where
    S: StudyApi,
{
    let status = service.status().await;
    Json(json!({
        "message": "Study Assistant API",
        "status": "running",
        "documents_loaded": status.documents_loaded,
        "ollama_url": status.ollama_url,
        "endpoints": {
            "upload": "POST /upload - Upload a PDF or TXT study document",
            "ask": "POST /ask - Ask a question about the uploaded material",
            "summarize": "POST /summarize - Summarize the uploaded material",
            "definitions": "POST /definitions - Extract key terms and definitions",
            "quiz_generate": "POST /quiz/generate - Generate a multiple-choice quiz",
            "quiz_grade": "POST /quiz/grade - Grade quiz answers",
            "documents": "GET /documents - List uploaded documents",
            "reset": "DELETE /reset - Remove all documents and the index",
            "metrics": "GET /metrics - Usage counters"
        }
    }))
}

/// Success response for `POST /upload`.
#[derive(Serialize)]
struct UploadResponse {
    message: &'static str,
    /// Name the document was stored under.
    filename: String,
    /// Chunks added to the index.
    chunks_created: usize,
    /// Chunks already indexed by an earlier upload.
    skipped_duplicates: usize,
    status: &'static str,
}

/// Store and index the multipart field named `file`.
///
/// Bodies over the configured upload limit are rejected with 413.
async fn upload_document<S>(
    State(service): State<Arc<S>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError>
where
    S: StudyApi,
{
    let mut multipart = multipart?;
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| AppError::multipart("Invalid multipart body", error))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|error| AppError::multipart("Failed to read upload", error))?;
        upload = Some((filename, bytes));
        break;
    }
    let (filename, bytes) = upload.ok_or_else(|| AppError::bad_request("No file provided"))?;

    let outcome = service
        .upload(&filename, &bytes)
        .await
        .map_err(|error| AppError::from_service("Upload failed", error))?;
    Ok(Json(UploadResponse {
        message: "Document uploaded and processed successfully",
        filename: outcome.filename,
        chunks_created: outcome.chunks_created,
        skipped_duplicates: outcome.skipped_duplicates,
        status: "success",
    }))
}

/// Request body for `POST /ask`.
#[derive(Deserialize)]
struct AskRequest {
    /// Question to answer from the uploaded material.
    question: String,
    /// Number of chunks to retrieve (defaults to 5).
    #[serde(default = "default_ask_k")]
    k: usize,
}

fn default_ask_k() -> usize {
    DEFAULT_ASK_K
}

/// Answer a question grounded on the `k` most similar chunks.
async fn ask_question<S>(
    State(service): State<Arc<S>>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<Answer>, AppError>
where
    S: StudyApi,
{
    let Json(request) = payload?;
    let answer = service
        .ask(&request.question, request.k)
        .await
        .map_err(|error| AppError::from_service("Question answering failed", error))?;
    tracing::info!(k = request.k, sources = answer.sources.len(), "Answered question");
    Ok(Json(answer))
}

/// Request body for `POST /summarize`.
#[derive(Deserialize)]
struct SummarizeRequest {
    /// Focus of the summary; the whole material when absent.
    #[serde(default)]
    topic: Option<String>,
    /// `bullets` (default), `short`, `detailed` or `eli15`.
    #[serde(default)]
    summary_type: SummaryType,
    /// Number of chunks to retrieve (defaults to 10).
    #[serde(default = "default_summary_k")]
    k: usize,
}

fn default_summary_k() -> usize {
    DEFAULT_SUMMARY_K
}

/// Summarize the material, optionally around a topic.
async fn summarize<S>(
    State(service): State<Arc<S>>,
    payload: Result<Json<SummarizeRequest>, JsonRejection>,
) -> Result<Json<Summary>, AppError>
where
    S: StudyApi,
{
    let Json(request) = payload?;
    let summary = service
        .summarize(request.topic.as_deref(), request.summary_type, request.k)
        .await
        .map_err(|error| AppError::from_service("Summarization failed", error))?;
    Ok(Json(summary))
}

/// Query string for `POST /definitions`.
#[derive(Deserialize)]
struct DefinitionsQuery {
    /// Retrieval query (defaults to `definitions terms concepts`).
    #[serde(default = "default_definitions_topic")]
    topic: String,
}

fn default_definitions_topic() -> String {
    DEFAULT_DEFINITIONS_TOPIC.to_string()
}

/// Extract `**Term**: definition` lines from chunks matching the topic.
async fn extract_definitions<S>(
    State(service): State<Arc<S>>,
    query: Result<Query<DefinitionsQuery>, QueryRejection>,
) -> Result<Json<Definitions>, AppError>
where
    S: StudyApi,
{
    let Query(query) = query?;
    let definitions = service
        .definitions(&query.topic)
        .await
        .map_err(|error| AppError::from_service("Definition extraction failed", error))?;
    Ok(Json(definitions))
}

/// Request body for `POST /quiz/generate`.
#[derive(Deserialize)]
struct QuizRequest {
    /// Subject the questions should cover.
    topic: String,
    /// Between 1 and 20 (defaults to 10).
    #[serde(default = "default_quiz_questions")]
    num_questions: usize,
    /// `easy`, `medium` (default) or `hard`.
    #[serde(default)]
    difficulty: Difficulty,
}

fn default_quiz_questions() -> usize {
    DEFAULT_QUIZ_QUESTIONS
}

/// Generate a multiple-choice quiz from chunks relevant to the topic.
async fn generate_quiz<S>(
    State(service): State<Arc<S>>,
    payload: Result<Json<QuizRequest>, JsonRejection>,
) -> Result<Json<Quiz>, AppError>
where
    S: StudyApi,
{
    let Json(request) = payload?;
    let quiz = service
        .generate_quiz(&request.topic, request.num_questions, request.difficulty)
        .await
        .map_err(|error| AppError::from_service("Quiz generation failed", error))?;
    Ok(Json(quiz))
}

/// Request body for `POST /quiz/grade`.
#[derive(Deserialize)]
struct GradeRequest {
    /// Questions as returned by `POST /quiz/generate`.
    questions: Vec<QuizQuestion>,
    /// Chosen letter per question index; missing entries count as wrong.
    #[serde(default)]
    user_answers: HashMap<usize, String>,
}

/// Score submitted answers against the correct letters.
async fn grade_quiz<S>(
    State(service): State<Arc<S>>,
    payload: Result<Json<GradeRequest>, JsonRejection>,
) -> Result<Json<GradeReport>, AppError>
where
    S: StudyApi,
{
    let Json(request) = payload?;
    let report = service
        .grade_quiz(&request.questions, &request.user_answers)
        .await
        .map_err(|error| AppError::from_service("Quiz grading failed", error))?;
    Ok(Json(report))
}

/// Response body for `GET /documents`.
#[derive(Serialize)]
struct DocumentsResponse {
    /// Uploaded filenames, sorted.
    documents: Vec<String>,
    count: usize,
}

/// List files in the upload directory.
async fn list_documents<S>(
    State(service): State<Arc<S>>,
) -> Result<Json<DocumentsResponse>, AppError>
where
    S: StudyApi,
{
    let documents = service
        .list_documents()
        .await
        .map_err(|error| AppError::from_service("Failed to list documents", error))?;
    Ok(Json(DocumentsResponse {
        count: documents.len(),
        documents,
    }))
}

/// Delete uploads and the persisted index, then clear the session.
async fn reset<S>(State(service): State<Arc<S>>) -> Result<Json<serde_json::Value>, AppError>
where
    S: StudyApi,
{
    service
        .reset()
        .await
        .map_err(|error| AppError::from_service("Reset failed", error))?;
    Ok(Json(json!({
        "message": "System reset successfully",
        "status": "success"
    })))
}

/// Usage counters since process start.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: StudyApi,
{
    Json(service.metrics_snapshot())
}

/// Error response rendered as `{"detail": ...}`.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    detail: String,
}

impl AppError {
    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    /// Keep the status multer reports (413 for bodies over the upload limit).
    fn multipart(context: &str, error: MultipartError) -> Self {
        Self {
            status: error.status(),
            detail: format!("{context}: {}", error.body_text()),
        }
    }

    /// Map a service failure; unexpected failures carry the endpoint's `context` prefix.
    fn from_service(context: &str, error: ServiceError) -> Self {
        match &error {
            ServiceError::UnsupportedFileType(_)
            | ServiceError::InvalidRequest(_)
            | ServiceError::NoDocuments => Self::bad_request(error.to_string()),
            ServiceError::EmptyExtraction
            | ServiceError::VectorStoreUpdate(_)
            | ServiceError::Quiz(QuizError::Generation(_)) => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                detail: error.to_string(),
            },
            _ => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                detail: format!("{context}: {error}"),
            },
        }
    }
}

macro_rules! from_rejection {
    ($($rejection:ty),+) => {
        $(impl From<$rejection> for AppError {
            fn from(rejection: $rejection) -> Self {
                Self {
                    status: rejection.status(),
                    detail: rejection.body_text(),
                }
            }
        })+
    };
}

from_rejection!(JsonRejection, QueryRejection, MultipartRejection);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, detail = %self.detail, "Request failed");
        } else {
            tracing::warn!(status = %self.status, detail = %self.detail, "Request rejected");
        }
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}
