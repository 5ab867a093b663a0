use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use study_assistant::{
    api::create_router,
    config::EmbeddingProvider,
    embedding::HashingEmbeddingClient,
    ingestion::ChunkingOptions,
    llm::{GenerationRequest, LlmClient, LlmClientError},
    service::{ServiceSettings, StudyService},
};
use tower::ServiceExt;

const QUIZ_REPLY: &str = r#"Sure! Here is the quiz:
```json
[
  {
    "question": "Where does photosynthesis take place?",
    "options": {"A": "Mitochondria", "B": "Chloroplasts", "C": "Nucleus", "D": "Ribosomes"},
    "correct_answer": "B",
    "explanation": "Chloroplasts contain chlorophyll."
  },
  {
    "question": "What gas do plants absorb?",
    "options": {"A": "Oxygen", "B": "Nitrogen", "C": "Carbon dioxide", "D": "Helium"},
    "correct_answer": "c",
    "explanation": "Carbon dioxide is fixed into sugar."
  }
]
```"#;

/// Answers quiz prompts with a fixed question set and everything else with a short reply.
struct ScriptedLlm;

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn generate(&self, request: GenerationRequest) -> Result<String, LlmClientError> {
        if request.prompt.contains("multiple-choice quiz") {
            Ok(QUIZ_REPLY.to_string())
        } else {
            Ok("Photosynthesis happens in chloroplasts.".to_string())
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

struct OfflineLlm;

#[async_trait]
impl LlmClient for OfflineLlm {
    async fn generate(&self, _request: GenerationRequest) -> Result<String, LlmClientError> {
        Err(LlmClientError::ProviderUnavailable(
            "connection refused".into(),
        ))
    }

    fn model_name(&self) -> &str {
        "offline"
    }
}

fn app(root: &Path, llm: Arc<dyn LlmClient>) -> Router {
    let service = StudyService::new(
        ServiceSettings {
            upload_dir: root.join("uploads"),
            vector_store_dir: root.join("vector_store"),
            vector_store_name: "study_materials".into(),
            ollama_url: "http://localhost:11434".into(),
        },
        ChunkingOptions {
            chunk_size: Some(24),
            overlap: 4,
            provider: EmbeddingProvider::Hash,
            model: String::new(),
        },
        Arc::new(HashingEmbeddingClient::new(128)),
        llm,
    );
    create_router(Arc::new(service), 1024 * 1024)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("router response");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn upload(filename: &str, content: &str) -> Request<Body> {
    let boundary = "flow-boundary";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n{content}\r\n--{boundary}--\r\n"
    );
    Request::builder()
        .method(Method::POST)
        .uri("/upload")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .expect("request")
}

fn post_json(uri: &str, payload: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .expect("request")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).expect("request")
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

const BIOLOGY: &str = "Photosynthesis is the process plants use to turn light into chemical energy. \
It takes place in the chloroplasts, which contain the green pigment chlorophyll. \
Plants absorb carbon dioxide from the air and water from the soil. \
The light reactions split water and release oxygen as a by-product. \
The Calvin cycle then fixes carbon dioxide into sugar molecules.";

const CHEMISTRY: &str = "An atom is the smallest unit of a chemical element. \
Covalent bonds form when atoms share electrons. Ionic bonds form when electrons are transferred.";

#[tokio::test]
async fn upload_query_quiz_and_reset_flow() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = app(dir.path(), Arc::new(ScriptedLlm));

    let (status, json) = send(&app, post_json("/ask", json!({ "question": "What is ATP?" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        json["detail"],
        "No documents uploaded yet. Please upload documents first."
    );

    let (status, json) = send(&app, upload("biology.txt", BIOLOGY)).await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["filename"], "biology.txt");
    assert_eq!(json["status"], "success");
    let biology_chunks = json["chunks_created"].as_u64().expect("chunk count");
    assert!(biology_chunks > 1);

    let (status, json) = send(&app, upload("chemistry.txt", CHEMISTRY)).await;
    assert_eq!(status, StatusCode::OK, "{json}");

    let (_, json) = send(&app, get("/")).await;
    assert_eq!(json["documents_loaded"], true);

    let (_, json) = send(&app, get("/documents")).await;
    assert_eq!(json["documents"], json!(["biology.txt", "chemistry.txt"]));
    assert_eq!(json["count"], 2);

    let (status, json) = send(
        &app,
        post_json("/ask", json!({ "question": "Where does photosynthesis happen?", "k": 3 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["answer"], "Photosynthesis happens in chloroplasts.");
    let sources = json["sources"].as_array().expect("sources");
    assert_eq!(sources.len(), 3);
    let scores: Vec<f64> = sources
        .iter()
        .map(|source| source["score"].as_f64().expect("score"))
        .collect();
    assert!(scores.windows(2).all(|pair| pair[0] >= pair[1]));

    let (status, json) = send(
        &app,
        post_json("/summarize", json!({ "summary_type": "eli15", "k": 100 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["summary_type"], "eli15");

    let (status, json) = send(
        &app,
        post_json("/quiz/generate", json!({ "topic": "photosynthesis", "num_questions": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["metadata"]["difficulty"], "medium");
    assert_eq!(json["metadata"]["num_questions"], 2);
    let questions = json["questions"].clone();
    assert_eq!(questions[1]["correct_answer"], "C");

    let (status, json) = send(
        &app,
        post_json(
            "/quiz/grade",
            json!({ "questions": questions, "user_answers": { "0": "b", "1": "A" } }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["correct"], 1);
    assert_eq!(json["total"], 2);
    assert_eq!(json["score"], 50.0);
    assert_eq!(json["results"][0]["is_correct"], true);
    assert_eq!(json["results"][1]["user_answer"], "A");

    let (_, json) = send(&app, get("/metrics")).await;
    assert_eq!(json["documents_uploaded"], 2);
    assert_eq!(json["questions_answered"], 1);
    assert_eq!(json["quizzes_generated"], 1);
    assert_eq!(json["quizzes_graded"], 1);

    let (status, json) = send(&app, delete("/reset")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "System reset successfully");
    assert!(!dir.path().join("vector_store/study_materials").exists());

    let (_, json) = send(&app, get("/documents")).await;
    assert_eq!(json["count"], 0);
    let (status, _) = send(
        &app,
        post_json("/quiz/generate", json!({ "topic": "photosynthesis" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unsupported_extension_is_rejected_before_writing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = app(dir.path(), Arc::new(ScriptedLlm));

    let (status, json) = send(&app, upload("slides.pptx", "binary")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        json["detail"],
        "Unsupported file type: .pptx. Only .pdf and .txt are supported."
    );
    assert!(!dir.path().join("uploads").exists());
}

#[tokio::test]
async fn reuploading_same_file_overwrites_and_skips_duplicates() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = app(dir.path(), Arc::new(ScriptedLlm));

    let (status, first) = send(&app, upload("biology.txt", BIOLOGY)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, second) = send(&app, upload("biology.txt", BIOLOGY)).await;
    assert_eq!(status, StatusCode::OK, "{second}");
    assert_eq!(second["skipped_duplicates"], first["chunks_created"]);

    let (_, json) = send(&app, get("/documents")).await;
    assert_eq!(json["documents"], json!(["biology.txt"]));
}

#[tokio::test]
async fn empty_document_reports_extraction_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = app(dir.path(), Arc::new(ScriptedLlm));

    let (status, json) = send(&app, upload("blank.txt", "   ")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["detail"], "Failed to extract content from document");
}

#[tokio::test]
async fn model_outage_surfaces_as_server_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = app(dir.path(), Arc::new(OfflineLlm));

    let (status, _) = send(&app, upload("chemistry.txt", CHEMISTRY)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = send(&app, post_json("/definitions?topic=bonds", json!({}))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let detail = json["detail"].as_str().expect("detail");
    assert!(detail.starts_with("Definition extraction failed: "));

    let (status, json) = send(&app, post_json("/quiz/generate", json!({ "topic": "atoms" }))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(
        json["detail"]
            .as_str()
            .expect("detail")
            .starts_with("Quiz generation failed: ")
    );
}
