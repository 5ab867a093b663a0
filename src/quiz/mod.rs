//! Multiple-choice quiz generation from retrieved material, plus deterministic grading.

mod parse;

use crate::embedding::EmbeddingClient;
use crate::llm::{GenerationRequest, LlmClient, LlmClientError};
use crate::rag::{self, RagError};
use crate::vector_store::{ScoredChunk, VectorStore};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;

const MAX_RETRIEVED_CHUNKS: usize = 20;
const EXTRA_CHUNKS: usize = 5;
const QUIZ_TEMPERATURE: f32 = 0.5;

/// Errors raised by [`QuizEngine::generate_quiz`].
#[derive(Debug, Error)]
pub enum QuizError {
    /// The model output could not be turned into a usable quiz.
    #[error("{0}")]
    Generation(String),
    /// Retrieval of source chunks failed.
    #[error(transparent)]
    Retrieval(#[from] RagError),
    /// Language model call failed.
    #[error(transparent)]
    Llm(#[from] LlmClientError),
}

/// Requested quiz difficulty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    /// Recall of facts stated directly in the material.
    Easy,
    /// Understanding and application.
    #[default]
    Medium,
    /// Analysis across several concepts.
    Hard,
}

impl Difficulty {
    fn guidance(self) -> &'static str {
        match self {
            Self::Easy => "Ask about facts and definitions stated directly in the material.",
            Self::Medium => {
                "Test understanding: ask the student to explain, compare, or apply concepts."
            }
            Self::Hard => {
                "Require analysis: combine several concepts, reason about consequences, or \
apply ideas to unfamiliar situations. Make the wrong options plausible."
            }
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

/// One multiple-choice question with options keyed `A`-`D`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestion {
    /// Question text.
    pub question: String,
    /// Option letter to option text.
    pub options: BTreeMap<String, String>,
    /// Letter of the correct option.
    pub correct_answer: String,
    /// Why the correct option is right.
    #[serde(default)]
    pub explanation: String,
}

/// Descriptive data returned with a generated quiz.
#[derive(Debug, Clone, Serialize)]
pub struct QuizMetadata {
    /// Topic the quiz was generated for.
    pub topic: String,
    /// Difficulty requested.
    pub difficulty: Difficulty,
    /// Number of questions actually produced.
    pub num_questions: usize,
    /// Distinct source filenames the questions were drawn from.
    pub sources: Vec<String>,
}

/// A generated quiz.
#[derive(Debug, Clone, Serialize)]
pub struct Quiz {
    /// Validated questions.
    pub questions: Vec<QuizQuestion>,
    /// Generation metadata.
    pub metadata: QuizMetadata,
}

/// Per-question grading outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionResult {
    /// Zero-based question position.
    pub question_index: usize,
    /// Question text.
    pub question: String,
    /// Normalized letter the user chose, if any.
    pub user_answer: Option<String>,
    /// Normalized correct letter.
    pub correct_answer: String,
    /// Whether the user picked the correct option.
    pub is_correct: bool,
    /// Explanation carried over from the question.
    pub explanation: String,
}

/// Aggregate grading outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeReport {
    /// Percentage correct, rounded to one decimal.
    pub score: f64,
    /// Number of correct answers.
    pub correct: usize,
    /// Number of questions graded.
    pub total: usize,
    /// Per-question breakdown.
    pub results: Vec<QuestionResult>,
}

/// Generates quizzes from one vector store and grades submitted answers.
pub struct QuizEngine {
    store: Arc<VectorStore>,
    embedder: Arc<dyn EmbeddingClient>,
    llm: Arc<dyn LlmClient>,
}

impl QuizEngine {
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

    /// Generate up to `num_questions` questions about `topic`.
    pub async fn generate_quiz(
        &self,
        topic: &str,
        num_questions: usize,
        difficulty: Difficulty,
    ) -> Result<Quiz, QuizError> {
        let k = (num_questions + EXTRA_CHUNKS).min(MAX_RETRIEVED_CHUNKS);
        let chunks = rag::retrieve(self.embedder.as_ref(), &self.store, topic, k).await?;
        if chunks.is_empty() {
            return Err(QuizError::Generation(format!(
                "No relevant content found for topic: {topic}"
            )));
        }

        let prompt = quiz_prompt(topic, num_questions, difficulty, &chunks);
        let output = self
            .llm
            .generate(GenerationRequest::new(prompt).with_temperature(QUIZ_TEMPERATURE))
            .await?;

        let mut questions = parse::parse_questions(&output).ok_or_else(|| {
            QuizError::Generation("Failed to parse quiz questions from model output".into())
        })?;
        if questions.is_empty() {
            return Err(QuizError::Generation(
                "Model did not produce any valid quiz questions".into(),
            ));
        }
        questions.truncate(num_questions);

        let mut sources: Vec<String> = Vec::new();
        for chunk in &chunks {
            if !sources.contains(&chunk.source) {
                sources.push(chunk.source.clone());
            }
        }

        tracing::info!(
            topic,
            difficulty = difficulty.as_str(),
            requested = num_questions,
            produced = questions.len(),
            "Generated quiz"
        );
        Ok(Quiz {
            metadata: QuizMetadata {
                topic: topic.to_string(),
                difficulty,
                num_questions: questions.len(),
                sources,
            },
            questions,
        })
    }

    /// Grade `user_answers` (question index to letter) against `questions`.
    pub fn grade_quiz(
        &self,
        questions: &[QuizQuestion],
        user_answers: &HashMap<usize, String>,
    ) -> GradeReport {
        grade(questions, user_answers)
    }
}

fn grade(questions: &[QuizQuestion], user_answers: &HashMap<usize, String>) -> GradeReport {
    let results: Vec<QuestionResult> = questions
        .iter()
        .enumerate()
        .map(|(index, question)| {
            let correct_answer = normalize_answer(&question.correct_answer);
            let user_answer = user_answers
                .get(&index)
                .map(|answer| normalize_answer(answer))
                .filter(|answer| !answer.is_empty());
            QuestionResult {
                question_index: index,
                question: question.question.clone(),
                is_correct: user_answer.as_deref() == Some(correct_answer.as_str()),
                user_answer,
                correct_answer,
                explanation: question.explanation.clone(),
            }
        })
        .collect();

    let correct = results.iter().filter(|result| result.is_correct).count();
    let total = results.len();
    let score = if total == 0 {
        0.0
    } else {
        ((correct as f64 / total as f64) * 1000.0).round() / 10.0
    };

    GradeReport {
        score,
        correct,
        total,
        results,
    }
}

fn normalize_answer(answer: &str) -> String {
    parse::normalize_letter(answer).unwrap_or_else(|| answer.trim().to_uppercase())
}

fn quiz_prompt(
    topic: &str,
    num_questions: usize,
    difficulty: Difficulty,
    chunks: &[ScoredChunk],
) -> String {
    let context = chunks
        .iter()
        .map(|chunk| chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");
    format!(
        "You are a teacher writing a {difficulty} multiple-choice quiz about \"{topic}\".\n\
{guidance}\n\
Write exactly {num_questions} questions based ONLY on the study material below. Each question \
has four options labelled A, B, C and D with exactly one correct answer.\n\n\
Respond with a JSON array and nothing else. Each element must look like:\n\
{{\"question\": \"...\", \"options\": {{\"A\": \"...\", \"B\": \"...\", \"C\": \"...\", \"D\": \"...\"}}, \
\"correct_answer\": \"A\", \"explanation\": \"...\"}}\n\n\
STUDY MATERIAL:\n{context}\n\n\
JSON:",
        difficulty = difficulty.as_str(),
        guidance = difficulty.guidance(),
    )
}
