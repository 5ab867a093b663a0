use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing server activity since startup.
#[derive(Default)]
pub struct UsageMetrics {
    documents_uploaded: AtomicU64,
    chunks_indexed: AtomicU64,
    questions_answered: AtomicU64,
    quizzes_generated: AtomicU64,
    quizzes_graded: AtomicU64,
}

impl UsageMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an uploaded document and the number of chunks added to the index.
    pub fn record_upload(&self, chunk_count: u64) {
        self.documents_uploaded.fetch_add(1, Ordering::Relaxed);
        self.chunks_indexed.fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record a question answered through the RAG engine.
    pub fn record_question(&self) {
        self.questions_answered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a generated quiz.
    pub fn record_quiz_generated(&self) {
        self.quizzes_generated.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a graded quiz submission.
    pub fn record_quiz_graded(&self) {
        self.quizzes_graded.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_uploaded: self.documents_uploaded.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            questions_answered: self.questions_answered.load(Ordering::Relaxed),
            quizzes_generated: self.quizzes_generated.load(Ordering::Relaxed),
            quizzes_graded: self.quizzes_graded.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of usage counters used for reporting.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Number of documents uploaded since startup.
    pub documents_uploaded: u64,
    /// Total chunks added to the index across all uploads.
    pub chunks_indexed: u64,
    /// Number of `/ask` requests answered.
    pub questions_answered: u64,
    /// Number of quizzes generated.
    pub quizzes_generated: u64,
    /// Number of quiz submissions graded.
    pub quizzes_graded: u64,
}
