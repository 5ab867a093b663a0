//! Active document session: the loaded index plus the engines bound to it.

use crate::embedding::EmbeddingClient;
use crate::llm::LlmClient;
use crate::quiz::QuizEngine;
use crate::rag::RagEngine;
use crate::vector_store::VectorStore;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, RwLock};

/// Engines built over one snapshot of the vector store.
pub struct Session {
    store: Arc<VectorStore>,
    rag: RagEngine,
    quiz: QuizEngine,
}

impl Session {
    /// Bind fresh RAG and quiz engines to `store`.
    pub fn new(
        store: VectorStore,
        embedder: Arc<dyn EmbeddingClient>,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        let store = Arc::new(store);
        Self {
            rag: RagEngine::new(store.clone(), embedder.clone(), llm.clone()),
            quiz: QuizEngine::new(store.clone(), embedder, llm),
            store,
        }
    }

    /// Index backing this session.
    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    /// Question answering, summaries, and definitions.
    pub fn rag(&self) -> &RagEngine {
        &self.rag
    }

    /// Quiz generation and grading.
    pub fn quiz(&self) -> &QuizEngine {
        &self.quiz
    }
}

/// Slot holding the current [`Session`], if any.
///
/// Readers clone the `Arc` under a short read lock and work on that snapshot, so replacing or
/// clearing the slot never affects a request already in flight. Writers serialize through
/// [`SessionState::begin_write`] before touching the persisted index.
#[derive(Default)]
pub struct SessionState {
    current: RwLock<Option<Arc<Session>>>,
    writer: Mutex<()>,
}

impl SessionState {
    /// Empty state with no active session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current session, if documents have been loaded.
    pub async fn snapshot(&self) -> Option<Arc<Session>> {
        self.current.read().await.clone()
    }

    /// Whether a session is active.
    pub async fn is_active(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// Acquire the exclusive guard held for the duration of an upload or reset.
    pub async fn begin_write(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().await
    }

    /// Replace the active session.
    pub async fn install(&self, session: Session) {
        *self.current.write().await = Some(Arc::new(session));
    }

    /// Drop the active session.
    pub async fn clear(&self) {
        self.current.write().await.take();
    }
}
