//! agri-rag - 농업 지식베이스 RAG 챗봇
//!
//! SQLite 지식 저장소 + 임베딩 최근접 이웃 / 코사인 / 키워드 폴백 검색 +
//! 근거 기반 답변 생성으로 구성된 검색 파이프라인입니다.

pub mod chatbot;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod knowledge;
pub mod llm;

// Re-exports
pub use chatbot::{AnswerEnvelope, AnswerStatus, ChatbotService, ServiceStats};
pub use config::{get_api_key, get_data_dir, has_api_key, EmbeddingBackendKind, LlmConfig, RagConfig};
pub use embedding::{Embedder, EmbeddingProvider, GeminiEmbedding, HashingEmbedding};
pub use error::RagError;
pub use knowledge::{
    AnswerBackend, AnswerComposer, Chunk, ChunkConfig, Chunker, KnowledgeEntry, KnowledgeStore,
    NewEntry, RetrievalResult, Retriever, SearchBackend, NOT_AVAILABLE_MESSAGE,
};
pub use llm::{CompletionRequest, GeminiChat, LanguageModel};
