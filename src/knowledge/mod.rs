//! Knowledge 모듈 - 농업 지식 검색 파이프라인
//!
//! - Store: SQLite append-only 지식 엔트리 저장
//! - Chunker: 단어 수 기준 패시지 분할
//! - Vector / Keyword: FlatL2, Cosine, 키워드 중첩 검색 백엔드
//! - Cache: 디스크 인덱스 번들
//! - Retriever: 지연 인덱싱 + 폴백 검색
//! - Composer: 근거 기반 답변 생성

mod cache;
mod chunker;
mod composer;
pub mod corpus;
mod keyword;
mod retriever;
mod store;
pub mod text;
mod vector;

// Re-exports
pub use cache::{fingerprint, IndexBundle, IndexCache, BUNDLE_VERSION};
pub use chunker::{
    chunk_words, default_chunker, word_chunker, Chunk, ChunkConfig, ChunkMetadata, Chunker,
    WordChunker,
};
pub use composer::{
    build_context, extractive_answer, is_grounded, AnswerBackend, AnswerComposer, AnswerMode,
    ComposedAnswer, MAX_EXTRACTIVE_SENTENCES, MAX_FALLBACK_CHARS, NOT_AVAILABLE_MESSAGE,
};
pub use keyword::{KeywordIndex, Vocabulary};
pub use retriever::{IndexSnapshot, Retrieval, Retriever, SnapshotStats, EMBEDDING_RETRY_BACKOFF};
pub use store::{
    KnowledgeEntry, KnowledgeStore, NewEntry, StoreStats, DEFAULT_REGION, DEFAULT_SEASON,
};
pub use vector::{
    cosine_similarity, l2_distance, normalized, CosineIndex, FlatL2Index, RawScore,
    RetrievalResult, SearchBackend, VectorIndex,
};
