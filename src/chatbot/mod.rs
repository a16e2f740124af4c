//! Chatbot 서비스 - 질문 응답 진입점
//!
//! 설정으로 명시적으로 생성되는 서비스 객체입니다 (전역 싱글톤 없음).
//! 호출자는 항상 올바른 `AnswerEnvelope` 또는 `RagError::InvalidQuery`를 받습니다.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::RagConfig;
use crate::embedding::Embedder;
use crate::error::RagError;
use crate::knowledge::{
    corpus, word_chunker, AnswerComposer, AnswerMode, IndexCache, KnowledgeEntry,
    KnowledgeStore, NewEntry, RetrievalResult, Retriever, SnapshotStats, StoreStats,
};
use crate::llm::GeminiChat;

/// 서비스 장애 시 답변 문구
pub const SERVICE_UNAVAILABLE_MESSAGE: &str =
    "The agriculture knowledge service is temporarily unavailable. Please try again later.";

// ============================================================================
// Envelope
// ============================================================================

/// 응답 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerStatus {
    Success,
    Error,
}

/// 질문 응답 봉투
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerEnvelope {
    pub answer: String,
    pub sources: Vec<String>,
    /// 답변 근거로 쓰인 검색 패시지 수
    pub context_count: usize,
    pub status: AnswerStatus,
    pub mode: AnswerMode,
}

/// 서비스 상태 요약
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub store: StoreStats,
    pub index: SnapshotStats,
    pub embedder: String,
    pub embedding_available: bool,
    pub answer_backend: String,
}

// ============================================================================
// ChatbotService
// ============================================================================

/// RAG 챗봇 서비스
pub struct ChatbotService {
    store: Arc<KnowledgeStore>,
    retriever: Retriever,
    composer: AnswerComposer,
    top_k: usize,
    max_question_chars: usize,
}

impl ChatbotService {
    /// 설정으로 서비스 생성
    ///
    /// 저장소 열기 → 기본 코퍼스 시드 → 임베딩 capability 확인 → 답변 백엔드 선택 순서입니다.
    pub async fn from_config(config: &RagConfig) -> Result<Self> {
        config.validate()?;

        let store = KnowledgeStore::open(&config.store_path())
            .with_context(|| format!("Failed to open store at {}", config.store_path().display()))?;
        tracing::info!("Knowledge store opened: {}", config.store_path().display());

        if config.seed_default_corpus {
            let inserted = store.seed_if_empty(corpus::default_corpus())?;
            if inserted > 0 {
                tracing::info!("Seeded default corpus: {} entries", inserted);
            }
        }

        let embedder = Embedder::from_config(config).await;

        let composer = match &config.llm {
            Some(llm) => match GeminiChat::new(llm, config.request_timeout()) {
                Ok(chat) => {
                    tracing::info!("Answer backend: Gemini {}", llm.model);
                    AnswerComposer::with_llm(Arc::new(chat), llm, config.request_timeout())
                }
                Err(e) => {
                    tracing::warn!("LLM unavailable, using extractive answers: {:#}", e);
                    AnswerComposer::extractive()
                }
            },
            None => {
                tracing::info!("Answer backend: extractive");
                AnswerComposer::extractive()
            }
        };

        let cache = config
            .persist_index
            .then(|| IndexCache::new(config.index_cache_path()));

        Ok(Self::assemble(Arc::new(store), embedder, composer, config, cache))
    }

    /// 구성 요소로 직접 생성 (디스크 캐시 없음)
    pub fn new(
        store: Arc<KnowledgeStore>,
        embedder: Embedder,
        composer: AnswerComposer,
        config: &RagConfig,
    ) -> Self {
        Self::assemble(store, embedder, composer, config, None)
    }

    fn assemble(
        store: Arc<KnowledgeStore>,
        embedder: Embedder,
        composer: AnswerComposer,
        config: &RagConfig,
        cache: Option<IndexCache>,
    ) -> Self {
        let mut retriever =
            Retriever::new(store.clone(), word_chunker(config.chunk.clone()), embedder)
                .with_nearest_neighbor(config.nearest_neighbor);
        if let Some(cache) = cache {
            retriever = retriever.with_cache(cache);
        }

        Self {
            store,
            retriever,
            composer,
            top_k: config.top_k,
            max_question_chars: config.max_question_chars,
        }
    }

    /// 질문 검증 (검색 전에 수행)
    fn validate_question<'a>(&self, question: &'a str) -> Result<&'a str, RagError> {
        let trimmed = question.trim();
        if trimmed.is_empty() {
            return Err(RagError::InvalidQuery("question is empty".to_string()));
        }

        let length = trimmed.chars().count();
        if length > self.max_question_chars {
            return Err(RagError::InvalidQuery(format!(
                "question is {} characters, maximum is {}",
                length, self.max_question_chars
            )));
        }
        Ok(trimmed)
    }

    /// 질문에 답변
    pub async fn ask_question(&self, question: &str) -> Result<AnswerEnvelope, RagError> {
        let question = self.validate_question(question)?;
        tracing::debug!("Question: {}", question);

        let retrieval = match self
            .retriever
            .retrieve_with_vocabulary(question, self.top_k)
            .await
        {
            Ok(retrieval) => retrieval,
            Err(e) => {
                tracing::error!("Retrieval failed: {:#}", e);
                return Ok(AnswerEnvelope {
                    answer: SERVICE_UNAVAILABLE_MESSAGE.to_string(),
                    sources: vec![],
                    context_count: 0,
                    status: AnswerStatus::Error,
                    mode: AnswerMode::NotAvailable,
                });
            }
        };

        let results = retrieval.results;
        let composed = self
            .composer
            .compose(question, &results, &retrieval.vocabulary)
            .await;
        let context_count = match composed.mode {
            AnswerMode::NotAvailable => 0,
            _ => results.len(),
        };

        tracing::debug!(
            "Answered via {:?} with {} passages, sources {:?}",
            composed.mode,
            context_count,
            composed.sources
        );

        Ok(AnswerEnvelope {
            answer: composed.answer,
            sources: composed.sources,
            context_count,
            status: AnswerStatus::Success,
            mode: composed.mode,
        })
    }

    /// 검색만 수행 (답변 생성 없음)
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievalResult>, RagError> {
        let query = self.validate_question(query)?;
        self.retriever
            .retrieve(query, k)
            .await
            .map_err(RagError::from_storage)
    }

    /// 문서 추가 (지역 India, 시즌 all)
    ///
    /// # Returns
    /// 저장 성공 여부
    pub fn add_document(&self, content: &str, title: &str, category: &str) -> bool {
        match self.add_entry(NewEntry::new(title, category, content)) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Document not added: {}", e);
                false
            }
        }
    }

    /// 메타데이터 전체 지정 엔트리 추가
    pub fn add_entry(&self, entry: NewEntry) -> Result<i64, RagError> {
        let id = self.store.add(entry).map_err(RagError::from_storage)?;
        self.retriever.mark_stale();
        tracing::info!("Added knowledge entry {}", id);
        Ok(id)
    }

    /// 인덱스 강제 리빌드
    pub async fn rebuild_index(&self) -> Result<usize, RagError> {
        self.retriever.rebuild().await.map_err(RagError::from_storage)
    }

    /// 서비스 상태
    pub fn stats(&self) -> Result<ServiceStats, RagError> {
        let store = self.store.stats().map_err(RagError::from_storage)?;
        let embedder = self.retriever.embedder();

        Ok(ServiceStats {
            store,
            index: self.retriever.snapshot_stats(),
            embedder: embedder.id(),
            embedding_available: embedder.available(),
            answer_backend: self.composer.backend().name(),
        })
    }

    /// 엔트리 목록 (최신순)
    pub fn list_entries(
        &self,
        limit: usize,
        category: Option<&str>,
    ) -> Result<Vec<KnowledgeEntry>, RagError> {
        self.store
            .list_filtered(limit, category)
            .map_err(RagError::from_storage)
    }

    /// 예시 질문
    pub fn suggestions(&self) -> &'static [&'static str] {
        corpus::SUGGESTED_QUESTIONS
    }
}

// ============================================================================
// Tests
// ============================================================================
