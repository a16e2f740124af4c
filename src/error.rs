//! 에러 타입 - RAG 파이프라인 에러 분류
//!
//! 호출자에게 전달되는 에러는 `InvalidQuery`, `InvalidDocument` 뿐입니다.
//! 나머지는 검색기/답변 생성기 내부에서 흡수되고 로그로만 남습니다.

use thiserror::Error;

/// RAG 에러
#[derive(Debug, Error)]
pub enum RagError {
    /// 빈 질문 또는 길이 초과 (검색 코어에 도달하지 않음)
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// 빈 본문/제목 문서 추가 시도
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// 임베딩 백엔드 비활성 (에러가 아닌 모드 플래그)
    #[error("embedding backend unavailable")]
    EmbeddingUnavailable,

    /// 벡터 검색 백엔드 일시 실패 → 키워드 폴백
    #[error("retrieval backend failure: {0}")]
    RetrievalBackend(String),

    /// LLM 호출 실패 (timeout, auth, quota) → 추출형 폴백
    #[error("language model failure: {0}")]
    LanguageModel(String),

    /// 디스크 인덱스 캐시 손상 또는 fingerprint 불일치 → 전체 리빌드
    #[error("index cache corrupted: {0}")]
    IndexCorruption(String),

    /// 지식 저장소 접근 실패
    #[error("storage error: {0}")]
    Storage(String),

    /// 어떤 경로로도 답변 불가
    #[error("service unavailable")]
    ServiceUnavailable,
}

impl RagError {
    /// 4xx 계열(사용자 입력 오류) 여부
    pub fn is_client_error(&self) -> bool {
        matches!(self, RagError::InvalidQuery(_) | RagError::InvalidDocument(_))
    }

    /// anyhow 에러를 저장소 에러로 변환 (이미 RagError면 그대로 유지)
    pub fn from_storage(err: anyhow::Error) -> Self {
        match err.downcast::<RagError>() {
            Ok(rag) => rag,
            Err(other) => RagError::Storage(format!("{:#}", other)),
        }
    }
}
