//! Answer Composer - 검색 결과 기반 답변 생성
//!
//! 답변 백엔드는 시작 시점에 한 번 결정됩니다:
//! - `Llm`: 검색된 패시지만으로 컨텍스트를 만들어 한 번 completion
//! - `Extractive`: 질의어와 겹치는 문장을 그대로 발췌
//!
//! LLM 실패나 빈 출력은 추출형으로 내려가고, 근거가 없는 질문은
//! 어느 백엔드든 고정 문구(`NOT_AVAILABLE_MESSAGE`)를 반환합니다.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::config::LlmConfig;
use crate::error::RagError;
use crate::llm::{grounded_system_prompt, CompletionRequest, LanguageModel};

use super::keyword::Vocabulary;
use super::text::{split_sentences, term_set, truncate_chars};
use super::vector::RetrievalResult;

/// 근거 부족 시 반환하는 고정 문구
pub const NOT_AVAILABLE_MESSAGE: &str =
    "Information not available in the agriculture knowledge base.";

/// 추출형 답변 최대 문장 수
pub const MAX_EXTRACTIVE_SENTENCES: usize = 6;

/// 매칭 문장이 없을 때 원문 연결 최대 길이
pub const MAX_FALLBACK_CHARS: usize = 2000;

// ============================================================================
// Types
// ============================================================================

/// 답변 백엔드 (시작 시 결정)
#[derive(Clone)]
pub enum AnswerBackend {
    Llm(Arc<dyn LanguageModel>),
    Extractive,
}

impl AnswerBackend {
    pub fn name(&self) -> String {
        match self {
            AnswerBackend::Llm(model) => format!("llm:{}", model.name()),
            AnswerBackend::Extractive => "extractive".to_string(),
        }
    }
}

impl std::fmt::Debug for AnswerBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

/// 실제 답변을 만든 경로
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerMode {
    Llm,
    Extractive,
    NotAvailable,
}

/// 생성된 답변
#[derive(Debug, Clone)]
pub struct ComposedAnswer {
    pub answer: String,
    /// 실제 사용된 패시지의 출처 라벨 (중복 없음)
    pub sources: Vec<String>,
    pub mode: AnswerMode,
}

impl ComposedAnswer {
    fn not_available() -> Self {
        Self {
            answer: NOT_AVAILABLE_MESSAGE.to_string(),
            sources: vec![],
            mode: AnswerMode::NotAvailable,
        }
    }
}

// ============================================================================
// AnswerComposer
// ============================================================================

/// 답변 생성기
#[derive(Debug, Clone)]
pub struct AnswerComposer {
    backend: AnswerBackend,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

impl AnswerComposer {
    /// 추출형 전용
    pub fn extractive() -> Self {
        Self {
            backend: AnswerBackend::Extractive,
            temperature: 0.0,
            max_tokens: 0,
            timeout: Duration::from_secs(30),
        }
    }

    /// LLM 백엔드 (temperature는 상한으로 제한)
    pub fn with_llm(model: Arc<dyn LanguageModel>, config: &LlmConfig, timeout: Duration) -> Self {
        Self {
            backend: AnswerBackend::Llm(model),
            temperature: config.effective_temperature(),
            max_tokens: config.max_tokens,
            timeout,
        }
    }

    pub fn backend(&self) -> &AnswerBackend {
        &self.backend
    }

    /// 실제 요청에 쓰이는 temperature
    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    /// 검색 결과로 답변 생성
    ///
    /// `vocabulary`는 검색에 쓰인 스냅샷의 코퍼스 용어 집합입니다.
    pub async fn compose(
        &self,
        query: &str,
        results: &[RetrievalResult],
        vocabulary: &Vocabulary,
    ) -> ComposedAnswer {
        if results.is_empty() {
            tracing::debug!("No passages retrieved");
            return ComposedAnswer::not_available();
        }

        if !is_grounded(query, results, vocabulary) {
            tracing::info!("Question is not covered by the knowledge base");
            return ComposedAnswer::not_available();
        }

        if let AnswerBackend::Llm(model) = &self.backend {
            match self.llm_answer(model.as_ref(), query, results).await {
                Ok(answer) => return answer,
                Err(e) => tracing::warn!("LLM answer failed, using extractive answer: {}", e),
            }
        }

        extractive_answer(query, results)
    }

    async fn llm_answer(
        &self,
        model: &dyn LanguageModel,
        query: &str,
        results: &[RetrievalResult],
    ) -> Result<ComposedAnswer, RagError> {
        let request = CompletionRequest {
            system_prompt: grounded_system_prompt(),
            context: build_context(results),
            question: query.trim().to_string(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let output = tokio::time::timeout(self.timeout, model.complete(&request))
            .await
            .map_err(|_| {
                RagError::LanguageModel(format!("completion timed out after {:?}", self.timeout))
            })?
            .map_err(|e| RagError::LanguageModel(format!("{:#}", e)))?;

        let answer = output.trim();
        if answer.is_empty() {
            return Err(RagError::LanguageModel(format!(
                "{} returned an empty answer",
                model.name()
            )));
        }
        if answer.contains(NOT_AVAILABLE_MESSAGE) {
            return Ok(ComposedAnswer::not_available());
        }

        Ok(ComposedAnswer {
            answer: answer.to_string(),
            sources: unique_labels(results.iter()),
            mode: AnswerMode::Llm,
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 근거 검사
///
/// 모든 질의어가 검색된 패시지에 있으면 통과합니다. 그렇지 않으면:
/// - 특정 대상 제목(작물 이름 등)이 질의에 있으면 통과
/// - 코퍼스 전체에 없는 질의어가 하나라도 있으면 코퍼스 밖 대상으로 판단
/// - 나머지는 패시지 제목 용어가 질의에 있을 때만 통과
pub fn is_grounded(query: &str, results: &[RetrievalResult], vocabulary: &Vocabulary) -> bool {
    let query_terms = term_set(query);
    if query_terms.is_empty() || results.is_empty() {
        return false;
    }

    let mut passage_terms: HashSet<String> = HashSet::new();
    for r in results {
        passage_terms.extend(term_set(&r.chunk.text));
        passage_terms.extend(term_set(&r.chunk.metadata.title));
        passage_terms.extend(term_set(&r.chunk.metadata.category));
    }

    let uncovered: Vec<&String> = query_terms
        .iter()
        .filter(|t| !passage_terms.contains(*t))
        .collect();
    if uncovered.is_empty() {
        return true;
    }

    let names_title = |r: &RetrievalResult| {
        term_set(&r.chunk.metadata.title)
            .iter()
            .any(|t| query_terms.contains(t))
    };

    if results
        .iter()
        .any(|r| names_title(r) && vocabulary.is_specific_title(&r.chunk.metadata.title))
    {
        return true;
    }

    if let Some(term) = uncovered.iter().find(|t| !vocabulary.contains(t.as_str())) {
        tracing::debug!("Query term '{}' is not in the knowledge base", term);
        return false;
    }

    results.iter().any(names_title)
}

/// LLM 컨텍스트 ("<label>:\n<text>" 블록)
pub fn build_context(results: &[RetrievalResult]) -> String {
    results
        .iter()
        .map(|r| format!("{}:\n{}", r.chunk.source_label(), r.chunk.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// 추출형 답변
///
/// 최상위 패시지의 엔트리에서 질의어와 겹치는 문장을 최대 6개 발췌합니다.
/// 겹치는 문장이 없으면 검색된 패시지 전체를 이어붙여 2000자로 자릅니다.
pub fn extractive_answer(query: &str, results: &[RetrievalResult]) -> ComposedAnswer {
    let Some(top) = results.first() else {
        return ComposedAnswer::not_available();
    };

    let query_terms = term_set(query);
    let primary: Vec<&RetrievalResult> = results
        .iter()
        .filter(|r| r.chunk.source_entry_id == top.chunk.source_entry_id)
        .collect();

    let mut selected: Vec<String> = Vec::new();
    'outer: for passage in &primary {
        for sentence in split_sentences(&passage.chunk.text) {
            if term_set(&sentence).iter().any(|t| query_terms.contains(t)) {
                selected.push(sentence);
                if selected.len() >= MAX_EXTRACTIVE_SENTENCES {
                    break 'outer;
                }
            }
        }
    }

    if !selected.is_empty() {
        let label = top.chunk.source_label();
        let bullets = selected
            .iter()
            .map(|s| format!("- {}", s))
            .collect::<Vec<_>>()
            .join("\n");

        return ComposedAnswer {
            answer: format!("{}:\n{}", label, bullets),
            sources: vec![label],
            mode: AnswerMode::Extractive,
        };
    }

    let joined = results
        .iter()
        .map(|r| r.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    ComposedAnswer {
        answer: truncate_chars(&joined, MAX_FALLBACK_CHARS),
        sources: unique_labels(results.iter()),
        mode: AnswerMode::Extractive,
    }
}

/// 순서를 유지한 중복 없는 출처 라벨
fn unique_labels<'a>(results: impl Iterator<Item = &'a RetrievalResult>) -> Vec<String> {
    let mut seen = HashSet::new();
    results
        .map(|r| r.chunk.source_label())
        .filter(|label| seen.insert(label.clone()))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
