//! 설정 모듈 - 환경변수 기반 RAG 설정
//!
//! 모든 백엔드 선택(임베딩, LLM)은 여기서 한 번 결정되고,
//! 서비스 생성 시점의 capability 확인 결과와 함께 고정됩니다.
//!
//! ## 환경변수
//! - `AGRI_RAG_DATA_DIR`: 데이터 디렉토리 (기본: ~/.agri-rag)
//! - `AGRI_RAG_EMBEDDING`: auto | gemini | hashing | none
//! - `AGRI_RAG_LLM`: auto | gemini | none
//! - `GEMINI_API_KEY` > `GOOGLE_AI_API_KEY` > `GOOGLE_API_KEY`

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Serialize;

use crate::knowledge::ChunkConfig;

/// LLM temperature 상한 (답변 분산 최소화)
pub const MAX_TEMPERATURE: f32 = 0.3;

/// 질문 최대 길이 (문자 수)
pub const DEFAULT_MAX_QUESTION_CHARS: usize = 2000;

/// 기본 검색 결과 수
pub const DEFAULT_TOP_K: usize = 5;

/// 기본 Gemini 생성 모델
pub const DEFAULT_LLM_MODEL: &str = "gemini-1.5-flash";

/// API 키 환경변수 (우선순위 순)
const API_KEY_VARS: [&str; 3] = ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY", "GOOGLE_API_KEY"];

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.agri-rag/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".agri-rag")
}

// ============================================================================
// API Key Management
// ============================================================================

/// API 키 로드 (환경변수에서)
///
/// 우선순위:
/// 1. `GEMINI_API_KEY`
/// 2. `GOOGLE_AI_API_KEY`
/// 3. `GOOGLE_API_KEY`
pub fn get_api_key() -> Option<String> {
    for var in API_KEY_VARS {
        if let Some(key) = env_var(var) {
            tracing::debug!("Using API key from {}", var);
            return Some(key);
        }
    }
    None
}

/// API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    API_KEY_VARS.iter().any(|var| env_var(var).is_some())
}

// ============================================================================
// Backend Kinds
// ============================================================================

/// 임베딩 백엔드 선택
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackendKind {
    /// API 키가 있으면 Gemini, 없으면 로컬 해싱
    Auto,
    /// Gemini 임베딩 API
    Gemini,
    /// 결정적 로컬 해싱 임베더
    Hashing,
    /// 임베딩 비활성 (키워드 검색 전용)
    None,
}

impl FromStr for EmbeddingBackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "gemini" => Ok(Self::Gemini),
            "hashing" | "hash" | "local" => Ok(Self::Hashing),
            "none" | "off" | "keyword" => Ok(Self::None),
            other => bail!(
                "Unknown embedding backend: {}. Use auto, gemini, hashing or none",
                other
            ),
        }
    }
}

/// LLM 설정 (Gemini generateContent)
#[derive(Debug, Clone, Serialize)]
pub struct LlmConfig {
    pub model: String,
    #[serde(skip)]
    pub api_key: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

impl LlmConfig {
    /// 기본 Gemini Flash 설정
    pub fn gemini(api_key: String) -> Self {
        Self {
            model: DEFAULT_LLM_MODEL.to_string(),
            api_key,
            temperature: 0.2,
            top_p: 0.9,
            max_tokens: 500,
        }
    }

    /// 실제 요청에 사용할 temperature (0.0 ~ MAX_TEMPERATURE)
    pub fn effective_temperature(&self) -> f32 {
        if self.temperature.is_nan() {
            return 0.0;
        }
        self.temperature.clamp(0.0, MAX_TEMPERATURE)
    }
}

// ============================================================================
// RagConfig
// ============================================================================

/// RAG 전체 설정
#[derive(Debug, Clone, Serialize)]
pub struct RagConfig {
    /// 데이터 디렉토리 (knowledge.db, index_cache.json)
    pub data_dir: PathBuf,
    /// 임베딩 백엔드
    pub embedding: EmbeddingBackendKind,
    /// 임베딩 차원 (None이면 백엔드 기본값)
    pub embedding_dimension: Option<usize>,
    /// Flat L2 최근접 이웃 백엔드 사용 여부 (false면 코사인만)
    pub nearest_neighbor: bool,
    /// LLM 설정 (None이면 추출형 답변)
    pub llm: Option<LlmConfig>,
    /// Gemini API 키
    #[serde(skip)]
    pub api_key: Option<String>,
    /// 청킹 설정
    pub chunk: ChunkConfig,
    /// 검색 결과 수
    pub top_k: usize,
    /// 질문 최대 길이
    pub max_question_chars: usize,
    /// 외부 호출 타임아웃 (초)
    pub request_timeout_secs: u64,
    /// 빈 저장소에 기본 코퍼스 시드 여부
    pub seed_default_corpus: bool,
    /// 인덱스 캐시 디스크 저장 여부
    pub persist_index: bool,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            data_dir: get_data_dir(),
            embedding: EmbeddingBackendKind::Auto,
            embedding_dimension: None,
            nearest_neighbor: true,
            llm: None,
            api_key: None,
            chunk: ChunkConfig::default(),
            top_k: DEFAULT_TOP_K,
            max_question_chars: DEFAULT_MAX_QUESTION_CHARS,
            request_timeout_secs: 30,
            seed_default_corpus: true,
            persist_index: true,
        }
    }
}

impl RagConfig {
    /// 환경변수에서 설정 로드
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(dir) = env_var("AGRI_RAG_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        config.api_key = get_api_key();

        if let Some(kind) = env_var("AGRI_RAG_EMBEDDING") {
            config.embedding = kind.parse()?;
        }
        if let Some(dim) = env_var("AGRI_RAG_EMBEDDING_DIM") {
            config.embedding_dimension =
                Some(dim.parse().context("AGRI_RAG_EMBEDDING_DIM must be a number")?);
        }
        if let Some(flag) = env_var("AGRI_RAG_NEAREST_NEIGHBOR") {
            config.nearest_neighbor = parse_bool(&flag)?;
        }
        if let Some(words) = env_var("AGRI_RAG_CHUNK_WORDS") {
            config.chunk.max_words = words
                .parse()
                .context("AGRI_RAG_CHUNK_WORDS must be a number")?;
        }
        if let Some(k) = env_var("AGRI_RAG_TOP_K") {
            config.top_k = k.parse().context("AGRI_RAG_TOP_K must be a number")?;
        }
        if let Some(secs) = env_var("AGRI_RAG_TIMEOUT_SECS") {
            config.request_timeout_secs = secs
                .parse()
                .context("AGRI_RAG_TIMEOUT_SECS must be a number")?;
        }
        if let Some(flag) = env_var("AGRI_RAG_SEED") {
            config.seed_default_corpus = parse_bool(&flag)?;
        }

        let llm_mode = env_var("AGRI_RAG_LLM").unwrap_or_else(|| "auto".to_string());
        config.llm = match llm_mode.to_lowercase().as_str() {
            "none" | "off" => None,
            "auto" | "gemini" => match config.api_key.clone() {
                Some(key) => {
                    let mut llm = LlmConfig::gemini(key);
                    if let Some(model) = env_var("AGRI_RAG_LLM_MODEL") {
                        llm.model = model;
                    }
                    Some(llm)
                }
                None => {
                    if llm_mode.eq_ignore_ascii_case("gemini") {
                        tracing::warn!("AGRI_RAG_LLM=gemini but no API key set; using extractive answers");
                    }
                    None
                }
            },
            other => bail!("Unknown LLM backend: {}. Use auto, gemini or none", other),
        };

        config.validate()?;
        Ok(config)
    }

    /// 설정값 검증
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            bail!("top_k must be at least 1");
        }
        if self.chunk.max_words == 0 {
            bail!("chunk.max_words must be at least 1");
        }
        if self.chunk.overlap_words >= self.chunk.max_words {
            bail!(
                "chunk.overlap_words ({}) must be smaller than chunk.max_words ({})",
                self.chunk.overlap_words,
                self.chunk.max_words
            );
        }
        if self.max_question_chars == 0 {
            bail!("max_question_chars must be at least 1");
        }
        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be at least 1");
        }
        if let Some(dim) = self.embedding_dimension {
            if dim == 0 {
                bail!("embedding_dimension must be at least 1");
            }
        }
        Ok(())
    }

    /// Auto를 실제 백엔드로 해석
    pub fn resolved_embedding(&self) -> EmbeddingBackendKind {
        match self.embedding {
            EmbeddingBackendKind::Auto => {
                if self.api_key.is_some() {
                    EmbeddingBackendKind::Gemini
                } else {
                    EmbeddingBackendKind::Hashing
                }
            }
            other => other,
        }
    }

    /// 외부 호출 타임아웃
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// SQLite 지식 저장소 경로
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("knowledge.db")
    }

    /// 인덱스 캐시 경로
    pub fn index_cache_path(&self) -> PathBuf {
        self.data_dir.join("index_cache.json")
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 비어있지 않은 환경변수 값
fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// 불리언 환경변수 파싱
fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("Invalid boolean value: {}", other),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RagConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.top_k, DEFAULT_TOP_K);
        assert_eq!(config.chunk.max_words, 400);
        assert_eq!(config.max_question_chars, 2000);
    }

    #[test]
    fn test_embedding_kind_parse() {
        assert_eq!(
            "gemini".parse::<EmbeddingBackendKind>().unwrap(),
            EmbeddingBackendKind::Gemini
        );
        assert_eq!(
            "HASHING".parse::<EmbeddingBackendKind>().unwrap(),
            EmbeddingBackendKind::Hashing
        );
        assert_eq!(
            "none".parse::<EmbeddingBackendKind>().unwrap(),
            EmbeddingBackendKind::None
        );
        assert!("faiss".parse::<EmbeddingBackendKind>().is_err());
    }

    #[test]
    fn test_resolved_embedding() {
        let mut config = RagConfig::default();
        config.api_key = None;
        assert_eq!(config.resolved_embedding(), EmbeddingBackendKind::Hashing);

        config.api_key = Some("fake_key".to_string());
        assert_eq!(config.resolved_embedding(), EmbeddingBackendKind::Gemini);

        config.embedding = EmbeddingBackendKind::None;
        assert_eq!(config.resolved_embedding(), EmbeddingBackendKind::None);
    }

    #[test]
    fn test_temperature_clamped() {
        let mut llm = LlmConfig::gemini("fake_key".to_string());
        assert!((llm.effective_temperature() - 0.2).abs() < f32::EPSILON);

        llm.temperature = 0.9;
        assert!((llm.effective_temperature() - MAX_TEMPERATURE).abs() < f32::EPSILON);

        llm.temperature = -1.0;
        assert_eq!(llm.effective_temperature(), 0.0);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = RagConfig::default();
        config.top_k = 0;
        assert!(config.validate().is_err());

        let mut config = RagConfig::default();
        config.chunk.overlap_words = config.chunk.max_words;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("yes").unwrap());
        assert!(!parse_bool("0").unwrap());
        assert!(parse_bool("maybe").is_err());
    }

    #[test]
    fn test_paths_under_data_dir() {
        let mut config = RagConfig::default();
        config.data_dir = PathBuf::from("/tmp/agri");
        assert_eq!(config.store_path(), PathBuf::from("/tmp/agri/knowledge.db"));
        assert_eq!(
            config.index_cache_path(),
            PathBuf::from("/tmp/agri/index_cache.json")
        );
    }
}
