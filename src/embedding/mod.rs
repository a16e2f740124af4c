//! 임베딩 모듈 - 텍스트 벡터화
//!
//! `EmbeddingProvider` 트레이트와 두 구현체(Gemini 원격, 로컬 해싱),
//! 그리고 서비스 시작 시 한 번 capability를 확인하는 `Embedder` capability 래퍼를 제공합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = Embedder::from_config(&config).await;
//! if embedder.available() {
//!     let vector = embedder.embed_query("rice blast").await?;
//! }
//! ```

mod gemini;
mod hashing;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::config::{EmbeddingBackendKind, RagConfig};
use crate::error::RagError;

pub use gemini::{GeminiEmbedding, DEFAULT_DIMENSION};
pub(crate) use gemini::GeminiError;
pub use hashing::{HashingEmbedding, DEFAULT_HASHING_DIMENSION};

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 문서와 질의는 같은 벡터 공간에 임베딩되어야 합니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 문서 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 질의 임베딩 (기본 구현: 문서와 동일)
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text).await
    }

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Embedder (capability wrapper)
// ============================================================================

/// capability 확인용 텍스트
const CHECK_TEXT: &str = "crop fertilizer irrigation";

/// 임베딩 capability 래퍼
///
/// capability 확인에 실패한 프로바이더는 프로세스 수명 동안 비활성 상태로 고정되고,
/// 모든 호출은 `RagError::EmbeddingUnavailable`을 반환합니다.
#[derive(Clone)]
pub struct Embedder {
    provider: Option<Arc<dyn EmbeddingProvider>>,
    timeout: Duration,
}

impl std::fmt::Debug for Embedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Embedder")
            .field("provider", &self.name())
            .field("dimension", &self.dimension())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Embedder {
    /// 비활성 임베더 (키워드 검색 전용)
    pub fn disabled() -> Self {
        Self {
            provider: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// capability 확인 없이 프로바이더 사용
    pub fn with_provider(provider: Arc<dyn EmbeddingProvider>, timeout: Duration) -> Self {
        Self {
            provider: Some(provider),
            timeout,
        }
    }

    /// 한 번의 임베딩 호출로 프로바이더 검증
    ///
    /// 타임아웃, 에러, 차원 불일치, 비유한 값이면 비활성 임베더를 반환합니다.
    pub async fn detect(provider: Arc<dyn EmbeddingProvider>, timeout: Duration) -> Self {
        let name = provider.name().to_string();

        let result = match tokio::time::timeout(timeout, provider.embed(CHECK_TEXT)).await {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!("capability check timed out after {:?}", timeout)),
        };

        match result {
            Ok(vector)
                if vector.len() == provider.dimension() && vector.iter().all(|x| x.is_finite()) =>
            {
                tracing::info!("Embedding backend ready: {} (dim {})", name, vector.len());
                Self::with_provider(provider, timeout)
            }
            Ok(vector) => {
                tracing::warn!(
                    "Embedding backend {} returned invalid check vector (len {}), using keyword search",
                    name,
                    vector.len()
                );
                Self::disabled()
            }
            Err(e) => {
                tracing::warn!(
                    "Embedding backend {} unavailable, using keyword search: {:#}",
                    name,
                    e
                );
                Self::disabled()
            }
        }
    }

    /// 설정에 따라 프로바이더 생성 후 capability 확인
    pub async fn from_config(config: &RagConfig) -> Self {
        let timeout = config.request_timeout();

        let provider: Arc<dyn EmbeddingProvider> = match config.resolved_embedding() {
            EmbeddingBackendKind::None => {
                tracing::info!("Embedding disabled by configuration");
                return Self::disabled();
            }
            EmbeddingBackendKind::Hashing => Arc::new(HashingEmbedding::new(
                config
                    .embedding_dimension
                    .unwrap_or(DEFAULT_HASHING_DIMENSION),
            )),
            EmbeddingBackendKind::Gemini | EmbeddingBackendKind::Auto => {
                let Some(api_key) = config.api_key.clone() else {
                    tracing::warn!("Gemini embedding requested but no API key set");
                    return Self::disabled();
                };
                let dimension = config.embedding_dimension.unwrap_or(DEFAULT_DIMENSION);
                match GeminiEmbedding::with_dimension(api_key, dimension, timeout) {
                    Ok(embedder) => Arc::new(embedder),
                    Err(e) => {
                        tracing::warn!("Failed to create Gemini embedder: {:#}", e);
                        return Self::disabled();
                    }
                }
            }
        };

        Self::detect(provider, timeout).await
    }

    /// 임베딩 사용 가능 여부
    pub fn available(&self) -> bool {
        self.provider.is_some()
    }

    /// 프로바이더 이름 ("none" if disabled)
    pub fn name(&self) -> &str {
        self.provider.as_ref().map(|p| p.name()).unwrap_or("none")
    }

    /// 임베딩 차원 (비활성이면 0)
    pub fn dimension(&self) -> usize {
        self.provider.as_ref().map(|p| p.dimension()).unwrap_or(0)
    }

    /// 캐시 식별자 ("hashing:512")
    pub fn id(&self) -> String {
        format!("{}:{}", self.name(), self.dimension())
    }

    fn provider(&self) -> Result<&Arc<dyn EmbeddingProvider>> {
        self.provider
            .as_ref()
            .ok_or_else(|| RagError::EmbeddingUnavailable.into())
    }

    /// 문서 배치 임베딩
    ///
    /// 원격 요청별 타임아웃은 HTTP 클라이언트가 적용합니다.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let provider = self.provider()?;
        let vectors = provider
            .embed_batch(texts)
            .await
            .with_context(|| format!("{} failed to embed {} texts", provider.name(), texts.len()))?;

        if vectors.len() != texts.len() {
            anyhow::bail!(
                "{} returned {} vectors for {} texts",
                provider.name(),
                vectors.len(),
                texts.len()
            );
        }
        Ok(vectors)
    }

    /// 질의 임베딩 (타임아웃 적용)
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let provider = self.provider()?;
        tokio::time::timeout(self.timeout, provider.embed_query(text))
            .await
            .map_err(|_| anyhow::anyhow!("query embedding timed out after {:?}", self.timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 항상 실패하는 프로바이더
    struct FailingProvider;

    #[async_trait]
    impl EmbeddingProvider for FailingProvider {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            anyhow::bail!("connection refused")
        }

        fn dimension(&self) -> usize {
            8
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    /// 응답하지 않는 프로바이더
    struct HangingProvider;

    #[async_trait]
    impl EmbeddingProvider for HangingProvider {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(vec![0.0; 8])
        }

        fn dimension(&self) -> usize {
            8
        }

        fn name(&self) -> &str {
            "hanging"
        }
    }

    #[tokio::test]
    async fn test_detect_success() {
        let embedder =
            Embedder::detect(Arc::new(HashingEmbedding::new(16)), Duration::from_secs(1)).await;
        assert!(embedder.available());
        assert_eq!(embedder.id(), "hashing:16");
    }

    #[tokio::test]
    async fn test_detect_failure_disables() {
        let embedder = Embedder::detect(Arc::new(FailingProvider), Duration::from_secs(1)).await;
        assert!(!embedder.available());
        assert_eq!(embedder.name(), "none");

        let err = embedder.embed_query("wheat").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RagError>(),
            Some(RagError::EmbeddingUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_detect_timeout_disables() {
        let embedder =
            Embedder::detect(Arc::new(HangingProvider), Duration::from_millis(50)).await;
        assert!(!embedder.available());
    }

    #[tokio::test]
    async fn test_from_config_none() {
        let mut config = RagConfig::default();
        config.embedding = EmbeddingBackendKind::None;
        assert!(!Embedder::from_config(&config).await.available());
    }

    #[tokio::test]
    async fn test_from_config_hashing_dimension() {
        let mut config = RagConfig::default();
        config.embedding = EmbeddingBackendKind::Hashing;
        config.embedding_dimension = Some(128);

        let embedder = Embedder::from_config(&config).await;
        assert!(embedder.available());
        assert_eq!(embedder.dimension(), 128);

        let vectors = embedder
            .embed(&["maize".to_string(), "paddy".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors.len(), 2);
    }
}
