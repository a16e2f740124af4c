//! 로컬 해싱 임베더
//!
//! 네트워크 없이 동작하는 결정적 feature hashing 임베딩입니다.
//! 정규화된 토큰(키워드 검색과 같은 규칙)을 SHA-256으로 버킷에 배정하고
//! 부호를 붙여 더한 뒤 L2 정규화합니다.

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::knowledge::normalized;
use crate::knowledge::text::tokenize;

use super::EmbeddingProvider;

/// 기본 해싱 차원
pub const DEFAULT_HASHING_DIMENSION: usize = 512;

/// Feature hashing 임베더
#[derive(Debug, Clone)]
pub struct HashingEmbedding {
    dimension: usize,
}

impl HashingEmbedding {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// 텍스트 → 벡터 (동기)
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&digest[..8]);
            let hash = u64::from_le_bytes(bytes);

            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        normalized(vector)
    }
}

impl Default for HashingEmbedding {
    fn default() -> Self {
        Self::new(DEFAULT_HASHING_DIMENSION)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::cosine_similarity;

    #[test]
    fn test_deterministic_and_normalized() {
        let embedder = HashingEmbedding::new(64);
        let a = embedder.embed_text("Drip irrigation for onion");
        let b = embedder.embed_text("Drip irrigation for onion");

        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_related_texts_are_closer() {
        let embedder = HashingEmbedding::default();
        let query = embedder.embed_text("tomato fertilizer");
        let related = embedder.embed_text("Tomato (Fertilizer): apply NPK fertilizer to tomato");
        let unrelated = embedder.embed_text("Rice (Irrigation): keep standing water in paddy");

        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[test]
    fn test_stopword_only_text_is_zero() {
        let embedder = HashingEmbedding::new(16);
        assert!(embedder.embed_text("what is the").iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn test_batch_matches_single() {
        let embedder = HashingEmbedding::new(32);
        let texts = vec!["wheat rust".to_string(), "cotton bollworm".to_string()];
        let batch = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(batch[1], embedder.embed("cotton bollworm").await.unwrap());
    }
}
