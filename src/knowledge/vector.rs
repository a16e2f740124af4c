//! Vector Index - 벡터 검색 트레이트 및 구현
//!
//! 두 가지 교체 가능한 인메모리 백엔드를 제공합니다:
//! - `FlatL2Index`: 정확한 L2 최근접 이웃 (O(n) 전수 스캔)
//! - `CosineIndex`: 정규화 벡터 내적
//!
//! 점수는 백엔드마다 0.0 ~ 1.0 "goodness"로 정규화되며,
//! 원본 값은 `RawScore`에 보존됩니다. 한 랭킹 안에서 백엔드를 섞지 않습니다.

use std::cmp::Ordering;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::error::RagError;

use super::chunker::Chunk;

// ============================================================================
// Types
// ============================================================================

/// 검색 백엔드 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchBackend {
    /// Flat L2 최근접 이웃
    NearestNeighbor,
    /// 코사인 유사도
    Cosine,
    /// 키워드 중첩
    Keyword,
}

impl SearchBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchBackend::NearestNeighbor => "nearest_neighbor",
            SearchBackend::Cosine => "cosine",
            SearchBackend::Keyword => "keyword",
        }
    }
}

/// 백엔드 고유 점수
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum RawScore {
    /// L2 거리 (낮을수록 좋음)
    L2Distance(f32),
    /// 코사인 유사도 (-1.0 ~ 1.0)
    Cosine(f32),
    /// 중첩 질의어 수 (항상 1 이상)
    Overlap(u32),
}

/// 검색 결과 (요청 단위, 점수 내림차순)
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub chunk: Chunk,
    /// 정규화 점수 (0.0 ~ 1.0, 높을수록 좋음)
    pub score: f32,
    pub raw: RawScore,
    pub backend: SearchBackend,
}

// ============================================================================
// VectorIndex Trait
// ============================================================================

/// 벡터 인덱스 공통 인터페이스
///
/// `build`는 이전 상태를 완전히 대체하므로 같은 입력으로 여러 번 호출해도
/// 결과가 같습니다. `search`는 마지막 `build`의 청크만 반환합니다.
pub trait VectorIndex: Send + Sync {
    /// 청크와 벡터(1:1)로 인덱스 구성
    fn build(&mut self, chunks: Arc<Vec<Chunk>>, vectors: Vec<Vec<f32>>) -> Result<()>;

    /// 상위 k개 검색 (goodness 내림차순, 길이 ≤ k)
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievalResult>>;

    /// 인덱싱된 벡터 수
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 백엔드 종류
    fn backend(&self) -> SearchBackend;
}

// ============================================================================
// FlatL2Index
// ============================================================================

/// 정확한 L2 최근접 이웃 인덱스
///
/// 코퍼스 규모(수십 ~ 수천 청크)에서는 전수 스캔으로 충분합니다.
#[derive(Debug, Default)]
pub struct FlatL2Index {
    chunks: Arc<Vec<Chunk>>,
    vectors: Vec<Vec<f32>>,
    dimension: usize,
}

impl FlatL2Index {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

impl VectorIndex for FlatL2Index {
    fn build(&mut self, chunks: Arc<Vec<Chunk>>, vectors: Vec<Vec<f32>>) -> Result<()> {
        let dimension = validate_vectors(&chunks, &vectors)?;

        self.chunks = chunks;
        self.vectors = vectors;
        self.dimension = dimension;

        tracing::debug!(
            "Built flat L2 index: {} vectors (dim {})",
            self.vectors.len(),
            self.dimension
        );
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievalResult>> {
        if self.vectors.is_empty() || k == 0 {
            return Ok(vec![]);
        }
        check_query(query, self.dimension)?;

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, l2_distance(query, v)))
            .collect();

        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, distance)| RetrievalResult {
                chunk: self.chunks[i].clone(),
                // L2 거리 → 유사도 (0, 1]
                score: 1.0 / (1.0 + distance),
                raw: RawScore::L2Distance(distance),
                backend: SearchBackend::NearestNeighbor,
            })
            .collect())
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn backend(&self) -> SearchBackend {
        SearchBackend::NearestNeighbor
    }
}

// ============================================================================
// CosineIndex
// ============================================================================

/// 코사인 유사도 인덱스
///
/// build 시점에 모든 벡터를 정규화해 두고 검색은 내적만 계산합니다.
#[derive(Debug, Default)]
pub struct CosineIndex {
    chunks: Arc<Vec<Chunk>>,
    normalized: Vec<Vec<f32>>,
    dimension: usize,
}

impl CosineIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VectorIndex for CosineIndex {
    fn build(&mut self, chunks: Arc<Vec<Chunk>>, vectors: Vec<Vec<f32>>) -> Result<()> {
        let dimension = validate_vectors(&chunks, &vectors)?;

        self.normalized = vectors.into_iter().map(normalized).collect();
        self.chunks = chunks;
        self.dimension = dimension;

        tracing::debug!("Built cosine index: {} vectors", self.normalized.len());
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievalResult>> {
        if self.normalized.is_empty() || k == 0 {
            return Ok(vec![]);
        }
        check_query(query, self.dimension)?;

        let query = normalized(query.to_vec());

        let mut scored: Vec<(usize, f32)> = self
            .normalized
            .iter()
            .enumerate()
            .map(|(i, v)| (i, dot(&query, v)))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, cosine)| RetrievalResult {
                chunk: self.chunks[i].clone(),
                score: ((1.0 + cosine) / 2.0).clamp(0.0, 1.0),
                raw: RawScore::Cosine(cosine),
                backend: SearchBackend::Cosine,
            })
            .collect())
    }

    fn len(&self) -> usize {
        self.normalized.len()
    }

    fn backend(&self) -> SearchBackend {
        SearchBackend::Cosine
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 결과는 -1.0 ~ 1.0 범위입니다. 길이가 다르거나 영벡터면 0.0을 반환합니다.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product = dot(a, b);
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// 유클리드(L2) 거리
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// L2 정규화 (영벡터는 그대로)
pub fn normalized(mut v: Vec<f32>) -> Vec<f32> {
    let norm = l2_norm(&v);
    if norm > f32::EPSILON {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// 청크/벡터 1:1 대응과 차원 일관성 검사
///
/// # Returns
/// 벡터 차원 (벡터가 없으면 0)
fn validate_vectors(chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<usize> {
    if chunks.len() != vectors.len() {
        return Err(RagError::RetrievalBackend(format!(
            "chunk/vector count mismatch: {} chunks, {} vectors",
            chunks.len(),
            vectors.len()
        ))
        .into());
    }

    let dimension = vectors.first().map(|v| v.len()).unwrap_or(0);
    if vectors.iter().any(|v| v.len() != dimension || v.is_empty()) {
        return Err(RagError::RetrievalBackend(
            "inconsistent or empty vector dimensions".to_string(),
        )
        .into());
    }

    Ok(dimension)
}

fn check_query(query: &[f32], dimension: usize) -> Result<()> {
    if query.len() != dimension {
        return Err(RagError::RetrievalBackend(format!(
            "query dimension {} does not match index dimension {}",
            query.len(),
            dimension
        ))
        .into());
    }
    if query.iter().any(|x| !x.is_finite()) {
        return Err(RagError::RetrievalBackend("query vector is not finite".to_string()).into());
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::chunker::ChunkMetadata;

    fn chunks(n: usize) -> Arc<Vec<Chunk>> {
        Arc::new(
            (0..n)
                .map(|i| Chunk {
                    text: format!("chunk {}", i),
                    metadata: ChunkMetadata {
                        title: format!("Doc {}", i),
                        category: "Test".to_string(),
                        region: "India".to_string(),
                        season: "all".to_string(),
                    },
                    source_entry_id: i as i64,
                    chunk_index: 0,
                })
                .collect(),
        )
    }

    fn vectors() -> Vec<Vec<f32>> {
        vec![
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.7, 0.7, 0.0],
            vec![-1.0, 0.0, 0.0],
        ]
    }

    fn assert_sorted_desc(results: &[RetrievalResult]) {
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_cosine_similarity_values() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-4);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-4);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-4);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_flat_l2_search_order_and_limit() {
        let mut index = FlatL2Index::new();
        index.build(chunks(4), vectors()).unwrap();

        let results = index.search(&[1.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.text, "chunk 0");
        assert_eq!(results[0].raw, RawScore::L2Distance(0.0));
        assert!((results[0].score - 1.0).abs() < 1e-6);
        assert_sorted_desc(&results);
        assert!(results.iter().all(|r| r.backend == SearchBackend::NearestNeighbor));
    }

    #[test]
    fn test_cosine_search_order() {
        let mut index = CosineIndex::new();
        index.build(chunks(4), vectors()).unwrap();

        let results = index.search(&[2.0, 0.0, 0.0], 10).unwrap();
        assert_eq!(results.len(), 4);
        assert_eq!(results[0].chunk.text, "chunk 0");
        assert_eq!(results[1].chunk.text, "chunk 2");
        assert_eq!(results[3].chunk.text, "chunk 3");
        assert!(results[3].score.abs() < 1e-4);
        assert_sorted_desc(&results);
    }

    #[test]
    fn test_build_is_idempotent() {
        let mut index = FlatL2Index::new();
        index.build(chunks(4), vectors()).unwrap();
        let first: Vec<String> = index
            .search(&[0.5, 0.5, 0.0], 3)
            .unwrap()
            .into_iter()
            .map(|r| r.chunk.text)
            .collect();

        index.build(chunks(4), vectors()).unwrap();
        let second: Vec<String> = index
            .search(&[0.5, 0.5, 0.0], 3)
            .unwrap()
            .into_iter()
            .map(|r| r.chunk.text)
            .collect();

        assert_eq!(first, second);
        assert_eq!(index.len(), 4);
    }

    #[test]
    fn test_rebuild_replaces_chunks() {
        let mut index = CosineIndex::new();
        index.build(chunks(4), vectors()).unwrap();
        index.build(chunks(1), vec![vec![0.0, 0.0, 1.0]]).unwrap();

        let results = index.search(&[1.0, 0.0, 0.0], 5).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.text, "chunk 0");
    }

    #[test]
    fn test_dimension_mismatch_is_backend_failure() {
        let mut index = FlatL2Index::new();
        index.build(chunks(4), vectors()).unwrap();

        let err = index.search(&[1.0, 0.0], 2).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RagError>(),
            Some(RagError::RetrievalBackend(_))
        ));
    }

    #[test]
    fn test_build_rejects_count_mismatch() {
        let mut index = CosineIndex::new();
        assert!(index.build(chunks(3), vectors()).is_err());
    }

    #[test]
    fn test_empty_index_returns_nothing() {
        let index = FlatL2Index::new();
        assert!(index.search(&[1.0], 3).unwrap().is_empty());
        assert!(index.is_empty());
    }
}
