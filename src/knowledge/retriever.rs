//! Retriever - 인덱스 스냅샷 관리 및 폴백 검색
//!
//! 인덱스는 첫 검색 시점과 저장소 변경 이후(stale 플래그)에 지연 생성됩니다.
//! 리빌드는 async mutex로 직렬화되고, 완성된 스냅샷은 `Arc`로 통째로 교체되어
//! 동시 검색은 항상 이전 또는 새 스냅샷 중 하나 전체만 봅니다.
//!
//! 검색 순서: 질의 임베딩 → FlatL2 → Cosine → Keyword
//! 벡터 경로의 실패는 로그만 남기고 키워드 검색으로 내려갑니다.
//! 코퍼스 임베딩이 실패한 스냅샷은 degraded로 표시되고, 재시도 간격이
//! 지난 뒤 다음 검색에서 다시 빌드됩니다.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::embedding::Embedder;
use crate::error::RagError;

use super::cache::{fingerprint, IndexBundle, IndexCache};
use super::chunker::{Chunk, Chunker};
use super::keyword::{KeywordIndex, Vocabulary};
use super::store::KnowledgeStore;
use super::vector::{CosineIndex, FlatL2Index, RetrievalResult, VectorIndex};

// ============================================================================
// IndexSnapshot
// ============================================================================

/// 불변 인덱스 스냅샷
#[derive(Debug)]
pub struct IndexSnapshot {
    chunks: Arc<Vec<Chunk>>,
    flat: Option<FlatL2Index>,
    cosine: Option<CosineIndex>,
    keyword: KeywordIndex,
    embedder_id: Option<String>,
    /// 임베딩 실패로 키워드 전용이 된 스냅샷
    degraded: bool,
    built_at: DateTime<Utc>,
    built_instant: Instant,
}

impl IndexSnapshot {
    fn keyword_only(chunks: Arc<Vec<Chunk>>) -> Self {
        let mut keyword = KeywordIndex::new();
        keyword.build(chunks.clone());

        Self {
            chunks,
            flat: None,
            cosine: None,
            keyword,
            embedder_id: None,
            degraded: false,
            built_at: Utc::now(),
            built_instant: Instant::now(),
        }
    }

    /// 벡터 인덱스 보유 여부
    pub fn has_vectors(&self) -> bool {
        self.flat.is_some() || self.cosine.is_some()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn vocabulary(&self) -> Arc<Vocabulary> {
        self.keyword.vocabulary()
    }
}

/// 검색 결과와 그 결과를 만든 스냅샷의 코퍼스 용어 집합
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub results: Vec<RetrievalResult>,
    pub vocabulary: Arc<Vocabulary>,
}

/// 스냅샷 상태 요약
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotStats {
    pub built: bool,
    pub stale: bool,
    pub degraded: bool,
    pub chunk_count: usize,
    pub vector_count: usize,
    pub embedder: Option<String>,
    pub built_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Retriever
// ============================================================================

/// 코퍼스 임베딩 실패 후 재시도까지의 기본 간격
pub const EMBEDDING_RETRY_BACKOFF: Duration = Duration::from_secs(30);

/// 지연 인덱싱 검색기
pub struct Retriever {
    store: Arc<KnowledgeStore>,
    chunker: Box<dyn Chunker>,
    embedder: Embedder,
    cache: Option<IndexCache>,
    nearest_neighbor: bool,
    retry_backoff: Duration,
    snapshot: RwLock<Option<Arc<IndexSnapshot>>>,
    stale: AtomicBool,
    build_lock: Mutex<()>,
}

impl Retriever {
    /// 검색기 생성 (캐시 없음, FlatL2 사용)
    pub fn new(store: Arc<KnowledgeStore>, chunker: Box<dyn Chunker>, embedder: Embedder) -> Self {
        Self {
            store,
            chunker,
            embedder,
            cache: None,
            nearest_neighbor: true,
            retry_backoff: EMBEDDING_RETRY_BACKOFF,
            snapshot: RwLock::new(None),
            stale: AtomicBool::new(true),
            build_lock: Mutex::new(()),
        }
    }

    /// 디스크 인덱스 캐시 사용
    pub fn with_cache(mut self, cache: IndexCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// FlatL2 백엔드 사용 여부 (false면 코사인만)
    pub fn with_nearest_neighbor(mut self, enabled: bool) -> Self {
        self.nearest_neighbor = enabled;
        self
    }

    /// degraded 스냅샷 재시도 간격
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn embedder(&self) -> &Embedder {
        &self.embedder
    }

    /// 저장소 변경 알림 (다음 검색 시 리빌드)
    pub fn mark_stale(&self) {
        self.stale.store(true, Ordering::SeqCst);
    }

    fn current(&self) -> Option<Arc<IndexSnapshot>> {
        match self.snapshot.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn install(&self, snapshot: Arc<IndexSnapshot>) {
        match self.snapshot.write() {
            Ok(mut guard) => *guard = Some(snapshot),
            Err(poisoned) => *poisoned.into_inner() = Some(snapshot),
        }
    }

    /// 재사용 가능한 현재 스냅샷 (리빌드가 필요하면 None)
    fn reusable(&self) -> Option<Arc<IndexSnapshot>> {
        if self.stale.load(Ordering::SeqCst) {
            return None;
        }
        self.current()
            .filter(|s| !s.degraded || s.built_instant.elapsed() < self.retry_backoff)
    }

    /// 최신 스냅샷 획득 (필요 시 리빌드)
    ///
    /// 저장소를 읽지 못하면 이전 스냅샷을 사용하고, 그것도 없으면
    /// `ServiceUnavailable`을 반환합니다.
    async fn snapshot(&self) -> Result<Arc<IndexSnapshot>> {
        if let Some(snapshot) = self.reusable() {
            return Ok(snapshot);
        }

        let _guard = self.build_lock.lock().await;

        // 대기 중 다른 작업이 리빌드를 끝냈을 수 있음
        if let Some(snapshot) = self.reusable() {
            return Ok(snapshot);
        }

        // 빌드 중 들어온 변경은 다시 stale로 표시됨
        self.stale.store(false, Ordering::SeqCst);

        match self.build_snapshot().await {
            Ok(snapshot) => {
                if snapshot.degraded {
                    tracing::warn!(
                        "Serving keyword-only index, embedding retry in {:?}",
                        self.retry_backoff
                    );
                }
                let snapshot = Arc::new(snapshot);
                self.install(snapshot.clone());
                Ok(snapshot)
            }
            Err(e) => {
                self.stale.store(true, Ordering::SeqCst);
                match self.current() {
                    Some(previous) => {
                        tracing::warn!("Index rebuild failed, serving previous snapshot: {:#}", e);
                        Ok(previous)
                    }
                    None => {
                        tracing::error!("Index rebuild failed with no snapshot: {:#}", e);
                        Err(RagError::ServiceUnavailable.into())
                    }
                }
            }
        }
    }

    /// 저장소 전체로 새 스냅샷 생성
    async fn build_snapshot(&self) -> Result<IndexSnapshot> {
        let entries = self.store.list()?;
        let chunks: Vec<Chunk> = entries
            .iter()
            .flat_map(|e| self.chunker.chunk_entry(e))
            .collect();

        tracing::info!(
            "Rebuilding index: {} entries, {} chunks ({})",
            entries.len(),
            chunks.len(),
            self.chunker.name()
        );

        let chunks = Arc::new(chunks);
        if chunks.is_empty() || !self.embedder.available() {
            return Ok(IndexSnapshot::keyword_only(chunks));
        }

        let vectors = match self.load_or_embed(&chunks).await {
            Ok(vectors) => vectors,
            Err(e) => {
                tracing::warn!("Corpus embedding failed, keyword search only: {:#}", e);
                let mut snapshot = IndexSnapshot::keyword_only(chunks);
                snapshot.degraded = true;
                return Ok(snapshot);
            }
        };

        let mut snapshot = IndexSnapshot::keyword_only(chunks.clone());
        snapshot.embedder_id = Some(self.embedder.id());

        if self.nearest_neighbor {
            let mut flat = FlatL2Index::new();
            match flat.build(chunks.clone(), vectors.clone()) {
                Ok(()) => snapshot.flat = Some(flat),
                Err(e) => tracing::warn!("FlatL2 index build failed: {:#}", e),
            }
        }

        let mut cosine = CosineIndex::new();
        match cosine.build(chunks, vectors) {
            Ok(()) => snapshot.cosine = Some(cosine),
            Err(e) => tracing::warn!("Cosine index build failed: {:#}", e),
        }

        if !snapshot.has_vectors() {
            snapshot.embedder_id = None;
        }
        Ok(snapshot)
    }

    /// 캐시된 벡터 사용, 없으면 임베딩 후 캐시 저장
    async fn load_or_embed(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let embedder_id = self.embedder.id();
        let fp = fingerprint(chunks, &embedder_id);

        if let Some(cache) = &self.cache {
            if let Some(bundle) = cache.load(&fp, &embedder_id) {
                tracing::info!("Reusing cached index ({} vectors)", bundle.vectors.len());
                return Ok(bundle.vectors);
            }
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.embedding_text()).collect();
        let vectors = self.embedder.embed(&texts).await?;

        if let Some(cache) = &self.cache {
            let bundle = IndexBundle::new(embedder_id, chunks.to_vec(), vectors);
            if let Err(e) = cache.save(&bundle) {
                tracing::warn!("Failed to save index cache: {:#}", e);
            }
            return Ok(bundle.vectors);
        }

        Ok(vectors)
    }

    /// 질의 검색 (상위 k개)
    ///
    /// 코퍼스가 비었거나 키워드 폴백에서 겹치는 용어가 없을 때만 빈 결과입니다.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievalResult>> {
        Ok(self.retrieve_with_vocabulary(query, k).await?.results)
    }

    /// 질의 검색 + 같은 스냅샷의 코퍼스 용어 집합
    pub async fn retrieve_with_vocabulary(&self, query: &str, k: usize) -> Result<Retrieval> {
        let snapshot = self.snapshot().await?;
        let vocabulary = snapshot.vocabulary();

        if snapshot.chunks.is_empty() || k == 0 {
            return Ok(Retrieval {
                results: vec![],
                vocabulary,
            });
        }

        if snapshot.has_vectors() && self.embedder.available() {
            match self.vector_search(&snapshot, query, k).await {
                Some(results) => return Ok(Retrieval { results, vocabulary }),
                None => tracing::warn!("Vector search unavailable, falling back to keyword search"),
            }
        }

        let results = snapshot.keyword.search(query, k);
        tracing::debug!("Keyword search returned {} results", results.len());
        Ok(Retrieval { results, vocabulary })
    }

    /// 벡터 경로 (FlatL2 → Cosine), 실패 시 None
    async fn vector_search(
        &self,
        snapshot: &IndexSnapshot,
        query: &str,
        k: usize,
    ) -> Option<Vec<RetrievalResult>> {
        let query_vector = match self.embedder.embed_query(query).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Query embedding failed: {:#}", e);
                return None;
            }
        };

        let backends = [
            snapshot.flat.as_ref().map(|i| i as &dyn VectorIndex),
            snapshot.cosine.as_ref().map(|i| i as &dyn VectorIndex),
        ];

        for index in backends.into_iter().flatten() {
            match index.search(&query_vector, k) {
                Ok(results) => {
                    tracing::debug!(
                        "{} search returned {} results",
                        index.backend().as_str(),
                        results.len()
                    );
                    return Some(results);
                }
                Err(e) => tracing::warn!("{} search failed: {:#}", index.backend().as_str(), e),
            }
        }

        None
    }

    /// 강제 리빌드
    ///
    /// # Returns
    /// 인덱싱된 청크 수
    pub async fn rebuild(&self) -> Result<usize> {
        self.mark_stale();
        let snapshot = self.snapshot().await?;
        Ok(snapshot.chunk_count())
    }

    /// 현재 스냅샷 상태 (리빌드하지 않음)
    pub fn snapshot_stats(&self) -> SnapshotStats {
        let stale = self.stale.load(Ordering::SeqCst);
        match self.current() {
            Some(s) => SnapshotStats {
                built: true,
                stale,
                degraded: s.degraded,
                chunk_count: s.chunk_count(),
                vector_count: s
                    .flat
                    .as_ref()
                    .map(|i| i.len())
                    .or_else(|| s.cosine.as_ref().map(|i| i.len()))
                    .unwrap_or(0),
                embedder: s.embedder_id.clone(),
                built_at: Some(s.built_at),
            },
            None => SnapshotStats {
                built: false,
                stale,
                degraded: false,
                chunk_count: 0,
                vector_count: 0,
                embedder: None,
                built_at: None,
            },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
