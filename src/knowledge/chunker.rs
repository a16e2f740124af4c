//! Text Chunking Module
//!
//! 지식 엔트리를 단어 수 기준 패시지로 분할합니다.
//! 의미 기반 분할은 하지 않으며, 같은 입력은 항상 같은 경계를 만듭니다.

use serde::{Deserialize, Serialize};

use super::store::KnowledgeEntry;

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkConfig {
    /// 청크당 최대 단어 수
    pub max_words: usize,
    /// 청크 간 중첩 단어 수
    pub overlap_words: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_words: 400,
            overlap_words: 0,
        }
    }
}

impl ChunkConfig {
    /// 최대 단어 수만 지정 (중첩 없음)
    pub fn with_max_words(max_words: usize) -> Self {
        Self {
            max_words,
            overlap_words: 0,
        }
    }
}

// ============================================================================
// Chunk Types
// ============================================================================

/// 청크 메타데이터 (원본 엔트리에서 복사)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub title: String,
    pub category: String,
    pub region: String,
    pub season: String,
}

/// 인덱싱/검색 단위 패시지
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
    pub source_entry_id: i64,
    pub chunk_index: usize,
}

impl Chunk {
    /// 출처 라벨 ("Tomato (Fertilizer)")
    pub fn source_label(&self) -> String {
        format!("{} ({})", self.metadata.title, self.metadata.category)
    }

    /// 임베딩 입력 텍스트 (메타데이터 포함)
    pub fn embedding_text(&self) -> String {
        format!("{}: {}", self.source_label(), self.text)
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크 문자열로 분할
    fn chunk(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;

    /// 엔트리를 메타데이터가 붙은 청크로 분할
    fn chunk_entry(&self, entry: &KnowledgeEntry) -> Vec<Chunk> {
        let metadata = ChunkMetadata {
            title: entry.title.clone(),
            category: entry.category.clone(),
            region: entry.region.clone(),
            season: entry.season.clone(),
        };

        self.chunk(&entry.text)
            .into_iter()
            .enumerate()
            .map(|(i, text)| Chunk {
                text,
                metadata: metadata.clone(),
                source_entry_id: entry.id,
                chunk_index: i,
            })
            .collect()
    }
}

// ============================================================================
// WordChunker
// ============================================================================

/// 단어 수 윈도우 청커
///
/// - 짧은 문서는 정확히 한 청크
/// - 마지막 부분 청크도 버리지 않음
/// - 공백은 단일 스페이스로 정규화
pub struct WordChunker {
    config: ChunkConfig,
}

impl WordChunker {
    /// 설정으로 생성
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    /// 기본 설정으로 생성 (400 단어, 중첩 없음)
    pub fn with_defaults() -> Self {
        Self::new(ChunkConfig::default())
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }
}

impl Chunker for WordChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        chunk_words(text, self.config.max_words, self.config.overlap_words)
    }

    fn name(&self) -> &'static str {
        "WordChunker"
    }
}

/// 텍스트를 단어 수 기준 청크로 분할
///
/// # Arguments
/// * `text` - 분할할 텍스트
/// * `max_words` - 청크 당 단어 수 (0이면 1로 취급)
/// * `overlap` - 청크 간 중첩 단어 수 (max_words 미만으로 제한)
pub fn chunk_words(text: &str, max_words: usize, overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();

    if words.is_empty() {
        return vec![];
    }

    let max_words = max_words.max(1);
    let overlap = overlap.min(max_words - 1);
    let step = max_words - overlap;

    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let end = (start + max_words).min(words.len());
        chunks.push(words[start..end].join(" "));

        if end >= words.len() {
            break;
        }
        start += step;
    }

    chunks
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 기본 청커 생성
pub fn default_chunker() -> Box<dyn Chunker> {
    Box::new(WordChunker::with_defaults())
}

/// 설정 지정 청커 생성
pub fn word_chunker(config: ChunkConfig) -> Box<dyn Chunker> {
    Box::new(WordChunker::new(config))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(text: &str) -> KnowledgeEntry {
        KnowledgeEntry {
            id: 7,
            title: "Wheat".to_string(),
            category: "Irrigation".to_string(),
            region: "India".to_string(),
            season: "Rabi".to_string(),
            text: text.to_string(),
            created_at: Utc::now(),
        }
    }

    fn numbered_words(n: usize) -> String {
        (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_chunk_empty() {
        assert!(chunk_words("", 4, 0).is_empty());
        assert!(chunk_words("   \n ", 4, 0).is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk_words("a  b\nc", 4, 0);
        assert_eq!(chunks, vec!["a b c"]);
    }

    #[test]
    fn test_no_overlap_keeps_trailing_partial() {
        let chunks = chunk_words("a b c d e f g h i j", 4, 0);
        assert_eq!(chunks, vec!["a b c d", "e f g h", "i j"]);
    }

    #[test]
    fn test_overlap() {
        let chunks = chunk_words("a b c d e f g h i j", 4, 1);
        assert_eq!(chunks, vec!["a b c d", "d e f g", "g h i j"]);
    }

    #[test]
    fn test_word_count_preserved() {
        let chunker = WordChunker::with_defaults();
        for n in [1, 399, 400, 401, 1000, 1234] {
            let text = numbered_words(n);
            let chunks = chunker.chunk(&text);

            let total: usize = chunks.iter().map(|c| c.split_whitespace().count()).sum();
            assert_eq!(total, n);
            assert!(chunks.iter().all(|c| c.split_whitespace().count() <= 400));
            assert_eq!(chunks.join(" "), text);
        }
    }

    #[test]
    fn test_deterministic() {
        let chunker = WordChunker::new(ChunkConfig::with_max_words(7));
        let text = numbered_words(50);
        assert_eq!(chunker.chunk(&text), chunker.chunk(&text));
    }

    #[test]
    fn test_chunk_entry_metadata() {
        let chunker = WordChunker::new(ChunkConfig::with_max_words(3));
        let chunks = chunker.chunk_entry(&entry("one two three four five"));

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].source_entry_id, 7);
        assert_eq!(chunks[1].chunk_index, 1);
        assert_eq!(chunks[1].metadata.season, "Rabi");
        assert_eq!(chunks[0].source_label(), "Wheat (Irrigation)");
        assert_eq!(chunks[0].embedding_text(), "Wheat (Irrigation): one two three");
    }

    #[test]
    fn test_zero_max_words_does_not_loop() {
        let chunks = chunk_words("a b c", 0, 0);
        assert_eq!(chunks, vec!["a", "b", "c"]);
    }
}
