//! Keyword Index - 용어 중첩 기반 검색
//!
//! 임베딩을 사용할 수 없을 때의 최종 검색 경로입니다.
//! 청크 본문과 제목/카테고리 토큰을 모두 용어 집합에 넣습니다.

use std::collections::HashSet;
use std::sync::Arc;

use super::chunker::Chunk;
use super::text::term_set;
use super::vector::{RawScore, RetrievalResult, SearchBackend};

// ============================================================================
// Vocabulary
// ============================================================================

/// 코퍼스 전체 용어 집합
///
/// 근거 검사에서 코퍼스에 아예 없는 질의어를 가려내는 데 씁니다.
/// 카테고리 용어와 겹치는 제목("Fertilizers", "Major Crops")은 주제 제목이고,
/// 나머지 제목(작물 이름 등)만 특정 대상을 가리킵니다.
#[derive(Debug, Default, Clone)]
pub struct Vocabulary {
    terms: HashSet<String>,
    category_terms: HashSet<String>,
}

impl Vocabulary {
    pub fn from_chunks(chunks: &[Chunk]) -> Self {
        let mut vocabulary = Self::default();
        for c in chunks {
            let category = term_set(&c.metadata.category);
            vocabulary.terms.extend(term_set(&c.text));
            vocabulary.terms.extend(term_set(&c.metadata.title));
            vocabulary.terms.extend(category.iter().cloned());
            vocabulary.category_terms.extend(category);
        }
        vocabulary
    }

    pub fn contains(&self, term: &str) -> bool {
        self.terms.contains(term)
    }

    /// 제목이 특정 대상을 가리키는지 (주제 제목이면 false)
    pub fn is_specific_title(&self, title: &str) -> bool {
        let terms = term_set(title);
        !terms.is_empty() && !terms.iter().any(|t| self.is_topic_term(t))
    }

    // "seasonal" / "season"처럼 어형만 다른 경우도 주제 용어
    fn is_topic_term(&self, term: &str) -> bool {
        self.category_terms
            .iter()
            .any(|c| term.starts_with(c.as_str()) || c.starts_with(term))
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

// ============================================================================
// KeywordIndex
// ============================================================================

/// 키워드 중첩 인덱스
#[derive(Debug, Default)]
pub struct KeywordIndex {
    chunks: Arc<Vec<Chunk>>,
    terms: Vec<HashSet<String>>,
    vocabulary: Arc<Vocabulary>,
}

impl KeywordIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// 청크 용어 집합 구성 (이전 상태 대체)
    pub fn build(&mut self, chunks: Arc<Vec<Chunk>>) {
        self.terms = chunks
            .iter()
            .map(|c| {
                let mut terms = term_set(&c.text);
                terms.extend(term_set(&c.metadata.title));
                terms.extend(term_set(&c.metadata.category));
                terms
            })
            .collect();
        self.vocabulary = Arc::new(Vocabulary::from_chunks(&chunks));
        self.chunks = chunks;

        tracing::debug!("Built keyword index: {} chunks", self.chunks.len());
    }

    /// 질의어와 겹치는 청크 검색
    ///
    /// 겹치는 용어가 없는 청크는 제외하고, 동점은 코퍼스 순서를 유지합니다.
    /// 점수는 `겹친 용어 수 / 질의 용어 수`입니다.
    pub fn search(&self, query: &str, k: usize) -> Vec<RetrievalResult> {
        let query_terms = term_set(query);
        if query_terms.is_empty() || k == 0 {
            return vec![];
        }

        let mut scored: Vec<(usize, u32)> = self
            .terms
            .iter()
            .enumerate()
            .filter_map(|(i, terms)| {
                let overlap = query_terms.iter().filter(|t| terms.contains(*t)).count() as u32;
                (overlap > 0).then_some((i, overlap))
            })
            .collect();

        // sort_by는 안정 정렬이므로 동점은 코퍼스 순서
        scored.sort_by(|a, b| b.1.cmp(&a.1));
        scored.truncate(k);

        let total = query_terms.len() as f32;
        scored
            .into_iter()
            .map(|(i, overlap)| RetrievalResult {
                chunk: self.chunks[i].clone(),
                score: overlap as f32 / total,
                raw: RawScore::Overlap(overlap),
                backend: SearchBackend::Keyword,
            })
            .collect()
    }

    /// 인덱싱된 코퍼스의 용어 집합
    pub fn vocabulary(&self) -> Arc<Vocabulary> {
        self.vocabulary.clone()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::chunker::ChunkMetadata;

    fn chunk(id: i64, title: &str, category: &str, text: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            metadata: ChunkMetadata {
                title: title.to_string(),
                category: category.to_string(),
                region: "India".to_string(),
                season: "all".to_string(),
            },
            source_entry_id: id,
            chunk_index: 0,
        }
    }

    fn index() -> KeywordIndex {
        let mut index = KeywordIndex::new();
        index.build(Arc::new(vec![
            chunk(1, "Wheat", "Fertilizer", "Apply urea at tillering stage."),
            chunk(2, "Tomato", "Fertilizer", "Use NPK 19:19:19 and calcium nitrate."),
            chunk(3, "Tomato", "Pest", "Whitefly spreads leaf curl virus."),
            chunk(4, "Rice", "Irrigation", "Keep standing water in the paddy."),
        ]));
        index
    }

    #[test]
    fn test_title_and_category_are_indexed() {
        let results = index().search("Which fertilizer is best for tomatoes?", 5);

        assert_eq!(results[0].chunk.source_entry_id, 2);
        assert_eq!(results[0].raw, RawScore::Overlap(2));
        assert!((results[0].score - 1.0).abs() < 1e-6);
        assert!(results.iter().all(|r| r.backend == SearchBackend::Keyword));
    }

    #[test]
    fn test_ties_keep_corpus_order() {
        let results = index().search("fertilizer", 5);
        let ids: Vec<i64> = results.iter().map(|r| r.chunk.source_entry_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_zero_overlap_excluded() {
        let results = index().search("banana cultivation", 5);
        assert!(results.is_empty());
    }

    #[test]
    fn test_limit_respected() {
        let results = index().search("tomato fertilizer rice wheat", 2);
        assert_eq!(results.len(), 2);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_stopword_only_query() {
        assert!(index().search("what is the", 5).is_empty());
    }

    #[test]
    fn test_vocabulary_covers_whole_corpus() {
        let vocabulary = index().vocabulary();

        assert!(vocabulary.contains("paddy"));
        assert!(vocabulary.contains("tomato"));
        assert!(vocabulary.contains("irrigation"));
        assert!(!vocabulary.contains("banana"));
    }

    #[test]
    fn test_topic_titles_are_not_specific() {
        let chunks = vec![
            chunk(1, "Rice", "Pest", "Stem borer."),
            chunk(2, "Fertilizers", "Fertilizer", "Urea and DAP."),
            chunk(3, "Pests and Diseases", "Pests", "Aphids and blight."),
            chunk(4, "Seasonal Calendar", "Season", "Kharif and rabi."),
        ];
        let vocabulary = Vocabulary::from_chunks(&chunks);

        assert!(vocabulary.is_specific_title("Rice"));
        assert!(!vocabulary.is_specific_title("Fertilizers"));
        assert!(!vocabulary.is_specific_title("Pests and Diseases"));
        assert!(!vocabulary.is_specific_title("Seasonal Calendar"));
    }
}
