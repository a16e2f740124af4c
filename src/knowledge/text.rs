//! 텍스트 정규화 유틸리티
//!
//! 키워드 검색, 해싱 임베더, 근거 검사, 추출형 답변이 모두 같은
//! 토큰화 규칙을 공유해야 점수가 일관됩니다.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

/// 질문에서 의미 없는 단어 (질문사, 관사, 전치사 등)
const STOPWORDS: &[&str] = &[
    "a", "about", "all", "an", "and", "any", "are", "as", "at", "be", "best", "by", "can",
    "could", "did", "do", "does", "for", "from", "get", "good", "has", "have", "how", "i",
    "if", "in", "into", "is", "it", "its", "me", "my", "of", "on", "or", "our", "please",
    "should", "so", "some", "tell", "that", "the", "their", "them", "there", "these", "this",
    "those", "to", "use", "was", "we", "what", "when", "where", "which", "who", "why", "will",
    "with", "would", "you", "your",
];

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\p{L}\p{N}]+").expect("valid token regex"))
}

fn stopwords() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| STOPWORDS.iter().copied().collect())
}

/// 텍스트를 정규화된 토큰 목록으로 분리
///
/// 소문자화 → 영숫자 단위 분리 → 불용어 제거 → 복수형 축약 순서입니다.
/// 순서와 중복을 유지합니다 (임베딩 TF 계산용).
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    token_regex()
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|t| t.chars().count() >= 2 && !stopwords().contains(t))
        .map(stem)
        .collect()
}

/// 중복 없는 토큰 집합
pub fn term_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// 단순 복수형 축약 (tomatoes → tomato, pests → pest)
fn stem(token: &str) -> String {
    let len = token.chars().count();
    if len > 4 && token.ends_with("ies") {
        format!("{}y", &token[..token.len() - 3])
    } else if len > 4 && token.ends_with("oes") {
        token[..token.len() - 2].to_string()
    } else if len > 3 && token.ends_with('s') && !token.ends_with("ss") && !token.ends_with("us")
    {
        token[..token.len() - 1].to_string()
    } else {
        token.to_string()
    }
}

/// 문장 단위 분리
///
/// `.`, `!`, `?` 뒤에 공백이 오거나 텍스트가 끝나는 지점에서 자릅니다.
/// `12.5kg` 같은 소수점은 분리하지 않습니다.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            let at_boundary = chars.peek().map(|n| n.is_whitespace()).unwrap_or(true);
            if at_boundary {
                let sentence = current.trim();
                if !sentence.is_empty() {
                    sentences.push(sentence.to_string());
                }
                current.clear();
            }
        }
    }

    let rest = current.trim();
    if !rest.is_empty() {
        sentences.push(rest.to_string());
    }

    sentences
}

/// 문자 수 기준 자르기 (UTF-8 안전)
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_drops_stopwords_and_stems() {
        let tokens = tokenize("Which fertilizer is best for tomatoes?");
        assert_eq!(tokens, vec!["fertilizer", "tomato"]);
    }

    #[test]
    fn test_tokenize_keeps_order_and_duplicates() {
        let tokens = tokenize("Urea urea DAP");
        assert_eq!(tokens, vec!["urea", "urea", "dap"]);
    }

    #[test]
    fn test_stem_rules() {
        assert_eq!(stem("tomatoes"), "tomato");
        assert_eq!(stem("potatoes"), "potato");
        assert_eq!(stem("varieties"), "variety");
        assert_eq!(stem("pests"), "pest");
        assert_eq!(stem("grass"), "grass");
        assert_eq!(stem("gas"), "gas");
        assert_eq!(stem("fungus"), "fungus");
    }

    #[test]
    fn test_split_sentences() {
        let text = "Apply 12.5kg zinc. Water weekly! Done?";
        let sentences = split_sentences(text);
        assert_eq!(
            sentences,
            vec!["Apply 12.5kg zinc.", "Water weekly!", "Done?"]
        );
    }

    #[test]
    fn test_split_sentences_without_terminator() {
        let sentences = split_sentences("No period at the end");
        assert_eq!(sentences, vec!["No period at the end"]);
        assert!(split_sentences("   ").is_empty());
    }

    #[test]
    fn test_truncate_chars_unicode() {
        assert_eq!(truncate_chars("안녕하세요 세계", 5), "안녕하세요");
        assert_eq!(truncate_chars("short", 10), "short");
    }
}
