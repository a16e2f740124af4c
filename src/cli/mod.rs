//! CLI 모듈
//!
//! agri-rag CLI 명령어 정의 및 구현

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::chatbot::{AnswerStatus, ChatbotService};
use crate::config::{has_api_key, RagConfig};
use crate::error::RagError;
use crate::knowledge::{NewEntry, RawScore};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "agri-rag")]
#[command(version, about = "농업 지식베이스 RAG 챗봇", long_about = None)]
pub struct Cli {
    /// 데이터 디렉토리 (기본: AGRI_RAG_DATA_DIR 또는 ~/.agri-rag)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 질문에 답변
    Ask {
        /// 질문
        question: String,

        /// JSON 봉투로 출력
        #[arg(long)]
        json: bool,
    },

    /// 검색 결과만 출력
    Search {
        /// 검색 쿼리
        query: String,

        /// 결과 개수 제한
        #[arg(short, long, default_value = "5")]
        limit: usize,
    },

    /// 지식 엔트리 추가
    Add {
        /// 제목 (예: Tomato)
        #[arg(short, long)]
        title: String,

        /// 카테고리 (예: Fertilizer)
        #[arg(short, long)]
        category: String,

        /// 본문 텍스트
        #[arg(long)]
        text: Option<String>,

        /// 본문 파일 경로
        #[arg(long)]
        file: Option<PathBuf>,

        /// 시즌 태그
        #[arg(long)]
        season: Option<String>,

        /// 지역 태그
        #[arg(long)]
        region: Option<String>,
    },

    /// 저장된 엔트리 목록
    List {
        /// 카테고리 필터
        #[arg(short, long)]
        category: Option<String>,

        /// 결과 개수 제한
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// 인덱스 리빌드
    Rebuild,

    /// 예시 질문
    Suggest,

    /// 상태 확인
    Status {
        /// JSON으로 출력
        #[arg(long)]
        json: bool,
    },
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let mut config = RagConfig::from_env().context("설정 로드 실패")?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    let service = ChatbotService::from_config(&config)
        .await
        .context("ChatbotService 초기화 실패")?;

    match cli.command {
        Commands::Ask { question, json } => cmd_ask(&service, &question, json).await,
        Commands::Search { query, limit } => cmd_search(&service, &query, limit).await,
        Commands::Add {
            title,
            category,
            text,
            file,
            season,
            region,
        } => cmd_add(&service, title, category, text, file, season, region),
        Commands::List { category, limit } => cmd_list(&service, category, limit),
        Commands::Rebuild => cmd_rebuild(&service).await,
        Commands::Suggest => cmd_suggest(&service),
        Commands::Status { json } => cmd_status(&service, &config, json),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 질문 명령어 (ask)
async fn cmd_ask(service: &ChatbotService, question: &str, json: bool) -> Result<()> {
    let envelope = match service.ask_question(question).await {
        Ok(envelope) => envelope,
        Err(RagError::InvalidQuery(reason)) => bail!("잘못된 질문: {}", reason),
        Err(e) => return Err(e.into()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&envelope)?);
        return Ok(());
    }

    match envelope.status {
        AnswerStatus::Success => println!("\n[OK] 답변 ({:?}):\n", envelope.mode),
        AnswerStatus::Error => println!("\n[!] 서비스 오류:\n"),
    }
    println!("{}", envelope.answer);

    if envelope.sources.is_empty() {
        println!("\n[*] 출처 없음");
    } else {
        println!(
            "\n[*] 출처 ({}건 검색): {}",
            envelope.context_count,
            envelope.sources.join(", ")
        );
    }

    Ok(())
}

/// 검색 명령어 (search)
async fn cmd_search(service: &ChatbotService, query: &str, limit: usize) -> Result<()> {
    println!("[*] 검색 중: \"{}\"", query);

    let results = service.retrieve(query, limit).await.context("검색 실패")?;

    if results.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", results.len());

    for (i, result) in results.iter().enumerate() {
        let raw = match result.raw {
            RawScore::L2Distance(d) => format!("L2 {:.4}", d),
            RawScore::Cosine(c) => format!("cos {:.4}", c),
            RawScore::Overlap(n) => format!("overlap {}", n),
        };

        println!(
            "{}. [{}] [점수: {:.4}, {}] {}",
            i + 1,
            result.backend.as_str(),
            result.score,
            raw,
            result.chunk.source_label()
        );
        println!(
            "   엔트리 #{} / 청크 {}",
            result.chunk.source_entry_id, result.chunk.chunk_index
        );
        println!("   내용: {}", truncate_text(&result.chunk.text, 200));
        println!();
    }

    Ok(())
}

/// 추가 명령어 (add)
fn cmd_add(
    service: &ChatbotService,
    title: String,
    category: String,
    text: Option<String>,
    file: Option<PathBuf>,
    season: Option<String>,
    region: Option<String>,
) -> Result<()> {
    let text = match (text, file) {
        (Some(text), None) => text,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("파일 읽기 실패: {}", path.display()))?,
        (Some(_), Some(_)) => bail!("--text 와 --file 은 함께 사용할 수 없습니다"),
        (None, None) => bail!("--text 또는 --file 중 하나를 지정해야 합니다"),
    };

    let mut entry = NewEntry::new(title, category, text);
    if let Some(season) = season {
        entry = entry.with_season(season);
    }
    if let Some(region) = region {
        entry = entry.with_region(region);
    }

    let label = format!("{} ({})", entry.title, entry.category);
    let id = service.add_entry(entry).context("엔트리 추가 실패")?;

    println!("[OK] 엔트리 #{} 추가됨: {}", id, label);
    println!("     다음 질문 시 인덱스가 갱신됩니다");

    Ok(())
}

/// 목록 명령어 (list)
fn cmd_list(service: &ChatbotService, category: Option<String>, limit: usize) -> Result<()> {
    let entries = service
        .list_entries(limit, category.as_deref())
        .context("엔트리 목록 조회 실패")?;

    if entries.is_empty() {
        println!("[!] 저장된 엔트리가 없습니다.");
        return Ok(());
    }

    println!("[OK] 저장된 엔트리 ({} 건):\n", entries.len());

    for entry in entries {
        println!(
            "  #{:<4} [{}] {}",
            entry.id,
            entry.category,
            truncate_text(&entry.title, 40)
        );
        println!("        {} | {}", entry.region, entry.season);
        println!(
            "        {} | {} chars",
            entry.created_at.format("%Y-%m-%d %H:%M"),
            entry.text.chars().count()
        );
        println!();
    }

    Ok(())
}

/// 리빌드 명령어 (rebuild)
async fn cmd_rebuild(service: &ChatbotService) -> Result<()> {
    println!("[*] 인덱스 리빌드 중...");

    let chunks = service.rebuild_index().await.context("인덱스 리빌드 실패")?;
    let stats = service.stats()?;

    println!("[OK] {} 청크 인덱싱 완료", chunks);
    match stats.index.embedder {
        Some(embedder) => println!("     벡터 인덱스: {} ({} 벡터)", embedder, stats.index.vector_count),
        None if stats.index.degraded => {
            println!("[!] 임베딩 실패로 키워드 검색 전용 (다음 질문 때 재시도)")
        }
        None => println!("     벡터 인덱스 없음 (키워드 검색 전용)"),
    }

    Ok(())
}

/// 예시 질문 명령어 (suggest)
fn cmd_suggest(service: &ChatbotService) -> Result<()> {
    println!("[*] 예시 질문:\n");
    for (i, question) in service.suggestions().iter().enumerate() {
        println!("  {}. {}", i + 1, question);
    }
    Ok(())
}

/// 상태 명령어 (status)
fn cmd_status(service: &ChatbotService, config: &RagConfig, json: bool) -> Result<()> {
    let stats = service.stats()?;

    if json {
        let report = serde_json::json!({
            "config": config,
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("agri-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", config.data_dir.display());

    if has_api_key() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정 (로컬 임베딩 + 추출형 답변)");
        println!("    설정: export GEMINI_API_KEY=your-key");
    }

    println!("[OK] 저장된 엔트리: {} 건", stats.store.entry_count);
    println!(
        "     총 콘텐츠: {}",
        format_bytes(stats.store.total_text_bytes)
    );

    if stats.embedding_available {
        println!("[OK] 임베딩: {}", stats.embedder);
    } else {
        println!("[!] 임베딩: 비활성 (키워드 검색 전용)");
    }
    println!("[OK] 답변 백엔드: {}", stats.answer_backend);

    if stats.index.built {
        println!(
            "[OK] 인덱스: {} 청크, {} 벡터{}",
            stats.index.chunk_count,
            stats.index.vector_count,
            if stats.index.degraded {
                " (임베딩 재시도 대기)"
            } else if stats.index.stale {
                " (갱신 대기)"
            } else {
                ""
            }
        );
    } else {
        println!("[*] 인덱스: 첫 질문 시 생성");
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("paddy", 10), "paddy");
        assert_eq!(truncate_text("drip irrigation", 4), "drip...");
        assert_eq!(truncate_text("urea\nsplit", 20), "urea split");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
    }

    #[test]
    fn test_cli_parses_ask() {
        let cli = Cli::try_parse_from(["agri-rag", "ask", "When to plant wheat?", "--json"]).unwrap();
        match cli.command {
            Commands::Ask { question, json } => {
                assert_eq!(question, "When to plant wheat?");
                assert!(json);
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn test_cli_parses_add_with_global_data_dir() {
        let cli = Cli::try_parse_from([
            "agri-rag",
            "add",
            "--title",
            "Millet",
            "--category",
            "Cultivation",
            "--text",
            "Millet tolerates drought.",
            "--data-dir",
            "/tmp/agri",
        ])
        .unwrap();

        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/agri")));
        assert!(matches!(cli.command, Commands::Add { .. }));
    }
}
