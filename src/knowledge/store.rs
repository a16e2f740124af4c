//! Knowledge Store - rusqlite 기반 append-only 지식 저장소
//!
//! 농업 지식 엔트리(작물/주제 메타데이터 + 본문)를 저장합니다.
//! 엔트리는 저장 후 변경되지 않으며, 갱신은 새 엔트리 추가로 표현합니다.
//! 저장 위치: ~/.agri-rag/knowledge.db

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, Row, TransactionBehavior};
use serde::{Deserialize, Serialize};

use crate::config::get_data_dir;
use crate::error::RagError;

/// 기본 지역 태그
pub const DEFAULT_REGION: &str = "India";
/// 기본 시즌 태그
pub const DEFAULT_SEASON: &str = "all";

// ============================================================================
// Types
// ============================================================================

/// 저장된 지식 엔트리
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: i64,
    pub title: String,
    pub category: String,
    pub region: String,
    pub season: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl KnowledgeEntry {
    /// 출처 라벨 ("Tomato (Fertilizer)")
    pub fn source_label(&self) -> String {
        format!("{} ({})", self.title, self.category)
    }
}

/// 새 엔트리 입력용 구조체
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub title: String,
    pub category: String,
    pub region: String,
    pub season: String,
    pub text: String,
}

impl NewEntry {
    /// 기본 지역/시즌으로 생성
    pub fn new(title: impl Into<String>, category: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            category: category.into(),
            region: DEFAULT_REGION.to_string(),
            season: DEFAULT_SEASON.to_string(),
            text: text.into(),
        }
    }

    /// 시즌 지정
    pub fn with_season(mut self, season: impl Into<String>) -> Self {
        self.season = season.into();
        self
    }

    /// 지역 지정
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// 앞뒤 공백 제거 후 검증 (add와 seed 공통)
    fn normalized(self) -> Result<Self, RagError> {
        let entry = Self {
            title: self.title.trim().to_string(),
            category: self.category.trim().to_string(),
            region: self.region.trim().to_string(),
            season: self.season.trim().to_string(),
            text: self.text.trim().to_string(),
        };

        if entry.text.is_empty() {
            return Err(RagError::InvalidDocument("document text is empty".to_string()));
        }
        if entry.title.is_empty() {
            return Err(RagError::InvalidDocument("document title is empty".to_string()));
        }
        Ok(entry)
    }
}

/// 저장소 통계
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub entry_count: usize,
    pub total_text_bytes: usize,
    pub db_path: Option<PathBuf>,
}

// ============================================================================
// KnowledgeStore
// ============================================================================

/// Knowledge Store - 동기 지식 저장소
///
/// 삭제/수정 API는 없습니다. 같은 주제의 새 엔트리를 추가하면
/// 검색기는 둘 다 후보로 다룹니다 (중복 제거 없음).
pub struct KnowledgeStore {
    conn: Arc<Mutex<Connection>>,
    db_path: Option<PathBuf>,
}

impl KnowledgeStore {
    /// 저장소 열기 (없으면 생성)
    ///
    /// # Arguments
    /// * `path` - DB 파일 경로
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create database directory")?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open SQLite database")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: Some(path.to_path_buf()),
        };

        store.initialize()?;
        Ok(store)
    }

    /// 메모리 저장소 (테스트, 임시 코퍼스용)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: None,
        };

        store.initialize()?;
        Ok(store)
    }

    /// 기본 위치에서 열기 (~/.agri-rag/knowledge.db)
    pub fn open_default() -> Result<Self> {
        Self::open(&get_data_dir().join("knowledge.db"))
    }

    /// DB 경로 반환 (메모리 저장소는 None)
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))
    }

    /// 스키마 초기화
    fn initialize(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                category TEXT NOT NULL,
                region TEXT NOT NULL,
                season TEXT NOT NULL,
                text TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create entries table")?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_entries_category ON entries(category)",
            [],
        )
        .context("Failed to create category index")?;

        tracing::debug!("Knowledge store initialized at {:?}", self.db_path);
        Ok(())
    }

    /// 엔트리 추가
    ///
    /// 본문이나 제목이 비어 있으면 `RagError::InvalidDocument`로 실패하고
    /// 아무것도 저장하지 않습니다.
    pub fn add(&self, entry: NewEntry) -> Result<i64> {
        let entry = entry.normalized()?;

        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO entries (title, category, region, season, text, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.title,
                entry.category,
                entry.region,
                entry.season,
                entry.text,
                now
            ],
        )
        .context("Failed to insert entry")?;

        let id = conn.last_insert_rowid();
        tracing::debug!("Added entry: {} ({}) id={}", entry.title, entry.category, id);

        Ok(id)
    }

    /// 저장소가 비어 있을 때만 엔트리 일괄 추가
    ///
    /// 비어 있는지 확인과 삽입은 같은 쓰기 트랜잭션 안에서 일어나므로
    /// 같은 DB를 여는 프로세스가 동시에 시작해도 한 번만 채워집니다.
    /// 본문이나 제목이 빈 엔트리는 건너뜁니다.
    ///
    /// # Returns
    /// 추가된 엔트리 수 (이미 데이터가 있으면 0)
    pub fn seed_if_empty(&self, entries: Vec<NewEntry>) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("Failed to begin seed transaction")?;

        let existing: i64 = tx
            .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))
            .context("Failed to count entries")?;
        if existing > 0 {
            return Ok(0);
        }

        let now = Utc::now().to_rfc3339();
        let mut inserted = 0;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO entries (title, category, region, season, text, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;

            for entry in entries {
                let entry = match entry.normalized() {
                    Ok(entry) => entry,
                    Err(e) => {
                        tracing::debug!("Skipping seed entry: {}", e);
                        continue;
                    }
                };
                stmt.execute(params![
                    entry.title,
                    entry.category,
                    entry.region,
                    entry.season,
                    entry.text,
                    now
                ])?;
                inserted += 1;
            }
        }

        tx.commit().context("Failed to commit seed transaction")?;
        tracing::info!("Seeded knowledge store with {} entries", inserted);

        Ok(inserted)
    }

    /// ID로 엔트리 조회
    pub fn get(&self, id: i64) -> Result<Option<KnowledgeEntry>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT id, title, category, region, season, text, created_at
             FROM entries WHERE id = ?1",
        )?;

        let entry = stmt.query_row(params![id], map_entry).ok();
        Ok(entry)
    }

    /// 전체 엔트리 (삽입 순서)
    pub fn list(&self) -> Result<Vec<KnowledgeEntry>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT id, title, category, region, season, text, created_at
             FROM entries ORDER BY id ASC",
        )?;

        let entries = stmt
            .query_map([], map_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read entries")?;

        Ok(entries)
    }

    /// 카테고리 필터 + 개수 제한 조회 (최근 추가 순)
    pub fn list_filtered(&self, limit: usize, category: Option<&str>) -> Result<Vec<KnowledgeEntry>> {
        let conn = self.lock()?;

        let entries = if let Some(category) = category {
            let mut stmt = conn.prepare(
                "SELECT id, title, category, region, season, text, created_at
                 FROM entries
                 WHERE LOWER(category) = LOWER(?1)
                 ORDER BY id DESC
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![category, limit as i64], map_entry)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        } else {
            let mut stmt = conn.prepare(
                "SELECT id, title, category, region, season, text, created_at
                 FROM entries
                 ORDER BY id DESC
                 LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit as i64], map_entry)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        Ok(entries)
    }

    /// 엔트리 개수
    pub fn count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))
            .context("Failed to count entries")?;
        Ok(count as usize)
    }

    /// 저장소 통계
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.lock()?;

        let (count, total_size): (i64, i64) = conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(LENGTH(text)), 0) FROM entries",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .context("Failed to read store stats")?;

        Ok(StoreStats {
            entry_count: count as usize,
            total_text_bytes: total_size as usize,
            db_path: self.db_path.clone(),
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn map_entry(row: &Row<'_>) -> rusqlite::Result<KnowledgeEntry> {
    Ok(KnowledgeEntry {
        id: row.get(0)?,
        title: row.get(1)?,
        category: row.get(2)?,
        region: row.get(3)?,
        season: row.get(4)?,
        text: row.get(5)?,
        created_at: parse_datetime(row.get::<_, String>(6)?),
    })
}

/// RFC3339 문자열을 DateTime<Utc>로 파싱
fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (TempDir, KnowledgeStore) {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("test.db");
        let store = KnowledgeStore::open(&db_path).unwrap();
        (dir, store)
    }

    #[test]
    fn test_add_and_get_entry() {
        let (_dir, store) = create_test_store();

        let id = store
            .add(NewEntry::new("Tomato", "Fertilizer", "Apply DAP at planting.").with_season("Rabi"))
            .unwrap();
        assert!(id > 0);

        let entry = store.get(id).unwrap().unwrap();
        assert_eq!(entry.title, "Tomato");
        assert_eq!(entry.category, "Fertilizer");
        assert_eq!(entry.region, DEFAULT_REGION);
        assert_eq!(entry.season, "Rabi");
        assert_eq!(entry.source_label(), "Tomato (Fertilizer)");
    }

    #[test]
    fn test_add_empty_text_is_invalid() {
        let (_dir, store) = create_test_store();

        let err = store.add(NewEntry::new("Empty", "Misc", "   ")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RagError>(),
            Some(RagError::InvalidDocument(_))
        ));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_list_keeps_insertion_order() {
        let (_dir, store) = create_test_store();

        for i in 0..3 {
            store
                .add(NewEntry::new(format!("Crop {}", i), "Cultivation", format!("Text {}", i)))
                .unwrap();
        }

        let titles: Vec<String> = store.list().unwrap().into_iter().map(|e| e.title).collect();
        assert_eq!(titles, vec!["Crop 0", "Crop 1", "Crop 2"]);
    }

    #[test]
    fn test_same_topic_is_appended_not_replaced() {
        let (_dir, store) = create_test_store();

        store.add(NewEntry::new("Wheat", "Irrigation", "Old advice.")).unwrap();
        store.add(NewEntry::new("Wheat", "Irrigation", "New advice.")).unwrap();

        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_list_filtered() {
        let (_dir, store) = create_test_store();

        for (title, category) in [("Rice", "Pest"), ("Wheat", "Pest"), ("Onion", "Irrigation")] {
            store.add(NewEntry::new(title, category, "Some text")).unwrap();
        }

        assert_eq!(store.list_filtered(10, None).unwrap().len(), 3);
        assert_eq!(store.list_filtered(10, Some("pest")).unwrap().len(), 2);
        assert_eq!(store.list_filtered(1, None).unwrap()[0].title, "Onion");
    }

    #[test]
    fn test_seed_if_empty() {
        let store = KnowledgeStore::open_in_memory().unwrap();

        let seeded = store
            .seed_if_empty(vec![
                NewEntry::new("Rice", "Cultivation", "Kharif crop."),
                NewEntry::new("Blank", "Misc", ""),
            ])
            .unwrap();
        assert_eq!(seeded, 1);

        let again = store
            .seed_if_empty(vec![NewEntry::new("Wheat", "Cultivation", "Rabi crop.")])
            .unwrap();
        assert_eq!(again, 0);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_seed_trims_like_add() {
        let store = KnowledgeStore::open_in_memory().unwrap();

        let seeded = store
            .seed_if_empty(vec![
                NewEntry::new("  Cotton ", " Pest\t", " Bollworm traps. ")
                    .with_season(" Kharif ")
                    .with_region(" India "),
                NewEntry::new("   ", "Misc", "No title."),
            ])
            .unwrap();
        assert_eq!(seeded, 1);

        let entry = &store.list().unwrap()[0];
        assert_eq!(entry.source_label(), "Cotton (Pest)");
        assert_eq!(entry.season, "Kharif");
        assert_eq!(entry.region, "India");
        assert_eq!(entry.text, "Bollworm traps.");

        let id = store
            .add(NewEntry::new(" Cotton", "Pest ", "Neem oil spray.").with_season(" Kharif "))
            .unwrap();
        let added = store.get(id).unwrap().unwrap();
        assert_eq!(added.source_label(), entry.source_label());
        assert_eq!(added.season, entry.season);
    }

    #[test]
    fn test_seed_skipped_when_other_handle_seeded() {
        let (dir, first) = create_test_store();
        let second = KnowledgeStore::open(&dir.path().join("test.db")).unwrap();

        assert_eq!(
            first
                .seed_if_empty(vec![NewEntry::new("Rice", "Cultivation", "Kharif crop.")])
                .unwrap(),
            1
        );
        assert_eq!(
            second
                .seed_if_empty(vec![NewEntry::new("Wheat", "Cultivation", "Rabi crop.")])
                .unwrap(),
            0
        );
        assert_eq!(second.count().unwrap(), 1);
    }

    #[test]
    fn test_stats() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        store.add(NewEntry::new("Test", "Misc", "1234567890")).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.total_text_bytes, 10);
        assert!(stats.db_path.is_none());
    }

    #[test]
    fn test_reopen_persists_entries() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("persist.db");

        {
            let store = KnowledgeStore::open(&db_path).unwrap();
            store.add(NewEntry::new("Cotton", "Pest", "Bollworm control.")).unwrap();
        }

        let store = KnowledgeStore::open(&db_path).unwrap();
        assert_eq!(store.count().unwrap(), 1);
    }
}
