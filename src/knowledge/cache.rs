//! Index Cache - 디스크 인덱스 번들
//!
//! 청크와 임베딩 벡터를 JSON 번들로 저장해 재시작 시 재임베딩을 피합니다.
//! 번들은 fingerprint(임베더 + 청크 내용)로 검증되며, 손상되었거나
//! 오래된 번들은 무시되고 전체 리빌드가 일어납니다.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::RagError;

use super::chunker::Chunk;

/// 번들 포맷 버전
pub const BUNDLE_VERSION: u32 = 1;

/// 디스크 인덱스 번들
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexBundle {
    pub version: u32,
    pub fingerprint: String,
    /// 임베더 식별자 (name:dimension)
    pub embedder: String,
    pub created_at: DateTime<Utc>,
    pub chunks: Vec<Chunk>,
    pub vectors: Vec<Vec<f32>>,
}

impl IndexBundle {
    pub fn new(embedder: String, chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Self {
        Self {
            version: BUNDLE_VERSION,
            fingerprint: fingerprint(&chunks, &embedder),
            embedder,
            created_at: Utc::now(),
            chunks,
            vectors,
        }
    }
}

/// 청크 목록과 임베더의 SHA-256 fingerprint (hex)
pub fn fingerprint(chunks: &[Chunk], embedder_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(embedder_id.as_bytes());
    hasher.update([0u8]);

    for chunk in chunks {
        hasher.update(chunk.source_entry_id.to_le_bytes());
        hasher.update((chunk.chunk_index as u64).to_le_bytes());
        for field in [
            &chunk.metadata.title,
            &chunk.metadata.category,
            &chunk.metadata.region,
            &chunk.metadata.season,
            &chunk.text,
        ] {
            hasher.update((field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
    }

    hex::encode(hasher.finalize())
}

/// 인덱스 캐시 파일 핸들
#[derive(Debug, Clone)]
pub struct IndexCache {
    path: PathBuf,
}

impl IndexCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 유효한 번들 로드
    ///
    /// 파일이 없거나, 손상되었거나, fingerprint/임베더가 다르면 `None`.
    pub fn load(&self, fingerprint: &str, embedder_id: &str) -> Option<IndexBundle> {
        if !self.path.exists() {
            return None;
        }

        let bundle = match self.read() {
            Ok(bundle) => bundle,
            Err(e) => {
                tracing::warn!("Ignoring index cache {}: {:#}", self.path.display(), e);
                return None;
            }
        };

        if bundle.version != BUNDLE_VERSION {
            tracing::info!("Index cache version {} is outdated", bundle.version);
            return None;
        }
        if bundle.embedder != embedder_id {
            tracing::info!(
                "Index cache built with {}, current embedder is {}",
                bundle.embedder,
                embedder_id
            );
            return None;
        }
        if bundle.fingerprint != fingerprint {
            tracing::info!("Index cache is stale (corpus changed)");
            return None;
        }
        if bundle.chunks.len() != bundle.vectors.len() {
            tracing::warn!(
                "Index cache has {} chunks but {} vectors",
                bundle.chunks.len(),
                bundle.vectors.len()
            );
            return None;
        }

        tracing::debug!("Loaded index cache: {} vectors", bundle.vectors.len());
        Some(bundle)
    }

    fn read(&self) -> Result<IndexBundle> {
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        serde_json::from_str(&raw).map_err(|e| RagError::IndexCorruption(e.to_string()).into())
    }

    /// 번들 저장 (고유 임시 파일 → fsync → rename)
    ///
    /// 임시 파일은 같은 디렉토리에 만들어 rename이 원자적으로 일어나고,
    /// 여러 프로세스가 동시에 저장해도 서로의 임시 파일을 덮어쓰지 않습니다.
    pub fn save(&self, bundle: &IndexBundle) -> Result<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new(""));
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir).context("Failed to create cache directory")?;
        }

        let json = serde_json::to_vec(bundle).context("Failed to serialize index bundle")?;
        let tmp = dir.join(format!(".index-cache-{}.tmp", uuid::Uuid::new_v4()));

        let written = write_synced(&tmp, &json).and_then(|()| {
            std::fs::rename(&tmp, &self.path)
                .with_context(|| format!("Failed to move cache into {}", self.path.display()))
        });
        if let Err(e) = written {
            let _ = std::fs::remove_file(&tmp);
            return Err(e);
        }

        tracing::debug!(
            "Saved index cache: {} vectors to {}",
            bundle.vectors.len(),
            self.path.display()
        );
        Ok(())
    }
}

/// 파일 쓰기 후 디스크 동기화
fn write_synced(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all(bytes)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    file.sync_all()
        .with_context(|| format!("Failed to sync {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::chunker::ChunkMetadata;
    use tempfile::TempDir;

    fn chunk(id: i64, text: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            metadata: ChunkMetadata {
                title: "Onion".to_string(),
                category: "Irrigation".to_string(),
                region: "India".to_string(),
                season: "Rabi".to_string(),
            },
            source_entry_id: id,
            chunk_index: 0,
        }
    }

    fn bundle() -> IndexBundle {
        IndexBundle::new(
            "hashing:4".to_string(),
            vec![chunk(1, "drip irrigation"), chunk(2, "furrow irrigation")],
            vec![vec![1.0, 0.0, 0.0, 0.0], vec![0.0, 1.0, 0.0, 0.0]],
        )
    }

    #[test]
    fn test_fingerprint_changes_with_content() {
        let a = fingerprint(&[chunk(1, "drip")], "hashing:4");
        let b = fingerprint(&[chunk(1, "drip")], "hashing:4");
        let c = fingerprint(&[chunk(1, "furrow")], "hashing:4");
        let d = fingerprint(&[chunk(1, "drip")], "gemini-embedding-001:768");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_save_and_load_fresh_bundle() {
        let dir = TempDir::new().unwrap();
        let cache = IndexCache::new(dir.path().join("index_cache.json"));
        let bundle = bundle();

        cache.save(&bundle).unwrap();

        let loaded = cache.load(&bundle.fingerprint, "hashing:4").unwrap();
        assert_eq!(loaded.chunks, bundle.chunks);
        assert_eq!(loaded.vectors, bundle.vectors);
    }

    #[test]
    fn test_stale_bundle_ignored() {
        let dir = TempDir::new().unwrap();
        let cache = IndexCache::new(dir.path().join("index_cache.json"));
        let bundle = bundle();
        cache.save(&bundle).unwrap();

        let other = fingerprint(&[chunk(3, "new entry")], "hashing:4");
        assert!(cache.load(&other, "hashing:4").is_none());
        assert!(cache.load(&bundle.fingerprint, "hashing:8").is_none());
    }

    #[test]
    fn test_corrupt_bundle_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index_cache.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let cache = IndexCache::new(&path);
        assert!(cache.load("anything", "hashing:4").is_none());
        assert!(cache.read().unwrap_err().downcast_ref::<RagError>().is_some());
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let cache = IndexCache::new(dir.path().join("missing.json"));
        assert!(cache.load("anything", "hashing:4").is_none());
    }

    #[test]
    fn test_count_mismatch_bundle_ignored() {
        let dir = TempDir::new().unwrap();
        let cache = IndexCache::new(dir.path().join("index_cache.json"));
        let mut bundle = bundle();
        bundle.vectors.pop();
        cache.save(&bundle).unwrap();

        // fingerprint와 임베더는 일치하지만 벡터가 하나 모자람
        assert!(cache.load(&bundle.fingerprint, "hashing:4").is_none());
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let cache = IndexCache::new(dir.path().join("index_cache.json"));
        cache.save(&bundle()).unwrap();
        cache.save(&bundle()).unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["index_cache.json".to_string()]);
    }

    #[test]
    fn test_concurrent_saves_do_not_clobber() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index_cache.json");

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = IndexCache::new(&path);
                std::thread::spawn(move || cache.save(&bundle()))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        let bundle = bundle();
        let cache = IndexCache::new(&path);
        assert!(cache.load(&bundle.fingerprint, "hashing:4").is_some());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
