use crate::entry::{fingerprint, CacheEntryMeta, CacheStats, StorageTier};
use crate::error::{CacheError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const INDEX_FILE_NAME: &str = "cache_index.json";

pub const DEFAULT_MEMORY_BUDGET_BYTES: u64 = 100 * 1024 * 1024; // 100 MiB
pub const DEFAULT_MEMORY_ITEM_MAX_BYTES: u64 = 50 * 1024; // 50 KiB

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub dir: PathBuf,
    pub memory_budget_bytes: u64,
    pub memory_item_max_bytes: u64,
}

impl CacheConfig {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            memory_budget_bytes: DEFAULT_MEMORY_BUDGET_BYTES,
            memory_item_max_bytes: DEFAULT_MEMORY_ITEM_MAX_BYTES,
        }
    }
}

/// Tiered cache for per-file analysis results.
///
/// Small values live in a process-local memory tier bounded by a byte
/// budget; everything else goes to value blobs on disk. A metadata row is
/// kept for every entry in an index document rewritten atomically on each
/// mutation. The disk tier and index survive restarts; memory-tier rows are
/// dropped when the store reopens.
///
/// Entries are keyed by a fingerprint over path, mtime, analysis kind and
/// extra parameters, so a rewritten file naturally misses; the rows the old
/// mtime left behind are swept out as a side effect of that miss.
pub struct CacheStore {
    config: CacheConfig,
    index: HashMap<String, CacheEntryMeta>,
    memory: HashMap<String, String>,
    memory_bytes: u64,
}

impl CacheStore {
    pub async fn open(config: CacheConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&config.dir).await?;
        let index_path = config.dir.join(INDEX_FILE_NAME);
        let mut index: HashMap<String, CacheEntryMeta> =
            match tokio::fs::read(&index_path).await {
                Ok(bytes) => match serde_json::from_slice(&bytes) {
                    Ok(index) => index,
                    Err(e) => {
                        log::warn!("Cache index unreadable ({e}); starting fresh");
                        HashMap::new()
                    }
                },
                Err(_) => HashMap::new(),
            };

        // Memory-tier values do not survive a restart; drop their rows now.
        let before = index.len();
        index.retain(|_, meta| meta.tier == StorageTier::Disk);
        let dropped = before - index.len();

        let mut store = Self {
            config,
            index,
            memory: HashMap::new(),
            memory_bytes: 0,
        };
        if dropped > 0 {
            log::debug!("Dropped {dropped} stale memory-tier rows from the index");
            store.persist_index().await?;
        }
        Ok(store)
    }

    /// Look up a cached value. Misses are silent: a missing or rewritten
    /// file, an expired entry, a value lost to a restart and an unreadable
    /// blob all come back as `None`, purging the dead entry where one exists.
    pub async fn get(
        &mut self,
        file_path: &Path,
        kind: &str,
        extra: &[(String, String)],
    ) -> Result<Option<String>> {
        let Some(mtime) = file_mtime_ms(file_path).await else {
            return Ok(None);
        };
        let fp = fingerprint(file_path, mtime, kind, extra);
        let now = unix_now_ms();

        let Some(meta) = self.index.get(&fp).cloned() else {
            self.purge_stale(file_path, kind, mtime).await?;
            return Ok(None);
        };

        if meta.is_expired_at(now) {
            log::debug!("Cache entry {fp} expired");
            self.remove_entry(&fp).await;
            self.persist_index().await?;
            return Ok(None);
        }

        if let Some(value) = self.memory.get(&fp) {
            return Ok(Some(value.clone()));
        }

        match meta.tier {
            StorageTier::Memory => {
                // The row survived a restart but its value did not.
                self.remove_entry(&fp).await;
                self.persist_index().await?;
                Ok(None)
            }
            StorageTier::Disk => {
                let blob = meta.blob.clone().unwrap_or_else(|| self.blob_path(&fp));
                match tokio::fs::read_to_string(&blob).await {
                    Ok(value) => {
                        if (value.len() as u64) < self.config.memory_item_max_bytes {
                            self.memory.insert(fp.clone(), value.clone());
                            self.memory_bytes += value.len() as u64;
                            if self.evict_over_budget() > 0 {
                                self.persist_index().await?;
                            }
                        }
                        Ok(Some(value))
                    }
                    Err(e) => {
                        log::warn!("Cache blob for {fp} unreadable ({e}); purging entry");
                        self.remove_entry(&fp).await;
                        self.persist_index().await?;
                        Ok(None)
                    }
                }
            }
        }
    }

    /// Store an analysis result for a file. `ttl_hours = 0` means the entry
    /// never expires. Fails only when the owning file does not exist.
    pub async fn set(
        &mut self,
        file_path: &Path,
        kind: &str,
        value: String,
        ttl_hours: u64,
        extra: &[(String, String)],
    ) -> Result<()> {
        let Some(mtime) = file_mtime_ms(file_path).await else {
            return Err(CacheError::FileNotFound(file_path.to_path_buf()));
        };
        let fp = fingerprint(file_path, mtime, kind, extra);
        let now = unix_now_ms();
        let expires_at_ms = (ttl_hours > 0).then(|| now + ttl_hours * 3_600_000);
        let size_bytes = value.len() as u64;

        // Replace any previous entry under the same key.
        self.remove_entry(&fp).await;

        let (tier, blob) = if size_bytes < self.config.memory_item_max_bytes
            && self.memory_bytes + size_bytes <= self.config.memory_budget_bytes
        {
            self.memory.insert(fp.clone(), value);
            self.memory_bytes += size_bytes;
            (StorageTier::Memory, None)
        } else {
            let blob = self.blob_path(&fp);
            write_atomic(&blob, value.as_bytes()).await?;
            (StorageTier::Disk, Some(blob))
        };

        self.index.insert(
            fp.clone(),
            CacheEntryMeta {
                fingerprint: fp,
                file_path: file_path.to_path_buf(),
                file_mtime_ms: mtime,
                kind: kind.to_string(),
                created_at_ms: now,
                expires_at_ms,
                size_bytes,
                tier,
                blob,
            },
        );
        self.persist_index().await?;
        Ok(())
    }

    /// Sweep out entries whose expiry has passed, in both tiers.
    pub async fn clear_expired(&mut self) -> Result<usize> {
        self.clear_expired_at(unix_now_ms()).await
    }

    /// Expiry sweep against an explicit clock.
    pub async fn clear_expired_at(&mut self, now_ms: u64) -> Result<usize> {
        let expired: Vec<String> = self
            .index
            .values()
            .filter(|meta| meta.is_expired_at(now_ms))
            .map(|meta| meta.fingerprint.clone())
            .collect();
        for fp in &expired {
            self.remove_entry(fp).await;
        }
        if !expired.is_empty() {
            self.persist_index().await?;
            log::info!("Cleared {} expired cache entries", expired.len());
        }
        Ok(expired.len())
    }

    /// Remove every entry owned by a file, in either tier. Used when a
    /// re-analysis is forced.
    pub async fn clear_for_file(&mut self, file_path: &Path) -> Result<usize> {
        let owned: Vec<String> = self
            .index
            .values()
            .filter(|meta| meta.file_path == file_path)
            .map(|meta| meta.fingerprint.clone())
            .collect();
        for fp in &owned {
            self.remove_entry(fp).await;
        }
        if !owned.is_empty() {
            self.persist_index().await?;
        }
        Ok(owned.len())
    }

    pub fn stats(&self) -> CacheStats {
        let mut memory_entries = 0;
        let mut disk_entries = 0;
        let mut disk_bytes = 0;
        for meta in self.index.values() {
            match meta.tier {
                StorageTier::Memory => memory_entries += 1,
                StorageTier::Disk => {
                    disk_entries += 1;
                    disk_bytes += meta.size_bytes;
                }
            }
        }
        CacheStats {
            memory_entries,
            disk_entries,
            memory_bytes: self.memory_bytes,
            disk_bytes,
        }
    }

    /// Drop rows for (path, kind) whose recorded mtime no longer matches the
    /// file on disk.
    async fn purge_stale(&mut self, file_path: &Path, kind: &str, current_mtime_ms: u64) -> Result<()> {
        let stale: Vec<String> = self
            .index
            .values()
            .filter(|meta| {
                meta.file_path == file_path
                    && meta.kind == kind
                    && meta.file_mtime_ms != current_mtime_ms
            })
            .map(|meta| meta.fingerprint.clone())
            .collect();
        if stale.is_empty() {
            return Ok(());
        }
        for fp in &stale {
            self.remove_entry(fp).await;
        }
        self.persist_index().await?;
        log::debug!(
            "Purged {} stale entries for {}",
            stale.len(),
            file_path.display()
        );
        Ok(())
    }

    /// Evict oldest-created memory values until back under budget. Returns
    /// the number of index rows dropped (promoted disk copies keep theirs).
    fn evict_over_budget(&mut self) -> usize {
        let mut removed_rows = 0;
        while self.memory_bytes > self.config.memory_budget_bytes {
            let oldest = self
                .memory
                .keys()
                .map(|fp| {
                    let created = self
                        .index
                        .get(fp)
                        .map(|meta| meta.created_at_ms)
                        .unwrap_or(0);
                    (created, fp.clone())
                })
                .min();
            let Some((_, fp)) = oldest else {
                break;
            };
            if let Some(value) = self.memory.remove(&fp) {
                self.memory_bytes = self.memory_bytes.saturating_sub(value.len() as u64);
            }
            if self.index.get(&fp).map(|meta| meta.tier) == Some(StorageTier::Memory) {
                self.index.remove(&fp);
                removed_rows += 1;
            }
            log::debug!("Evicted {fp} from the memory tier");
        }
        removed_rows
    }

    async fn remove_entry(&mut self, fp: &str) -> bool {
        let removed = self.index.remove(fp);
        if let Some(value) = self.memory.remove(fp) {
            self.memory_bytes = self.memory_bytes.saturating_sub(value.len() as u64);
        }
        if let Some(meta) = &removed {
            if let Some(blob) = &meta.blob {
                let _ = tokio::fs::remove_file(blob).await;
            }
        }
        removed.is_some()
    }

    async fn persist_index(&self) -> Result<()> {
        let path = self.config.dir.join(INDEX_FILE_NAME);
        let bytes = serde_json::to_vec_pretty(&self.index)?;
        write_atomic(&path, &bytes).await
    }

    fn blob_path(&self, fp: &str) -> PathBuf {
        self.config.dir.join(format!("{fp}.blob"))
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

async fn file_mtime_ms(path: &Path) -> Option<u64> {
    let meta = tokio::fs::metadata(path).await.ok()?;
    let modified = meta.modified().ok()?;
    modified
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_millis() as u64)
}

fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tempfile::tempdir;

    fn write_source(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"def handler(): pass\n").unwrap();
        path
    }

    async fn open_store(dir: &Path) -> CacheStore {
        CacheStore::open(CacheConfig::new(dir.join("cache")))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn set_then_get_returns_the_value() {
        let temp = tempdir().unwrap();
        let source = write_source(temp.path(), "a.py");
        let mut store = open_store(temp.path()).await;

        store
            .set(&source, "functions", "{\"count\": 3}".into(), 24, &[])
            .await
            .unwrap();
        let hit = store.get(&source, "functions", &[]).await.unwrap();
        assert_eq!(hit.as_deref(), Some("{\"count\": 3}"));
    }

    #[tokio::test]
    async fn set_fails_when_the_file_is_missing() {
        let temp = tempdir().unwrap();
        let mut store = open_store(temp.path()).await;
        let err = store
            .set(&temp.path().join("ghost.py"), "functions", "x".into(), 24, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn rewriting_the_file_invalidates_and_purges_the_entry() {
        let temp = tempdir().unwrap();
        let source = write_source(temp.path(), "a.py");
        let mut store = open_store(temp.path()).await;

        store
            .set(&source, "functions", "old analysis".into(), 24, &[])
            .await
            .unwrap();

        // Rewrite and push the mtime forward past timestamp granularity.
        std::fs::write(&source, b"def handler(): return 1\n").unwrap();
        let file = std::fs::OpenOptions::new().write(true).open(&source).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(5))
            .unwrap();

        let miss = store.get(&source, "functions", &[]).await.unwrap();
        assert_eq!(miss, None);
        assert!(store.index.is_empty(), "stale metadata row must be purged");
    }

    #[tokio::test]
    async fn expired_entries_are_swept_and_then_miss() {
        let temp = tempdir().unwrap();
        let source = write_source(temp.path(), "a.py");
        let mut store = open_store(temp.path()).await;

        store
            .set(&source, "functions", "short lived".into(), 1, &[])
            .await
            .unwrap();

        let two_hours_on = unix_now_ms() + 2 * 3_600_000;
        let cleared = store.clear_expired_at(two_hours_on).await.unwrap();
        assert_eq!(cleared, 1);
        assert_eq!(store.get(&source, "functions", &[]).await.unwrap(), None);
    }

    #[tokio::test]
    async fn zero_ttl_never_expires() {
        let temp = tempdir().unwrap();
        let source = write_source(temp.path(), "a.py");
        let mut store = open_store(temp.path()).await;

        store
            .set(&source, "functions", "keep me".into(), 0, &[])
            .await
            .unwrap();
        assert_eq!(store.clear_expired_at(u64::MAX).await.unwrap(), 0);
        assert_eq!(
            store.get(&source, "functions", &[]).await.unwrap().as_deref(),
            Some("keep me")
        );
    }

    #[tokio::test]
    async fn large_values_go_to_the_disk_tier() {
        let temp = tempdir().unwrap();
        let source = write_source(temp.path(), "a.py");
        let mut store = open_store(temp.path()).await;

        let big = "x".repeat(60 * 1024);
        store.set(&source, "report", big.clone(), 24, &[]).await.unwrap();

        let stats = store.stats();
        assert_eq!(stats.memory_entries, 0);
        assert_eq!(stats.disk_entries, 1);
        assert_eq!(stats.disk_bytes, big.len() as u64);
        assert_eq!(
            store.get(&source, "report", &[]).await.unwrap().as_deref(),
            Some(big.as_str())
        );
    }

    #[tokio::test]
    async fn promotion_evicts_oldest_created_entries_first() {
        let temp = tempdir().unwrap();
        let a = write_source(temp.path(), "a.py");
        let b = write_source(temp.path(), "b.py");
        let c = write_source(temp.path(), "c.py");

        let mut config = CacheConfig::new(temp.path().join("cache"));
        config.memory_budget_bytes = 25;
        config.memory_item_max_bytes = 20;
        let mut store = CacheStore::open(config).await.unwrap();

        store.set(&a, "functions", "aaaaaaaaaa".into(), 24, &[]).await.unwrap();
        store.set(&b, "functions", "bbbbbbbbbb".into(), 24, &[]).await.unwrap();
        // Make `a` unambiguously the oldest regardless of timer resolution.
        let fp_a = store
            .index
            .values()
            .find(|m| m.file_path == a)
            .unwrap()
            .fingerprint
            .clone();
        store.index.get_mut(&fp_a).unwrap().created_at_ms = 1;

        // Too big for the remaining budget: lands on disk...
        store.set(&c, "functions", "ccccccccccccccc".into(), 24, &[]).await.unwrap();
        assert_eq!(store.stats().disk_entries, 1);

        // ...but a read promotes it, pushing the tier over budget.
        store.get(&c, "functions", &[]).await.unwrap();

        assert!(store.memory_bytes <= 25);
        assert!(!store.memory.contains_key(&fp_a), "oldest entry must go first");
        assert_eq!(store.get(&a, "functions", &[]).await.unwrap(), None);
        assert_eq!(
            store.get(&b, "functions", &[]).await.unwrap().as_deref(),
            Some("bbbbbbbbbb")
        );
    }

    #[tokio::test]
    async fn corrupt_blob_is_treated_as_a_miss_and_purged() {
        let temp = tempdir().unwrap();
        let source = write_source(temp.path(), "a.py");
        let mut store = open_store(temp.path()).await;

        let big = "x".repeat(60 * 1024);
        store.set(&source, "report", big, 24, &[]).await.unwrap();
        let blob = store
            .index
            .values()
            .next()
            .unwrap()
            .blob
            .clone()
            .unwrap();
        std::fs::write(&blob, [0xff, 0xfe, 0xfd]).unwrap();

        assert_eq!(store.get(&source, "report", &[]).await.unwrap(), None);
        assert!(store.index.is_empty());
    }

    #[tokio::test]
    async fn disk_tier_survives_reopen_but_memory_tier_does_not() {
        let temp = tempdir().unwrap();
        let source = write_source(temp.path(), "a.py");

        {
            let mut store = open_store(temp.path()).await;
            store.set(&source, "small", "tiny".into(), 24, &[]).await.unwrap();
            let big = "x".repeat(60 * 1024);
            store.set(&source, "big", big, 24, &[]).await.unwrap();
        }

        let mut store = open_store(temp.path()).await;
        assert_eq!(store.stats().memory_entries, 0);
        assert_eq!(store.stats().disk_entries, 1);
        assert_eq!(store.get(&source, "small", &[]).await.unwrap(), None);
        assert!(store.get(&source, "big", &[]).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn clear_for_file_removes_every_owned_entry() {
        let temp = tempdir().unwrap();
        let a = write_source(temp.path(), "a.py");
        let b = write_source(temp.path(), "b.py");
        let mut store = open_store(temp.path()).await;

        store.set(&a, "functions", "fa".into(), 24, &[]).await.unwrap();
        store.set(&a, "imports", "ia".into(), 24, &[]).await.unwrap();
        store.set(&b, "functions", "fb".into(), 24, &[]).await.unwrap();

        let cleared = store.clear_for_file(&a).await.unwrap();
        assert_eq!(cleared, 2);
        assert_eq!(store.get(&a, "functions", &[]).await.unwrap(), None);
        assert_eq!(
            store.get(&b, "functions", &[]).await.unwrap().as_deref(),
            Some("fb")
        );
    }
}
