use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageTier {
    Memory,
    Disk,
}

/// One metadata row of the cache index. The row is durable for both tiers;
/// only disk-tier rows point at a value blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntryMeta {
    pub fingerprint: String,
    pub file_path: PathBuf,
    pub file_mtime_ms: u64,
    pub kind: String,
    pub created_at_ms: u64,
    /// None means the entry never expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at_ms: Option<u64>,
    pub size_bytes: u64,
    pub tier: StorageTier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob: Option<PathBuf>,
}

impl CacheEntryMeta {
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        self.expires_at_ms.is_some_and(|expires| now_ms > expires)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub memory_entries: usize,
    pub disk_entries: usize,
    pub memory_bytes: u64,
    pub disk_bytes: u64,
}

/// Deterministic cache key over the request's identifying fields. Extra
/// parameters are sorted so callers can pass them in any order.
pub fn fingerprint(
    file_path: &Path,
    file_mtime_ms: u64,
    kind: &str,
    extra: &[(String, String)],
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(file_path.to_string_lossy().as_bytes());
    hasher.update(file_mtime_ms.to_le_bytes());
    hasher.update(kind.as_bytes());
    let mut pairs: Vec<&(String, String)> = extra.iter().collect();
    pairs.sort();
    for (key, value) in pairs {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
    }
    let digest = hasher.finalize();
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn fingerprint_is_stable_under_extra_param_order() {
        let a = fingerprint(
            Path::new("/r/a.py"),
            1_000,
            "functions",
            &[
                ("depth".to_string(), "2".to_string()),
                ("mode".to_string(), "full".to_string()),
            ],
        );
        let b = fingerprint(
            Path::new("/r/a.py"),
            1_000,
            "functions",
            &[
                ("mode".to_string(), "full".to_string()),
                ("depth".to_string(), "2".to_string()),
            ],
        );
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn fingerprint_changes_with_mtime_and_kind() {
        let base = fingerprint(Path::new("/r/a.py"), 1_000, "functions", &[]);
        assert_ne!(base, fingerprint(Path::new("/r/a.py"), 1_001, "functions", &[]));
        assert_ne!(base, fingerprint(Path::new("/r/a.py"), 1_000, "imports", &[]));
    }

    #[test]
    fn expiry_check_honors_never_expires() {
        let meta = CacheEntryMeta {
            fingerprint: "ab".into(),
            file_path: PathBuf::from("/r/a.py"),
            file_mtime_ms: 0,
            kind: "functions".into(),
            created_at_ms: 0,
            expires_at_ms: None,
            size_bytes: 1,
            tier: StorageTier::Memory,
            blob: None,
        };
        assert!(!meta.is_expired_at(u64::MAX));
    }
}
