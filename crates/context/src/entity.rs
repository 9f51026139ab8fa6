use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// An HTTP endpoint. Deduplicated globally by method + path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiFinding {
    pub method: String,
    pub path: String,
}

/// A function definition, deduplicated per source file by name + line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionFinding {
    pub name: String,
    pub line: u32,
}

/// A class definition, deduplicated per source file by name + line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassFinding {
    pub name: String,
    pub line: u32,
}

/// An import statement. The module also feeds the file-dependency map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportFinding {
    pub module: String,
    #[serde(default)]
    pub name: String,
}

/// A database reference (connection, pool, raw driver usage).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbConnectionFinding {
    pub db_type: String,
    pub connection_string: String,
}

/// Tagged union of everything a worker can report. Payloads arriving from
/// the LLM boundary deserialize through this type, so malformed shapes are
/// rejected before they reach any store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    Api(ApiFinding),
    Function(FunctionFinding),
    Class(ClassFinding),
    Import(ImportFinding),
    DbConnection(DbConnectionFinding),
}

/// A finding accepted into a session, stamped with its origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discovered<T> {
    #[serde(flatten)]
    pub item: T,
    pub source_file: String,
    pub discovered_at_ms: u64,
}

/// Kind-specific identity used for deduplication across processing steps.
pub trait DedupKey {
    fn dedup_key(&self, source_file: &str) -> String;
}

impl DedupKey for ApiFinding {
    fn dedup_key(&self, _source_file: &str) -> String {
        format!("api:{}:{}", self.method, self.path)
    }
}

impl DedupKey for FunctionFinding {
    fn dedup_key(&self, source_file: &str) -> String {
        format!("function:{source_file}:{}:{}", self.name, self.line)
    }
}

impl DedupKey for ClassFinding {
    fn dedup_key(&self, source_file: &str) -> String {
        format!("class:{source_file}:{}:{}", self.name, self.line)
    }
}

impl DedupKey for ImportFinding {
    fn dedup_key(&self, source_file: &str) -> String {
        format!("import:{source_file}:{}:{}", self.module, self.name)
    }
}

impl DedupKey for DbConnectionFinding {
    fn dedup_key(&self, source_file: &str) -> String {
        format!(
            "db:{source_file}:{}:{}",
            self.db_type, self.connection_string
        )
    }
}

/// Hash a dedup key down to the short fingerprint kept in the seen-set.
pub fn dedup_fingerprint(item: &impl DedupKey, source_file: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(item.dedup_key(source_file).as_bytes());
    let digest = hasher.finalize();
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}
