use crate::error::SessionError;
use crate::status::TaskStatus;
use analysis_catalog::FileRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_TOKEN_BUDGET: u64 = 15_000;

const LARGE_BATCH_TOKENS: u64 = 10_000;
const MEDIUM_BATCH_TOKENS: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeClass {
    Small,
    Medium,
    Large,
}

impl SizeClass {
    pub fn for_tokens(tokens: u64) -> Self {
        if tokens > LARGE_BATCH_TOKENS {
            SizeClass::Large
        } else if tokens > MEDIUM_BATCH_TOKENS {
            SizeClass::Medium
        } else {
            SizeClass::Small
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SizeClass::Small => "small",
            SizeClass::Medium => "medium",
            SizeClass::Large => "large",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStrategy {
    BySize,
    ByLanguage,
    ByDirectory,
    #[default]
    Mixed,
}

impl BatchStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            BatchStrategy::BySize => "by_size",
            BatchStrategy::ByLanguage => "by_language",
            BatchStrategy::ByDirectory => "by_directory",
            BatchStrategy::Mixed => "mixed",
        }
    }
}

impl FromStr for BatchStrategy {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "by_size" => Ok(BatchStrategy::BySize),
            "by_language" => Ok(BatchStrategy::ByLanguage),
            "by_directory" => Ok(BatchStrategy::ByDirectory),
            "mixed" => Ok(BatchStrategy::Mixed),
            other => Err(SessionError::InvalidStrategy(other.to_string())),
        }
    }
}

impl std::fmt::Display for BatchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A token-bounded group of files processed together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub id: String,
    pub files: Vec<PathBuf>,
    pub estimated_tokens: u64,
    pub size_class: SizeClass,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory_group: Option<String>,
    pub status: TaskStatus,
}

/// Partitions file records into token-bounded batches.
///
/// Every strategy bottoms out in size-based packing; the partition invariant
/// (each record lands in exactly one batch) holds for all of them.
pub struct Batcher {
    max_tokens_per_batch: u64,
}

impl Default for Batcher {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_BUDGET)
    }
}

impl Batcher {
    pub fn new(max_tokens_per_batch: u64) -> Self {
        Self {
            max_tokens_per_batch,
        }
    }

    pub fn create_batches(&self, records: &[FileRecord], strategy: BatchStrategy) -> Vec<Batch> {
        let refs: Vec<&FileRecord> = records.iter().collect();
        let batches = match strategy {
            BatchStrategy::BySize => {
                self.pack_by_size(&refs, |n| format!("size_batch_{n}"), None, None)
            }
            BatchStrategy::ByLanguage => {
                let mut batches = Vec::new();
                for (language, group) in group_by(&refs, |r| r.language.as_str().to_string()) {
                    batches.extend(self.pack_by_size(
                        &group,
                        |n| format!("lang_{language}_{n}"),
                        Some(language.clone()),
                        None,
                    ));
                }
                batches
            }
            BatchStrategy::ByDirectory => {
                let mut batches = Vec::new();
                for (directory, group) in group_by(&refs, |r| directory_of(r)) {
                    let tag = sanitize_group(&directory);
                    batches.extend(self.pack_by_size(
                        &group,
                        |n| format!("dir_{tag}_{n}"),
                        None,
                        Some(directory.clone()),
                    ));
                }
                batches
            }
            BatchStrategy::Mixed => {
                let mut batches = Vec::new();
                let mut counter = 0usize;
                for (language, lang_group) in group_by(&refs, |r| r.language.as_str().to_string())
                {
                    for (directory, group) in group_by(&lang_group, |r| directory_of(r)) {
                        let tag = sanitize_group(&directory);
                        let packed = self.pack_by_size(
                            &group,
                            |_| String::new(),
                            Some(language.clone()),
                            Some(directory.clone()),
                        );
                        for mut batch in packed {
                            batch.id = format!("mixed_{language}_{tag}_{counter}");
                            counter += 1;
                            batches.push(batch);
                        }
                    }
                }
                batches
            }
        };

        log::debug!(
            "Created {} batches from {} records ({})",
            batches.len(),
            records.len(),
            strategy
        );
        batches
    }

    /// Size-based packing: records sorted by token cost descending; records
    /// over 80% of the budget are isolated into their own `large` batch; the
    /// rest accumulate until adding one would exceed the budget.
    fn pack_by_size(
        &self,
        records: &[&FileRecord],
        label: impl Fn(usize) -> String,
        language_group: Option<String>,
        directory_group: Option<String>,
    ) -> Vec<Batch> {
        let mut sorted: Vec<&FileRecord> = records.to_vec();
        sorted.sort_by(|a, b| {
            b.estimated_tokens
                .cmp(&a.estimated_tokens)
                .then_with(|| a.relative_path.cmp(&b.relative_path))
        });

        let oversize_threshold = self.max_tokens_per_batch * 8 / 10;
        let mut batches: Vec<Batch> = Vec::new();
        let mut current: Vec<PathBuf> = Vec::new();
        let mut current_tokens = 0u64;

        let make_batch = |n: usize, files: Vec<PathBuf>, tokens: u64, class: SizeClass| Batch {
            id: label(n),
            files,
            estimated_tokens: tokens,
            size_class: class,
            language_group: language_group.clone(),
            directory_group: directory_group.clone(),
            status: TaskStatus::Pending,
        };

        for record in sorted {
            if record.estimated_tokens > oversize_threshold {
                if !current.is_empty() {
                    let files = std::mem::take(&mut current);
                    batches.push(make_batch(
                        batches.len(),
                        files,
                        current_tokens,
                        SizeClass::for_tokens(current_tokens),
                    ));
                    current_tokens = 0;
                }
                batches.push(make_batch(
                    batches.len(),
                    vec![record.path.clone()],
                    record.estimated_tokens,
                    SizeClass::Large,
                ));
                continue;
            }

            if current_tokens + record.estimated_tokens > self.max_tokens_per_batch
                && !current.is_empty()
            {
                let files = std::mem::take(&mut current);
                batches.push(make_batch(
                    batches.len(),
                    files,
                    current_tokens,
                    SizeClass::for_tokens(current_tokens),
                ));
                current_tokens = 0;
            }

            current.push(record.path.clone());
            current_tokens += record.estimated_tokens;
        }

        if !current.is_empty() {
            let files = std::mem::take(&mut current);
            batches.push(make_batch(
                batches.len(),
                files,
                current_tokens,
                SizeClass::for_tokens(current_tokens),
            ));
        }

        batches
    }
}

/// Group records by key, preserving first-encounter order of the keys.
fn group_by<'a, K, F>(records: &[&'a FileRecord], key: F) -> Vec<(K, Vec<&'a FileRecord>)>
where
    K: Eq + Hash + Clone,
    F: Fn(&FileRecord) -> K,
{
    let mut order: Vec<K> = Vec::new();
    let mut groups: HashMap<K, Vec<&FileRecord>> = HashMap::new();
    for &record in records {
        let k = key(record);
        if !groups.contains_key(&k) {
            order.push(k.clone());
        }
        groups.entry(k).or_default().push(record);
    }
    order
        .into_iter()
        .map(|k| {
            let group = groups.remove(&k).unwrap_or_default();
            (k, group)
        })
        .collect()
}

fn directory_of(record: &FileRecord) -> String {
    match record.relative_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            parent.to_string_lossy().to_string()
        }
        _ => "root".to_string(),
    }
}

fn sanitize_group(directory: &str) -> String {
    directory.replace(['/', '\\'], "_")
}
