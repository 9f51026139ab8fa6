use crate::error::{CatalogError, Result};
use crate::language::{Language, CONFIG_EXTENSIONS, KNOWN_EXTENSIONS};
use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10 MiB

/// A source file discovered by a scan. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: PathBuf,
    pub relative_path: PathBuf,
    pub size: u64,
    pub language: Language,
    pub estimated_tokens: u64,
    pub modified_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    TooLarge,
    Unreadable { message: String },
}

/// A file the scan saw but did not catalog, with the reason why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub relative_path: PathBuf,
    pub size: u64,
    #[serde(flatten)]
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOutcome {
    pub records: Vec<FileRecord>,
    pub skipped: Vec<SkippedFile>,
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Extensions to keep (with or without leading dot). None = full known table.
    pub extensions: Option<Vec<String>>,
    pub include_config: bool,
    pub max_file_size: u64,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            extensions: None,
            include_config: true,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// Catalogs the analyzable files under a repository root.
pub struct FileCatalog {
    root: PathBuf,
    options: ScanOptions,
}

impl FileCatalog {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            options: ScanOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ScanOptions) -> Self {
        self.options = options;
        self
    }

    /// Walk the repository root and produce size-sorted file records.
    ///
    /// Ignored directories are pruned before any content I/O. Oversized and
    /// unreadable files are reported in `skipped`; empty files and files
    /// outside the requested extension set are dropped silently. Records are
    /// sorted by size descending (ties by relative path) — the batcher relies
    /// on this ordering.
    pub fn scan(&self) -> Result<ScanOutcome> {
        let root = self
            .root
            .canonicalize()
            .map_err(|_| CatalogError::RootNotFound(self.root.clone()))?;
        if !root.is_dir() {
            return Err(CatalogError::RootNotFound(self.root.clone()));
        }

        let targets = self.target_extensions();
        let mut records = Vec::new();
        let mut skipped = Vec::new();

        let mut builder = WalkBuilder::new(&root);
        builder.standard_filters(false);
        builder.filter_entry(|entry| entry.depth() == 0 || !Self::is_ignored_entry(entry));

        for result in builder.build() {
            let entry = match result {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Failed to read entry: {e}");
                    continue;
                }
            };
            if entry.depth() == 0 {
                continue;
            }
            let Some(file_type) = entry.file_type() else {
                continue;
            };
            if !file_type.is_file() {
                continue;
            }

            let path = entry.path();
            let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
                continue;
            };
            if !targets.contains(ext.to_lowercase().as_str()) {
                continue;
            }

            let relative_path = path.strip_prefix(&root).unwrap_or(path).to_path_buf();
            let meta = match entry.metadata() {
                Ok(meta) => meta,
                Err(e) => {
                    skipped.push(SkippedFile {
                        relative_path,
                        size: 0,
                        reason: SkipReason::Unreadable {
                            message: e.to_string(),
                        },
                    });
                    continue;
                }
            };

            let size = meta.len();
            if size == 0 {
                continue;
            }
            if size > self.options.max_file_size {
                log::debug!(
                    "Skipping large file {} ({} bytes > {})",
                    path.display(),
                    size,
                    self.options.max_file_size
                );
                skipped.push(SkippedFile {
                    relative_path,
                    size,
                    reason: SkipReason::TooLarge,
                });
                continue;
            }

            let modified_ms = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0);

            records.push(FileRecord {
                path: path.to_path_buf(),
                relative_path,
                size,
                language: Language::from_path(path),
                estimated_tokens: estimate_tokens(size),
                modified_ms,
            });
        }

        records.sort_by(|a, b| {
            b.size
                .cmp(&a.size)
                .then_with(|| a.relative_path.cmp(&b.relative_path))
        });

        log::info!(
            "Cataloged {} files under {} ({} skipped)",
            records.len(),
            root.display(),
            skipped.len()
        );
        Ok(ScanOutcome { records, skipped })
    }

    fn target_extensions(&self) -> HashSet<String> {
        match &self.options.extensions {
            Some(requested) => requested
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            None => KNOWN_EXTENSIONS
                .iter()
                .filter(|ext| self.options.include_config || !CONFIG_EXTENSIONS.contains(ext))
                .map(|ext| (*ext).to_string())
                .collect(),
        }
    }

    fn is_ignored_entry(entry: &ignore::DirEntry) -> bool {
        let Some(name) = entry.file_name().to_str() else {
            return true;
        };
        if name.starts_with('.') {
            return true;
        }
        let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
        if is_dir {
            IGNORED_DIRS.contains(&name.to_lowercase().as_str())
        } else {
            Self::is_ignored_file(name)
        }
    }

    fn is_ignored_file(name: &str) -> bool {
        let lowered = name.to_lowercase();
        IGNORED_FILES.contains(&lowered.as_str())
            || lowered.ends_with(".min.js")
            || lowered.ends_with(".bundle.js")
    }
}

pub fn estimate_tokens(size: u64) -> u64 {
    // 1 token per ~4 bytes, a heuristic shared with the batch budget.
    size / 4
}

const IGNORED_DIRS: &[&str] = &[
    // VCS / IDE state
    ".git",
    ".svn",
    ".hg",
    ".idea",
    ".vscode",
    // caches / environments
    "__pycache__",
    ".pytest_cache",
    "node_modules",
    ".npm",
    ".venv",
    "venv",
    "env",
    ".gradle",
    // build output
    "build",
    "dist",
    "out",
    "bin",
    "obj",
    "target",
    ".next",
    ".nuxt",
    "coverage",
    ".nyc_output",
    // vendored / transient
    "vendor",
    "deps",
    "logs",
    "log",
    "tmp",
    "temp",
];

const IGNORED_FILES: &[&str] = &[
    ".gitignore",
    ".gitattributes",
    ".dockerignore",
    "dockerfile",
    "package-lock.json",
    "yarn.lock",
    "pipfile.lock",
    "poetry.lock",
    "composer.lock",
    "gemfile.lock",
    ".env",
    ".env.local",
    ".env.example",
    "readme.md",
    "license",
    "changelog.md",
];
