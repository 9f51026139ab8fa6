use crate::scanner::ScanOutcome;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const LARGE_FILE_TOKENS: u64 = 5_000;
const MEDIUM_CODEBASE_TOKENS: u64 = 50_000;
const LARGE_CODEBASE_TOKENS: u64 = 100_000;

/// Aggregate statistics for one scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanStats {
    pub total_files: usize,
    pub total_bytes: u64,
    pub total_tokens: u64,
    pub languages: HashMap<String, usize>,
    pub large_files: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    SinglePass,
    MultiBatch,
    MultiBatchWithContext,
}

/// Suggested processing shape for the scanned codebase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingHint {
    pub mode: ProcessingMode,
    pub estimated_batches: u64,
    pub warnings: Vec<String>,
}

impl ScanStats {
    pub fn collect(outcome: &ScanOutcome) -> Self {
        let mut languages: HashMap<String, usize> = HashMap::new();
        let mut total_bytes = 0u64;
        let mut total_tokens = 0u64;
        let mut large_files = 0usize;
        for record in &outcome.records {
            total_bytes += record.size;
            total_tokens += record.estimated_tokens;
            if record.estimated_tokens > LARGE_FILE_TOKENS {
                large_files += 1;
            }
            *languages.entry(record.language.as_str().to_string()).or_insert(0) += 1;
        }
        Self {
            total_files: outcome.records.len(),
            total_bytes,
            total_tokens,
            languages,
            large_files,
            skipped: outcome.skipped.len(),
        }
    }

    /// Rough guidance for how a worker should stage the analysis.
    pub fn processing_hint(&self) -> ProcessingHint {
        let mut warnings = Vec::new();
        let (mode, estimated_batches) = if self.total_tokens > LARGE_CODEBASE_TOKENS {
            warnings.push("large codebase detected, consider targeted analysis".to_string());
            (
                ProcessingMode::MultiBatchWithContext,
                (self.total_tokens / 10_000).max(10),
            )
        } else if self.total_tokens > MEDIUM_CODEBASE_TOKENS {
            (ProcessingMode::MultiBatch, (self.total_tokens / 20_000).max(5))
        } else {
            (ProcessingMode::SinglePass, 1)
        };

        if self.large_files > 0 {
            warnings.push(format!("{} large files may need chunking", self.large_files));
        }

        ProcessingHint {
            mode,
            estimated_batches,
            warnings,
        }
    }
}
