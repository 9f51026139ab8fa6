use crate::batch::{Batch, BatchStrategy, Batcher};
use crate::checklist::{
    blocked, build_checklist, next_ready, progress, update_status, BlockedItem, ChecklistItem,
    ProgressSummary,
};
use crate::status::TaskStatus;
use analysis_catalog::FileRecord;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// The durable unit of one analysis run: goal, strategy, batches, checklist
/// and global context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub repo_path: PathBuf,
    pub analysis_goal: String,
    pub strategy: BatchStrategy,
    pub checklist: Vec<ChecklistItem>,
    pub batches: Vec<Batch>,
    #[serde(default)]
    pub global_context: BTreeMap<String, serde_json::Value>,
    pub created_at_ms: u64,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<PathBuf>,
}

impl Session {
    /// Plan a session: batch the records under the chosen strategy and build
    /// the dependency checklist for the single analysis goal.
    pub fn plan(
        repo_path: impl AsRef<Path>,
        analysis_goal: impl Into<String>,
        strategy: BatchStrategy,
        records: &[FileRecord],
        batcher: &Batcher,
    ) -> Self {
        let repo_path = repo_path.as_ref().to_path_buf();
        let analysis_goal = analysis_goal.into();
        let created_at_ms = unix_now_ms();
        let id = generate_session_id(&repo_path, created_at_ms);

        let batches = batcher.create_batches(records, strategy);
        let goals = vec![analysis_goal.clone()];
        let checklist = build_checklist(&batches, &goals);

        log::info!(
            "Planned session {id}: {} batches, {} checklist items ({strategy})",
            batches.len(),
            checklist.len()
        );

        Self {
            id,
            repo_path,
            analysis_goal,
            strategy,
            checklist,
            batches,
            global_context: BTreeMap::new(),
            created_at_ms,
            status: TaskStatus::Pending,
            location: None,
        }
    }

    /// Items whose dependencies are all complete, in creation order.
    pub fn next_ready(&self, limit: usize) -> Vec<&ChecklistItem> {
        next_ready(&self.checklist, limit)
    }

    /// Pending items still waiting on dependencies.
    pub fn blocked(&self, limit: usize) -> Vec<BlockedItem> {
        blocked(&self.checklist, limit)
    }

    pub fn update_status(
        &mut self,
        item_id: &str,
        status: TaskStatus,
        error_message: Option<String>,
    ) -> bool {
        update_status(&mut self.checklist, item_id, status, error_message)
    }

    pub fn progress(&self) -> ProgressSummary {
        progress(&self.checklist, self.status)
    }

    pub fn set_global(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.global_context.insert(key.into(), value);
    }

    pub fn global(&self, key: &str) -> Option<&serde_json::Value> {
        self.global_context.get(key)
    }
}

/// Short stable id derived from the repo path and creation time.
fn generate_session_id(repo_path: &Path, created_at_ms: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(repo_path.to_string_lossy().as_bytes());
    hasher.update(created_at_ms.to_le_bytes());
    let digest = hasher.finalize();
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}

pub(crate) fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_catalog::Language;
    use pretty_assertions::assert_eq;

    fn record(relative: &str, tokens: u64) -> FileRecord {
        FileRecord {
            path: PathBuf::from("/repo").join(relative),
            relative_path: PathBuf::from(relative),
            size: tokens * 4,
            language: Language::Python,
            estimated_tokens: tokens,
            modified_ms: 0,
        }
    }

    #[test]
    fn plan_builds_batches_and_checklist() {
        let records = vec![record("a.py", 2_000), record("b.py", 1_000)];
        let session = Session::plan(
            "/repo",
            "map the api surface",
            BatchStrategy::BySize,
            &records,
            &Batcher::default(),
        );

        assert_eq!(session.batches.len(), 1);
        // 2 file items + 1 goal + 1 batch
        assert_eq!(session.checklist.len(), 4);
        assert_eq!(session.status, TaskStatus::Pending);
        assert_eq!(session.id.len(), 16);
    }

    #[test]
    fn session_ids_differ_across_repos() {
        let a = generate_session_id(Path::new("/repo/a"), 1_000);
        let b = generate_session_id(Path::new("/repo/b"), 1_000);
        assert_ne!(a, b);
    }

    #[test]
    fn global_context_round_trips_values() {
        let session = {
            let mut s = Session::plan(
                "/repo",
                "goal",
                BatchStrategy::Mixed,
                &[record("a.py", 100)],
                &Batcher::default(),
            );
            s.set_global("framework", serde_json::json!("axum"));
            s
        };
        assert_eq!(session.global("framework"), Some(&serde_json::json!("axum")));
        assert_eq!(session.global("missing"), None);
    }
}
