use crate::batch::Batch;
use crate::status::TaskStatus;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    File,
    Goal,
    Batch,
}

impl ItemKind {
    pub const ALL: [ItemKind; 3] = [ItemKind::File, ItemKind::Goal, ItemKind::Batch];

    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::File => "file",
            ItemKind::Goal => "goal",
            ItemKind::Batch => "batch",
        }
    }
}

/// Typed item metadata; every field is optional so each kind carries only
/// what applies to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
}

/// One trackable unit of work: a file, an analysis goal, or a whole batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub id: String,
    pub kind: ItemKind,
    pub description: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default)]
    pub metadata: ItemMetadata,
}

/// Build the three-layer checklist: file items carry no dependencies, goal
/// items depend on every file item, batch items depend on their own files.
pub fn build_checklist(batches: &[Batch], goals: &[String]) -> Vec<ChecklistItem> {
    let mut items = Vec::new();
    let mut counter = 0usize;
    let mut files_by_batch: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for batch in batches {
        for file in &batch.files {
            let id = format!("file_{counter:04}");
            counter += 1;
            files_by_batch
                .entry(batch.id.clone())
                .or_default()
                .push(id.clone());
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| file.to_string_lossy().to_string());
            items.push(ChecklistItem {
                id,
                kind: ItemKind::File,
                description: format!("Process file: {name}"),
                status: TaskStatus::Pending,
                dependencies: Vec::new(),
                retry_count: 0,
                last_error: None,
                metadata: ItemMetadata {
                    file_path: Some(file.clone()),
                    language: batch.language_group.clone(),
                    directory: batch.directory_group.clone(),
                    batch_id: Some(batch.id.clone()),
                    goal: None,
                },
            });
        }
    }

    let all_file_ids: Vec<String> = items.iter().map(|item| item.id.clone()).collect();

    for goal in goals {
        let id = format!("goal_{counter:04}");
        counter += 1;
        items.push(ChecklistItem {
            id,
            kind: ItemKind::Goal,
            description: format!("Analysis goal: {goal}"),
            status: TaskStatus::Pending,
            dependencies: all_file_ids.clone(),
            retry_count: 0,
            last_error: None,
            metadata: ItemMetadata {
                goal: Some(goal.clone()),
                ..ItemMetadata::default()
            },
        });
    }

    for batch in batches {
        let id = format!("batch_{counter:04}");
        counter += 1;
        items.push(ChecklistItem {
            id,
            kind: ItemKind::Batch,
            description: format!("Complete batch: {}", batch.id),
            status: TaskStatus::Pending,
            dependencies: files_by_batch.get(&batch.id).cloned().unwrap_or_default(),
            retry_count: 0,
            last_error: None,
            metadata: ItemMetadata {
                batch_id: Some(batch.id.clone()),
                ..ItemMetadata::default()
            },
        });
    }

    items
}

/// Linear scan in creation order; an item is ready when it is pending and
/// every dependency id resolves to a completed item.
pub fn next_ready(items: &[ChecklistItem], limit: usize) -> Vec<&ChecklistItem> {
    let status_by_id: HashMap<&str, TaskStatus> = items
        .iter()
        .map(|item| (item.id.as_str(), item.status))
        .collect();

    let mut ready = Vec::new();
    for item in items {
        if item.status != TaskStatus::Pending {
            continue;
        }
        let dependencies_met = item
            .dependencies
            .iter()
            .all(|dep| status_by_id.get(dep.as_str()) == Some(&TaskStatus::Completed));
        if dependencies_met {
            ready.push(item);
            if ready.len() >= limit {
                break;
            }
        }
    }
    ready
}

/// Update one item's status. Returns false when the id is unknown. A failed
/// transition increments the retry counter and records the error; retries
/// themselves are the caller's responsibility.
pub fn update_status(
    items: &mut [ChecklistItem],
    item_id: &str,
    status: TaskStatus,
    error_message: Option<String>,
) -> bool {
    let Some(item) = items.iter_mut().find(|item| item.id == item_id) else {
        return false;
    };
    item.status = status;
    if let Some(message) = error_message {
        item.last_error = Some(message);
    }
    if status == TaskStatus::Failed {
        item.retry_count += 1;
    }
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindProgress {
    pub total: usize,
    pub completed: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedItem {
    pub id: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub retry_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSummary {
    pub total_items: usize,
    pub status_counts: BTreeMap<String, usize>,
    pub overall_percentage: f64,
    pub kinds: BTreeMap<String, KindProgress>,
    pub failed: Vec<FailedItem>,
    pub session_status: TaskStatus,
}

pub fn progress(items: &[ChecklistItem], session_status: TaskStatus) -> ProgressSummary {
    let mut status_counts: BTreeMap<String, usize> = TaskStatus::ALL
        .iter()
        .map(|status| (status.as_str().to_string(), 0))
        .collect();
    for item in items {
        *status_counts.entry(item.status.as_str().to_string()).or_insert(0) += 1;
    }

    let mut kinds = BTreeMap::new();
    for kind in ItemKind::ALL {
        let of_kind: Vec<&ChecklistItem> = items.iter().filter(|i| i.kind == kind).collect();
        let total = of_kind.len();
        let completed = of_kind
            .iter()
            .filter(|i| i.status == TaskStatus::Completed)
            .count();
        let percentage = if total > 0 {
            completed as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        kinds.insert(
            kind.as_str().to_string(),
            KindProgress {
                total,
                completed,
                percentage,
            },
        );
    }

    let completed = status_counts
        .get(TaskStatus::Completed.as_str())
        .copied()
        .unwrap_or(0);
    let overall_percentage = if items.is_empty() {
        0.0
    } else {
        completed as f64 / items.len() as f64 * 100.0
    };

    let failed = items
        .iter()
        .filter(|item| item.status == TaskStatus::Failed)
        .map(|item| FailedItem {
            id: item.id.clone(),
            description: item.description.clone(),
            error: item.last_error.clone(),
            retry_count: item.retry_count,
        })
        .collect();

    ProgressSummary {
        total_items: items.len(),
        status_counts,
        overall_percentage,
        kinds,
        failed,
        session_status,
    }
}

/// A pending item still waiting on incomplete dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedItem {
    pub id: String,
    pub description: String,
    pub unmet_dependencies: usize,
}

pub fn blocked(items: &[ChecklistItem], limit: usize) -> Vec<BlockedItem> {
    let status_by_id: HashMap<&str, TaskStatus> = items
        .iter()
        .map(|item| (item.id.as_str(), item.status))
        .collect();

    let mut waiting = Vec::new();
    for item in items {
        if item.status != TaskStatus::Pending {
            continue;
        }
        let unmet = item
            .dependencies
            .iter()
            .filter(|dep| status_by_id.get(dep.as_str()) != Some(&TaskStatus::Completed))
            .count();
        if unmet > 0 {
            waiting.push(BlockedItem {
                id: item.id.clone(),
                description: item.description.clone(),
                unmet_dependencies: unmet,
            });
            if waiting.len() >= limit {
                break;
            }
        }
    }
    waiting
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::SizeClass;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn batch(id: &str, files: &[&str]) -> Batch {
        Batch {
            id: id.to_string(),
            files: files.iter().map(PathBuf::from).collect(),
            estimated_tokens: 1_000,
            size_class: SizeClass::Small,
            language_group: None,
            directory_group: None,
            status: TaskStatus::Pending,
        }
    }

    fn sample_checklist() -> Vec<ChecklistItem> {
        let batches = vec![batch("b0", &["/r/a.py", "/r/b.py"]), batch("b1", &["/r/c.py"])];
        build_checklist(&batches, &["find apis".to_string()])
    }

    #[test]
    fn builds_three_layers_with_expected_dependencies() {
        let items = sample_checklist();

        // 3 file items, 1 goal item, 2 batch items
        assert_eq!(items.len(), 6);
        assert_eq!(items[0].id, "file_0000");
        assert!(items[0].dependencies.is_empty());

        let goal = items.iter().find(|i| i.kind == ItemKind::Goal).unwrap();
        assert_eq!(goal.id, "goal_0003");
        assert_eq!(goal.dependencies.len(), 3);

        let b1 = items
            .iter()
            .find(|i| i.kind == ItemKind::Batch && i.metadata.batch_id.as_deref() == Some("b1"))
            .unwrap();
        assert_eq!(b1.dependencies, vec!["file_0002".to_string()]);
    }

    #[test]
    fn file_items_come_ready_first() {
        let items = sample_checklist();
        let ready = next_ready(&items, 10);
        let ids: Vec<&str> = ready.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["file_0000", "file_0001", "file_0002"]);
    }

    #[test]
    fn batch_item_becomes_ready_when_its_files_complete() {
        let mut items = sample_checklist();
        assert!(update_status(&mut items, "file_0002", TaskStatus::Completed, None));

        let ready = next_ready(&items, 10);
        let ids: Vec<&str> = ready.iter().map(|i| i.id.as_str()).collect();
        // b1's only file is done; the goal still waits on all three files.
        assert_eq!(ids, vec!["file_0000", "file_0001", "batch_0005"]);
    }

    #[test]
    fn ready_set_never_contains_items_with_incomplete_dependencies() {
        let mut items = sample_checklist();
        update_status(&mut items, "file_0000", TaskStatus::Completed, None);
        update_status(&mut items, "file_0001", TaskStatus::Failed, Some("boom".into()));
        update_status(&mut items, "file_0002", TaskStatus::Completed, None);

        let status_by_id: HashMap<String, TaskStatus> = items
            .iter()
            .map(|i| (i.id.clone(), i.status))
            .collect();
        for item in next_ready(&items, 100) {
            for dep in &item.dependencies {
                assert_eq!(status_by_id.get(dep), Some(&TaskStatus::Completed));
            }
        }
    }

    #[test]
    fn limit_caps_returned_items() {
        let items = sample_checklist();
        assert_eq!(next_ready(&items, 2).len(), 2);
    }

    #[test]
    fn unknown_item_update_returns_false() {
        let mut items = sample_checklist();
        assert!(!update_status(&mut items, "file_9999", TaskStatus::Completed, None));
    }

    #[test]
    fn failed_update_increments_retry_and_keeps_error() {
        let mut items = sample_checklist();
        update_status(&mut items, "file_0000", TaskStatus::Failed, Some("timeout".into()));
        update_status(&mut items, "file_0000", TaskStatus::Failed, Some("again".into()));

        let item = items.iter().find(|i| i.id == "file_0000").unwrap();
        assert_eq!(item.retry_count, 2);
        assert_eq!(item.last_error.as_deref(), Some("again"));
    }

    #[test]
    fn progress_counts_statuses_and_kinds() {
        let mut items = sample_checklist();
        update_status(&mut items, "file_0000", TaskStatus::Completed, None);
        update_status(&mut items, "file_0001", TaskStatus::Failed, Some("oops".into()));

        let summary = progress(&items, TaskStatus::InProgress);
        assert_eq!(summary.total_items, 6);
        assert_eq!(summary.status_counts.get("completed"), Some(&1));
        assert_eq!(summary.status_counts.get("failed"), Some(&1));
        assert_eq!(summary.status_counts.get("pending"), Some(&4));
        assert_eq!(summary.kinds.get("file").unwrap().total, 3);
        assert_eq!(summary.kinds.get("file").unwrap().completed, 1);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].error.as_deref(), Some("oops"));
    }

    #[test]
    fn blocked_reports_unmet_dependency_counts() {
        let mut items = sample_checklist();
        update_status(&mut items, "file_0000", TaskStatus::Completed, None);

        let waiting = blocked(&items, 10);
        let goal = waiting.iter().find(|w| w.id == "goal_0003").unwrap();
        assert_eq!(goal.unmet_dependencies, 2);
    }
}
