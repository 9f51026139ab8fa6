use crate::entity::{
    dedup_fingerprint, ApiFinding, ClassFinding, DbConnectionFinding, DedupKey, Discovered,
    Finding, FunctionFinding, ImportFinding,
};
use crate::graph::find_cycles;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

/// A recorded relationship between two files beyond a direct import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossReference {
    pub target: String,
    pub relation: String,
}

/// Everything a session has learned so far, in serializable form. The dedup
/// seen-set is deliberately absent: it is rebuilt from the entity lists on
/// import so a hand-edited or truncated snapshot cannot desynchronize it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub session_id: String,
    pub created_at_ms: u64,
    pub last_updated_ms: u64,
    #[serde(default)]
    pub apis: Vec<Discovered<ApiFinding>>,
    #[serde(default)]
    pub functions: Vec<Discovered<FunctionFinding>>,
    #[serde(default)]
    pub classes: Vec<Discovered<ClassFinding>>,
    #[serde(default)]
    pub imports: Vec<Discovered<ImportFinding>>,
    #[serde(default)]
    pub db_connections: Vec<Discovered<DbConnectionFinding>>,
    #[serde(default)]
    pub file_dependencies: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub cross_references: BTreeMap<String, Vec<CrossReference>>,
    #[serde(default)]
    pub patterns: BTreeSet<String>,
    #[serde(default)]
    pub framework_usage: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub processed_files: BTreeSet<String>,
    #[serde(default)]
    pub summaries: BTreeMap<String, String>,
}

/// Context relevant to one file, assembled for the worker before it starts
/// analyzing that file.
#[derive(Debug, Clone, Serialize)]
pub struct FileContext {
    pub related_files: Vec<String>,
    pub relevant_apis: Vec<Discovered<ApiFinding>>,
    pub relevant_functions: Vec<Discovered<FunctionFinding>>,
    pub relevant_classes: Vec<Discovered<ClassFinding>>,
    pub known_patterns: Vec<String>,
    pub already_processed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextSummary {
    pub session_id: String,
    pub processed_files: usize,
    pub apis: usize,
    pub functions: usize,
    pub classes: usize,
    pub imports: usize,
    pub db_connections: usize,
    pub patterns: usize,
    pub frameworks: usize,
    pub dependency_files: usize,
    pub cross_referenced_files: usize,
}

/// Per-session accumulator of discovered entities.
///
/// Entities only ever accumulate for the life of a session; deduplication by
/// kind-specific fingerprint makes re-reporting the same finding a no-op.
#[derive(Debug, Default)]
pub struct ContextStore {
    snapshot: ContextSnapshot,
    seen: HashSet<String>,
}

impl ContextStore {
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = unix_now_ms();
        Self {
            snapshot: ContextSnapshot {
                session_id: session_id.into(),
                created_at_ms: now,
                last_updated_ms: now,
                ..ContextSnapshot::default()
            },
            seen: HashSet::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.snapshot.session_id
    }

    pub fn add_apis(&mut self, items: Vec<ApiFinding>, source_file: &str) -> usize {
        let now = unix_now_ms();
        let mut added = 0;
        for item in items {
            let fp = dedup_fingerprint(&item, source_file);
            if !self.seen.insert(fp) {
                continue;
            }
            self.snapshot.apis.push(Discovered {
                item,
                source_file: source_file.to_string(),
                discovered_at_ms: now,
            });
            added += 1;
        }
        self.touch(added);
        added
    }

    pub fn add_functions(&mut self, items: Vec<FunctionFinding>, source_file: &str) -> usize {
        let now = unix_now_ms();
        let mut added = 0;
        for item in items {
            let fp = dedup_fingerprint(&item, source_file);
            if !self.seen.insert(fp) {
                continue;
            }
            self.snapshot.functions.push(Discovered {
                item,
                source_file: source_file.to_string(),
                discovered_at_ms: now,
            });
            added += 1;
        }
        self.touch(added);
        added
    }

    pub fn add_classes(&mut self, items: Vec<ClassFinding>, source_file: &str) -> usize {
        let now = unix_now_ms();
        let mut added = 0;
        for item in items {
            let fp = dedup_fingerprint(&item, source_file);
            if !self.seen.insert(fp) {
                continue;
            }
            self.snapshot.classes.push(Discovered {
                item,
                source_file: source_file.to_string(),
                discovered_at_ms: now,
            });
            added += 1;
        }
        self.touch(added);
        added
    }

    /// Accepted imports also feed the file-dependency map.
    pub fn add_imports(&mut self, items: Vec<ImportFinding>, source_file: &str) -> usize {
        let now = unix_now_ms();
        let mut added = 0;
        for item in items {
            let fp = dedup_fingerprint(&item, source_file);
            if !self.seen.insert(fp) {
                continue;
            }
            if !item.module.is_empty() {
                let deps = self
                    .snapshot
                    .file_dependencies
                    .entry(source_file.to_string())
                    .or_default();
                if !deps.contains(&item.module) {
                    deps.push(item.module.clone());
                }
            }
            self.snapshot.imports.push(Discovered {
                item,
                source_file: source_file.to_string(),
                discovered_at_ms: now,
            });
            added += 1;
        }
        self.touch(added);
        added
    }

    pub fn add_db_connections(
        &mut self,
        items: Vec<DbConnectionFinding>,
        source_file: &str,
    ) -> usize {
        let now = unix_now_ms();
        let mut added = 0;
        for item in items {
            let fp = dedup_fingerprint(&item, source_file);
            if !self.seen.insert(fp) {
                continue;
            }
            self.snapshot.db_connections.push(Discovered {
                item,
                source_file: source_file.to_string(),
                discovered_at_ms: now,
            });
            added += 1;
        }
        self.touch(added);
        added
    }

    /// Dispatch a mixed batch of boundary payloads to the typed adders.
    pub fn add_findings(&mut self, findings: Vec<Finding>, source_file: &str) -> usize {
        let mut added = 0;
        for finding in findings {
            added += match finding {
                Finding::Api(item) => self.add_apis(vec![item], source_file),
                Finding::Function(item) => self.add_functions(vec![item], source_file),
                Finding::Class(item) => self.add_classes(vec![item], source_file),
                Finding::Import(item) => self.add_imports(vec![item], source_file),
                Finding::DbConnection(item) => self.add_db_connections(vec![item], source_file),
            };
        }
        added
    }

    pub fn add_pattern(&mut self, tag: impl Into<String>) {
        self.snapshot.patterns.insert(tag.into());
        self.touch(1);
    }

    pub fn add_framework_usage(&mut self, framework: &str, detail: &str, source_file: &str) {
        let entry = format!("{source_file}: {detail}");
        let usages = self
            .snapshot
            .framework_usage
            .entry(framework.to_string())
            .or_default();
        if !usages.contains(&entry) {
            usages.push(entry);
        }
        self.touch(1);
    }

    pub fn add_cross_reference(&mut self, from_file: &str, to_file: &str, relation: &str) {
        let refs = self
            .snapshot
            .cross_references
            .entry(from_file.to_string())
            .or_default();
        let reference = CrossReference {
            target: to_file.to_string(),
            relation: relation.to_string(),
        };
        if !refs.contains(&reference) {
            refs.push(reference);
        }
        self.touch(1);
    }

    pub fn mark_processed(&mut self, file_path: &str, summary: impl Into<String>) {
        self.snapshot.processed_files.insert(file_path.to_string());
        self.snapshot
            .summaries
            .insert(file_path.to_string(), summary.into());
        self.touch(1);
    }

    pub fn is_processed(&self, file_path: &str) -> bool {
        self.snapshot.processed_files.contains(file_path)
    }

    pub fn summary_for(&self, file_path: &str) -> Option<&str> {
        self.snapshot.summaries.get(file_path).map(String::as_str)
    }

    /// Files related to the given one: importers of it, the modules it
    /// imports, and anything cross-referenced to or from it.
    pub fn related_files(&self, file_path: &str) -> BTreeSet<String> {
        let mut related = BTreeSet::new();

        for (file, deps) in &self.snapshot.file_dependencies {
            if file != file_path && deps.iter().any(|module| module == file_path) {
                related.insert(file.clone());
            }
        }
        if let Some(deps) = self.snapshot.file_dependencies.get(file_path) {
            related.extend(deps.iter().cloned());
        }
        if let Some(refs) = self.snapshot.cross_references.get(file_path) {
            related.extend(refs.iter().map(|r| r.target.clone()));
        }
        for (from, refs) in &self.snapshot.cross_references {
            if from != file_path && refs.iter().any(|r| r.target == file_path) {
                related.insert(from.clone());
            }
        }

        related.remove(file_path);
        related
    }

    /// Assemble the context a worker should see before analyzing a file.
    /// Relevance is membership of an entity's source file in the related set
    /// (or the file itself).
    pub fn context_for_file(&self, file_path: &str) -> FileContext {
        let related = self.related_files(file_path);
        let relevant = |source: &str| source == file_path || related.contains(source);

        FileContext {
            related_files: related.iter().cloned().collect(),
            relevant_apis: self
                .snapshot
                .apis
                .iter()
                .filter(|d| relevant(&d.source_file))
                .cloned()
                .collect(),
            relevant_functions: self
                .snapshot
                .functions
                .iter()
                .filter(|d| relevant(&d.source_file))
                .cloned()
                .collect(),
            relevant_classes: self
                .snapshot
                .classes
                .iter()
                .filter(|d| relevant(&d.source_file))
                .cloned()
                .collect(),
            known_patterns: self.snapshot.patterns.iter().cloned().collect(),
            already_processed: self.is_processed(file_path),
            previous_summary: self.summary_for(file_path).map(str::to_string),
        }
    }

    pub fn summary(&self) -> ContextSummary {
        ContextSummary {
            session_id: self.snapshot.session_id.clone(),
            processed_files: self.snapshot.processed_files.len(),
            apis: self.snapshot.apis.len(),
            functions: self.snapshot.functions.len(),
            classes: self.snapshot.classes.len(),
            imports: self.snapshot.imports.len(),
            db_connections: self.snapshot.db_connections.len(),
            patterns: self.snapshot.patterns.len(),
            frameworks: self.snapshot.framework_usage.len(),
            dependency_files: self.snapshot.file_dependencies.len(),
            cross_referenced_files: self.snapshot.cross_references.len(),
        }
    }

    /// Cycle diagnostics over the observed import graph.
    pub fn find_import_cycles(&self) -> Vec<Vec<String>> {
        find_cycles(&self.snapshot.file_dependencies)
    }

    pub fn export(&self) -> ContextSnapshot {
        self.snapshot.clone()
    }

    /// Rebuild a store from a snapshot, recomputing every dedup fingerprint
    /// from the entity lists themselves.
    pub fn import(snapshot: ContextSnapshot) -> Self {
        let mut seen = HashSet::new();
        for d in &snapshot.apis {
            seen.insert(dedup_fingerprint(&d.item, &d.source_file));
        }
        for d in &snapshot.functions {
            seen.insert(dedup_fingerprint(&d.item, &d.source_file));
        }
        for d in &snapshot.classes {
            seen.insert(dedup_fingerprint(&d.item, &d.source_file));
        }
        for d in &snapshot.imports {
            seen.insert(dedup_fingerprint(&d.item, &d.source_file));
        }
        for d in &snapshot.db_connections {
            seen.insert(dedup_fingerprint(&d.item, &d.source_file));
        }
        Self { snapshot, seen }
    }

    fn touch(&mut self, changed: usize) {
        if changed > 0 {
            self.snapshot.last_updated_ms = unix_now_ms();
        }
    }
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

    fn api(method: &str, path: &str) -> ApiFinding {
        ApiFinding {
            method: method.into(),
            path: path.into(),
        }
    }

    fn import(module: &str, name: &str) -> ImportFinding {
        ImportFinding {
            module: module.into(),
            name: name.into(),
        }
    }

    #[test]
    fn adding_the_same_api_twice_is_idempotent() {
        let mut store = ContextStore::new("s1");
        assert_eq!(store.add_apis(vec![api("GET", "/x")], "a.py"), 1);
        assert_eq!(store.add_apis(vec![api("GET", "/x")], "a.py"), 0);
        // Same endpoint reported from another file is still a duplicate.
        assert_eq!(store.add_apis(vec![api("GET", "/x")], "b.py"), 0);
        assert_eq!(store.summary().apis, 1);
    }

    #[test]
    fn imports_feed_the_dependency_map_once() {
        let mut store = ContextStore::new("s1");
        store.add_imports(vec![import("models", "User")], "api.py");
        store.add_imports(vec![import("models", "Order")], "api.py");

        let deps = store.export().file_dependencies;
        assert_eq!(deps.get("api.py"), Some(&vec!["models".to_string()]));
    }

    #[test]
    fn related_files_cover_imports_and_cross_references_in_both_directions() {
        let mut store = ContextStore::new("s1");
        store.add_imports(vec![import("models", "User")], "api.py");
        store.add_imports(vec![import("api.py", "handler")], "routes.py");
        store.add_cross_reference("tests.py", "api.py", "call_site");

        let related = store.related_files("api.py");
        let expected: BTreeSet<String> = ["models", "routes.py", "tests.py"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(related, expected);
    }

    #[test]
    fn file_context_filters_entities_by_related_source() {
        let mut store = ContextStore::new("s1");
        store.add_imports(vec![import("models", "User")], "api.py");
        store.add_functions(
            vec![FunctionFinding {
                name: "save".into(),
                line: 12,
            }],
            "models",
        );
        store.add_functions(
            vec![FunctionFinding {
                name: "unrelated".into(),
                line: 1,
            }],
            "other.py",
        );
        store.add_apis(vec![api("GET", "/users")], "api.py");
        store.add_pattern("repository-pattern");
        store.mark_processed("api.py", "exposes user CRUD");

        let context = store.context_for_file("api.py");
        assert_eq!(context.related_files, vec!["models".to_string()]);
        assert_eq!(context.relevant_functions.len(), 1);
        assert_eq!(context.relevant_functions[0].item.name, "save");
        assert_eq!(context.relevant_apis.len(), 1);
        assert!(context.already_processed);
        assert_eq!(context.previous_summary.as_deref(), Some("exposes user CRUD"));
        assert_eq!(context.known_patterns, vec!["repository-pattern".to_string()]);
    }

    #[test]
    fn mixed_findings_dispatch_to_their_stores() {
        let mut store = ContextStore::new("s1");
        let added = store.add_findings(
            vec![
                Finding::Api(api("POST", "/orders")),
                Finding::Import(import("db", "pool")),
                Finding::DbConnection(DbConnectionFinding {
                    db_type: "postgres".into(),
                    connection_string: "postgres://localhost/app".into(),
                }),
            ],
            "orders.py",
        );
        assert_eq!(added, 3);
        let summary = store.summary();
        assert_eq!(summary.apis, 1);
        assert_eq!(summary.imports, 1);
        assert_eq!(summary.db_connections, 1);
    }

    #[test]
    fn export_import_round_trip_preserves_dedup_behavior() {
        let mut store = ContextStore::new("s1");
        store.add_apis(vec![api("GET", "/x")], "a.py");
        store.add_functions(
            vec![FunctionFinding {
                name: "f".into(),
                line: 3,
            }],
            "a.py",
        );
        store.add_imports(vec![import("m", "n")], "a.py");
        store.mark_processed("a.py", "done");

        let snapshot = store.export();
        let json = serde_json::to_string(&snapshot).unwrap();
        let mut restored = ContextStore::import(serde_json::from_str(&json).unwrap());

        assert_eq!(restored.summary(), store.summary());
        // Previously seen findings are still duplicates after the round trip.
        assert_eq!(restored.add_apis(vec![api("GET", "/x")], "a.py"), 0);
        assert_eq!(restored.add_imports(vec![import("m", "n")], "a.py"), 0);
        // New findings are still accepted.
        assert_eq!(restored.add_apis(vec![api("DELETE", "/x")], "a.py"), 1);
    }

    #[test]
    fn import_cycles_surface_from_recorded_imports() {
        let mut store = ContextStore::new("s1");
        store.add_imports(vec![import("b.py", "x")], "a.py");
        store.add_imports(vec![import("c.py", "y")], "b.py");
        store.add_imports(vec![import("a.py", "z")], "c.py");

        let cycles = store.find_import_cycles();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].len(), 3);
    }
}
