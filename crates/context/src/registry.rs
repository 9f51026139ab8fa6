use crate::error::{ContextError, Result};
use crate::store::{ContextSnapshot, ContextStore};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Explicit owner of per-session context stores.
///
/// Constructed once by the application and passed by reference wherever
/// context is needed; there is no hidden global registry. Each session's
/// context is persisted as one JSON record, overwritten on every save.
pub struct ContextRegistry {
    base_dir: PathBuf,
    stores: HashMap<String, ContextStore>,
}

impl ContextRegistry {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            stores: HashMap::new(),
        }
    }

    pub fn get(&self, session_id: &str) -> Option<&ContextStore> {
        self.stores.get(session_id)
    }

    pub fn get_or_create(&mut self, session_id: &str) -> &mut ContextStore {
        self.stores
            .entry(session_id.to_string())
            .or_insert_with(|| ContextStore::new(session_id))
    }

    /// Load a session's context from its durable record, or start a fresh
    /// store when none exists yet.
    pub async fn open(&mut self, session_id: &str) -> Result<&mut ContextStore> {
        if !self.stores.contains_key(session_id) {
            match self.read_snapshot(session_id).await {
                Ok(snapshot) => {
                    self.stores
                        .insert(session_id.to_string(), ContextStore::import(snapshot));
                }
                Err(ContextError::SessionNotFound(_)) => {
                    self.stores
                        .insert(session_id.to_string(), ContextStore::new(session_id));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(self.get_or_create(session_id))
    }

    /// Load a session's context, failing when no record exists.
    pub async fn load(&mut self, session_id: &str) -> Result<&mut ContextStore> {
        if !self.stores.contains_key(session_id) {
            let snapshot = self.read_snapshot(session_id).await?;
            self.stores
                .insert(session_id.to_string(), ContextStore::import(snapshot));
        }
        Ok(self.get_or_create(session_id))
    }

    /// Overwrite the session's durable record with its current state.
    pub async fn save(&self, session_id: &str) -> Result<PathBuf> {
        let store = self
            .stores
            .get(session_id)
            .ok_or_else(|| ContextError::SessionNotFound(session_id.to_string()))?;

        tokio::fs::create_dir_all(&self.base_dir).await?;
        let path = self.record_path(session_id);
        let bytes = serde_json::to_vec_pretty(&store.export())?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        log::debug!("Saved context for session {session_id} to {}", path.display());
        Ok(path)
    }

    /// Explicit session reset: drop the in-memory store and its record.
    pub async fn reset(&mut self, session_id: &str) -> Result<bool> {
        let existed = self.stores.remove(session_id).is_some();
        let path = self.record_path(session_id);
        let removed = tokio::fs::remove_file(&path).await.is_ok();
        if existed || removed {
            log::info!("Reset context for session {session_id}");
        }
        Ok(existed || removed)
    }

    async fn read_snapshot(&self, session_id: &str) -> Result<ContextSnapshot> {
        let path = self.record_path(session_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(_) => return Err(ContextError::SessionNotFound(session_id.to_string())),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn record_path(&self, session_id: &str) -> PathBuf {
        self.base_dir.join(format!("context_{session_id}.json"))
    }
}
