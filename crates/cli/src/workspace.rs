use analysis_cache::{CacheConfig, CacheStore};
use analysis_context::ContextRegistry;
use analysis_session::SessionStore;
use anyhow::Result;
use std::path::Path;

/// Registry of the engine's stores, owned by the application and passed by
/// reference to every command that needs one.
pub(crate) struct Workspace {
    pub sessions: SessionStore,
    pub cache: CacheStore,
    pub contexts: ContextRegistry,
}

impl Workspace {
    pub async fn open(data_dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;
        let sessions = SessionStore::new(data_dir.join("sessions"));
        let cache = CacheStore::open(CacheConfig::new(data_dir.join("cache"))).await?;
        let contexts = ContextRegistry::new(data_dir.join("context"));
        Ok(Self {
            sessions,
            cache,
            contexts,
        })
    }
}
