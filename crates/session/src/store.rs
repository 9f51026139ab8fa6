use crate::error::{Result, SessionError};
use crate::session::{unix_now_ms, Session};
use std::path::{Path, PathBuf};

/// Durable session records, one JSON document per save generation.
///
/// Records are named `session_{id}_{created_ms}.json`; looking a session up
/// by id resolves the most recently created record. Writes go through a
/// temp file and rename so a crashed save never leaves a torn record.
pub struct SessionStore {
    base_dir: PathBuf,
}

impl SessionStore {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    /// Persist the session. The first save creates a timestamped record and
    /// stamps its location on the session; later saves overwrite it in place.
    pub async fn save(&self, session: &mut Session) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.base_dir).await?;
        let path = match &session.location {
            Some(existing) => existing.clone(),
            None => self
                .base_dir
                .join(format!("session_{}_{}.json", session.id, unix_now_ms())),
        };

        let bytes = serde_json::to_vec_pretty(session)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;

        session.location = Some(path.clone());
        log::info!("Saved session {} to {}", session.id, path.display());
        Ok(path)
    }

    pub async fn load(&self, path: &Path) -> Result<Session> {
        let bytes = tokio::fs::read(path).await?;
        let mut session: Session = serde_json::from_slice(&bytes)?;
        session.location = Some(path.to_path_buf());
        Ok(session)
    }

    /// Load the most recently created record for a session id.
    pub async fn load_latest(&self, session_id: &str) -> Result<Session> {
        let prefix = format!("session_{session_id}_");
        let mut newest: Option<(u64, PathBuf)> = None;

        let mut dir = match tokio::fs::read_dir(&self.base_dir).await {
            Ok(dir) => dir,
            Err(_) => return Err(SessionError::SessionNotFound(session_id.to_string())),
        };
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(stamp) = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(".json"))
            else {
                continue;
            };
            let Ok(stamp) = stamp.parse::<u64>() else {
                continue;
            };
            if newest.as_ref().map_or(true, |(best, _)| stamp > *best) {
                newest = Some((stamp, entry.path()));
            }
        }

        match newest {
            Some((_, path)) => self.load(&path).await,
            None => Err(SessionError::SessionNotFound(session_id.to_string())),
        }
    }
}
