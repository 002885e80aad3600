use crate::core::session::{Session, SessionStore};
use anyhow::{Context, Result};
use async_trait::async_trait;
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use std::path::Path;
use tracing::debug;

const PARTITION: &str = "session";
const CURRENT_KEY: &str = "current";

/// Session store backed by a fjall keyspace under the data directory.
pub struct FjallSessionStore {
    keyspace: Keyspace,
    partition: PartitionHandle,
}

impl FjallSessionStore {
    pub fn open(data_path: &Path) -> Result<Self> {
        let path = data_path.join("session");
        std::fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;

        let keyspace = Config::new(&path)
            .open()
            .with_context(|| format!("Failed to open session store at {}", path.display()))?;
        let partition = keyspace
            .open_partition(PARTITION, PartitionCreateOptions::default())
            .context("Failed to open session partition")?;
        Ok(Self {
            keyspace,
            partition,
        })
    }
}

#[async_trait]
impl SessionStore for FjallSessionStore {
    async fn load(&self) -> Result<Option<Session>> {
        match self.partition.get(CURRENT_KEY)? {
            Some(bytes) => {
                let session: Session =
                    serde_json::from_slice(&bytes).context("Saved session is corrupt")?;
                debug!(user = %session.user_id, "Session store HIT");
                Ok(Some(session))
            }
            None => {
                debug!("Session store MISS");
                Ok(None)
            }
        }
    }

    async fn save(&self, session: &Session) -> Result<()> {
        self.partition
            .insert(CURRENT_KEY, serde_json::to_vec(session)?)?;
        self.keyspace.persist(PersistMode::SyncAll)?;
        debug!(user = %session.user_id, "Session store PUT");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.partition.remove(CURRENT_KEY)?;
        self.keyspace.persist(PersistMode::SyncAll)?;
        debug!("Session store CLEAR");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn session() -> Session {
        Session {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            user_id: "user-1".to_string(),
            email: None,
            expires_at: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_fjall_session_round_trip() {
        let dir = tempdir().unwrap();
        let store = FjallSessionStore::open(dir.path()).unwrap();

        // Initially, no session is stored
        assert!(store.load().await.unwrap().is_none());

        store.save(&session()).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(session()));

        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fjall_session_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = FjallSessionStore::open(dir.path()).unwrap();
            store.save(&session()).await.unwrap();
        }
        let reopened = FjallSessionStore::open(dir.path()).unwrap();
        assert_eq!(reopened.load().await.unwrap(), Some(session()));
    }
}
