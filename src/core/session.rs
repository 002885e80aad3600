//! Explicit session context handed to every data-access call.
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Tokens are refreshed this many seconds before they actually expire.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn expires_soon(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_MARGIN_SECS) >= self.expires_at
    }
}

/// Exchanges credentials for sessions with the hosted auth service.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session>;
    async fn refresh(&self, session: &Session) -> Result<Session>;
    async fn sign_out(&self, session: &Session) -> Result<()>;
}

/// Keeps the current session between runs.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self) -> Result<Option<Session>>;
    async fn save(&self, session: &Session) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

pub struct SessionContext {
    session: Option<Session>,
    store: Arc<dyn SessionStore>,
}

impl SessionContext {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            session: None,
            store,
        }
    }

    /// Loads whatever session the store holds. A missing session is fine.
    pub async fn restore(store: Arc<dyn SessionStore>) -> Result<Self> {
        let session = store.load().await.context("Failed to load saved session")?;
        debug!(restored = session.is_some(), "Session context created");
        Ok(Self { session, store })
    }

    pub fn current(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub async fn sign_in(
        &mut self,
        auth: &dyn Authenticator,
        email: &str,
        password: &str,
    ) -> Result<Session> {
        let session = auth.sign_in(email, password).await?;
        self.replace(session.clone()).await?;
        info!(user = %session.user_id, "Signed in");
        Ok(session)
    }

    /// Returns a usable session, refreshing it first when it is about to
    /// expire. A failed refresh invalidates the context.
    pub async fn active(&mut self, auth: &dyn Authenticator, now: DateTime<Utc>) -> Result<Session> {
        let Some(session) = self.session.clone() else {
            bail!("Not logged in. Run `finboard login` first");
        };
        if !session.expires_soon(now) {
            return Ok(session);
        }

        debug!(user = %session.user_id, "Session expiring, refreshing");
        match auth.refresh(&session).await {
            Ok(refreshed) => {
                self.replace(refreshed.clone()).await?;
                Ok(refreshed)
            }
            Err(e) => {
                warn!(error = %e, "Session refresh failed");
                self.invalidate().await?;
                bail!("Session expired, please log in again: {e}")
            }
        }
    }

    pub async fn replace(&mut self, session: Session) -> Result<()> {
        self.store
            .save(&session)
            .await
            .context("Failed to persist session")?;
        self.session = Some(session);
        Ok(())
    }

    /// Forgets the session both in memory and in the store.
    pub async fn invalidate(&mut self) -> Result<()> {
        self.session = None;
        self.store.clear().await.context("Failed to clear saved session")
    }

    /// Revokes the session remotely when possible, then invalidates it.
    pub async fn sign_out(&mut self, auth: &dyn Authenticator) -> Result<()> {
        if let Some(session) = &self.session {
            if let Err(e) = auth.sign_out(session).await {
                warn!(error = %e, "Remote sign out failed, clearing local session anyway");
            }
        }
        self.invalidate().await
    }
}
