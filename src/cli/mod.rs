//! Command handlers and terminal rendering.

pub mod activity;
pub mod auth;
pub mod backfill;
pub mod budget;
pub mod cards;
pub mod debts;
pub mod goals;
pub mod setup;
pub mod ui;

use crate::core::config::AppConfig;
use crate::core::{Authenticator, FinanceBackend, MonthWindow, Session, SessionContext};
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;

/// Everything a command needs: configuration, the data and auth seams, and
/// the explicit session context.
pub struct App {
    pub config: AppConfig,
    pub backend: Arc<dyn FinanceBackend>,
    pub auth: Arc<dyn Authenticator>,
    pub session: SessionContext,
}

impl App {
    pub fn new(
        config: AppConfig,
        backend: Arc<dyn FinanceBackend>,
        auth: Arc<dyn Authenticator>,
        session: SessionContext,
    ) -> Self {
        Self {
            config,
            backend,
            auth,
            session,
        }
    }

    /// The signed-in session, refreshed when it is about to expire.
    pub async fn session(&mut self) -> Result<Session> {
        self.session.active(self.auth.as_ref(), Utc::now()).await
    }
}

/// The requested month, or the one containing today's local date.
pub fn month_or_current(month: Option<MonthWindow>) -> MonthWindow {
    month.unwrap_or_else(|| MonthWindow::containing(chrono::Local::now().date_naive()))
}
