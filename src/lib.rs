pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

use crate::cli::App;
use crate::cli::activity::{InstallmentAction, SubscriptionAction};
use crate::cli::cards::CardAction;
use crate::cli::debts::DebtAction;
use crate::cli::goals::GoalAction;
use crate::core::config::AppConfig;
use crate::core::{MonthWindow, SessionContext};
use crate::providers::{AuthProvider, RestProvider};
use anyhow::Result;
use clap::Subcommand;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Subcommand)]
pub enum AppCommand {
    /// Sign in and keep the session for later commands
    Login {
        #[arg(long)]
        email: String,
        /// Read from FINBOARD_PASSWORD or prompted when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Sign out and forget the saved session
    Logout,
    /// Cards and their monthly activity
    #[command(subcommand)]
    Card(CardAction),
    /// Savings goals
    #[command(subcommand)]
    Goal(GoalAction),
    /// Debts and payments
    #[command(subcommand)]
    Debt(DebtAction),
    /// Recurring subscriptions
    #[command(subcommand)]
    Subscription(SubscriptionAction),
    /// Installment purchases
    #[command(subcommand)]
    Installment(InstallmentAction),
    /// Fixed items and category budgets for a month
    Budget {
        /// Month as YYYY-MM, defaults to the current month
        #[arg(short, long)]
        month: Option<MonthWindow>,
    },
    /// Link activity rows to cards by id using the text heuristics
    Backfill {
        /// Show what would be linked without writing anything
        #[arg(long)]
        dry_run: bool,
    },
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("finboard starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!(url = %config.backend.url, matching = ?config.matching, "Loaded config");

    let timeout = config.backend.request_timeout_secs;
    let backend = RestProvider::new(&config.backend.url, &config.backend.anon_key, timeout)?;
    let auth = AuthProvider::new(&config.backend.url, &config.backend.anon_key, timeout)?;
    let session = SessionContext::restore(store::open_session_store(&config)?).await?;

    let mut app = App::new(config, Arc::new(backend), Arc::new(auth), session);
    run_app(&mut app, command).await
}

/// Dispatches a command against an already wired application.
pub async fn run_app(app: &mut App, command: AppCommand) -> Result<()> {
    match command {
        AppCommand::Login { email, password } => cli::auth::login(app, &email, password).await,
        AppCommand::Logout => cli::auth::logout(app).await,
        AppCommand::Card(action) => cli::cards::run(app, action).await,
        AppCommand::Goal(action) => cli::goals::run(app, action).await,
        AppCommand::Debt(action) => cli::debts::run(app, action).await,
        AppCommand::Subscription(action) => cli::activity::run_subscription(app, action).await,
        AppCommand::Installment(action) => cli::activity::run_installment(app, action).await,
        AppCommand::Budget { month } => cli::budget::run(app, month).await,
        AppCommand::Backfill { dry_run } => cli::backfill::run(app, dry_run).await,
    }
}
