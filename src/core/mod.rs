//! Domain types, derivations and the seams to the hosted backend

pub mod backend;
pub mod backfill;
pub mod budget;
pub mod config;
pub mod debts;
pub mod goals;
pub mod log;
pub mod models;
pub mod reconcile;
pub mod session;

// Re-export main types for cleaner imports
pub use backend::FinanceBackend;
pub use reconcile::{ActivitySet, CardSummary, MatchPolicy, MonthWindow};
pub use session::{Authenticator, Session, SessionContext, SessionStore};
