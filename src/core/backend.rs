//! Data access abstraction over the hosted database.

use crate::core::budget::{FixedItem, VariableBudget};
use crate::core::debts::{Debt, DebtPayment, DebtStatus, NewDebt, NewDebtPayment};
use crate::core::goals::{Goal, GoalContribution, NewGoal};
use crate::core::models::{
    ActivityKind, Card, CardUpdate, Installment, NewCard, NewInstallment, NewSubscription,
    Subscription, Transaction,
};
use crate::core::reconcile::ActivitySet;
use crate::core::session::Session;
use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

/// Reads and writes the signed-in user's rows. Every call is scoped by the
/// session it receives.
#[async_trait]
pub trait FinanceBackend: Send + Sync {
    async fn list_cards(&self, session: &Session) -> Result<Vec<Card>>;
    async fn list_transactions(&self, session: &Session) -> Result<Vec<Transaction>>;
    async fn list_subscriptions(&self, session: &Session) -> Result<Vec<Subscription>>;
    async fn list_installments(&self, session: &Session) -> Result<Vec<Installment>>;
    async fn list_goals(&self, session: &Session) -> Result<Vec<Goal>>;
    async fn list_debts(&self, session: &Session) -> Result<Vec<Debt>>;
    async fn list_debt_payments(&self, session: &Session, debt_id: &str)
    -> Result<Vec<DebtPayment>>;
    async fn list_fixed_items(&self, session: &Session) -> Result<Vec<FixedItem>>;
    async fn list_variable_budgets(&self, session: &Session) -> Result<Vec<VariableBudget>>;

    async fn create_card(&self, session: &Session, card: &NewCard) -> Result<Card>;
    async fn update_card(&self, session: &Session, id: &str, update: &CardUpdate) -> Result<Card>;
    async fn delete_card(&self, session: &Session, id: &str) -> Result<()>;

    async fn create_goal(&self, session: &Session, goal: &NewGoal) -> Result<Goal>;
    /// Applies a contribution and any resulting completion and unlock as a
    /// single atomic update.
    async fn contribute_to_goal(
        &self,
        session: &Session,
        goal_id: &str,
        amount: f64,
    ) -> Result<GoalContribution>;

    async fn create_debt(&self, session: &Session, debt: &NewDebt) -> Result<Debt>;
    async fn insert_debt_payment(
        &self,
        session: &Session,
        payment: &NewDebtPayment,
    ) -> Result<DebtPayment>;
    async fn update_debt_balance(
        &self,
        session: &Session,
        debt_id: &str,
        remaining_amount: f64,
        status: DebtStatus,
    ) -> Result<Debt>;

    async fn create_subscription(
        &self,
        session: &Session,
        subscription: &NewSubscription,
    ) -> Result<Subscription>;
    async fn set_subscription_active(
        &self,
        session: &Session,
        id: &str,
        active: bool,
    ) -> Result<Subscription>;

    async fn create_installment(
        &self,
        session: &Session,
        installment: &NewInstallment,
    ) -> Result<Installment>;
    async fn set_paid_installments(
        &self,
        session: &Session,
        id: &str,
        paid_installments: u32,
    ) -> Result<Installment>;

    /// Writes the `card_id` foreign key of one activity row.
    async fn assign_card(
        &self,
        session: &Session,
        kind: ActivityKind,
        item_id: &str,
        card_id: &str,
    ) -> Result<()>;
}

fn or_empty<T>(
    source: &'static str,
    result: Result<Vec<T>>,
    failed: &mut Vec<&'static str>,
) -> Vec<T> {
    match result {
        Ok(rows) => rows,
        Err(e) => {
            warn!(source, error = %e, "Fetch failed, continuing without this data");
            failed.push(source);
            Vec::new()
        }
    }
}

/// Cards and activity as loaded, plus the sources that could not be fetched.
#[derive(Debug, Clone, Default)]
pub struct CardActivity {
    pub cards: Vec<Card>,
    pub activity: ActivitySet,
    /// Table names whose fetch failed and now read as empty.
    pub failed: Vec<&'static str>,
}

impl CardActivity {
    pub fn is_missing(&self, source: &str) -> bool {
        self.failed.iter().any(|failed| *failed == source)
    }
}

/// Fetches cards and all card-linked activity concurrently. A failed fetch
/// contributes an empty list instead of failing the whole load, and is
/// listed in `failed`.
pub async fn fetch_card_activity(backend: &dyn FinanceBackend, session: &Session) -> CardActivity {
    let (cards, transactions, subscriptions, installments) = futures::join!(
        backend.list_cards(session),
        backend.list_transactions(session),
        backend.list_subscriptions(session),
        backend.list_installments(session),
    );

    let mut failed = Vec::new();
    let cards = or_empty("cards", cards, &mut failed);
    let activity = ActivitySet {
        transactions: or_empty("transactions", transactions, &mut failed),
        subscriptions: or_empty("subscriptions", subscriptions, &mut failed),
        installments: or_empty("installments", installments, &mut failed),
    };
    CardActivity {
        cards,
        activity,
        failed,
    }
}
