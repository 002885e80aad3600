use crate::core::backend::FinanceBackend;
use crate::core::budget::{FixedItem, VariableBudget};
use crate::core::debts::{Debt, DebtPayment, DebtStatus, NewDebt, NewDebtPayment};
use crate::core::goals::{self, Goal, GoalContribution, NewGoal};
use crate::core::models::{
    ActivityKind, Card, CardUpdate, Installment, NewCard, NewInstallment, NewSubscription,
    Subscription, Transaction,
};
use crate::core::session::{Session, SessionStore};
use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

/// In-memory session store, used when nothing should touch the disk.
#[derive(Default)]
pub struct MemorySessionStore {
    inner: Mutex<Option<Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session) -> Self {
        Self {
            inner: Mutex::new(Some(session)),
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self) -> Result<Option<Session>> {
        Ok(self.inner.lock().await.clone())
    }

    async fn save(&self, session: &Session) -> Result<()> {
        *self.inner.lock().await = Some(session.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.inner.lock().await = None;
        Ok(())
    }
}

/// All rows of one user.
#[derive(Debug, Clone, Default)]
pub struct MemoryData {
    pub cards: Vec<Card>,
    pub transactions: Vec<Transaction>,
    pub subscriptions: Vec<Subscription>,
    pub installments: Vec<Installment>,
    pub goals: Vec<Goal>,
    pub debts: Vec<Debt>,
    pub debt_payments: Vec<DebtPayment>,
    pub fixed_items: Vec<FixedItem>,
    pub variable_budgets: Vec<VariableBudget>,
}

/// A backend that keeps every user's rows in memory. Goal contributions are
/// applied under one lock, the same guarantee the stored procedure gives.
#[derive(Default)]
pub struct MemoryBackend {
    users: Mutex<HashMap<String, MemoryData>>,
    failing: Mutex<HashSet<&'static str>>,
    next_id: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, user_id: &str, data: MemoryData) {
        self.users.lock().await.insert(user_id.to_string(), data);
    }

    pub async fn snapshot(&self, user_id: &str) -> MemoryData {
        self.users
            .lock()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Makes every later call of `operation` fail, e.g. `"list_transactions"`.
    pub async fn fail_on(&self, operation: &'static str) {
        self.failing.lock().await.insert(operation);
    }

    async fn check(&self, operation: &'static str) -> Result<()> {
        if self.failing.lock().await.contains(operation) {
            bail!("{operation} failed: simulated outage");
        }
        Ok(())
    }

    fn new_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    async fn read<T>(
        &self,
        operation: &'static str,
        session: &Session,
        f: impl FnOnce(&MemoryData) -> T,
    ) -> Result<T> {
        self.check(operation).await?;
        let users = self.users.lock().await;
        let empty = MemoryData::default();
        Ok(f(users.get(&session.user_id).unwrap_or(&empty)))
    }

    async fn write<T>(
        &self,
        operation: &'static str,
        session: &Session,
        f: impl FnOnce(&mut MemoryData) -> Result<T>,
    ) -> Result<T> {
        self.check(operation).await?;
        let mut users = self.users.lock().await;
        let data = users.entry(session.user_id.clone()).or_default();
        debug!(operation, user = %session.user_id, "Memory backend write");
        f(data)
    }
}

fn not_found(kind: &str, id: &str) -> anyhow::Error {
    anyhow!("{kind} not found: {id}")
}

#[async_trait]
impl FinanceBackend for MemoryBackend {
    async fn list_cards(&self, session: &Session) -> Result<Vec<Card>> {
        self.read("list_cards", session, |d| d.cards.clone()).await
    }

    async fn list_transactions(&self, session: &Session) -> Result<Vec<Transaction>> {
        self.read("list_transactions", session, |d| d.transactions.clone())
            .await
    }

    async fn list_subscriptions(&self, session: &Session) -> Result<Vec<Subscription>> {
        self.read("list_subscriptions", session, |d| d.subscriptions.clone())
            .await
    }

    async fn list_installments(&self, session: &Session) -> Result<Vec<Installment>> {
        self.read("list_installments", session, |d| d.installments.clone())
            .await
    }

    async fn list_goals(&self, session: &Session) -> Result<Vec<Goal>> {
        self.read("list_goals", session, |d| {
            let mut goals = d.goals.clone();
            goals.sort_by_key(|g| g.order_index);
            goals
        })
        .await
    }

    async fn list_debts(&self, session: &Session) -> Result<Vec<Debt>> {
        self.read("list_debts", session, |d| d.debts.clone()).await
    }

    async fn list_debt_payments(
        &self,
        session: &Session,
        debt_id: &str,
    ) -> Result<Vec<DebtPayment>> {
        self.read("list_debt_payments", session, |d| {
            d.debt_payments
                .iter()
                .filter(|p| p.debt_id == debt_id)
                .cloned()
                .collect()
        })
        .await
    }

    async fn list_fixed_items(&self, session: &Session) -> Result<Vec<FixedItem>> {
        self.read("list_fixed_items", session, |d| d.fixed_items.clone())
            .await
    }

    async fn list_variable_budgets(&self, session: &Session) -> Result<Vec<VariableBudget>> {
        self.read("list_variable_budgets", session, |d| {
            d.variable_budgets.clone()
        })
        .await
    }

    async fn create_card(&self, session: &Session, card: &NewCard) -> Result<Card> {
        card.validate()?;
        let id = self.new_id("card");
        self.write("create_card", session, |d| {
            let created = Card {
                id,
                bank_name: card.bank_name.clone(),
                last_four: card.last_four.clone(),
                brand: card.brand.clone(),
                card_type: card.card_type,
                status: card.status,
                credit_limit: card.credit_limit,
                available_limit: card.available_limit,
                closing_day: card.closing_day,
                due_day: card.due_day,
            };
            d.cards.push(created.clone());
            Ok(created)
        })
        .await
    }

    async fn update_card(&self, session: &Session, id: &str, update: &CardUpdate) -> Result<Card> {
        self.write("update_card", session, |d| {
            let card = d
                .cards
                .iter_mut()
                .find(|c| c.id == id)
                .ok_or_else(|| not_found("Card", id))?;
            update.apply_to(card);
            Ok(card.clone())
        })
        .await
    }

    async fn delete_card(&self, session: &Session, id: &str) -> Result<()> {
        self.write("delete_card", session, |d| {
            let before = d.cards.len();
            d.cards.retain(|c| c.id != id);
            if d.cards.len() == before {
                return Err(not_found("Card", id));
            }
            Ok(())
        })
        .await
    }

    async fn create_goal(&self, session: &Session, goal: &NewGoal) -> Result<Goal> {
        let id = self.new_id("goal");
        self.write("create_goal", session, |d| {
            let created = Goal {
                id,
                name: goal.name.clone(),
                target_amount: goal.target_amount,
                current_amount: goal.current_amount,
                order_index: goal.order_index,
                status: goal.status,
                completed_at: None,
            };
            d.goals.push(created.clone());
            Ok(created)
        })
        .await
    }

    async fn contribute_to_goal(
        &self,
        session: &Session,
        goal_id: &str,
        amount: f64,
    ) -> Result<GoalContribution> {
        self.write("contribute_to_goal", session, |d| {
            let result = goals::plan_contribution(&d.goals, goal_id, amount, Utc::now())?;
            for updated in std::iter::once(&result.goal).chain(result.unlocked.as_ref()) {
                if let Some(slot) = d.goals.iter_mut().find(|g| g.id == updated.id) {
                    *slot = updated.clone();
                }
            }
            Ok(result)
        })
        .await
    }

    async fn create_debt(&self, session: &Session, debt: &NewDebt) -> Result<Debt> {
        let id = self.new_id("debt");
        self.write("create_debt", session, |d| {
            let created = Debt {
                id,
                creditor: debt.creditor.clone(),
                total_amount: debt.total_amount,
                remaining_amount: debt.remaining_amount,
                due_date: debt.due_date,
                status: debt.status,
            };
            d.debts.push(created.clone());
            Ok(created)
        })
        .await
    }

    async fn insert_debt_payment(
        &self,
        session: &Session,
        payment: &NewDebtPayment,
    ) -> Result<DebtPayment> {
        let id = self.new_id("payment");
        self.write("insert_debt_payment", session, |d| {
            if !d.debts.iter().any(|debt| debt.id == payment.debt_id) {
                return Err(not_found("Debt", &payment.debt_id));
            }
            let created = DebtPayment {
                id,
                debt_id: payment.debt_id.clone(),
                amount: payment.amount,
                paid_at: payment.paid_at,
            };
            d.debt_payments.push(created.clone());
            Ok(created)
        })
        .await
    }

    async fn update_debt_balance(
        &self,
        session: &Session,
        debt_id: &str,
        remaining_amount: f64,
        status: DebtStatus,
    ) -> Result<Debt> {
        self.write("update_debt_balance", session, |d| {
            let debt = d
                .debts
                .iter_mut()
                .find(|debt| debt.id == debt_id)
                .ok_or_else(|| not_found("Debt", debt_id))?;
            debt.remaining_amount = remaining_amount;
            debt.status = status;
            Ok(debt.clone())
        })
        .await
    }

    async fn create_subscription(
        &self,
        session: &Session,
        subscription: &NewSubscription,
    ) -> Result<Subscription> {
        subscription.validate()?;
        let id = self.new_id("subscription");
        self.write("create_subscription", session, |d| {
            let created = Subscription {
                id,
                name: subscription.name.clone(),
                amount: subscription.amount,
                billing_day: subscription.billing_day,
                category: subscription.category.clone(),
                card: subscription.card.clone(),
                card_id: subscription.card_id.clone(),
                active: subscription.active,
            };
            d.subscriptions.push(created.clone());
            Ok(created)
        })
        .await
    }

    async fn set_subscription_active(
        &self,
        session: &Session,
        id: &str,
        active: bool,
    ) -> Result<Subscription> {
        self.write("set_subscription_active", session, |d| {
            let subscription = d
                .subscriptions
                .iter_mut()
                .find(|s| s.id == id)
                .ok_or_else(|| not_found("Subscription", id))?;
            subscription.active = active;
            Ok(subscription.clone())
        })
        .await
    }

    async fn create_installment(
        &self,
        session: &Session,
        installment: &NewInstallment,
    ) -> Result<Installment> {
        installment.validate()?;
        let id = self.new_id("installment");
        self.write("create_installment", session, |d| {
            let created = Installment {
                id,
                description: installment.description.clone(),
                total_amount: installment.total_amount,
                installment_count: installment.installment_count,
                paid_installments: installment.paid_installments,
                start_date: installment.start_date,
                card: installment.card.clone(),
                card_id: installment.card_id.clone(),
            };
            d.installments.push(created.clone());
            Ok(created)
        })
        .await
    }

    async fn set_paid_installments(
        &self,
        session: &Session,
        id: &str,
        paid_installments: u32,
    ) -> Result<Installment> {
        self.write("set_paid_installments", session, |d| {
            let installment = d
                .installments
                .iter_mut()
                .find(|i| i.id == id)
                .ok_or_else(|| not_found("Installment", id))?;
            installment.paid_installments = paid_installments;
            Ok(installment.clone())
        })
        .await
    }

    async fn assign_card(
        &self,
        session: &Session,
        kind: ActivityKind,
        item_id: &str,
        card_id: &str,
    ) -> Result<()> {
        self.write("assign_card", session, |d| {
            let slot = match kind {
                ActivityKind::Transaction => d
                    .transactions
                    .iter_mut()
                    .find(|t| t.id == item_id)
                    .map(|t| &mut t.card_id),
                ActivityKind::Subscription => d
                    .subscriptions
                    .iter_mut()
                    .find(|s| s.id == item_id)
                    .map(|s| &mut s.card_id),
                ActivityKind::Installment => d
                    .installments
                    .iter_mut()
                    .find(|i| i.id == item_id)
                    .map(|i| &mut i.card_id),
            };
            let slot = slot.ok_or_else(|| not_found(&kind.to_string(), item_id))?;
            *slot = Some(card_id.to_string());
            Ok(())
        })
        .await
    }
}
