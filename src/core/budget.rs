//! Monthly budget plan: fixed incomes and expenses plus per-category
//! spending ceilings compared against realized spend.
use crate::core::models::Transaction;
use crate::core::reconcile::{MonthWindow, category_key};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixedKind {
    Income,
    Expense,
}

/// A recurring planned income or expense.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedItem {
    pub id: String,
    pub name: String,
    pub kind: FixedKind,
    pub amount: f64,
    #[serde(default)]
    pub day: Option<u8>,
}

/// A planned monthly ceiling for one spending category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableBudget {
    pub id: String,
    pub category: String,
    pub monthly_limit: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BudgetLine {
    pub category: String,
    pub limit: f64,
    pub spent: f64,
    pub remaining: f64,
    pub over_budget: bool,
}

impl BudgetLine {
    pub fn usage(&self) -> f64 {
        if self.limit <= 0.0 {
            return 0.0;
        }
        (self.spent / self.limit) * 100.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BudgetPlan {
    pub month: MonthWindow,
    pub fixed_income: f64,
    pub fixed_expenses: f64,
    pub planned_balance: f64,
    pub lines: Vec<BudgetLine>,
}

fn same_category(a: &str, b: &str) -> bool {
    category_key(a) == category_key(b)
}

/// Absolute sum of the month's outgoing transactions in `category`.
pub fn spent_in_category(transactions: &[Transaction], category: &str, month: MonthWindow) -> f64 {
    transactions
        .iter()
        .filter(|tx| tx.amount < 0.0 && month.contains(tx.date))
        .filter(|tx| {
            tx.category
                .as_deref()
                .is_some_and(|c| same_category(c, category))
        })
        .map(|tx| tx.amount.abs())
        .sum()
}

pub fn plan_month(
    fixed_items: &[FixedItem],
    budgets: &[VariableBudget],
    transactions: &[Transaction],
    month: MonthWindow,
) -> BudgetPlan {
    let (fixed_income, fixed_expenses) =
        fixed_items
            .iter()
            .fold((0.0, 0.0), |(income, expenses), item| match item.kind {
                FixedKind::Income => (income + item.amount.abs(), expenses),
                FixedKind::Expense => (income, expenses + item.amount.abs()),
            });

    let lines = budgets
        .iter()
        .map(|budget| {
            let spent = spent_in_category(transactions, &budget.category, month);
            BudgetLine {
                category: budget.category.clone(),
                limit: budget.monthly_limit,
                spent,
                remaining: budget.monthly_limit - spent,
                over_budget: spent > budget.monthly_limit,
            }
        })
        .collect();

    BudgetPlan {
        month,
        fixed_income,
        fixed_expenses,
        planned_balance: fixed_income - fixed_expenses,
        lines,
    }
}
