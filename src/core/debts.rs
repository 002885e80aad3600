//! Debts and their payment history.
use crate::core::backend::FinanceBackend;
use crate::core::session::Session;
use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use tracing::{error, info};

/// Balances below this are treated as settled.
const SETTLED_EPSILON: f64 = 0.005;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebtStatus {
    Open,
    Paid,
}

impl Display for DebtStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                DebtStatus::Open => "open",
                DebtStatus::Paid => "paid",
            }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Debt {
    pub id: String,
    pub creditor: String,
    pub total_amount: f64,
    pub remaining_amount: f64,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    pub status: DebtStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDebt {
    pub creditor: String,
    pub total_amount: f64,
    pub remaining_amount: f64,
    pub due_date: Option<NaiveDate>,
    pub status: DebtStatus,
}

impl NewDebt {
    pub fn new(creditor: &str, total_amount: f64, due_date: Option<NaiveDate>) -> Result<Self> {
        if creditor.trim().is_empty() {
            bail!("Creditor is required");
        }
        if !total_amount.is_finite() || total_amount <= 0.0 {
            bail!("Debt amount must be positive, got {total_amount}");
        }
        Ok(Self {
            creditor: creditor.trim().to_string(),
            total_amount,
            remaining_amount: total_amount,
            due_date,
            status: DebtStatus::Open,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebtPayment {
    pub id: String,
    pub debt_id: String,
    pub amount: f64,
    pub paid_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDebtPayment {
    pub debt_id: String,
    pub amount: f64,
    pub paid_at: DateTime<Utc>,
}

/// Balance and status of `debt` after paying `amount`.
pub fn apply_payment(debt: &Debt, amount: f64) -> Result<(f64, DebtStatus)> {
    if debt.status == DebtStatus::Paid {
        bail!("Debt to {} is already paid", debt.creditor);
    }
    if !amount.is_finite() || amount <= 0.0 {
        bail!("Payment must be a positive amount, got {amount}");
    }
    if amount > debt.remaining_amount + SETTLED_EPSILON {
        bail!(
            "Payment of {amount:.2} exceeds the remaining {:.2}",
            debt.remaining_amount
        );
    }

    let remaining = debt.remaining_amount - amount;
    if remaining <= SETTLED_EPSILON {
        Ok((0.0, DebtStatus::Paid))
    } else {
        Ok((remaining, DebtStatus::Open))
    }
}

/// Records a payment in the history, then lowers the debt's balance.
///
/// These are two separate writes. When the second fails the payment row
/// stays in place and the returned error says so.
pub async fn record_payment(
    backend: &dyn FinanceBackend,
    session: &Session,
    debt: &Debt,
    amount: f64,
    now: DateTime<Utc>,
) -> Result<Debt> {
    let (remaining, status) = apply_payment(debt, amount)?;

    let payment = backend
        .insert_debt_payment(
            session,
            &NewDebtPayment {
                debt_id: debt.id.clone(),
                amount,
                paid_at: now,
            },
        )
        .await
        .context("Failed to record debt payment")?;

    match backend
        .update_debt_balance(session, &debt.id, remaining, status)
        .await
    {
        Ok(updated) => {
            info!(debt = %debt.id, amount, remaining, "Recorded debt payment");
            Ok(updated)
        }
        Err(e) => {
            error!(
                debt = %debt.id,
                payment = %payment.id,
                error = %e,
                "Payment saved but debt balance was not updated"
            );
            Err(e).context(format!(
                "Payment {} was saved but the balance of debt {} was not updated",
                payment.id, debt.id
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn debt(remaining: f64) -> Debt {
        Debt {
            id: "d1".to_string(),
            creditor: "Bank".to_string(),
            total_amount: 1000.0,
            remaining_amount: remaining,
            due_date: None,
            status: DebtStatus::Open,
        }
    }

    #[test]
    fn test_apply_payment() {
        assert_eq!(
            apply_payment(&debt(1000.0), 250.0).unwrap(),
            (750.0, DebtStatus::Open)
        );
        assert_eq!(
            apply_payment(&debt(250.0), 250.0).unwrap(),
            (0.0, DebtStatus::Paid)
        );
        assert!(apply_payment(&debt(100.0), 100.01).is_err());
        assert!(apply_payment(&debt(100.0), 0.0).is_err());

        let mut paid = debt(0.0);
        paid.status = DebtStatus::Paid;
        assert!(apply_payment(&paid, 1.0).is_err());
    }

    #[test]
    fn test_new_debt_validation() {
        let d = NewDebt::new(" Uncle ", 300.0, None).unwrap();
        assert_eq!(d.creditor, "Uncle");
        assert_eq!(d.remaining_amount, 300.0);
        assert_eq!(d.status, DebtStatus::Open);
        assert!(NewDebt::new("", 300.0, None).is_err());
        assert!(NewDebt::new("Uncle", -1.0, None).is_err());
    }
}
