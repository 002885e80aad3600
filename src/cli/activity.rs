//! Subscriptions and installment purchases.

use super::App;
use crate::core::models::{NewInstallment, NewSubscription};
use anyhow::{Result, anyhow, bail};
use chrono::NaiveDate;
use clap::Subcommand;

#[derive(Debug, Subcommand)]
pub enum SubscriptionAction {
    /// Add a recurring charge
    Add {
        name: String,
        amount: f64,
        #[arg(long)]
        billing_day: Option<u8>,
        #[arg(long)]
        category: Option<String>,
        /// Id of the card it is charged to
        #[arg(long)]
        card_id: Option<String>,
    },
    /// Stop tracking a subscription without deleting it
    Cancel { id: String },
    /// Mark a cancelled subscription as active again
    Resume { id: String },
}

#[derive(Debug, Subcommand)]
pub enum InstallmentAction {
    /// Add an installment purchase
    Add {
        description: String,
        /// Total price of the purchase
        total: f64,
        /// Number of installments
        count: u32,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        card_id: Option<String>,
    },
    /// Record that the next installment was paid
    Pay { id: String },
}

pub async fn run_subscription(app: &mut App, action: SubscriptionAction) -> Result<()> {
    let session = app.session().await?;
    match action {
        SubscriptionAction::Add {
            name,
            amount,
            billing_day,
            category,
            card_id,
        } => {
            if let Some(day) = billing_day {
                if !(1..=31).contains(&day) {
                    bail!("Billing day must be between 1 and 31, got {day}");
                }
            }
            let subscription = NewSubscription {
                name: name.trim().to_string(),
                amount,
                billing_day,
                category,
                card: None,
                card_id,
                active: true,
            };
            subscription.validate()?;
            let created = app
                .backend
                .create_subscription(&session, &subscription)
                .await?;
            println!("Added subscription {} ({})", created.name, created.id);
        }
        SubscriptionAction::Cancel { id } => {
            let updated = app
                .backend
                .set_subscription_active(&session, &id, false)
                .await?;
            println!("Cancelled {}", updated.name);
        }
        SubscriptionAction::Resume { id } => {
            let updated = app
                .backend
                .set_subscription_active(&session, &id, true)
                .await?;
            println!("Resumed {}", updated.name);
        }
    }
    Ok(())
}

pub async fn run_installment(app: &mut App, action: InstallmentAction) -> Result<()> {
    let session = app.session().await?;
    match action {
        InstallmentAction::Add {
            description,
            total,
            count,
            start,
            card_id,
        } => {
            let installment = NewInstallment {
                description: description.trim().to_string(),
                total_amount: total,
                installment_count: count,
                paid_installments: 0,
                start_date: start,
                card: None,
                card_id,
            };
            installment.validate()?;
            let created = app
                .backend
                .create_installment(&session, &installment)
                .await?;
            println!(
                "Added {} in {}x of {:.2} ({})",
                created.description,
                created.installment_count,
                created.installment_value(),
                created.id
            );
        }
        InstallmentAction::Pay { id } => {
            let current = app
                .backend
                .list_installments(&session)
                .await?
                .into_iter()
                .find(|i| i.id == id)
                .ok_or_else(|| anyhow!("Installment not found: {id}"))?;
            if current.is_settled() {
                bail!("{} is already fully paid", current.description);
            }
            let updated = app
                .backend
                .set_paid_installments(&session, &id, current.paid_installments + 1)
                .await?;
            println!(
                "{}: {}/{} paid, {:.2} remaining",
                updated.description,
                updated.paid_installments,
                updated.installment_count,
                updated.remaining_amount()
            );
        }
    }
    Ok(())
}
