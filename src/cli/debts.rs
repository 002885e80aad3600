use super::{App, ui};
use crate::core::debts::{self, Debt, DebtPayment, DebtStatus, NewDebt};
use anyhow::{Result, anyhow};
use chrono::{NaiveDate, Utc};
use clap::Subcommand;
use comfy_table::{Cell, Color};

#[derive(Debug, Subcommand)]
pub enum DebtAction {
    /// Show open and paid debts
    List,
    /// Record a new debt
    Add {
        creditor: String,
        amount: f64,
        /// Due date as YYYY-MM-DD
        #[arg(long)]
        due: Option<NaiveDate>,
    },
    /// Pay part or all of a debt
    Pay { id: String, amount: f64 },
    /// Show the payments made on a debt
    History { id: String },
}

pub async fn run(app: &mut App, action: DebtAction) -> Result<()> {
    let session = app.session().await?;
    match action {
        DebtAction::List => {
            let debts = app.backend.list_debts(&session).await?;
            if debts.is_empty() {
                println!("No debts recorded");
            } else {
                println!("{}", display_debts(&debts, &app.config.currency));
            }
        }
        DebtAction::Add {
            creditor,
            amount,
            due,
        } => {
            let debt = NewDebt::new(&creditor, amount, due)?;
            let created = app.backend.create_debt(&session, &debt).await?;
            println!(
                "Recorded debt to {} of {:.2} ({})",
                created.creditor, created.total_amount, created.id
            );
        }
        DebtAction::Pay { id, amount } => {
            let debt = app
                .backend
                .list_debts(&session)
                .await?
                .into_iter()
                .find(|d| d.id == id)
                .ok_or_else(|| anyhow!("Debt not found: {id}"))?;
            let updated =
                debts::record_payment(app.backend.as_ref(), &session, &debt, amount, Utc::now())
                    .await?;
            if updated.status == DebtStatus::Paid {
                println!(
                    "{}",
                    ui::style_text(
                        &format!("Debt to {} is paid off", updated.creditor),
                        ui::StyleType::TotalValue
                    )
                );
            } else {
                println!(
                    "Paid {amount:.2} to {}, {:.2} remaining",
                    updated.creditor, updated.remaining_amount
                );
            }
        }
        DebtAction::History { id } => {
            let payments = app.backend.list_debt_payments(&session, &id).await?;
            println!("{}", display_payments(&payments));
        }
    }
    Ok(())
}

pub fn display_debts(debts: &[Debt], currency: &str) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Creditor"),
        ui::header_cell("Due"),
        ui::header_cell("Total"),
        ui::header_cell("Remaining"),
        ui::header_cell("Status"),
    ]);
    for debt in debts {
        let color = match debt.status {
            DebtStatus::Open => Color::Yellow,
            DebtStatus::Paid => Color::Green,
        };
        table.add_row(vec![
            Cell::new(&debt.creditor),
            Cell::new(debt.due_date.map_or("-".to_string(), |d| d.to_string())),
            ui::money_cell(debt.total_amount),
            ui::money_cell(debt.remaining_amount),
            Cell::new(debt.status.to_string()).fg(color),
        ]);
    }

    let outstanding: f64 = debts
        .iter()
        .filter(|d| d.status == DebtStatus::Open)
        .map(|d| d.remaining_amount)
        .sum();
    format!(
        "{}\n\n{}\n\nOutstanding ({}): {}",
        ui::style_text("Debts", ui::StyleType::Title),
        table,
        ui::style_text(currency, ui::StyleType::TotalLabel),
        ui::style_text(&format!("{outstanding:.2}"), ui::StyleType::Error)
    )
}

fn display_payments(payments: &[DebtPayment]) -> String {
    if payments.is_empty() {
        return ui::style_text("No payments yet", ui::StyleType::Subtle);
    }
    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Paid at"), ui::header_cell("Amount")]);
    for payment in payments {
        table.add_row(vec![
            Cell::new(payment.paid_at.format("%Y-%m-%d %H:%M").to_string()),
            ui::money_cell(payment.amount),
        ]);
    }
    table.to_string()
}
