use super::{App, month_or_current, ui};
use crate::core::backend::{CardActivity, fetch_card_activity};
use crate::core::models::{CardStatus, CardType, CardUpdate, NewCard};
use crate::core::reconcile::{self, CardSummary, MonthWindow};
use anyhow::{Result, bail};
use clap::Subcommand;
use comfy_table::Cell;
use tracing::info;

#[derive(Debug, Subcommand)]
pub enum CardAction {
    /// Show every card with its reconciled activity for a month
    List {
        /// Month as YYYY-MM, defaults to the current month
        #[arg(short, long)]
        month: Option<MonthWindow>,
        /// Also list the matched transactions of each card
        #[arg(short, long)]
        detail: bool,
    },
    /// Register a new card
    Add {
        #[arg(long)]
        bank: String,
        #[arg(long)]
        last_four: Option<String>,
        #[arg(long)]
        brand: Option<String>,
        #[arg(long, default_value = "credit")]
        card_type: CardType,
        #[arg(long)]
        credit_limit: Option<f64>,
        #[arg(long)]
        available_limit: Option<f64>,
        #[arg(long)]
        closing_day: Option<u8>,
        #[arg(long)]
        due_day: Option<u8>,
    },
    /// Change the status or limits of a card
    Update {
        id: String,
        #[arg(long)]
        status: Option<CardStatus>,
        #[arg(long)]
        credit_limit: Option<f64>,
        #[arg(long)]
        available_limit: Option<f64>,
    },
    /// Delete a card
    Remove { id: String },
}

pub async fn run(app: &mut App, action: CardAction) -> Result<()> {
    match action {
        CardAction::List { month, detail } => list(app, month_or_current(month), detail).await,
        CardAction::Add {
            bank,
            last_four,
            brand,
            card_type,
            credit_limit,
            available_limit,
            closing_day,
            due_day,
        } => {
            let card = NewCard {
                bank_name: bank.trim().to_string(),
                last_four,
                brand,
                card_type,
                status: CardStatus::Active,
                credit_limit,
                available_limit: available_limit.or(credit_limit),
                closing_day,
                due_day,
            };
            card.validate()?;
            let session = app.session().await?;
            let created = app.backend.create_card(&session, &card).await?;
            info!(card = %created.id, "Card created");
            println!("Added card {} ({})", created.label(), created.id);
            Ok(())
        }
        CardAction::Update {
            id,
            status,
            credit_limit,
            available_limit,
        } => {
            let update = CardUpdate {
                status,
                credit_limit,
                available_limit,
            };
            if update.is_empty() {
                bail!("Nothing to update. Pass --status, --credit-limit or --available-limit");
            }
            let session = app.session().await?;
            let card = app.backend.update_card(&session, &id, &update).await?;
            println!("Updated {} (status: {})", card.label(), card.status);
            Ok(())
        }
        CardAction::Remove { id } => {
            let session = app.session().await?;
            app.backend.delete_card(&session, &id).await?;
            println!("Removed card {id}");
            Ok(())
        }
    }
}

async fn list(app: &mut App, month: MonthWindow, detail: bool) -> Result<()> {
    let session = app.session().await?;

    let spinner = ui::new_spinner("Loading cards and activity...");
    let loaded = fetch_card_activity(app.backend.as_ref(), &session).await;
    spinner.finish_and_clear();

    if let Some(message) = empty_message(&loaded) {
        println!("{message}");
        return Ok(());
    }
    if let Some(warning) = partial_load_warning(&loaded) {
        eprintln!("{}", ui::style_text(&warning, ui::StyleType::Error));
    }

    let summaries =
        reconcile::reconcile(&loaded.cards, &loaded.activity, month, app.config.matching);
    println!(
        "{}",
        display_overview(&summaries, month, &app.config.currency)
    );
    for summary in &summaries {
        ui::print_separator();
        println!("{}", display_card(summary, month, detail));
    }
    Ok(())
}

/// Shown instead of the card tables when no card can be listed.
pub fn empty_message(loaded: &CardActivity) -> Option<String> {
    if loaded.is_missing("cards") {
        Some("Cards could not be loaded. Try again, or run with -v for details.".to_string())
    } else if loaded.cards.is_empty() {
        Some("No cards yet. Add one with `finboard card add`.".to_string())
    } else {
        None
    }
}

/// Names the activity sources that failed, since their totals read as zero.
pub fn partial_load_warning(loaded: &CardActivity) -> Option<String> {
    if loaded.failed.is_empty() {
        return None;
    }
    Some(format!(
        "Could not load {}, figures below are incomplete",
        loaded.failed.join(", ")
    ))
}

pub fn display_overview(summaries: &[CardSummary], month: MonthWindow, currency: &str) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Card"),
        ui::header_cell("Status"),
        ui::header_cell(&format!("{month} ({currency})")),
        ui::header_cell(&format!("{} ({currency})", month.previous())),
        ui::header_cell("Change"),
        ui::header_cell("Available"),
    ]);

    for summary in summaries {
        table.add_row(vec![
            Cell::new(summary.card.label()),
            Cell::new(summary.card.status.to_string()),
            ui::money_cell(summary.month_total),
            ui::money_cell(summary.previous_month_total),
            ui::spend_change_cell(summary.month_total, summary.previous_month_total),
            ui::format_optional_cell(summary.card.available_limit, |v| format!("{v:.2}")),
        ]);
    }

    let total: f64 = summaries.iter().map(|s| s.month_total).sum();
    format!(
        "{}\n\n{}\n\nTotal ({}): {}",
        ui::style_text(&format!("Cards for {month}"), ui::StyleType::Title),
        table,
        ui::style_text(currency, ui::StyleType::TotalLabel),
        ui::style_text(&format!("{total:.2}"), ui::StyleType::TotalValue),
    )
}

pub fn display_card(summary: &CardSummary, month: MonthWindow, detail: bool) -> String {
    let card = &summary.card;
    let mut output = format!(
        "Card: {} [{} / {}]\n",
        ui::style_text(&card.label(), ui::StyleType::Title),
        card.card_type,
        card.brand.as_deref().unwrap_or("no brand"),
    );

    if summary.top_categories.is_empty() {
        output.push_str(&ui::style_text(
            &format!("\nNo spending in {month}"),
            ui::StyleType::Subtle,
        ));
    } else {
        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Category"),
            ui::header_cell("Spent"),
            ui::header_cell("Share"),
        ]);
        for share in &summary.top_categories {
            table.add_row(vec![
                Cell::new(&share.category),
                ui::money_cell(share.total),
                Cell::new(ui::progress_text(share.percentage, 10)),
            ]);
        }
        output.push_str(&format!("\nTop categories\n{table}"));
    }

    if detail {
        let mut rows: Vec<_> = summary
            .transactions
            .iter()
            .filter(|m| month.contains(m.item.date))
            .collect();
        rows.sort_by_key(|m| m.item.date);
        if !rows.is_empty() {
            let mut table = ui::new_styled_table();
            table.set_header(vec![
                ui::header_cell("Date"),
                ui::header_cell("Description"),
                ui::header_cell("Category"),
                ui::header_cell("Amount"),
                ui::header_cell("Matched by"),
            ]);
            for matched in rows {
                let tx = &matched.item;
                table.add_row(vec![
                    Cell::new(tx.date.to_string()),
                    Cell::new(&tx.description),
                    Cell::new(tx.category.as_deref().unwrap_or("-")),
                    ui::money_cell(tx.amount),
                    Cell::new(matched.rule.to_string()),
                ]);
            }
            output.push_str(&format!("\n\nTransactions\n{table}"));
        }
    }

    let active_subscriptions = summary
        .subscriptions
        .iter()
        .filter(|m| m.item.active)
        .count();
    let open_installments = summary
        .installments
        .iter()
        .filter(|m| !m.item.is_settled())
        .count();
    output.push_str(&format!(
        "\n\nSubscriptions: {active_subscriptions} active, {:.2}/month\nInstallments: {open_installments} open, {:.2} remaining",
        summary.subscriptions_total, summary.installments_remaining
    ));
    output
}
