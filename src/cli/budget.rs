use super::{App, month_or_current, ui};
use crate::core::budget::{BudgetPlan, plan_month};
use crate::core::reconcile::MonthWindow;
use anyhow::Result;
use comfy_table::Cell;
use tracing::warn;

pub async fn run(app: &mut App, month: Option<MonthWindow>) -> Result<()> {
    let month = month_or_current(month);
    let session = app.session().await?;

    let spinner = ui::new_spinner("Loading budget...");
    let (fixed, budgets, transactions) = futures::join!(
        app.backend.list_fixed_items(&session),
        app.backend.list_variable_budgets(&session),
        app.backend.list_transactions(&session),
    );
    spinner.finish_and_clear();

    let transactions = transactions.unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load transactions, spending shows as zero");
        Vec::new()
    });
    let plan = plan_month(&fixed?, &budgets?, &transactions, month);
    println!("{}", display_plan(&plan, &app.config.currency));
    Ok(())
}

pub fn display_plan(plan: &BudgetPlan, currency: &str) -> String {
    let mut output = format!(
        "{}\n\nFixed income:   {:>12.2}\nFixed expenses: {:>12.2}\nPlanned balance: {}\n",
        ui::style_text(&format!("Budget for {}", plan.month), ui::StyleType::Title),
        plan.fixed_income,
        plan.fixed_expenses,
        ui::style_text(
            &format!("{:.2} {currency}", plan.planned_balance),
            if plan.planned_balance >= 0.0 {
                ui::StyleType::TotalValue
            } else {
                ui::StyleType::Error
            }
        ),
    );

    if plan.lines.is_empty() {
        output.push_str(&ui::style_text(
            "\nNo category budgets defined",
            ui::StyleType::Subtle,
        ));
        return output;
    }

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Category"),
        ui::header_cell("Limit"),
        ui::header_cell("Spent"),
        ui::header_cell("Remaining"),
        ui::header_cell("Used"),
    ]);
    for line in &plan.lines {
        table.add_row(vec![
            Cell::new(&line.category),
            ui::money_cell(line.limit),
            ui::money_cell(line.spent),
            ui::money_cell(line.remaining),
            ui::usage_cell(line.usage()),
        ]);
    }
    output.push_str(&format!("\n{table}"));

    let over: Vec<&str> = plan
        .lines
        .iter()
        .filter(|l| l.over_budget)
        .map(|l| l.category.as_str())
        .collect();
    if !over.is_empty() {
        output.push_str(&format!(
            "\n\n{}",
            ui::style_text(
                &format!("Over budget: {}", over.join(", ")),
                ui::StyleType::Error
            )
        ));
    }
    output
}
