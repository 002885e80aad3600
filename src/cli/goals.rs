use super::{App, ui};
use crate::core::goals::{self, Goal, GoalStatus};
use anyhow::Result;
use clap::Subcommand;
use comfy_table::{Cell, Color};

#[derive(Debug, Subcommand)]
pub enum GoalAction {
    /// Show goals in their unlock order
    List,
    /// Append a goal to the end of the sequence
    Add {
        name: String,
        /// Amount to save
        target: f64,
    },
    /// Put money into the active goal
    Contribute { id: String, amount: f64 },
}

pub async fn run(app: &mut App, action: GoalAction) -> Result<()> {
    let session = app.session().await?;
    match action {
        GoalAction::List => {
            let mut goals = app.backend.list_goals(&session).await?;
            goals.sort_by_key(|g| g.order_index);
            if goals.is_empty() {
                println!("No goals yet. Add one with `finboard goal add`.");
            } else {
                println!("{}", display_goals(&goals, &app.config.currency));
            }
        }
        GoalAction::Add { name, target } => {
            let existing = app.backend.list_goals(&session).await?;
            let new_goal = goals::plan_new_goal(&existing, &name, target)?;
            let goal = app.backend.create_goal(&session, &new_goal).await?;
            println!("Added goal '{}' ({})", goal.name, goal.status);
        }
        GoalAction::Contribute { id, amount } => {
            goals::validate_amount(amount)?;
            let result = app
                .backend
                .contribute_to_goal(&session, &id, amount)
                .await?;
            let goal = &result.goal;
            println!(
                "{}: {:.2} of {:.2} {}",
                goal.name,
                goal.current_amount,
                goal.target_amount,
                ui::progress_text(goal.progress(), 20)
            );
            if result.completed() {
                println!(
                    "{}",
                    ui::style_text("Goal completed!", ui::StyleType::TotalValue)
                );
            }
            if let Some(next) = &result.unlocked {
                println!("Unlocked next goal: {}", next.name);
            }
        }
    }
    Ok(())
}

pub fn display_goals(goals: &[Goal], currency: &str) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("#"),
        ui::header_cell("Goal"),
        ui::header_cell("Status"),
        ui::header_cell(&format!("Saved ({currency})")),
        ui::header_cell(&format!("Target ({currency})")),
        ui::header_cell("Progress"),
    ]);

    for goal in goals {
        let status_color = match goal.status {
            GoalStatus::Active => Color::Green,
            GoalStatus::Completed => Color::Cyan,
            GoalStatus::Locked => Color::DarkGrey,
        };
        table.add_row(vec![
            Cell::new(goal.order_index),
            Cell::new(&goal.name),
            Cell::new(goal.status.to_string()).fg(status_color),
            ui::money_cell(goal.current_amount),
            ui::money_cell(goal.target_amount),
            Cell::new(ui::progress_text(goal.progress(), 10)),
        ]);
    }

    let saved: f64 = goals.iter().map(|g| g.current_amount).sum();
    format!(
        "{}\n\n{}\n\nTotal saved ({}): {}",
        ui::style_text("Goals", ui::StyleType::Title),
        table,
        ui::style_text(currency, ui::StyleType::TotalLabel),
        ui::style_text(&format!("{saved:.2}"), ui::StyleType::TotalValue)
    )
}
