use super::{App, ui};
use crate::core::backend::fetch_card_activity;
use crate::core::backfill::{BackfillPlan, apply_backfill, plan_backfill};
use anyhow::{Result, bail};
use comfy_table::Cell;
use std::collections::HashMap;

/// Fills in missing card ids on activity rows using the text heuristics.
pub async fn run(app: &mut App, dry_run: bool) -> Result<()> {
    let session = app.session().await?;

    let spinner = ui::new_spinner("Loading cards and activity...");
    let loaded = fetch_card_activity(app.backend.as_ref(), &session).await;
    spinner.finish_and_clear();

    if loaded.is_missing("cards") {
        bail!("Cards could not be loaded, nothing was linked");
    }
    if loaded.cards.is_empty() {
        bail!("No cards found, nothing to link activity to");
    }
    if !loaded.failed.is_empty() {
        eprintln!(
            "{}",
            ui::style_text(
                &format!(
                    "Skipping {}: they could not be loaded",
                    loaded.failed.join(", ")
                ),
                ui::StyleType::Error
            )
        );
    }

    let plan = plan_backfill(&loaded.cards, &loaded.activity);
    let labels: HashMap<&str, String> = loaded
        .cards
        .iter()
        .map(|c| (c.id.as_str(), c.label()))
        .collect();
    println!("{}", display_plan(&plan, &labels));

    if dry_run || plan.assignments.is_empty() {
        return Ok(());
    }

    let outcome = apply_backfill(app.backend.as_ref(), &session, &plan).await;
    println!("Linked {} rows", outcome.written);
    if !outcome.failed.is_empty() {
        for (assignment, error) in &outcome.failed {
            eprintln!(
                "{}",
                ui::style_text(
                    &format!("{} {}: {error}", assignment.kind, assignment.item_id),
                    ui::StyleType::Error
                )
            );
        }
        bail!(
            "{} rows could not be updated, run the backfill again",
            outcome.failed.len()
        );
    }
    Ok(())
}

pub fn display_plan(plan: &BackfillPlan, labels: &HashMap<&str, String>) -> String {
    let mut output = format!(
        "{}\n\n{} to link, {} already linked, {} without a match\n",
        ui::style_text("Card id backfill", ui::StyleType::Title),
        plan.assignments.len(),
        plan.skipped,
        plan.unmatched.len()
    );

    if !plan.assignments.is_empty() {
        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Kind"),
            ui::header_cell("Row"),
            ui::header_cell("Card"),
            ui::header_cell("Matched by"),
        ]);
        for assignment in &plan.assignments {
            let card = labels
                .get(assignment.card_id.as_str())
                .cloned()
                .unwrap_or_else(|| assignment.card_id.clone());
            table.add_row(vec![
                Cell::new(assignment.kind.to_string()),
                Cell::new(&assignment.item_id),
                Cell::new(card),
                Cell::new(assignment.rule.to_string()),
            ]);
        }
        output.push_str(&format!("\n{table}"));
    }

    for unmatched in &plan.unmatched {
        output.push_str(&ui::style_text(
            &format!(
                "\nNo card for {} {} (card text: {})",
                unmatched.kind,
                unmatched.item_id,
                unmatched.card_label.as_deref().unwrap_or("none")
            ),
            ui::StyleType::Subtle,
        ));
    }
    output
}
