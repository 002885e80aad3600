//! One-time migration that turns text-matched card links into `card_id`
//! foreign keys.
use crate::core::backend::FinanceBackend;
use crate::core::models::{ActivityKind, Card, CardLinked};
use crate::core::reconcile::{ActivitySet, MatchPolicy, MatchRule, match_card};
use crate::core::session::Session;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub kind: ActivityKind,
    pub item_id: String,
    pub card_id: String,
    pub rule: MatchRule,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Unmatched {
    pub kind: ActivityKind,
    pub item_id: String,
    pub card_label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackfillPlan {
    pub assignments: Vec<Assignment>,
    pub unmatched: Vec<Unmatched>,
    /// Items that already carry a card id.
    pub skipped: usize,
}

#[derive(Debug, Default)]
pub struct BackfillOutcome {
    pub written: usize,
    pub failed: Vec<(Assignment, String)>,
}

/// The single card an item belongs to: the lowest-numbered rule across all
/// cards wins, ties go to the card listed first.
pub fn best_card<'a, T: CardLinked>(item: &T, cards: &'a [Card]) -> Option<(&'a Card, MatchRule)> {
    cards
        .iter()
        .filter_map(|card| match_card(item, card, MatchPolicy::Heuristic).map(|rule| (card, rule)))
        .min_by_key(|(_, rule)| *rule)
}

fn plan_items<T: CardLinked>(items: &[T], cards: &[Card], plan: &mut BackfillPlan) {
    for item in items {
        if item.linked_card_id().is_some_and(|id| !id.trim().is_empty()) {
            plan.skipped += 1;
            continue;
        }
        match best_card(item, cards) {
            Some((card, rule)) => plan.assignments.push(Assignment {
                kind: T::KIND,
                item_id: item.item_id().to_string(),
                card_id: card.id.clone(),
                rule,
            }),
            None => plan.unmatched.push(Unmatched {
                kind: T::KIND,
                item_id: item.item_id().to_string(),
                card_label: item.card_label().map(str::to_string),
            }),
        }
    }
}

pub fn plan_backfill(cards: &[Card], activity: &ActivitySet) -> BackfillPlan {
    let mut plan = BackfillPlan::default();
    plan_items(&activity.transactions, cards, &mut plan);
    plan_items(&activity.subscriptions, cards, &mut plan);
    plan_items(&activity.installments, cards, &mut plan);
    plan
}

/// Writes every planned assignment. Failures are collected, not fatal, so a
/// rerun picks up whatever is still missing.
pub async fn apply_backfill(
    backend: &dyn FinanceBackend,
    session: &Session,
    plan: &BackfillPlan,
) -> BackfillOutcome {
    let mut outcome = BackfillOutcome::default();
    for assignment in &plan.assignments {
        match backend
            .assign_card(
                session,
                assignment.kind,
                &assignment.item_id,
                &assignment.card_id,
            )
            .await
        {
            Ok(()) => outcome.written += 1,
            Err(e) => {
                warn!(
                    kind = %assignment.kind,
                    item = %assignment.item_id,
                    error = %e,
                    "Failed to write card id"
                );
                outcome.failed.push((assignment.clone(), e.to_string()));
            }
        }
    }
    info!(
        written = outcome.written,
        failed = outcome.failed.len(),
        "Backfill finished"
    );
    outcome
}
