//! Assigns loosely-linked activity rows to cards and folds the matched
//! transactions into per-card monthly aggregates.
use crate::core::models::{Card, CardLinked, Installment, Subscription, Transaction};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use tracing::debug;

/// Number of categories kept in a card's monthly breakdown.
pub const TOP_CATEGORIES: usize = 5;

/// Label used for transactions without a category.
pub const OTHER_CATEGORY: &str = "Other";

/// Which rules of the matching cascade are allowed to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
    /// Foreign key first, then the text heuristics.
    #[default]
    Heuristic,
    /// Foreign key only.
    Strict,
}

/// The rule of the cascade that linked an item to a card, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum MatchRule {
    CardId,
    NameOrLastFour,
    BankSubstring,
    Brand,
}

impl Display for MatchRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                MatchRule::CardId => "card id",
                MatchRule::NameOrLastFour => "bank name / last four",
                MatchRule::BankSubstring => "bank name substring",
                MatchRule::Brand => "brand",
            }
        )
    }
}

fn normalize(value: Option<&str>) -> Option<String> {
    value
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
}

/// Runs the matching cascade for one item against one card.
///
/// Blank card text matches nothing, and neither do blank card fields.
pub fn match_card<T: CardLinked>(item: &T, card: &Card, policy: MatchPolicy) -> Option<MatchRule> {
    if let Some(card_id) = item.linked_card_id() {
        if !card_id.is_empty() && card_id == card.id {
            return Some(MatchRule::CardId);
        }
    }

    if policy == MatchPolicy::Strict {
        return None;
    }

    let label = normalize(item.card_label())?;
    let bank = normalize(Some(&card.bank_name));
    let last_four = normalize(card.last_four.as_deref());
    let brand = normalize(card.brand.as_deref());

    if bank.as_deref() == Some(label.as_str()) || last_four.as_deref() == Some(label.as_str()) {
        return Some(MatchRule::NameOrLastFour);
    }
    if let Some(bank) = &bank {
        if label.contains(bank.as_str()) || bank.contains(label.as_str()) {
            return Some(MatchRule::BankSubstring);
        }
    }
    if brand.as_deref() == Some(label.as_str()) {
        return Some(MatchRule::Brand);
    }
    None
}

/// A calendar month, e.g. February 2024.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthWindow {
    pub year: i32,
    pub month: u32,
}

impl MonthWindow {
    pub fn containing(date: NaiveDate) -> Self {
        MonthWindow {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn previous(&self) -> Self {
        if self.month == 1 {
            MonthWindow {
                year: self.year - 1,
                month: 12,
            }
        } else {
            MonthWindow {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }
}

impl Display for MonthWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthWindow {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let date = NaiveDate::parse_from_str(&format!("{}-01", s.trim()), "%Y-%m-%d")
            .map_err(|_| anyhow::anyhow!("Invalid month '{}', expected YYYY-MM", s))?;
        Ok(MonthWindow::containing(date))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryShare {
    pub category: String,
    pub total: f64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Matched<T> {
    pub item: T,
    pub rule: MatchRule,
}

/// Everything known about one card after reconciliation.
#[derive(Debug, Clone)]
pub struct CardSummary {
    pub card: Card,
    pub transactions: Vec<Matched<Transaction>>,
    pub subscriptions: Vec<Matched<Subscription>>,
    pub installments: Vec<Matched<Installment>>,
    pub month_total: f64,
    pub previous_month_total: f64,
    pub top_categories: Vec<CategoryShare>,
    pub subscriptions_total: f64,
    pub installments_remaining: f64,
}

/// Independently fetched activity for one user, not scoped by card.
#[derive(Debug, Clone, Default)]
pub struct ActivitySet {
    pub transactions: Vec<Transaction>,
    pub subscriptions: Vec<Subscription>,
    pub installments: Vec<Installment>,
}

fn collect_matches<T: CardLinked + Clone>(
    items: &[T],
    card: &Card,
    policy: MatchPolicy,
) -> Vec<Matched<T>> {
    items
        .iter()
        .filter_map(|item| {
            match_card(item, card, policy).map(|rule| Matched {
                item: item.clone(),
                rule,
            })
        })
        .collect()
}

/// Sums of absolute amounts for `month` and the month before it.
pub fn monthly_totals<'a, I>(transactions: I, month: MonthWindow) -> (f64, f64)
where
    I: IntoIterator<Item = &'a Transaction>,
{
    let previous = month.previous();
    transactions
        .into_iter()
        .fold((0.0, 0.0), |(current, prior), tx| {
            if month.contains(tx.date) {
                (current + tx.amount.abs(), prior)
            } else if previous.contains(tx.date) {
                (current, prior + tx.amount.abs())
            } else {
                (current, prior)
            }
        })
}

/// Grouping key for a category label: trimmed and lowercased.
pub fn category_key(label: &str) -> String {
    label.trim().to_lowercase()
}

/// Buckets the month's transactions by category and keeps the `limit`
/// largest, ties in the order the categories were first seen. Labels that
/// differ only in case share a bucket shown under the first label seen.
pub fn top_categories<'a, I>(transactions: I, month: MonthWindow, limit: usize) -> Vec<CategoryShare>
where
    I: IntoIterator<Item = &'a Transaction>,
{
    let mut buckets: Vec<(String, String, f64)> = Vec::new();
    let mut month_total = 0.0;

    for tx in transactions.into_iter().filter(|tx| month.contains(tx.date)) {
        let label = tx
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(OTHER_CATEGORY);
        let value = tx.amount.abs();
        month_total += value;
        let key = category_key(label);
        match buckets.iter_mut().find(|(k, _, _)| *k == key) {
            Some((_, _, total)) => *total += value,
            None => buckets.push((key, label.to_string(), value)),
        }
    }

    // Stable sort keeps encounter order between equal totals.
    buckets.sort_by(|a, b| b.2.total_cmp(&a.2));
    buckets.truncate(limit);

    buckets
        .into_iter()
        .map(|(_, category, total)| CategoryShare {
            category,
            total,
            percentage: if month_total > 0.0 {
                (total / month_total) * 100.0
            } else {
                0.0
            },
        })
        .collect()
}

/// Reconciles every card against the whole activity set.
///
/// Each card evaluates each item on its own, so an item can show up under
/// more than one card when the text heuristics are ambiguous.
pub fn reconcile(
    cards: &[Card],
    activity: &ActivitySet,
    month: MonthWindow,
    policy: MatchPolicy,
) -> Vec<CardSummary> {
    cards
        .iter()
        .map(|card| {
            let transactions = collect_matches(&activity.transactions, card, policy);
            let subscriptions = collect_matches(&activity.subscriptions, card, policy);
            let installments = collect_matches(&activity.installments, card, policy);

            let (month_total, previous_month_total) =
                monthly_totals(transactions.iter().map(|m| &m.item), month);
            let top_categories =
                top_categories(transactions.iter().map(|m| &m.item), month, TOP_CATEGORIES);
            let subscriptions_total = subscriptions
                .iter()
                .filter(|m| m.item.active)
                .map(|m| m.item.amount.abs())
                .sum();
            let installments_remaining = installments
                .iter()
                .map(|m| m.item.remaining_amount())
                .sum();

            debug!(
                card = %card.id,
                transactions = transactions.len(),
                subscriptions = subscriptions.len(),
                installments = installments.len(),
                month_total,
                previous_month_total,
                "Reconciled card"
            );

            CardSummary {
                card: card.clone(),
                transactions,
                subscriptions,
                installments,
                month_total,
                previous_month_total,
                top_categories,
                subscriptions_total,
                installments_remaining,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{CardStatus, CardType};

    fn card(id: &str, bank: &str, last_four: Option<&str>, brand: Option<&str>) -> Card {
        Card {
            id: id.to_string(),
            bank_name: bank.to_string(),
            last_four: last_four.map(str::to_string),
            brand: brand.map(str::to_string),
            card_type: CardType::Credit,
            status: CardStatus::Active,
            credit_limit: None,
            available_limit: None,
            closing_day: None,
            due_day: None,
        }
    }

    fn tx(id: &str, card: Option<&str>, amount: f64, date: &str, category: Option<&str>) -> Transaction {
        Transaction {
            id: id.to_string(),
            description: String::new(),
            category: category.map(str::to_string),
            amount,
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            card: card.map(str::to_string),
            card_id: None,
        }
    }

    fn feb_2024() -> MonthWindow {
        MonthWindow {
            year: 2024,
            month: 2,
        }
    }

    #[test]
    fn test_rule_priority() {
        let nubank = card("c1", "Nubank", Some("1234"), Some("Mastercard"));

        let mut by_id = tx("t1", Some("something else"), 1.0, "2024-02-01", None);
        by_id.card_id = Some("c1".to_string());
        assert_eq!(
            match_card(&by_id, &nubank, MatchPolicy::Heuristic),
            Some(MatchRule::CardId)
        );

        let trailing_space = tx("t2", Some("nubank "), 1.0, "2024-02-01", None);
        assert_eq!(
            match_card(&trailing_space, &nubank, MatchPolicy::Heuristic),
            Some(MatchRule::NameOrLastFour)
        );

        let last_four = tx("t3", Some(" 1234"), 1.0, "2024-02-01", None);
        assert_eq!(
            match_card(&last_four, &nubank, MatchPolicy::Heuristic),
            Some(MatchRule::NameOrLastFour)
        );

        let brand = tx("t4", Some("MASTERCARD"), 1.0, "2024-02-01", None);
        assert_eq!(
            match_card(&brand, &nubank, MatchPolicy::Heuristic),
            Some(MatchRule::Brand)
        );

        let miss = tx("t5", Some("Itau"), 1.0, "2024-02-01", None);
        assert_eq!(match_card(&miss, &nubank, MatchPolicy::Heuristic), None);
    }

    #[test]
    fn test_substring_both_directions() {
        let santander = card("c1", "Santander", None, None);
        let longer = tx("t1", Some("Santander Sogra"), 1.0, "2024-02-01", None);
        assert_eq!(
            match_card(&longer, &santander, MatchPolicy::Heuristic),
            Some(MatchRule::BankSubstring)
        );

        let santander_sogra = card("c2", "Santander Sogra", None, None);
        let shorter = tx("t2", Some("santander"), 1.0, "2024-02-01", None);
        assert_eq!(
            match_card(&shorter, &santander_sogra, MatchPolicy::Heuristic),
            Some(MatchRule::BankSubstring)
        );
    }

    #[test]
    fn test_blank_card_text_never_matches() {
        let cards = [
            card("c1", "Nubank", Some("1234"), Some("Visa")),
            card("c2", "", None, None),
        ];
        for label in [None, Some(""), Some("   ")] {
            let item = tx("t1", label, 10.0, "2024-02-01", None);
            for c in &cards {
                assert_eq!(match_card(&item, c, MatchPolicy::Heuristic), None);
            }
        }
        // An empty card id on both sides is not a link either.
        let mut item = tx("t2", None, 10.0, "2024-02-01", None);
        item.card_id = Some(String::new());
        let blank_id = card("", "Nubank", None, None);
        assert_eq!(match_card(&item, &blank_id, MatchPolicy::Heuristic), None);
    }

    #[test]
    fn test_strict_policy_uses_foreign_key_only() {
        let nubank = card("c1", "Nubank", Some("1234"), None);
        let by_name = tx("t1", Some("Nubank"), 1.0, "2024-02-01", None);
        assert_eq!(match_card(&by_name, &nubank, MatchPolicy::Strict), None);

        let mut by_id = by_name.clone();
        by_id.card_id = Some("c1".to_string());
        assert_eq!(
            match_card(&by_id, &nubank, MatchPolicy::Strict),
            Some(MatchRule::CardId)
        );
    }

    #[test]
    fn test_month_window_rollover() {
        let jan = MonthWindow {
            year: 2024,
            month: 1,
        };
        assert_eq!(
            jan.previous(),
            MonthWindow {
                year: 2023,
                month: 12
            }
        );
        assert_eq!(feb_2024().previous(), jan);
        assert_eq!("2024-02".parse::<MonthWindow>().unwrap(), feb_2024());
        assert!("2024-13".parse::<MonthWindow>().is_err());
        assert_eq!(feb_2024().to_string(), "2024-02");
    }

    #[test]
    fn test_calendar_month_boundaries() {
        let txs = [
            tx("t1", Some("Nubank"), -40.0, "2024-01-31", None),
            tx("t2", Some("Nubank"), -60.0, "2024-02-01", None),
            tx("t3", Some("Nubank"), 15.0, "2023-12-31", None),
        ];
        let (current, previous) = monthly_totals(&txs, feb_2024());
        assert_eq!(current, 60.0);
        assert_eq!(previous, 40.0);
    }

    #[test]
    fn test_january_uses_previous_december() {
        let txs = [
            tx("t1", None, -25.0, "2023-12-15", None),
            tx("t2", None, -10.0, "2024-01-02", None),
            tx("t3", None, -99.0, "2022-12-15", None),
        ];
        let jan = MonthWindow {
            year: 2024,
            month: 1,
        };
        assert_eq!(monthly_totals(&txs, jan), (10.0, 25.0));
    }

    #[test]
    fn test_top_categories_ordering_and_other_bucket() {
        let txs = [
            tx("t1", None, -10.0, "2024-02-01", Some("Food")),
            tx("t2", None, -30.0, "2024-02-02", Some("Travel")),
            tx("t3", None, -10.0, "2024-02-03", Some("Fuel")),
            tx("t4", None, -20.0, "2024-02-04", Some("")),
            tx("t5", None, -5.0, "2024-02-05", None),
            tx("t6", None, -10.0, "2024-02-06", Some("Games")),
            tx("t7", None, -5.0, "2024-02-07", Some("Books")),
            tx("t8", None, -500.0, "2024-01-07", Some("Rent")),
        ];
        let shares = top_categories(&txs, feb_2024(), TOP_CATEGORIES);
        let names: Vec<&str> = shares.iter().map(|s| s.category.as_str()).collect();
        assert_eq!(names, vec!["Travel", "Other", "Food", "Fuel", "Games"]);
        assert_eq!(shares[1].total, 25.0);
        assert!((shares[0].percentage - 100.0 / 3.0).abs() < 1e-9);

        let sum: f64 = shares.iter().map(|s| s.percentage).sum();
        assert!(sum <= 100.0 + 1e-9);
    }

    #[test]
    fn test_top_categories_group_labels_ignoring_case() {
        let txs = [
            tx("t1", None, -15.0, "2024-02-01", Some("Travel")),
            tx("t2", None, -10.0, "2024-02-02", Some("Food")),
            tx("t3", None, -10.0, "2024-02-03", Some("food ")),
            tx("t4", None, -4.0, "2024-02-04", Some("SAÚDE")),
            tx("t5", None, -4.0, "2024-02-05", Some("Saúde")),
        ];
        let shares = top_categories(&txs, feb_2024(), TOP_CATEGORIES);
        let summary: Vec<(&str, f64)> = shares
            .iter()
            .map(|s| (s.category.as_str(), s.total))
            .collect();
        assert_eq!(
            summary,
            vec![("Food", 20.0), ("Travel", 15.0), ("SAÚDE", 8.0)]
        );
    }

    #[test]
    fn test_zero_total_yields_zero_percentages() {
        let txs = [
            tx("t1", None, 0.0, "2024-02-01", Some("Food")),
            tx("t2", None, 0.0, "2024-02-02", Some("Travel")),
        ];
        let shares = top_categories(&txs, feb_2024(), TOP_CATEGORIES);
        assert_eq!(shares.len(), 2);
        assert!(shares.iter().all(|s| s.percentage == 0.0));
    }

    #[test]
    fn test_reconcile_builds_card_summaries() {
        let cards = vec![
            card("c1", "Nubank", Some("1234"), Some("Mastercard")),
            card("c2", "Santander", Some("9876"), Some("Visa")),
        ];
        let activity = ActivitySet {
            transactions: vec![
                tx("t1", Some("nubank "), -100.0, "2024-02-10", Some("Food")),
                tx("t2", Some("Santander Sogra"), -50.0, "2024-02-11", Some("Gifts")),
                tx("t3", Some("1234"), -20.0, "2024-01-20", Some("Food")),
                tx("t4", None, -999.0, "2024-02-12", Some("Food")),
            ],
            subscriptions: vec![
                Subscription {
                    id: "s1".to_string(),
                    name: "Music".to_string(),
                    amount: 21.9,
                    billing_day: Some(5),
                    category: None,
                    card: Some("visa".to_string()),
                    card_id: None,
                    active: true,
                },
                Subscription {
                    id: "s2".to_string(),
                    name: "Old gym".to_string(),
                    amount: 90.0,
                    billing_day: Some(5),
                    category: None,
                    card: Some("Santander".to_string()),
                    card_id: None,
                    active: false,
                },
            ],
            installments: vec![Installment {
                id: "i1".to_string(),
                description: "Phone".to_string(),
                total_amount: 1000.0,
                installment_count: 10,
                paid_installments: 3,
                start_date: None,
                card: None,
                card_id: Some("c1".to_string()),
            }],
        };

        let summaries = reconcile(&cards, &activity, feb_2024(), MatchPolicy::Heuristic);
        assert_eq!(summaries.len(), 2);

        let nubank = &summaries[0];
        assert_eq!(nubank.transactions.len(), 2);
        assert_eq!(nubank.month_total, 100.0);
        assert_eq!(nubank.previous_month_total, 20.0);
        assert_eq!(nubank.top_categories[0].category, "Food");
        assert_eq!(nubank.top_categories[0].percentage, 100.0);
        assert_eq!(nubank.installments.len(), 1);
        assert_eq!(nubank.installments[0].rule, MatchRule::CardId);
        assert!((nubank.installments_remaining - 700.0).abs() < 1e-9);
        assert!(nubank.subscriptions.is_empty());

        let santander = &summaries[1];
        assert_eq!(santander.transactions.len(), 1);
        assert_eq!(santander.transactions[0].rule, MatchRule::BankSubstring);
        assert_eq!(santander.month_total, 50.0);
        assert_eq!(santander.subscriptions.len(), 2);
        assert!((santander.subscriptions_total - 21.9).abs() < 1e-9);
    }
}
