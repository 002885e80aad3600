//! Rows returned by the hosted REST API, plus the payloads used to write them.

use anyhow::{Result, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardType {
    Credit,
    Debit,
    Multi,
}

impl Display for CardType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                CardType::Credit => "credit",
                CardType::Debit => "debit",
                CardType::Multi => "multi",
            }
        )
    }
}

impl FromStr for CardType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "credit" => Ok(CardType::Credit),
            "debit" => Ok(CardType::Debit),
            "multi" => Ok(CardType::Multi),
            _ => Err(anyhow::anyhow!("Invalid card type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardStatus {
    Active,
    Blocked,
    Canceled,
}

impl Display for CardStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                CardStatus::Active => "active",
                CardStatus::Blocked => "blocked",
                CardStatus::Canceled => "canceled",
            }
        )
    }
}

impl FromStr for CardStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(CardStatus::Active),
            "blocked" => Ok(CardStatus::Blocked),
            "canceled" | "cancelled" => Ok(CardStatus::Canceled),
            _ => Err(anyhow::anyhow!("Invalid card status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    pub bank_name: String,
    #[serde(default)]
    pub last_four: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    pub card_type: CardType,
    pub status: CardStatus,
    #[serde(default)]
    pub credit_limit: Option<f64>,
    #[serde(default)]
    pub available_limit: Option<f64>,
    #[serde(default)]
    pub closing_day: Option<u8>,
    #[serde(default)]
    pub due_day: Option<u8>,
}

impl Card {
    /// Short label used in tables, e.g. `Nubank •1234`.
    pub fn label(&self) -> String {
        match self.last_four.as_deref().map(str::trim) {
            Some(digits) if !digits.is_empty() => format!("{} •{}", self.bank_name, digits),
            _ => self.bank_name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCard {
    pub bank_name: String,
    pub last_four: Option<String>,
    pub brand: Option<String>,
    pub card_type: CardType,
    pub status: CardStatus,
    pub credit_limit: Option<f64>,
    pub available_limit: Option<f64>,
    pub closing_day: Option<u8>,
    pub due_day: Option<u8>,
}

impl NewCard {
    pub fn validate(&self) -> Result<()> {
        if self.bank_name.trim().is_empty() {
            bail!("Bank name is required");
        }
        if let Some(digits) = &self.last_four {
            if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
                bail!("Last four digits must be exactly 4 digits, got '{digits}'");
            }
        }
        for day in [self.closing_day, self.due_day].into_iter().flatten() {
            if !(1..=31).contains(&day) {
                bail!("Day of month must be between 1 and 31, got {day}");
            }
        }
        if let Some(limit) = self.credit_limit {
            if limit < 0.0 {
                bail!("Credit limit cannot be negative");
            }
        }
        Ok(())
    }
}

/// Partial update of a card. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CardStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credit_limit: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_limit: Option<f64>,
}

impl CardUpdate {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.credit_limit.is_none() && self.available_limit.is_none()
    }

    pub fn apply_to(&self, card: &mut Card) {
        if let Some(status) = self.status {
            card.status = status;
        }
        if let Some(limit) = self.credit_limit {
            card.credit_limit = Some(limit);
        }
        if let Some(limit) = self.available_limit {
            card.available_limit = Some(limit);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    pub amount: f64,
    pub date: NaiveDate,
    #[serde(default)]
    pub card: Option<String>,
    #[serde(default)]
    pub card_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub name: String,
    pub amount: f64,
    #[serde(default)]
    pub billing_day: Option<u8>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub card: Option<String>,
    #[serde(default)]
    pub card_id: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSubscription {
    pub name: String,
    pub amount: f64,
    pub billing_day: Option<u8>,
    pub category: Option<String>,
    pub card: Option<String>,
    pub card_id: Option<String>,
    pub active: bool,
}

impl NewSubscription {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("Subscription name is required");
        }
        if !self.amount.is_finite() || self.amount <= 0.0 {
            bail!("Subscription amount must be positive");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Installment {
    pub id: String,
    pub description: String,
    pub total_amount: f64,
    pub installment_count: u32,
    #[serde(default)]
    pub paid_installments: u32,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub card: Option<String>,
    #[serde(default)]
    pub card_id: Option<String>,
}

impl Installment {
    pub fn installment_value(&self) -> f64 {
        if self.installment_count == 0 {
            return 0.0;
        }
        self.total_amount / f64::from(self.installment_count)
    }

    pub fn remaining_installments(&self) -> u32 {
        self.installment_count.saturating_sub(self.paid_installments)
    }

    pub fn remaining_amount(&self) -> f64 {
        self.installment_value() * f64::from(self.remaining_installments())
    }

    pub fn is_settled(&self) -> bool {
        self.remaining_installments() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInstallment {
    pub description: String,
    pub total_amount: f64,
    pub installment_count: u32,
    pub paid_installments: u32,
    pub start_date: Option<NaiveDate>,
    pub card: Option<String>,
    pub card_id: Option<String>,
}

impl NewInstallment {
    pub fn validate(&self) -> Result<()> {
        if self.description.trim().is_empty() {
            bail!("Installment description is required");
        }
        if !self.total_amount.is_finite() || self.total_amount <= 0.0 {
            bail!("Installment total must be positive");
        }
        if self.installment_count == 0 {
            bail!("Installment count must be at least 1");
        }
        if self.paid_installments > self.installment_count {
            bail!("Paid installments cannot exceed the installment count");
        }
        Ok(())
    }
}

/// The activity tables that carry a loose reference to a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityKind {
    Transaction,
    Subscription,
    Installment,
}

impl ActivityKind {
    pub fn table(&self) -> &'static str {
        match self {
            ActivityKind::Transaction => "transactions",
            ActivityKind::Subscription => "subscriptions",
            ActivityKind::Installment => "installments",
        }
    }
}

impl Display for ActivityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                ActivityKind::Transaction => "transaction",
                ActivityKind::Subscription => "subscription",
                ActivityKind::Installment => "installment",
            }
        )
    }
}

/// Anything that refers to a card either by foreign key or by free text.
pub trait CardLinked {
    const KIND: ActivityKind;

    fn item_id(&self) -> &str;
    fn linked_card_id(&self) -> Option<&str>;
    fn card_label(&self) -> Option<&str>;
}

impl CardLinked for Transaction {
    const KIND: ActivityKind = ActivityKind::Transaction;

    fn item_id(&self) -> &str {
        &self.id
    }
    fn linked_card_id(&self) -> Option<&str> {
        self.card_id.as_deref()
    }
    fn card_label(&self) -> Option<&str> {
        self.card.as_deref()
    }
}

impl CardLinked for Subscription {
    const KIND: ActivityKind = ActivityKind::Subscription;

    fn item_id(&self) -> &str {
        &self.id
    }
    fn linked_card_id(&self) -> Option<&str> {
        self.card_id.as_deref()
    }
    fn card_label(&self) -> Option<&str> {
        self.card.as_deref()
    }
}

impl CardLinked for Installment {
    const KIND: ActivityKind = ActivityKind::Installment;

    fn item_id(&self) -> &str {
        &self.id
    }
    fn linked_card_id(&self) -> Option<&str> {
        self.card_id.as_deref()
    }
    fn card_label(&self) -> Option<&str> {
        self.card.as_deref()
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_deserialization_with_nulls() {
        let json = r#"{
            "id": "c1",
            "bank_name": "Nubank",
            "last_four": null,
            "brand": "Mastercard",
            "card_type": "credit",
            "status": "blocked",
            "credit_limit": 5000.0,
            "available_limit": null,
            "closing_day": 3,
            "due_day": 10,
            "user_id": "u1"
        }"#;
        let card: Card = serde_json::from_str(json).unwrap();
        assert_eq!(card.bank_name, "Nubank");
        assert!(card.last_four.is_none());
        assert_eq!(card.card_type, CardType::Credit);
        assert_eq!(card.status, CardStatus::Blocked);
        assert_eq!(card.label(), "Nubank");
    }

    #[test]
    fn test_transaction_deserialization() {
        let json = r#"{
            "id": "t1",
            "description": "Groceries",
            "category": "Food",
            "amount": -54.3,
            "date": "2024-02-01",
            "card": "nubank "
        }"#;
        let tx: Transaction = serde_json::from_str(json).unwrap();
        assert_eq!(tx.date, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(tx.card_label(), Some("nubank "));
        assert!(tx.linked_card_id().is_none());
    }

    #[test]
    fn test_new_card_validation() {
        let mut card = NewCard {
            bank_name: "Inter".to_string(),
            last_four: Some("12a4".to_string()),
            brand: None,
            card_type: CardType::Debit,
            status: CardStatus::Active,
            credit_limit: None,
            available_limit: None,
            closing_day: None,
            due_day: Some(10),
        };
        assert!(card.validate().is_err());
        card.last_four = Some("1234".to_string());
        assert!(card.validate().is_ok());
        card.due_day = Some(32);
        assert!(card.validate().is_err());
        card.due_day = None;
        card.bank_name = "  ".to_string();
        assert!(card.validate().is_err());
    }

    #[test]
    fn test_card_update_serializes_only_present_fields() {
        let update = CardUpdate {
            status: Some(CardStatus::Canceled),
            ..Default::default()
        };
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(value, serde_json::json!({ "status": "canceled" }));
    }

    #[test]
    fn test_installment_remaining() {
        let inst = Installment {
            id: "i1".to_string(),
            description: "Laptop".to_string(),
            total_amount: 1200.0,
            installment_count: 12,
            paid_installments: 4,
            start_date: None,
            card: None,
            card_id: None,
        };
        assert_eq!(inst.installment_value(), 100.0);
        assert_eq!(inst.remaining_installments(), 8);
        assert_eq!(inst.remaining_amount(), 800.0);
        assert!(!inst.is_settled());
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("Cancelled".parse::<CardStatus>().unwrap(), CardStatus::Canceled);
        assert_eq!(" MULTI ".parse::<CardType>().unwrap(), CardType::Multi);
        assert!("frozen".parse::<CardStatus>().is_err());
    }
}
