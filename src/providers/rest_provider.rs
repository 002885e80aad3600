use super::util::{build_client, join_url, read_json};
use crate::core::backend::FinanceBackend;
use crate::core::budget::{FixedItem, VariableBudget};
use crate::core::debts::{Debt, DebtPayment, DebtStatus, NewDebt, NewDebtPayment};
use crate::core::goals::{Goal, GoalContribution, NewGoal, validate_amount};
use crate::core::models::{
    ActivityKind, Card, CardUpdate, Installment, NewCard, NewInstallment, NewSubscription,
    Subscription, Transaction,
};
use crate::core::session::Session;
use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, instrument};

/// Client for the auto-generated REST API over the user's tables.
pub struct RestProvider {
    base_url: String,
    anon_key: String,
    client: reqwest::Client,
}

impl RestProvider {
    pub fn new(base_url: &str, anon_key: &str, timeout_secs: Option<u64>) -> Result<Self> {
        Ok(Self {
            base_url: base_url.to_string(),
            anon_key: anon_key.to_string(),
            client: build_client(timeout_secs)?,
        })
    }

    fn url(&self, path: &str, filters: &[(&str, String)]) -> Result<Url> {
        let mut url = join_url(&self.base_url, &format!("rest/v1/{path}"))?;
        if !filters.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in filters {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url, session: &Session) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(&session.access_token)
    }

    fn row_filters(session: &Session, id: &str) -> Vec<(&'static str, String)> {
        vec![
            ("id", format!("eq.{id}")),
            ("user_id", format!("eq.{}", session.user_id)),
        ]
    }

    #[instrument(name = "RestSelect", skip(self, session, extra))]
    async fn select<T: DeserializeOwned>(
        &self,
        session: &Session,
        table: &str,
        extra: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let mut filters = vec![
            ("select", "*".to_string()),
            ("user_id", format!("eq.{}", session.user_id)),
        ];
        filters.extend(extra.iter().cloned());
        let url = self.url(table, &filters)?;

        let response = self
            .request(Method::GET, url, session)
            .send()
            .await
            .with_context(|| format!("Request for {table} failed"))?;
        let rows: Vec<T> = read_json(response, table).await?;
        debug!(rows = rows.len(), "Fetched rows");
        Ok(rows)
    }

    /// Inserts one row owned by the session's user and returns it as stored.
    #[instrument(name = "RestInsert", skip(self, session, row))]
    async fn insert<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        session: &Session,
        table: &str,
        row: &B,
    ) -> Result<T> {
        let mut body = serde_json::to_value(row)?;
        if let Some(object) = body.as_object_mut() {
            object.insert("user_id".to_string(), json!(session.user_id));
        }

        let response = self
            .request(Method::POST, self.url(table, &[])?, session)
            .header("Prefer", "return=representation")
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Insert into {table} failed"))?;
        let mut rows: Vec<T> = read_json(response, table).await?;
        if rows.is_empty() {
            bail!("Insert into {table} returned no row");
        }
        Ok(rows.swap_remove(0))
    }

    #[instrument(name = "RestUpdate", skip(self, session, changes))]
    async fn update<T: DeserializeOwned>(
        &self,
        session: &Session,
        table: &str,
        id: &str,
        changes: serde_json::Value,
    ) -> Result<T> {
        let url = self.url(table, &Self::row_filters(session, id))?;
        let response = self
            .request(Method::PATCH, url, session)
            .header("Prefer", "return=representation")
            .json(&changes)
            .send()
            .await
            .with_context(|| format!("Update of {table} failed"))?;
        let mut rows: Vec<T> = read_json(response, table).await?;
        if rows.is_empty() {
            bail!("No row {id} in {table}");
        }
        Ok(rows.swap_remove(0))
    }

    #[instrument(name = "RestDelete", skip(self, session))]
    async fn delete(&self, session: &Session, table: &str, id: &str) -> Result<()> {
        let url = self.url(table, &Self::row_filters(session, id))?;
        let response = self
            .request(Method::DELETE, url, session)
            .header("Prefer", "return=representation")
            .send()
            .await
            .with_context(|| format!("Delete from {table} failed"))?;
        let rows: Vec<serde_json::Value> = read_json(response, table).await?;
        if rows.is_empty() {
            bail!("No row {id} in {table}");
        }
        Ok(())
    }
}

#[async_trait]
impl FinanceBackend for RestProvider {
    async fn list_cards(&self, session: &Session) -> Result<Vec<Card>> {
        self.select(session, "cards", &[]).await
    }

    async fn list_transactions(&self, session: &Session) -> Result<Vec<Transaction>> {
        self.select(session, "transactions", &[("order", "date.desc".to_string())])
            .await
    }

    async fn list_subscriptions(&self, session: &Session) -> Result<Vec<Subscription>> {
        self.select(session, "subscriptions", &[]).await
    }

    async fn list_installments(&self, session: &Session) -> Result<Vec<Installment>> {
        self.select(session, "installments", &[]).await
    }

    async fn list_goals(&self, session: &Session) -> Result<Vec<Goal>> {
        self.select(session, "goals", &[("order", "order_index.asc".to_string())])
            .await
    }

    async fn list_debts(&self, session: &Session) -> Result<Vec<Debt>> {
        self.select(session, "debts", &[]).await
    }

    async fn list_debt_payments(
        &self,
        session: &Session,
        debt_id: &str,
    ) -> Result<Vec<DebtPayment>> {
        self.select(
            session,
            "debt_payments",
            &[
                ("debt_id", format!("eq.{debt_id}")),
                ("order", "paid_at.desc".to_string()),
            ],
        )
        .await
    }

    async fn list_fixed_items(&self, session: &Session) -> Result<Vec<FixedItem>> {
        self.select(session, "fixed_items", &[]).await
    }

    async fn list_variable_budgets(&self, session: &Session) -> Result<Vec<VariableBudget>> {
        self.select(session, "variable_budgets", &[]).await
    }

    async fn create_card(&self, session: &Session, card: &NewCard) -> Result<Card> {
        card.validate()?;
        self.insert(session, "cards", card).await
    }

    async fn update_card(&self, session: &Session, id: &str, update: &CardUpdate) -> Result<Card> {
        if update.is_empty() {
            bail!("Nothing to update for card {id}");
        }
        self.update(session, "cards", id, serde_json::to_value(update)?)
            .await
    }

    async fn delete_card(&self, session: &Session, id: &str) -> Result<()> {
        self.delete(session, "cards", id).await
    }

    async fn create_goal(&self, session: &Session, goal: &NewGoal) -> Result<Goal> {
        self.insert(session, "goals", goal).await
    }

    #[instrument(name = "ContributeToGoal", skip(self, session), fields(user = %session.user_id))]
    async fn contribute_to_goal(
        &self,
        session: &Session,
        goal_id: &str,
        amount: f64,
    ) -> Result<GoalContribution> {
        validate_amount(amount)?;
        let response = self
            .request(Method::POST, self.url("rpc/contribute_to_goal", &[])?, session)
            .json(&json!({ "p_goal_id": goal_id, "p_amount": amount }))
            .send()
            .await
            .context("Goal contribution request failed")?;
        read_json(response, "Goal contribution").await
    }

    async fn create_debt(&self, session: &Session, debt: &NewDebt) -> Result<Debt> {
        self.insert(session, "debts", debt).await
    }

    async fn insert_debt_payment(
        &self,
        session: &Session,
        payment: &NewDebtPayment,
    ) -> Result<DebtPayment> {
        self.insert(session, "debt_payments", payment).await
    }

    async fn update_debt_balance(
        &self,
        session: &Session,
        debt_id: &str,
        remaining_amount: f64,
        status: DebtStatus,
    ) -> Result<Debt> {
        self.update(
            session,
            "debts",
            debt_id,
            json!({ "remaining_amount": remaining_amount, "status": status }),
        )
        .await
    }

    async fn create_subscription(
        &self,
        session: &Session,
        subscription: &NewSubscription,
    ) -> Result<Subscription> {
        subscription.validate()?;
        self.insert(session, "subscriptions", subscription).await
    }

    async fn set_subscription_active(
        &self,
        session: &Session,
        id: &str,
        active: bool,
    ) -> Result<Subscription> {
        self.update(session, "subscriptions", id, json!({ "active": active }))
            .await
    }

    async fn create_installment(
        &self,
        session: &Session,
        installment: &NewInstallment,
    ) -> Result<Installment> {
        installment.validate()?;
        self.insert(session, "installments", installment).await
    }

    async fn set_paid_installments(
        &self,
        session: &Session,
        id: &str,
        paid_installments: u32,
    ) -> Result<Installment> {
        self.update(
            session,
            "installments",
            id,
            json!({ "paid_installments": paid_installments }),
        )
        .await
    }

    async fn assign_card(
        &self,
        session: &Session,
        kind: ActivityKind,
        item_id: &str,
        card_id: &str,
    ) -> Result<()> {
        let _: serde_json::Value = self
            .update(session, kind.table(), item_id, json!({ "card_id": card_id }))
            .await
            .map_err(|e| anyhow!("Failed to link {kind} {item_id} to card {card_id}: {e}"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::goals::GoalStatus;
    use crate::core::models::{CardStatus, CardType};
    use chrono::{Duration, Utc};
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session() -> Session {
        Session {
            access_token: "jwt".to_string(),
            refresh_token: "r".to_string(),
            user_id: "u1".to_string(),
            email: None,
            expires_at: Utc::now() + Duration::hours(1),
        }
    }

    const CARDS_JSON: &str = r#"[
        {
            "id": "c1",
            "user_id": "u1",
            "bank_name": "Nubank",
            "last_four": "1234",
            "brand": "Mastercard",
            "card_type": "credit",
            "status": "active",
            "credit_limit": 5000,
            "available_limit": 3200.5,
            "closing_day": 3,
            "due_day": 10,
            "created_at": "2024-01-01T00:00:00Z"
        }
    ]"#;

    #[tokio::test]
    async fn test_list_cards_is_scoped_to_user() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/cards"))
            .and(query_param("user_id", "eq.u1"))
            .and(query_param("select", "*"))
            .and(header("apikey", "anon"))
            .and(header("authorization", "Bearer jwt"))
            .respond_with(ResponseTemplate::new(200).set_body_string(CARDS_JSON))
            .mount(&mock_server)
            .await;

        let provider = RestProvider::new(&mock_server.uri(), "anon", None).unwrap();
        let cards = provider.list_cards(&session()).await.unwrap();

        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].bank_name, "Nubank");
        assert_eq!(cards[0].card_type, CardType::Credit);
        assert_eq!(cards[0].available_limit, Some(3200.5));
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/transactions"))
            .respond_with(
                ResponseTemplate::new(401).set_body_string(r#"{"message":"JWT expired"}"#),
            )
            .mount(&mock_server)
            .await;

        let provider = RestProvider::new(&mock_server.uri(), "anon", None).unwrap();
        let err = provider.list_transactions(&session()).await.unwrap_err();
        assert!(err.to_string().contains("401"));
        assert!(err.to_string().contains("JWT expired"));
    }

    #[tokio::test]
    async fn test_create_card_adds_user_id() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/cards"))
            .and(header("prefer", "return=representation"))
            .and(body_json(serde_json::json!({
                "bank_name": "Nubank",
                "last_four": "1234",
                "brand": "Mastercard",
                "card_type": "credit",
                "status": "active",
                "credit_limit": 5000.0,
                "available_limit": 3200.5,
                "closing_day": 3,
                "due_day": 10,
                "user_id": "u1"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_string(CARDS_JSON))
            .expect(1)
            .mount(&mock_server)
            .await;

        let provider = RestProvider::new(&mock_server.uri(), "anon", None).unwrap();
        let card = provider
            .create_card(
                &session(),
                &NewCard {
                    bank_name: "Nubank".to_string(),
                    last_four: Some("1234".to_string()),
                    brand: Some("Mastercard".to_string()),
                    card_type: CardType::Credit,
                    status: CardStatus::Active,
                    credit_limit: Some(5000.0),
                    available_limit: Some(3200.5),
                    closing_day: Some(3),
                    due_day: Some(10),
                },
            )
            .await
            .unwrap();
        assert_eq!(card.id, "c1");
    }

    #[tokio::test]
    async fn test_update_card_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/cards"))
            .and(query_param("id", "eq.c1"))
            .and(query_param("user_id", "eq.u1"))
            .and(body_json(serde_json::json!({ "status": "active" })))
            .respond_with(ResponseTemplate::new(200).set_body_string(CARDS_JSON))
            .mount(&mock_server)
            .await;

        let provider = RestProvider::new(&mock_server.uri(), "anon", None).unwrap();
        let update = CardUpdate {
            status: Some(CardStatus::Active),
            ..Default::default()
        };
        let card = provider.update_card(&session(), "c1", &update).await.unwrap();
        assert_eq!(card.status, CardStatus::Active);

        let empty = CardUpdate::default();
        assert!(provider.update_card(&session(), "c1", &empty).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_missing_card() {
        let mock_server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/cards"))
            .and(query_param("id", "eq.nope"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .mount(&mock_server)
            .await;

        let provider = RestProvider::new(&mock_server.uri(), "anon", None).unwrap();
        let err = provider.delete_card(&session(), "nope").await.unwrap_err();
        assert!(err.to_string().contains("No row nope"));
    }

    #[tokio::test]
    async fn test_contribute_calls_stored_procedure() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/contribute_to_goal"))
            .and(body_json(serde_json::json!({ "p_goal_id": "g1", "p_amount": 700.0 })))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{
                    "goal": {
                        "id": "g1", "name": "A", "target_amount": 1000, "current_amount": 1000,
                        "order_index": 0, "status": "completed",
                        "completed_at": "2024-02-10T12:00:00+00:00"
                    },
                    "unlocked": {
                        "id": "g2", "name": "B", "target_amount": 500, "current_amount": 0,
                        "order_index": 1, "status": "active", "completed_at": null
                    }
                }"#,
            ))
            .expect(1)
            .mount(&mock_server)
            .await;

        let provider = RestProvider::new(&mock_server.uri(), "anon", None).unwrap();
        let result = provider
            .contribute_to_goal(&session(), "g1", 700.0)
            .await
            .unwrap();
        assert!(result.completed());
        assert!(result.goal.completed_at.is_some());
        assert_eq!(result.unlocked.unwrap().status, GoalStatus::Active);

        // Invalid amounts never reach the server.
        assert!(provider.contribute_to_goal(&session(), "g1", -1.0).await.is_err());
    }

    #[tokio::test]
    async fn test_assign_card_patches_activity_table() {
        let mock_server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/subscriptions"))
            .and(query_param("id", "eq.s1"))
            .and(body_json(serde_json::json!({ "card_id": "c1" })))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"[{"id":"s1"}]"#))
            .expect(1)
            .mount(&mock_server)
            .await;

        let provider = RestProvider::new(&mock_server.uri(), "anon", None).unwrap();
        provider
            .assign_card(&session(), ActivityKind::Subscription, "s1", "c1")
            .await
            .unwrap();
    }
}
