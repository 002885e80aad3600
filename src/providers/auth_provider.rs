use super::util::{build_client, join_url, read_body, read_json};
use crate::core::session::{Authenticator, Session};
use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use serde::Deserialize;
use tracing::{debug, instrument};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    #[serde(default)]
    expires_at: Option<i64>,
    user: TokenUser,
}

#[derive(Debug, Deserialize)]
struct TokenUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

impl From<TokenResponse> for Session {
    fn from(token: TokenResponse) -> Self {
        let expires_at = token
            .expires_at
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .unwrap_or_else(|| Utc::now() + Duration::seconds(token.expires_in));
        Session {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            user_id: token.user.id,
            email: token.user.email,
            expires_at,
        }
    }
}

/// Password and refresh-token grants against the hosted auth endpoint.
pub struct AuthProvider {
    base_url: String,
    anon_key: String,
    client: reqwest::Client,
}

impl AuthProvider {
    pub fn new(base_url: &str, anon_key: &str, timeout_secs: Option<u64>) -> Result<Self> {
        Ok(Self {
            base_url: base_url.to_string(),
            anon_key: anon_key.to_string(),
            client: build_client(timeout_secs)?,
        })
    }

    async fn token(&self, grant_type: &str, body: serde_json::Value) -> Result<Session> {
        let mut url = join_url(&self.base_url, "auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", grant_type);

        let response = self
            .client
            .post(url)
            .header("apikey", &self.anon_key)
            .json(&body)
            .send()
            .await?;
        let token: TokenResponse = read_json(response, "Token").await?;
        Ok(token.into())
    }
}

#[async_trait]
impl Authenticator for AuthProvider {
    #[instrument(name = "SignIn", skip(self, password))]
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        if email.trim().is_empty() || password.is_empty() {
            bail!("Email and password are required");
        }
        self.token(
            "password",
            serde_json::json!({ "email": email.trim(), "password": password }),
        )
        .await
    }

    #[instrument(name = "RefreshSession", skip_all, fields(user = %session.user_id))]
    async fn refresh(&self, session: &Session) -> Result<Session> {
        self.token(
            "refresh_token",
            serde_json::json!({ "refresh_token": session.refresh_token }),
        )
        .await
    }

    #[instrument(name = "SignOut", skip_all, fields(user = %session.user_id))]
    async fn sign_out(&self, session: &Session) -> Result<()> {
        let url = join_url(&self.base_url, "auth/v1/logout")?;
        let response = self
            .client
            .post(url)
            .header("apikey", &self.anon_key)
            .bearer_auth(&session.access_token)
            .send()
            .await?;
        read_body(response, "Sign out").await?;
        debug!("Session revoked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TOKEN_JSON: &str = r#"{
        "access_token": "jwt-access",
        "token_type": "bearer",
        "expires_in": 3600,
        "expires_at": 1893456000,
        "refresh_token": "refresh-1",
        "user": { "id": "user-123", "email": "me@example.com" }
    }"#;

    #[tokio::test]
    async fn test_sign_in() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "password"))
            .and(header("apikey", "anon"))
            .and(body_json(serde_json::json!({
                "email": "me@example.com",
                "password": "secret"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string(TOKEN_JSON))
            .mount(&mock_server)
            .await;

        let provider = AuthProvider::new(&mock_server.uri(), "anon", None).unwrap();
        let session = provider.sign_in(" me@example.com ", "secret").await.unwrap();

        assert_eq!(session.access_token, "jwt-access");
        assert_eq!(session.refresh_token, "refresh-1");
        assert_eq!(session.user_id, "user-123");
        assert_eq!(session.email.as_deref(), Some("me@example.com"));
        assert_eq!(session.expires_at.timestamp(), 1893456000);
    }

    #[tokio::test]
    async fn test_sign_in_rejected() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string(
                r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#,
            ))
            .mount(&mock_server)
            .await;

        let provider = AuthProvider::new(&mock_server.uri(), "anon", None).unwrap();
        let err = provider.sign_in("me@example.com", "nope").await.unwrap_err();
        assert!(err.to_string().contains("Invalid login credentials"));
        assert!(provider.sign_in("", "secret").await.is_err());
    }

    #[tokio::test]
    async fn test_refresh_uses_refresh_token() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "refresh_token"))
            .and(body_json(serde_json::json!({ "refresh_token": "old-refresh" })))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{
                    "access_token": "new-access",
                    "expires_in": 3600,
                    "refresh_token": "new-refresh",
                    "user": { "id": "user-123" }
                }"#,
            ))
            .mount(&mock_server)
            .await;

        let provider = AuthProvider::new(&mock_server.uri(), "anon", None).unwrap();
        let old = Session {
            access_token: "old".to_string(),
            refresh_token: "old-refresh".to_string(),
            user_id: "user-123".to_string(),
            email: None,
            expires_at: Utc::now(),
        };
        let session = provider.refresh(&old).await.unwrap();
        assert_eq!(session.access_token, "new-access");
        assert!(session.expires_at > Utc::now() + Duration::minutes(59));
    }

    #[tokio::test]
    async fn test_sign_out() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/logout"))
            .and(header("authorization", "Bearer jwt-access"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;

        let provider = AuthProvider::new(&mock_server.uri(), "anon", None).unwrap();
        let session = Session {
            access_token: "jwt-access".to_string(),
            refresh_token: "r".to_string(),
            user_id: "user-123".to_string(),
            email: None,
            expires_at: Utc::now(),
        };
        provider.sign_out(&session).await.unwrap();
    }
}
