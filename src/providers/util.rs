use anyhow::{Context, Result, anyhow};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, error};

/// Builds the shared HTTP client. Without a configured timeout the client
/// default applies.
pub fn build_client(timeout_secs: Option<u64>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(secs) = timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    builder.build().context("Failed to build HTTP client")
}

/// Joins a base URL and a path, tolerating a trailing slash on the base.
pub fn join_url(base_url: &str, path: &str) -> Result<reqwest::Url> {
    let raw = format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'));
    reqwest::Url::parse(&raw).with_context(|| format!("Invalid URL: {raw}"))
}

/// Fails on a non-success status, otherwise returns the body text.
pub async fn read_body(response: reqwest::Response, what: &str) -> Result<String> {
    let status = response.status();
    let body = response
        .text()
        .await
        .with_context(|| format!("Failed to read {what} response"))?;
    if !status.is_success() {
        debug!(%status, body = %body, "{what} request rejected");
        return Err(anyhow!("{what} failed with status {status}: {body}"));
    }
    Ok(body)
}

/// Checks the status and parses the JSON body, logging the raw body when it
/// does not match the expected shape.
pub async fn read_json<T: DeserializeOwned>(response: reqwest::Response, what: &str) -> Result<T> {
    let body = read_body(response, what).await?;
    match serde_json::from_str(&body) {
        Ok(data) => Ok(data),
        Err(e) => {
            error!(
                error = ?e,
                response = %body,
                "Failed to parse {what} response"
            );
            Err(e).with_context(|| format!("Failed to parse {what} response"))
        }
    }
}
