use serde_json::{json, Value};

use crate::config::ERROR_BODY_PREVIEW;
use crate::error::{AppError, Result};

/// Minimal GraphQL-over-HTTP client: POST `{query, variables}`, return `data`.
#[derive(Clone)]
pub struct GqlClient {
    http: reqwest::Client,
    url: String,
}

impl GqlClient {
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self { http, url: url.into() }
    }

    pub async fn query(&self, query: &str, variables: Value) -> Result<Value> {
        let resp = self
            .http
            .post(&self.url)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            // A server that answers with a GraphQL error document on a 4xx/5xx
            // still answered; only opaque failures count as transport errors.
            if let Some(err) = graphql_rejection(&body) {
                return Err(err);
            }
            return Err(AppError::Upstream(format!(
                "gql {status} :: {}",
                preview(&body)
            )));
        }

        let text = resp.text().await?;
        let payload: Value = serde_json::from_str(&text)
            .map_err(|e| AppError::GraphQl(format!("unparseable response ({e}): {}", preview(&text))))?;
        into_data(payload)
    }
}

/// Split a GraphQL response into `data` or an error.
pub fn into_data(mut payload: Value) -> Result<Value> {
    if let Some(errors) = payload.get("errors").and_then(Value::as_array) {
        if !errors.is_empty() {
            return Err(AppError::GraphQl(preview(&Value::Array(errors.clone()).to_string())));
        }
    }
    match payload.get_mut("data") {
        Some(data) if !data.is_null() => Ok(data.take()),
        _ => Err(AppError::GraphQl("response carried no data".to_string())),
    }
}

/// A non-empty `errors` array in an error-status body.
fn graphql_rejection(body: &str) -> Option<AppError> {
    let payload: Value = serde_json::from_str(body).ok()?;
    let errors = payload.get("errors")?.as_array()?;
    if errors.is_empty() {
        return None;
    }
    Some(AppError::GraphQl(preview(&Value::Array(errors.clone()).to_string())))
}

pub fn preview(s: &str) -> String {
    s.chars().take(ERROR_BODY_PREVIEW).collect()
}
