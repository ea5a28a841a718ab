//! Filtered stream rule management.

use reqwest::header::RETRY_AFTER;
use tracing::{debug, info};

use crate::{
    config::TwitterConfig,
    error::{TwitterError, TwitterResult},
    types::{
        AddRulesRequest, DeleteIds, DeleteRulesRequest, NewRule, RulesResponse, StreamRule,
    },
};

const RULES_PATH: &str = "/2/tweets/search/stream/rules";

/// Client for `/2/tweets/search/stream/rules`.
#[derive(Clone)]
pub struct RulesClient {
    http: reqwest::Client,
    endpoint: String,
    bearer_token: String,
}

impl std::fmt::Debug for RulesClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RulesClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl RulesClient {
    /// Create a rules client.
    ///
    /// # Errors
    /// Fails when the bearer token is missing or the HTTP client cannot be
    /// built.
    pub fn new(config: &TwitterConfig) -> TwitterResult<Self> {
        let bearer_token = config.require_bearer_token()?.to_string();
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            http,
            endpoint: config.endpoint(RULES_PATH),
            bearer_token,
        })
    }

    /// List installed rules.
    ///
    /// # Errors
    /// Returns HTTP, API, or decoding failures.
    pub async fn list(&self) -> TwitterResult<Vec<StreamRule>> {
        let response = self
            .http
            .get(&self.endpoint)
            .bearer_auth(&self.bearer_token)
            .send()
            .await?;
        let body: RulesResponse = decode(response).await?;
        Ok(body.data)
    }

    /// Install a rule, reusing an identical one if it already exists.
    ///
    /// # Errors
    /// Returns HTTP, API, or decoding failures, or the rejection reason when
    /// the rule is refused.
    pub async fn add(&self, value: &str, tag: &str) -> TwitterResult<StreamRule> {
        let request = AddRulesRequest {
            add: vec![NewRule { value, tag }],
        };
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.bearer_token)
            .json(&request)
            .send()
            .await?;
        let body: RulesResponse = decode(response).await?;

        if let Some(rule) = body.data.into_iter().find(|rule| rule.value == value) {
            info!(rule_id = %rule.id, value, "Installed stream rule");
            return Ok(rule);
        }

        if let Some(problem) = body.errors.iter().find(|p| p.is_duplicate()) {
            debug!(value, "Rule already installed, looking it up");
            if let Some(rule) = self.list().await?.into_iter().find(|r| r.value == value) {
                return Ok(rule);
            }
            if let Some(id) = problem.id.clone() {
                return Ok(StreamRule {
                    id,
                    value: value.to_string(),
                    tag: Some(tag.to_string()),
                });
            }
        }

        let not_created = body
            .meta
            .and_then(|meta| meta.summary)
            .map_or(0, |summary| summary.not_created);
        let reason = body
            .errors
            .first()
            .map_or_else(|| "rule was not created".to_string(), |p| p.describe());
        Err(TwitterError::Api {
            status: 400,
            message: format!("{reason} (not_created: {not_created})"),
            retry_after: None,
        })
    }

    /// Delete rules by id. Returns how many were deleted.
    ///
    /// # Errors
    /// Returns HTTP, API, or decoding failures.
    pub async fn delete(&self, ids: &[String]) -> TwitterResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let request = DeleteRulesRequest {
            delete: DeleteIds { ids },
        };
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.bearer_token)
            .json(&request)
            .send()
            .await?;
        let body: RulesResponse = decode(response).await?;
        let deleted = body
            .meta
            .and_then(|meta| meta.summary)
            .map_or(0, |summary| summary.deleted);
        debug!(requested = ids.len(), deleted, "Deleted stream rules");
        Ok(deleted)
    }
}

/// Map a non-success status to an error, otherwise decode the body.
async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> TwitterResult<T> {
    let status = response.status();
    if !status.is_success() {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok());
        let message = response.text().await.unwrap_or_default();
        return Err(TwitterError::from_status(
            status.as_u16(),
            message,
            retry_after,
        ));
    }
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}
