//! Twitter source configuration.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{TwitterError, TwitterResult};

/// Production API base URL.
pub const DEFAULT_API_URL: &str = "https://api.twitter.com";

/// Environment variable holding the app-only bearer token.
pub const BEARER_TOKEN_ENV: &str = "TWITTER_BEARER_TOKEN";

/// Environment variable overriding the API base URL.
pub const API_URL_ENV: &str = "TWITTER_API_URL";

/// Connection settings for the filtered stream.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TwitterConfig {
    /// App-only bearer token.
    #[serde(skip_serializing)]
    pub bearer_token: Option<String>,

    /// API base URL (overridable for tests and proxies).
    pub api_url: String,

    /// Timeout for rule management requests (seconds).
    pub request_timeout_secs: u64,

    /// Idle timeout for the streaming connection (seconds). Twitter sends a
    /// heartbeat every 20s, so anything well above that works.
    pub stream_timeout_secs: u64,

    /// Buffer between the shared connection and each subscription.
    pub channel_capacity: usize,

    /// First reconnect delay (milliseconds); doubles per failed attempt.
    pub reconnect_base_ms: u64,

    /// Reconnect delay cap (milliseconds).
    pub reconnect_max_ms: u64,
}

impl Default for TwitterConfig {
    fn default() -> Self {
        Self {
            bearer_token: None,
            api_url: DEFAULT_API_URL.to_string(),
            request_timeout_secs: 30,
            stream_timeout_secs: 90,
            channel_capacity: 256,
            reconnect_base_ms: 1_000,
            reconnect_max_ms: 60_000,
        }
    }
}

impl fmt::Debug for TwitterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwitterConfig")
            .field(
                "bearer_token",
                &self.bearer_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("api_url", &self.api_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("stream_timeout_secs", &self.stream_timeout_secs)
            .field("channel_capacity", &self.channel_capacity)
            .field("reconnect_base_ms", &self.reconnect_base_ms)
            .field("reconnect_max_ms", &self.reconnect_max_ms)
            .finish()
    }
}

impl TwitterConfig {
    #[must_use]
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    #[must_use]
    pub const fn with_reconnect_backoff(mut self, base_ms: u64, max_ms: u64) -> Self {
        self.reconnect_base_ms = base_ms;
        self.reconnect_max_ms = max_ms;
        self
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub const fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_secs)
    }

    /// Join `path` onto the API base URL.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// The bearer token, or a configuration error if it is missing.
    ///
    /// # Errors
    /// Returns [`TwitterError::Config`] when no token is set.
    pub fn require_bearer_token(&self) -> TwitterResult<&str> {
        self.bearer_token
            .as_deref()
            .ok_or_else(|| TwitterError::Config("Bearer token required for streaming".into()))
    }

    /// Check the settings before any connection is made.
    ///
    /// # Errors
    /// Returns [`TwitterError::Config`] describing the first problem.
    pub fn validate(&self) -> TwitterResult<()> {
        self.require_bearer_token()?;
        let url = url::Url::parse(&self.api_url)
            .map_err(|err| TwitterError::Config(format!("invalid API URL: {err}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TwitterError::Config(format!(
                "API URL must be http(s), got {}",
                url.scheme()
            )));
        }
        if self.channel_capacity == 0 {
            return Err(TwitterError::Config(
                "channel capacity must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Reconnect delay before attempt `attempt` (0-indexed).
    #[must_use]
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.min(30);
        let delay = self.reconnect_base_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(delay.min(self.reconnect_max_ms))
    }
}
