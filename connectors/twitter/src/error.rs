//! Twitter-specific error types.

use std::time::Duration;

use tagtrail_core::ExploreError;
use thiserror::Error;

/// Twitter-specific errors.
#[derive(Error, Debug)]
pub enum TwitterError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Twitter API returned an error
    #[error("Twitter API error {status}: {message}")]
    Api {
        status: u16,
        message: String,
        retry_after: Option<u64>,
    },

    /// Rate limited
    #[error("Rate limited, retry after {retry_after} seconds")]
    RateLimited { retry_after: u64 },

    /// Stream error
    #[error("Stream error: {0}")]
    Stream(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl TwitterError {
    /// Check if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::RateLimited { .. } | Self::Stream(_) => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            Self::Json(_) | Self::Config(_) => false,
        }
    }

    /// Get the suggested retry delay.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => Some(Duration::from_secs(*retry_after)),
            Self::Api { retry_after, .. } => retry_after.map(Duration::from_secs),
            _ => None,
        }
    }

    /// Build the error for a non-success HTTP response.
    #[must_use]
    pub fn from_status(status: u16, message: String, retry_after: Option<u64>) -> Self {
        if status == 429 {
            Self::RateLimited {
                retry_after: retry_after.unwrap_or(60),
            }
        } else {
            Self::Api {
                status,
                message,
                retry_after,
            }
        }
    }

    /// Convert to the engine's subscription error for `tag`.
    #[must_use]
    pub fn to_subscription_error(&self, tag: &str) -> ExploreError {
        let message = match self {
            Self::Api { status: 401, .. } => "unauthorized: check the bearer token".to_string(),
            Self::Api { status: 403, message, .. } => format!("forbidden: {message}"),
            other => other.to_string(),
        };
        ExploreError::subscription(tag, message)
    }
}

/// Result type for Twitter operations.
pub type TwitterResult<T> = Result<T, TwitterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_429_becomes_rate_limited() {
        let err = TwitterError::from_status(429, "slow down".into(), Some(5));
        assert!(matches!(err, TwitterError::RateLimited { retry_after: 5 }));
        assert!(err.is_retryable());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_rate_limit_defaults_to_a_minute() {
        let err = TwitterError::from_status(429, String::new(), None);
        assert_eq!(err.retry_after(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_server_errors_are_retryable() {
        let err = TwitterError::from_status(503, "unavailable".into(), None);
        assert!(err.is_retryable());
        let err = TwitterError::from_status(400, "bad rule".into(), None);
        assert!(!err.is_retryable());
        assert!(!TwitterError::Config("missing".into()).is_retryable());
    }

    #[test]
    fn test_unauthorized_maps_to_subscription_error() {
        let err = TwitterError::from_status(401, "Unauthorized".into(), None);
        let explore = err.to_subscription_error("#food");
        assert!(matches!(
            explore,
            ExploreError::Subscription { tag, message }
                if tag == "#food" && message.contains("bearer token")
        ));
    }

    #[test]
    fn test_forbidden_keeps_api_message() {
        let err = TwitterError::from_status(403, "client not enrolled".into(), None);
        let explore = err.to_subscription_error("#food");
        assert!(matches!(
            explore,
            ExploreError::Subscription { message, .. } if message == "forbidden: client not enrolled"
        ));
    }
}
