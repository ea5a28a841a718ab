//! Twitter API v2 payloads used by the filtered stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One line of the filtered stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamTweet {
    pub data: Tweet,
    #[serde(default)]
    pub matching_rules: Vec<MatchingRule>,
}

impl StreamTweet {
    /// Whether a rule tagged `rule_tag` selected this tweet.
    #[must_use]
    pub fn matches_rule(&self, rule_tag: &str) -> bool {
        self.matching_rules
            .iter()
            .any(|rule| rule.tag.as_deref() == Some(rule_tag))
    }
}

/// Tweet object (only the requested fields).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tweet {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities: Option<TweetEntities>,
}

impl Tweet {
    /// Hashtags Twitter extracted, `#`-prefixed.
    #[must_use]
    pub fn hashtags(&self) -> Vec<String> {
        self.entities
            .as_ref()
            .map(|entities| {
                entities
                    .hashtags
                    .iter()
                    .map(|h| format!("#{}", h.tag))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TweetEntities {
    #[serde(default)]
    pub hashtags: Vec<HashtagEntity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashtagEntity {
    pub start: usize,
    pub end: usize,
    pub tag: String,
}

/// Rule reference attached to each delivered tweet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingRule {
    pub id: String,
    #[serde(default)]
    pub tag: Option<String>,
}

/// A rule installed on the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRule {
    pub id: String,
    pub value: String,
    #[serde(default)]
    pub tag: Option<String>,
}

/// Response of the rules endpoints.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RulesResponse {
    #[serde(default)]
    pub data: Vec<StreamRule>,
    #[serde(default)]
    pub meta: Option<RulesMeta>,
    #[serde(default)]
    pub errors: Vec<ApiProblem>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RulesMeta {
    #[serde(default)]
    pub summary: Option<RulesSummary>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RulesSummary {
    #[serde(default)]
    pub not_created: usize,
    #[serde(default)]
    pub deleted: usize,
}

/// Problem object returned alongside partial successes.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ApiProblem {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}

impl ApiProblem {
    pub fn is_duplicate(&self) -> bool {
        self.title.as_deref() == Some("DuplicateRule")
    }

    pub fn describe(&self) -> String {
        self.detail
            .clone()
            .or_else(|| self.title.clone())
            .unwrap_or_else(|| "unknown rules error".to_string())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AddRulesRequest<'a> {
    pub add: Vec<NewRule<'a>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct NewRule<'a> {
    pub value: &'a str,
    pub tag: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct DeleteRulesRequest<'a> {
    pub delete: DeleteIds<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct DeleteIds<'a> {
    pub ids: &'a [String],
}
