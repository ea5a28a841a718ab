//! Rules and filtered stream behaviour against a fake API server.

use std::time::Duration;

use pretty_assertions::assert_eq;
use tagtrail_core::{ExploreError, StreamItem, StreamSource};
use tagtrail_twitter::{RulesClient, TwitterConfig, TwitterError, TwitterStreamSource};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RULES: &str = "/2/tweets/search/stream/rules";
const STREAM: &str = "/2/tweets/search/stream";

fn config(server: &MockServer) -> TwitterConfig {
    TwitterConfig::default()
        .with_bearer_token("test-token")
        .with_api_url(server.uri())
        .with_reconnect_backoff(10, 50)
}

async fn mount_rules(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(RULES))
        .and(body_string_contains("\"add\""))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "data": [{"id": "100", "value": "#food", "tag": "#food"}],
            "meta": {"summary": {"created": 1, "not_created": 0}}
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(RULES))
        .and(body_string_contains("\"delete\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "meta": {"summary": {"deleted": 1, "not_deleted": 0}}
        })))
        .mount(server)
        .await;
}

fn stream_body() -> String {
    let lines = [
        serde_json::json!({
            "data": {"id": "1", "text": "lunch #pizza"},
            "matching_rules": [{"id": "555", "tag": "#pizza"}]
        }),
        serde_json::json!({
            "data": {"id": "2", "text": "dinner #food #pasta"},
            "matching_rules": [{"id": "100", "tag": "#food"}]
        }),
    ];
    let mut body = String::new();
    for line in lines {
        body.push_str(&line.to_string());
        body.push_str("\r\n");
    }
    body
}

async fn wait_for_delete(server: &MockServer) -> bool {
    for _ in 0..100 {
        let requests = server.received_requests().await.unwrap_or_default();
        if requests
            .iter()
            .any(|req| String::from_utf8_lossy(&req.body).contains("\"delete\""))
        {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn rules_client_lists_rules() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(RULES))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [
                {"id": "1", "value": "#food", "tag": "#food"},
                {"id": "2", "value": "from:someone"}
            ]
        })))
        .mount(&server)
        .await;

    let rules = RulesClient::new(&config(&server)).expect("client");
    let listed = rules.list().await.expect("list");
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].tag.as_deref(), Some("#food"));
    assert_eq!(listed[1].tag, None);
}

#[tokio::test]
async fn duplicate_rule_is_reused() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(RULES))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "meta": {"summary": {"created": 0, "not_created": 1}},
            "errors": [{"title": "DuplicateRule", "value": "#food", "id": "77"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(RULES))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{"id": "77", "value": "#food", "tag": "#food"}]
        })))
        .mount(&server)
        .await;

    let rules = RulesClient::new(&config(&server)).expect("client");
    let rule = rules.add("#food", "#food").await.expect("add");
    assert_eq!(rule.id, "77");
}

#[tokio::test]
async fn rate_limit_is_reported_with_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(RULES))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
        .mount(&server)
        .await;

    let rules = RulesClient::new(&config(&server)).expect("client");
    let err = rules.list().await.expect_err("rate limited");
    assert!(
        matches!(err, TwitterError::RateLimited { retry_after: 7 }),
        "expected rate limit, got {err:?}"
    );
    assert!(err.is_retryable());
}

#[tokio::test]
async fn subscription_receives_only_its_tag_and_releases_rule() {
    let server = MockServer::start().await;
    mount_rules(&server).await;
    Mock::given(method("GET"))
        .and(path(STREAM))
        .respond_with(ResponseTemplate::new(200).set_body_string(stream_body()))
        .mount(&server)
        .await;

    let source = TwitterStreamSource::new(config(&server)).expect("source");
    let mut subscription = source.subscribe("#Food").await.expect("subscribe");
    assert_eq!(subscription.tag(), "#Food");
    assert_eq!(source.active_rules().await, 1);

    let item = tokio::time::timeout(Duration::from_secs(5), subscription.next())
        .await
        .expect("item before timeout");
    assert_eq!(item, Some(StreamItem::Text("dinner #food #pasta".into())));

    subscription.close();
    assert!(wait_for_delete(&server).await, "rule was not deleted");
    assert_eq!(source.active_rules().await, 0);
    source.shutdown().await;
}

#[tokio::test]
async fn rejected_token_fails_subscription() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(RULES))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&server)
        .await;

    let source = TwitterStreamSource::new(config(&server)).expect("source");
    let err = source.subscribe("#food").await.expect_err("unauthorized");
    assert!(
        matches!(&err, ExploreError::Subscription { tag, message }
            if tag == "#food" && message.contains("bearer token")),
        "unexpected error: {err:?}"
    );
    assert_eq!(source.active_rules().await, 0);
}

#[tokio::test]
async fn permanent_stream_failure_ends_subscriptions() {
    let server = MockServer::start().await;
    mount_rules(&server).await;
    Mock::given(method("GET"))
        .and(path(STREAM))
        .respond_with(ResponseTemplate::new(403).set_body_string("client not enrolled"))
        .mount(&server)
        .await;

    let source = TwitterStreamSource::new(config(&server)).expect("source");
    let mut subscription = source.subscribe("#food").await.expect("subscribe");

    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(item) = subscription.next().await {
            assert!(matches!(item, StreamItem::Unexpected { .. }));
        }
    })
    .await;
    assert!(drained.is_ok(), "subscription did not end");

    let err = source.subscribe("#pizza").await.expect_err("fatal source");
    assert!(matches!(err, ExploreError::Subscription { .. }));
}

#[test]
fn source_requires_token() {
    let err = TwitterStreamSource::new(TwitterConfig::default()).expect_err("no token");
    assert!(matches!(err, TwitterError::Config(_)));
}
