//! [`StreamSource`] over the shared filtered stream.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tagtrail_core::aggregator::tag_key;
use tagtrail_core::{ExploreError, ExploreResult, StreamItem, StreamSource, Subscription, is_tag};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::{
    config::TwitterConfig,
    error::TwitterResult,
    rules::RulesClient,
    stream::{FilteredStream, StreamEvent},
};

type FatalSlot = Arc<parking_lot::Mutex<Option<String>>>;

/// Installed rule shared by every subscription to the same tag.
#[derive(Debug)]
struct RuleLease {
    rule_id: String,
    holders: usize,
}

struct SourceInner {
    config: TwitterConfig,
    rules: RulesClient,
    stream: FilteredStream,
    events: broadcast::Sender<StreamEvent>,
    leases: tokio::sync::Mutex<HashMap<String, RuleLease>>,
    pump: parking_lot::Mutex<Option<JoinHandle<()>>>,
    fatal: FatalSlot,
}

impl Drop for SourceInner {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.get_mut().take() {
            pump.abort();
        }
    }
}

impl SourceInner {
    /// Take a hold on the rule for `rule_tag`, installing it on first use.
    ///
    /// Hashtag matching is case-insensitive on the server, so the rule value
    /// and the rule tag are both the lowercased tag.
    async fn acquire(&self, rule_tag: &str) -> TwitterResult<String> {
        let mut leases = self.leases.lock().await;
        if let Some(lease) = leases.get_mut(rule_tag) {
            lease.holders += 1;
            return Ok(lease.rule_id.clone());
        }
        let rule = self.rules.add(rule_tag, rule_tag).await?;
        leases.insert(
            rule_tag.to_string(),
            RuleLease {
                rule_id: rule.id.clone(),
                holders: 1,
            },
        );
        Ok(rule.id)
    }

    /// Drop a hold; the last holder deletes the rule.
    async fn release(&self, rule_tag: &str) {
        let mut leases = self.leases.lock().await;
        let Some(lease) = leases.get_mut(rule_tag) else {
            return;
        };
        lease.holders = lease.holders.saturating_sub(1);
        if lease.holders > 0 {
            return;
        }
        let Some(lease) = leases.remove(rule_tag) else {
            return;
        };
        match self.rules.delete(std::slice::from_ref(&lease.rule_id)).await {
            Ok(_) => debug!(rule_tag, rule_id = %lease.rule_id, "Released stream rule"),
            Err(err) => warn!(rule_tag, error = %err, "Failed to delete stream rule"),
        }
    }

    fn fatal(&self) -> Option<String> {
        self.fatal.lock().clone()
    }

    fn ensure_pump(&self) {
        let mut pump = self.pump.lock();
        if pump.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        if self.fatal().is_some() {
            return;
        }
        *pump = Some(tokio::spawn(run_pump(
            self.stream.clone(),
            self.config.clone(),
            self.events.clone(),
            Arc::clone(&self.fatal),
        )));
    }
}

/// Tag source backed by the v2 filtered stream.
///
/// Cheap to clone; clones share the connection and the rule leases.
#[derive(Clone)]
pub struct TwitterStreamSource {
    inner: Arc<SourceInner>,
}

impl std::fmt::Debug for TwitterStreamSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwitterStreamSource")
            .field("config", &self.inner.config)
            .field("fatal", &self.inner.fatal())
            .finish_non_exhaustive()
    }
}

impl TwitterStreamSource {
    /// Create a source. No connection is made until the first subscription.
    ///
    /// # Errors
    /// Returns [`crate::TwitterError::Config`] for invalid settings.
    pub fn new(config: TwitterConfig) -> TwitterResult<Self> {
        config.validate()?;
        let rules = RulesClient::new(&config)?;
        let stream = FilteredStream::new(&config)?;
        let (events, _) = broadcast::channel(config.channel_capacity);

        Ok(Self {
            inner: Arc::new(SourceInner {
                config,
                rules,
                stream,
                events,
                leases: tokio::sync::Mutex::new(HashMap::new()),
                pump: parking_lot::Mutex::new(None),
                fatal: Arc::new(parking_lot::Mutex::new(None)),
            }),
        })
    }

    /// Rules client used for this source.
    #[must_use]
    pub fn rules(&self) -> &RulesClient {
        &self.inner.rules
    }

    /// Number of tags currently holding a rule.
    pub async fn active_rules(&self) -> usize {
        self.inner.leases.lock().await.len()
    }

    /// Delete hashtag rules left behind by an earlier run.
    ///
    /// # Errors
    /// Returns HTTP, API, or decoding failures.
    pub async fn clear_rules(&self) -> TwitterResult<usize> {
        let stale: Vec<String> = self
            .inner
            .rules
            .list()
            .await?
            .into_iter()
            .filter(|rule| rule.tag.as_deref().is_some_and(is_tag))
            .map(|rule| rule.id)
            .collect();
        if stale.is_empty() {
            return Ok(0);
        }
        let deleted = self.inner.rules.delete(&stale).await?;
        info!(deleted, "Cleared stale stream rules");
        Ok(deleted)
    }

    /// Stop the connection and delete every leased rule.
    pub async fn shutdown(&self) {
        if let Some(pump) = self.inner.pump.lock().take() {
            pump.abort();
        }
        let ids: Vec<String> = self
            .inner
            .leases
            .lock()
            .await
            .drain()
            .map(|(_, lease)| lease.rule_id)
            .collect();
        if let Err(err) = self.inner.rules.delete(&ids).await {
            warn!(error = %err, "Failed to delete stream rules on shutdown");
        }
    }
}

#[async_trait]
impl StreamSource for TwitterStreamSource {
    async fn subscribe(&self, tag: &str) -> ExploreResult<Subscription> {
        if let Some(reason) = self.inner.fatal() {
            return Err(ExploreError::subscription(tag, reason));
        }

        // Receiver first, so nothing delivered after the rule lands is missed.
        let events = self.inner.events.subscribe();
        let rule_tag = tag_key(tag);
        let rule_id = self
            .inner
            .acquire(&rule_tag)
            .await
            .map_err(|err| err.to_subscription_error(tag))?;
        self.inner.ensure_pump();

        let (tx, subscription) = Subscription::channel(tag, self.inner.config.channel_capacity);
        tokio::spawn(forward(
            Arc::clone(&self.inner),
            rule_tag,
            rule_id,
            events,
            tx,
        ));
        Ok(subscription)
    }
}

/// Route matching tweets to one subscription until it is closed.
async fn forward(
    inner: Arc<SourceInner>,
    rule_tag: String,
    rule_id: String,
    mut events: broadcast::Receiver<StreamEvent>,
    tx: mpsc::Sender<StreamItem>,
) {
    loop {
        let received = tokio::select! {
            () = tx.closed() => break,
            received = events.recv() => received,
        };
        match received {
            Ok(StreamEvent::Tweet(tweet)) => {
                let selected = tweet.matches_rule(&rule_tag)
                    || tweet.matching_rules.iter().any(|rule| rule.id == rule_id);
                if selected && tx.send(StreamItem::Text(tweet.data.text)).await.is_err() {
                    break;
                }
            }
            Ok(StreamEvent::Error(message)) => {
                if inner.fatal().is_some() {
                    break;
                }
                let _ = tx.try_send(StreamItem::Unexpected {
                    kind: format!("stream error: {message}"),
                });
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(tag = %rule_tag, skipped, "Subscription fell behind the stream");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    inner.release(&rule_tag).await;
}

/// Keep the shared connection up, fanning its events out to subscribers.
async fn run_pump(
    stream: FilteredStream,
    config: TwitterConfig,
    events: broadcast::Sender<StreamEvent>,
    fatal: FatalSlot,
) {
    let mut attempt = 0u32;
    loop {
        let mut handle = stream.connect_once();
        while let Some(event) = handle.events.recv().await {
            match &event {
                StreamEvent::Connected => {
                    info!("Filtered stream connected");
                    attempt = 0;
                }
                StreamEvent::Disconnected { reason } => {
                    warn!(reason = %reason, "Filtered stream disconnected");
                }
                _ => {}
            }
            // No receivers is fine; nothing is subscribed right now.
            let _ = events.send(event);
        }

        let delay = match handle.join_handle.await {
            Ok(Ok(())) => config.reconnect_delay(attempt),
            Ok(Err(err)) if !err.is_retryable() => {
                error!(error = %err, "Filtered stream failed permanently");
                *fatal.lock() = Some(err.to_string());
                let _ = events.send(StreamEvent::Error(err.to_string()));
                return;
            }
            Ok(Err(err)) => err
                .retry_after()
                .unwrap_or_else(|| config.reconnect_delay(attempt)),
            Err(join_err) => {
                warn!(error = %join_err, "Filtered stream task ended abnormally");
                config.reconnect_delay(attempt)
            }
        };

        debug!(attempt, delay_ms = delay.as_millis(), "Reconnecting filtered stream");
        tokio::time::sleep(delay).await;
        attempt = attempt.saturating_add(1);
    }
}
