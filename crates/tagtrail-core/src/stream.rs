//! Stream collaborator interface.
//!
//! The engine only needs one thing from the outside world: given a tag, a
//! channel of text items that mention it. [`StreamSource`] is that seam;
//! connectors implement it, and [`MemorySource`] implements it over a local
//! corpus for offline runs and tests.

use std::io::BufRead;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::aggregator::{TagSet, extract_tags, tag_key};
use crate::error::{ExploreError, ExploreResult};

/// Default buffer between a source and the round loop.
pub const DEFAULT_SUBSCRIPTION_CAPACITY: usize = 256;

/// A value delivered by a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamItem {
    /// Text of one item (e.g. a tweet body).
    Text(String),

    /// Something the source could not turn into text.
    Unexpected { kind: String },
}

impl StreamItem {
    /// The item's text.
    ///
    /// # Errors
    /// Returns [`ExploreError::UnexpectedItemShape`] for non-text items.
    pub fn into_text(self) -> ExploreResult<String> {
        match self {
            Self::Text(text) => Ok(text),
            Self::Unexpected { kind } => Err(ExploreError::UnexpectedItemShape { kind }),
        }
    }
}

/// Open, filtered feed of items for one tag.
///
/// Dropping the handle closes it; producers observe this through
/// [`mpsc::Sender::closed`] and release whatever they hold for the filter.
#[derive(Debug)]
pub struct Subscription {
    tag: String,
    items: mpsc::Receiver<StreamItem>,
}

impl Subscription {
    #[must_use]
    pub fn new(tag: impl Into<String>, items: mpsc::Receiver<StreamItem>) -> Self {
        Self {
            tag: tag.into(),
            items,
        }
    }

    /// Create a subscription together with the sender a producer feeds.
    #[must_use]
    pub fn channel(tag: impl Into<String>, capacity: usize) -> (mpsc::Sender<StreamItem>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self::new(tag, rx))
    }

    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Next item, or `None` once the producer has finished.
    pub async fn next(&mut self) -> Option<StreamItem> {
        self.items.recv().await
    }

    /// Stop delivery.
    pub fn close(mut self) {
        self.items.close();
    }
}

/// Something that can open a filtered stream for a tag.
#[async_trait]
pub trait StreamSource: Send + Sync + 'static {
    /// Open a subscription for `tag`.
    ///
    /// # Errors
    /// Returns [`ExploreError::Subscription`] if the filter cannot be established.
    async fn subscribe(&self, tag: &str) -> ExploreResult<Subscription>;
}

#[async_trait]
impl<S: StreamSource + ?Sized> StreamSource for Arc<S> {
    async fn subscribe(&self, tag: &str) -> ExploreResult<Subscription> {
        (**self).subscribe(tag).await
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    items: Vec<String>,
    item_interval: Duration,
    refused: TagSet,
    subscriptions: AtomicUsize,
}

/// In-memory source over a fixed corpus.
///
/// A subscription to `#tag` replays every corpus item containing that tag
/// (case-insensitive), one per `item_interval`, then stays open and silent
/// until closed, like a quiet live stream.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    inner: Arc<MemoryInner>,
}

impl MemorySource {
    pub fn new<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            inner: Arc::new(MemoryInner {
                items: items.into_iter().map(Into::into).collect(),
                ..MemoryInner::default()
            }),
        }
    }

    /// Load one item per non-empty line.
    ///
    /// # Errors
    /// Propagates read errors.
    pub fn from_reader(reader: impl BufRead) -> std::io::Result<Self> {
        let mut items = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if !line.trim().is_empty() {
                items.push(line);
            }
        }
        Ok(Self::new(items))
    }

    fn with_inner(self, update: impl FnOnce(&mut MemoryInner)) -> Self {
        let mut inner = MemoryInner {
            items: self.inner.items.clone(),
            item_interval: self.inner.item_interval,
            refused: self.inner.refused.clone(),
            subscriptions: AtomicUsize::new(self.inner.subscriptions.load(Ordering::Relaxed)),
        };
        update(&mut inner);
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Pace replay at one item per `interval`.
    #[must_use]
    pub fn with_item_interval(self, interval: Duration) -> Self {
        self.with_inner(|inner| inner.item_interval = interval)
    }

    /// Make subscriptions to `tag` fail.
    #[must_use]
    pub fn with_refused_tag(self, tag: &str) -> Self {
        self.with_inner(|inner| {
            inner.refused.insert(tag);
        })
    }

    /// Number of items in the corpus.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.items.is_empty()
    }

    /// Subscriptions opened so far.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.load(Ordering::Relaxed)
    }

    fn matching(&self, tag: &str) -> Vec<String> {
        let key = tag_key(tag);
        self.inner
            .items
            .iter()
            .filter(|text| extract_tags(text).any(|t| tag_key(t) == key))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl StreamSource for MemorySource {
    async fn subscribe(&self, tag: &str) -> ExploreResult<Subscription> {
        if self.inner.refused.contains(tag) {
            return Err(ExploreError::subscription(tag, "filter refused"));
        }
        self.inner.subscriptions.fetch_add(1, Ordering::Relaxed);

        let matching = self.matching(tag);
        let interval = self.inner.item_interval;
        let (tx, subscription) = Subscription::channel(tag, DEFAULT_SUBSCRIPTION_CAPACITY);
        debug!(tag, items = matching.len(), "Replaying corpus");

        tokio::spawn(async move {
            for text in matching {
                if !interval.is_zero() {
                    tokio::time::sleep(interval).await;
                }
                if tx.send(StreamItem::Text(text)).await.is_err() {
                    return;
                }
            }
            tx.closed().await;
        });

        Ok(subscription)
    }
}
