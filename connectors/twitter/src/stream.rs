//! Twitter filtered stream client.
//!
//! Handles connection to Twitter's filtered stream API (v2), which delivers
//! newline-delimited JSON with blank keep-alive lines.

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    config::TwitterConfig,
    error::{TwitterError, TwitterResult},
    types::StreamTweet,
};

const STREAM_PATH: &str =
    "/2/tweets/search/stream?tweet.fields=id,text,author_id,created_at,entities";

/// A stream event from Twitter's filtered stream.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A tweet matching the filter rules.
    Tweet(StreamTweet),

    /// Stream connected successfully.
    Connected,

    /// Stream disconnected (will attempt reconnection).
    Disconnected { reason: String },

    /// Keep-alive heartbeat received.
    Heartbeat,

    /// Error object delivered in-band.
    Error(String),
}

/// Twitter filtered stream connection.
#[derive(Clone)]
pub struct FilteredStream {
    http: reqwest::Client,
    url: String,
    bearer_token: String,
    capacity: usize,
}

impl std::fmt::Debug for FilteredStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilteredStream")
            .field("url", &self.url)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

/// Handle for a single stream connection attempt.
pub struct StreamHandle {
    pub events: mpsc::Receiver<StreamEvent>,
    pub join_handle: tokio::task::JoinHandle<TwitterResult<()>>,
}

impl FilteredStream {
    /// Create a new filtered stream connection.
    ///
    /// # Errors
    /// Fails when the bearer token is missing or the HTTP client cannot be
    /// built.
    pub fn new(config: &TwitterConfig) -> TwitterResult<Self> {
        let bearer_token = config.require_bearer_token()?.to_string();
        // read_timeout is per chunk, so heartbeats keep the connection alive
        let http = reqwest::Client::builder()
            .read_timeout(config.stream_timeout())
            .build()?;

        Ok(Self {
            http,
            url: config.endpoint(STREAM_PATH),
            bearer_token,
            capacity: config.channel_capacity.max(1),
        })
    }

    /// Connect to the filtered stream once and return a handle for stream events.
    #[must_use]
    pub fn connect_once(&self) -> StreamHandle {
        let (event_tx, event_rx) = mpsc::channel(self.capacity);
        let this = self.clone();
        let join_handle = tokio::spawn(async move { this.run_once(event_tx).await });

        StreamHandle {
            events: event_rx,
            join_handle,
        }
    }

    async fn run_once(self, event_tx: mpsc::Sender<StreamEvent>) -> TwitterResult<()> {
        info!(url = %self.url, "Connecting to Twitter filtered stream");

        let response = match self.connect().await {
            Ok(response) => response,
            Err(err) => {
                let _ = event_tx.send(StreamEvent::Error(err.to_string())).await;
                return Err(err);
            }
        };

        if event_tx.send(StreamEvent::Connected).await.is_err() {
            info!("Event receiver dropped, stopping stream");
            return Ok(());
        }

        if let Err(e) = process_stream(response, &event_tx).await {
            warn!(error = %e, "Stream processing error");
            let _ = event_tx
                .send(StreamEvent::Disconnected {
                    reason: e.to_string(),
                })
                .await;
            return Err(e);
        }

        let _ = event_tx
            .send(StreamEvent::Disconnected {
                reason: "stream closed by server".into(),
            })
            .await;
        Ok(())
    }

    async fn connect(&self) -> TwitterResult<reqwest::Response> {
        let response = self
            .http
            .get(&self.url)
            .bearer_auth(&self.bearer_token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse().ok());
            let body = response.text().await.unwrap_or_default();
            return Err(TwitterError::from_status(status, body, retry_after));
        }

        Ok(response)
    }
}

/// Process incoming stream data.
async fn process_stream(
    response: reqwest::Response,
    event_tx: &mpsc::Sender<StreamEvent>,
) -> TwitterResult<()> {
    let mut stream = response.bytes_stream();
    let mut buffer = Vec::new();

    while let Some(chunk_result) = stream.next().await {
        let chunk: Bytes = chunk_result?;

        if is_heartbeat_chunk(&chunk) {
            debug!("Received heartbeat");
            if event_tx.send(StreamEvent::Heartbeat).await.is_err() {
                return Ok(());
            }
            continue;
        }

        buffer.extend_from_slice(&chunk);

        while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = buffer.drain(..=newline_pos).collect();
            let line_str = String::from_utf8_lossy(&line).trim().to_string();

            match parse_stream_line(&line_str) {
                Ok(Some(event)) => {
                    if let StreamEvent::Tweet(tweet) = &event {
                        debug!(tweet_id = %tweet.data.id, "Received stream tweet");
                    }
                    if event_tx.send(event).await.is_err() {
                        return Ok(());
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, data = %line_str, "Failed to parse stream data");
                }
            }
        }
    }

    Ok(())
}

fn parse_stream_line(line_str: &str) -> Result<Option<StreamEvent>, serde_json::Error> {
    if line_str.is_empty() {
        return Ok(None);
    }

    match serde_json::from_str::<StreamTweet>(line_str) {
        Ok(tweet) => Ok(Some(StreamEvent::Tweet(tweet))),
        Err(err) => {
            if let Some(msg) = extract_stream_error(line_str) {
                return Ok(Some(StreamEvent::Error(msg)));
            }
            Err(err)
        }
    }
}

fn extract_stream_error(line_str: &str) -> Option<String> {
    let error = serde_json::from_str::<serde_json::Value>(line_str).ok()?;
    if error.get("errors").is_some() || error.get("title").is_some() {
        let detail = error
            .get("detail")
            .or_else(|| error.get("title"))
            .or_else(|| {
                error
                    .get("errors")
                    .and_then(|errors| errors.get(0))
                    .and_then(|first| first.get("detail").or_else(|| first.get("title")))
            })
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown stream error");
        Some(detail.to_string())
    } else {
        None
    }
}

fn is_heartbeat_chunk(chunk: &Bytes) -> bool {
    chunk.is_empty() || chunk[..] == b"\r\n"[..]
}
