//! tagtrail Twitter/X source
//!
//! Implements [`tagtrail_core::StreamSource`] on top of the v2 filtered
//! stream.
//!
//! The filtered stream is one connection per app whose contents are driven
//! by server-side rules. Each tag subscription therefore:
//!
//! - leases a stream rule whose value and tag are the lowercased hashtag,
//! - listens on a broadcast of everything the shared connection delivers,
//! - forwards tweets whose `matching_rules` carry its rule tag,
//! - releases the rule when the subscription is closed.
//!
//! Authentication uses an app-only bearer token.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod config;
mod error;
mod rules;
mod source;
mod stream;
mod types;

pub use config::{API_URL_ENV, BEARER_TOKEN_ENV, DEFAULT_API_URL, TwitterConfig};
pub use error::{TwitterError, TwitterResult};
pub use rules::RulesClient;
pub use source::TwitterStreamSource;
pub use stream::{FilteredStream, StreamEvent, StreamHandle};
pub use types::{MatchingRule, StreamRule, StreamTweet, Tweet};
