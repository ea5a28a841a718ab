//! tagtrail core
//!
//! Explores a live stream of short text items for hashtags that co-occur with
//! the tag currently being tracked, and records which tag led to which in a
//! lineage tree.
//!
//! ## Pipeline
//!
//! - [`aggregator`]: per-round tag counting
//! - [`selector`]: best / second-best choice with exclusion and fallback
//! - [`tree`]: shared lineage tree (arena + reader/writer lock)
//! - [`engine`]: round loop, fan-out, deadlines, stall escalation
//! - [`reporter`]: breadth-first rendering over [`queue::BoundedQueue`]
//!
//! The stream itself is an external collaborator reached through
//! [`stream::StreamSource`].

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod aggregator;
pub mod config;
pub mod engine;
pub mod error;
pub mod queue;
pub mod reporter;
pub mod selector;
pub mod stream;
pub mod tree;

pub use aggregator::{RoundAggregator, RoundCounts, TagCount, TagSet, extract_tags, is_tag};
pub use config::ExplorerConfig;
pub use engine::{ExplorationEngine, RunSummary, TaskOutcome};
pub use error::{ExploreError, ExploreResult};
pub use queue::BoundedQueue;
pub use reporter::{INITIAL_SEARCH, render, render_snapshot, write_report};
pub use selector::{Selection, TagScore, select_best_pair};
pub use stream::{MemorySource, StreamItem, StreamSource, Subscription};
pub use tree::{ChildSpec, ExplorationTree, NodeId, TreeNode, TreeSnapshot};

/// Marker character that starts a tag token.
pub const TAG_MARKER: char = '#';
