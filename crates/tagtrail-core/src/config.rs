//! Exploration settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::aggregator::is_tag;
use crate::error::{ExploreError, ExploreResult};

/// Settings consumed by the exploration engine.
///
/// Durations are stored in milliseconds so the struct reads naturally from
/// TOML or JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    /// Tag at the root of the lineage tree.
    /// Default: `#food`.
    pub initial_tag: String,

    /// Length of one aggregation round (milliseconds).
    /// Default: 10000.
    pub round_duration_ms: u64,

    /// Wall-clock budget for the whole run (milliseconds).
    ///
    /// Checked cooperatively by every task; a task past the deadline exits
    /// without spawning children.
    /// Default: 60000.
    pub program_duration_ms: u64,

    /// Exclude tags already present anywhere in the tree from selection.
    /// Default: true.
    pub avoid_cycles: bool,

    /// Consecutive idle rounds before a task escalates to a full restart.
    /// Default: 3.
    pub stall_limit: u32,

    /// Full restarts allowed per run. Past this, a stalled task just exits.
    /// Default: 2.
    pub max_restarts: u32,

    /// Cap on exploration tasks spawned per epoch; a restart starts a fresh
    /// count so the new root always runs. `None` is unbounded:
    /// every completed round doubles the live frontier until the deadline.
    /// Default: None.
    pub max_tasks: Option<usize>,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            initial_tag: "#food".to_string(),
            round_duration_ms: 10_000,
            program_duration_ms: 60_000,
            avoid_cycles: true,
            stall_limit: 3,
            max_restarts: 2,
            max_tasks: None,
        }
    }
}

impl ExplorerConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_initial_tag(mut self, tag: impl Into<String>) -> Self {
        self.initial_tag = tag.into();
        self
    }

    #[must_use]
    pub const fn with_round_duration(mut self, duration: Duration) -> Self {
        self.round_duration_ms = duration_ms(duration);
        self
    }

    #[must_use]
    pub const fn with_program_duration(mut self, duration: Duration) -> Self {
        self.program_duration_ms = duration_ms(duration);
        self
    }

    #[must_use]
    pub const fn with_avoid_cycles(mut self, enabled: bool) -> Self {
        self.avoid_cycles = enabled;
        self
    }

    #[must_use]
    pub const fn with_stall_limit(mut self, limit: u32) -> Self {
        self.stall_limit = limit;
        self
    }

    #[must_use]
    pub const fn with_max_restarts(mut self, restarts: u32) -> Self {
        self.max_restarts = restarts;
        self
    }

    #[must_use]
    pub const fn with_max_tasks(mut self, max_tasks: Option<usize>) -> Self {
        self.max_tasks = max_tasks;
        self
    }

    #[must_use]
    pub const fn round_duration(&self) -> Duration {
        Duration::from_millis(self.round_duration_ms)
    }

    #[must_use]
    pub const fn program_duration(&self) -> Duration {
        Duration::from_millis(self.program_duration_ms)
    }

    /// Reject settings the engine cannot run with.
    ///
    /// # Errors
    /// Returns [`ExploreError::InvalidConfig`] describing the first problem.
    pub fn validate(&self) -> ExploreResult<()> {
        if !is_tag(&self.initial_tag) {
            return Err(ExploreError::InvalidConfig(format!(
                "initial tag must look like #tag, got {:?}",
                self.initial_tag
            )));
        }
        if self.initial_tag.split_whitespace().count() != 1 {
            return Err(ExploreError::InvalidConfig(
                "initial tag must be a single token".into(),
            ));
        }
        if self.round_duration_ms == 0 {
            return Err(ExploreError::InvalidConfig(
                "round duration must be non-zero".into(),
            ));
        }
        if self.program_duration_ms == 0 {
            return Err(ExploreError::InvalidConfig(
                "program duration must be non-zero".into(),
            ));
        }
        if self.stall_limit == 0 {
            return Err(ExploreError::InvalidConfig(
                "stall limit must be at least 1".into(),
            ));
        }
        if self.max_tasks == Some(0) {
            return Err(ExploreError::InvalidConfig(
                "max tasks must allow the root task".into(),
            ));
        }
        Ok(())
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn duration_ms(duration: Duration) -> u64 {
    duration.as_millis() as u64
}
