//! Settings layering: defaults, then the TOML file, then flags and env.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use serde::Deserialize;
use tagtrail_core::ExplorerConfig;
use tagtrail_twitter::TwitterConfig;

/// Exploration flags. Unset flags fall through to the file, then defaults.
#[derive(Args, Debug, Default)]
pub struct ExploreArgs {
    /// TOML file with `[explore]` and `[twitter]` sections.
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Tag to start from [default: #food].
    #[arg(long, short = 'f', value_name = "TAG")]
    pub first_search: Option<String>,

    /// Seconds each round aggregates before branching [default: 10].
    #[arg(long, value_name = "SECS")]
    pub round_secs: Option<u64>,

    /// Total seconds the exploration may run [default: 60].
    #[arg(long, value_name = "SECS")]
    pub duration_secs: Option<u64>,

    /// Skip tags already in the tree when choosing children [default: true].
    #[arg(long, value_name = "BOOL")]
    pub avoid_cycles: Option<bool>,

    /// Idle rounds in a row before restarting from the root [default: 3].
    #[arg(long, value_name = "N")]
    pub stall_limit: Option<u32>,

    /// Restarts allowed before stalled tasks give up [default: 2].
    #[arg(long, value_name = "N")]
    pub max_restarts: Option<u32>,

    /// Cap on exploration tasks over the whole run.
    #[arg(long, value_name = "N")]
    pub max_tasks: Option<usize>,
}

/// Where items come from.
#[derive(Args, Debug, Default)]
pub struct SourceArgs {
    /// Replay a local corpus (one item per line) instead of the live stream.
    #[arg(long, value_name = "FILE")]
    pub replay: Option<PathBuf>,

    /// App-only bearer token for the filtered stream.
    #[arg(
        long,
        short = 'b',
        env = tagtrail_twitter::BEARER_TOKEN_ENV,
        hide_env_values = true,
        value_name = "TOKEN"
    )]
    pub bearer_token: Option<String>,

    /// Override the Twitter API base URL.
    #[arg(long, env = tagtrail_twitter::API_URL_ENV, value_name = "URL")]
    pub api_url: Option<String>,
}

/// Contents of the `--config` file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileSettings {
    pub explore: ExplorerConfig,
    pub twitter: TwitterConfig,
}

impl FileSettings {
    /// Load and parse a settings file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let mut settings: Self = toml::from_str(raw)?;
        // Credentials only come from flags or the environment.
        settings.twitter.bearer_token = None;
        Ok(settings)
    }
}

/// Final settings for one run.
#[derive(Debug)]
pub struct Settings {
    pub explorer: ExplorerConfig,
    pub twitter: TwitterConfig,
}

impl Settings {
    /// Layer flags over the file over defaults.
    pub fn resolve(explore: &ExploreArgs, source: &SourceArgs) -> Result<Self> {
        let file = match &explore.config {
            Some(path) => FileSettings::load(path)?,
            None => FileSettings::default(),
        };
        Ok(Self::merge(file, explore, source))
    }

    pub fn merge(file: FileSettings, explore: &ExploreArgs, source: &SourceArgs) -> Self {
        let mut explorer = file.explore;
        if let Some(tag) = &explore.first_search {
            explorer = explorer.with_initial_tag(tag.clone());
        }
        if let Some(secs) = explore.round_secs {
            explorer = explorer.with_round_duration(Duration::from_secs(secs));
        }
        if let Some(secs) = explore.duration_secs {
            explorer = explorer.with_program_duration(Duration::from_secs(secs));
        }
        if let Some(enabled) = explore.avoid_cycles {
            explorer = explorer.with_avoid_cycles(enabled);
        }
        if let Some(limit) = explore.stall_limit {
            explorer = explorer.with_stall_limit(limit);
        }
        if let Some(restarts) = explore.max_restarts {
            explorer = explorer.with_max_restarts(restarts);
        }
        if explore.max_tasks.is_some() {
            explorer = explorer.with_max_tasks(explore.max_tasks);
        }

        let mut twitter = file.twitter;
        if let Some(token) = source.bearer_token.as_deref().filter(|t| !t.trim().is_empty()) {
            twitter = twitter.with_bearer_token(token);
        }
        if let Some(url) = &source.api_url {
            twitter = twitter.with_api_url(url.clone());
        }

        Self { explorer, twitter }
    }
}
