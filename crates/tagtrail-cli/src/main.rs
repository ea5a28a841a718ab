//! `tagtrail`: follow a hashtag's lineage through a live stream.
//!
//! Every round, the most and second most frequent co-occurring tags become
//! children of the tag being watched, and are explored in turn until the
//! time budget runs out. The lineage tree is printed breadth-first at the
//! end.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

mod settings;

use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser};
use tagtrail_core::{ExplorationEngine, ExplorerConfig, MemorySource, RunSummary, StreamSource};
use tagtrail_twitter::TwitterStreamSource;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use settings::{ExploreArgs, Settings, SourceArgs};

#[derive(Parser, Debug)]
#[command(name = "tagtrail", version, about = "Follow hashtag lineage through a live stream")]
struct Cli {
    #[command(flatten)]
    explore: ExploreArgs,

    #[command(flatten)]
    source: SourceArgs,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Log filter (overrides `RUST_LOG`), e.g. "debug" or "tagtrail_core=trace".
    #[arg(long, value_name = "FILTER")]
    log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long, default_value_t = false)]
    json_logs: bool,

    /// Also write the run summary as JSON to this file.
    #[arg(long, value_name = "PATH")]
    summary: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.output)?;

    let settings = Settings::resolve(&cli.explore, &cli.source)?;
    let summary = match &cli.source.replay {
        Some(path) => {
            let file =
                File::open(path).with_context(|| format!("opening replay {}", path.display()))?;
            let source = MemorySource::from_reader(BufReader::new(file))
                .with_context(|| format!("reading replay {}", path.display()))?;
            info!(path = %path.display(), items = source.len(), "Replaying local corpus");
            explore(settings.explorer, source).await?
        }
        None => {
            if settings.twitter.bearer_token.is_none() {
                bail!(
                    "no item source: pass --replay <FILE> or set {}",
                    tagtrail_twitter::BEARER_TOKEN_ENV
                );
            }
            let source = TwitterStreamSource::new(settings.twitter)
                .context("configuring the Twitter stream")?;
            match source.clear_rules().await {
                Ok(0) => {}
                Ok(cleared) => info!(cleared, "Removed rules left by an earlier run"),
                Err(err) => warn!(error = %err, "Could not clear stale stream rules"),
            }
            let summary = explore(settings.explorer, source.clone()).await;
            source.shutdown().await;
            summary?
        }
    };

    if let Some(path) = &cli.output.summary {
        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(path, json)
            .with_context(|| format!("writing summary {}", path.display()))?;
    }
    Ok(())
}

/// Run the engine to completion and print the report to stdout.
async fn explore<S: StreamSource>(config: ExplorerConfig, source: S) -> Result<RunSummary> {
    let engine = ExplorationEngine::new(config, source).context("invalid exploration settings")?;
    let summary = engine.run().await;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    tagtrail_core::write_report(engine.tree(), &mut out).context("writing report")?;
    out.flush()?;

    info!(
        rounds = summary.rounds_completed,
        stalls = summary.stalls,
        restarts = summary.restarts,
        subscription_failures = summary.subscription_failures,
        "Run summary"
    );
    Ok(summary)
}

fn init_tracing(output: &OutputArgs) -> Result<()> {
    let filter = match &output.log_level {
        Some(level) => EnvFilter::try_new(level).context("invalid --log-level")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    let registry = tracing_subscriber::registry().with(filter);
    if output.json_logs {
        registry
            .with(fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(io::stderr)).init();
    }
    Ok(())
}
