//! Exploration engine.
//!
//! One task per tag being explored. Each task runs rounds against its own
//! subscription until a round observes at least one item, then records the
//! best/second pair under its node and spawns one task per child:
//!
//! ```text
//! Subscribing ─► Accumulating ─┬─► RoundComplete ─► BranchAndRecurse (2 tasks)
//!                              ├─► ProgramDeadlineReached ─► exit
//!                              └─► StreamIdle ─► sleep, resubscribe
//!                                               └─ stall limit ─► full restart
//! ```
//!
//! # Growth
//!
//! Every completed round adds two live tasks, so the frontier doubles each
//! round until the program deadline. Nothing else bounds it unless
//! [`ExplorerConfig::max_tasks`] is set; with it, children past the cap are
//! still recorded in the tree but never explored. The cap counts tasks per
//! epoch, so the root spawned by a restart always runs.
//!
//! # Clocks
//!
//! The program deadline and the round deadline are explicit `Instant`s.
//! Every wait is bounded by the earlier of the two and both are re-read
//! after it, so a restart that moves the program clock is observed at the
//! next wakeup.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::{Instant, sleep_until, timeout_at};
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::aggregator::{RoundAggregator, RoundCounts, TagSet};
use crate::config::ExplorerConfig;
use crate::error::{ExploreError, ExploreResult};
use crate::reporter;
use crate::selector::select_best_pair;
use crate::stream::{StreamSource, Subscription};
use crate::tree::{ChildSpec, ExplorationTree, NodeId};

/// How an exploration task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Round completed; two children were recorded and handed off.
    Branched,
    /// The program deadline passed.
    DeadlineReached,
    /// The source refused the filter.
    SubscriptionFailed,
    /// The tree rejected the insert.
    InsertFailed,
    /// The tree was reset under this task.
    Superseded,
    /// This task triggered a full restart.
    Restarted,
    /// Stalled with no restarts left.
    StallLimitExceeded,
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub tasks_spawned: usize,
    pub rounds_completed: usize,
    pub stalls: usize,
    pub restarts: usize,
    pub subscription_failures: usize,
    pub insert_failures: usize,
    pub deadline_exits: usize,
    pub skipped_children: usize,
    /// Nodes in the final tree, root included.
    pub nodes: usize,
    pub max_depth: usize,
    pub epoch: u64,
}

#[derive(Debug, Default)]
struct EngineStats {
    tasks_spawned: AtomicUsize,
    rounds_completed: AtomicUsize,
    stalls: AtomicUsize,
    restarts: AtomicUsize,
    subscription_failures: AtomicUsize,
    insert_failures: AtomicUsize,
    deadline_exits: AtomicUsize,
    skipped_children: AtomicUsize,
    /// Tasks admitted in the current epoch; what `max_tasks` caps.
    epoch_tasks: AtomicUsize,
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Program start and budget; restarted on escalation.
#[derive(Debug)]
struct ProgramClock {
    started: RwLock<Instant>,
    budget: Duration,
}

impl ProgramClock {
    fn new(budget: Duration) -> Self {
        Self {
            started: RwLock::new(Instant::now()),
            budget,
        }
    }

    fn restart(&self) {
        *self.started.write() = Instant::now();
    }

    fn deadline(&self) -> Instant {
        *self.started.read() + self.budget
    }
}

/// Join barrier over a set of tasks that keeps growing while it is awaited.
#[derive(Debug, Default)]
struct TaskGroup {
    live: AtomicUsize,
    idle: Notify,
}

/// Held by a running task; releases its slot in the group on drop.
struct TaskGuard {
    group: Arc<TaskGroup>,
}

impl TaskGroup {
    fn enter(self: &Arc<Self>) -> TaskGuard {
        self.live.fetch_add(1, Ordering::SeqCst);
        TaskGuard {
            group: Arc::clone(self),
        }
    }

    fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.live() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if self.group.live.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.group.idle.notify_waiters();
        }
    }
}

struct Shared<S> {
    config: ExplorerConfig,
    source: S,
    tree: ExplorationTree,
    clock: ProgramClock,
    tasks: Arc<TaskGroup>,
    stats: EngineStats,
    restart_lock: Mutex<()>,
}

enum RoundEnd {
    Complete(RoundCounts),
    DeadlineReached,
}

/// Drives exploration from the initial tag until every task has ended.
pub struct ExplorationEngine<S> {
    shared: Arc<Shared<S>>,
}

impl<S: StreamSource> ExplorationEngine<S> {
    /// Build an engine over `source`.
    ///
    /// # Errors
    /// Returns [`ExploreError::InvalidConfig`] if `config` does not validate.
    pub fn new(config: ExplorerConfig, source: S) -> ExploreResult<Self> {
        config.validate()?;
        let tree = ExplorationTree::new(&config.initial_tag);
        let clock = ProgramClock::new(config.program_duration());
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                source,
                tree,
                clock,
                tasks: Arc::new(TaskGroup::default()),
                stats: EngineStats::default(),
                restart_lock: Mutex::new(()),
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &ExplorerConfig {
        &self.shared.config
    }

    /// The lineage tree built so far.
    #[must_use]
    pub fn tree(&self) -> &ExplorationTree {
        &self.shared.tree
    }

    /// Tasks still running.
    #[must_use]
    pub fn live_tasks(&self) -> usize {
        self.shared.tasks.live()
    }

    /// Explore from the initial tag and wait until every task has ended.
    pub async fn run(&self) -> RunSummary {
        let shared = &self.shared;
        shared.clock.restart();
        info!(
            tag = %shared.config.initial_tag,
            round_ms = shared.config.round_duration_ms,
            program_ms = shared.config.program_duration_ms,
            avoid_cycles = shared.config.avoid_cycles,
            "Starting exploration"
        );

        let root = shared.tree.root();
        spawn_task(shared, root.tag, root.id, shared.tree.epoch());
        shared.tasks.wait_idle().await;

        let summary = self.summary();
        info!(
            nodes = summary.nodes,
            max_depth = summary.max_depth,
            tasks = summary.tasks_spawned,
            restarts = summary.restarts,
            "Exploration finished"
        );
        summary
    }

    /// Counters so far.
    #[must_use]
    pub fn summary(&self) -> RunSummary {
        let stats = &self.shared.stats;
        let load = |counter: &AtomicUsize| counter.load(Ordering::Relaxed);
        let snapshot = self.shared.tree.snapshot();
        RunSummary {
            tasks_spawned: load(&stats.tasks_spawned),
            rounds_completed: load(&stats.rounds_completed),
            stalls: load(&stats.stalls),
            restarts: load(&stats.restarts),
            subscription_failures: load(&stats.subscription_failures),
            insert_failures: load(&stats.insert_failures),
            deadline_exits: load(&stats.deadline_exits),
            skipped_children: load(&stats.skipped_children),
            nodes: snapshot.len(),
            max_depth: snapshot.max_depth(),
            epoch: snapshot.epoch(),
        }
    }

    /// Breadth-first report of the tree.
    #[must_use]
    pub fn report(&self) -> Vec<String> {
        reporter::render(&self.shared.tree)
    }
}

/// Start a task exploring `tag` under `node`, unless the task cap is reached.
///
/// The cap counts tasks per epoch, so the root spawned by a restart is
/// always admitted.
fn spawn_task<S: StreamSource>(shared: &Arc<Shared<S>>, tag: String, node: NodeId, epoch: u64) {
    if shared.tree.epoch() != epoch {
        debug!(tag = %tag, "Tree was reset; not starting task");
        return;
    }
    let max_tasks = shared.config.max_tasks;
    let admitted = shared
        .stats
        .epoch_tasks
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |spawned| {
            max_tasks
                .is_none_or(|max| spawned < max)
                .then_some(spawned + 1)
        })
        .is_ok();
    if !admitted {
        bump(&shared.stats.skipped_children);
        debug!(tag = %tag, "Task cap reached; leaving node unexplored");
        return;
    }
    bump(&shared.stats.tasks_spawned);

    let guard = shared.tasks.enter();
    let span = info_span!("explore", tag = %tag, node = node.0, epoch);
    let shared = Arc::clone(shared);
    tokio::spawn(
        async move {
            let _guard = guard;
            let outcome = explore(shared, tag, node, epoch).await;
            debug!(?outcome, "Task ended");
        }
        .instrument(span),
    );
}

async fn explore<S: StreamSource>(
    shared: Arc<Shared<S>>,
    tag: String,
    node: NodeId,
    epoch: u64,
) -> TaskOutcome {
    let mut stalls = 0u32;
    loop {
        if shared.tree.epoch() != epoch {
            return TaskOutcome::Superseded;
        }
        if Instant::now() >= shared.clock.deadline() {
            bump(&shared.stats.deadline_exits);
            return TaskOutcome::DeadlineReached;
        }

        let mut subscription = match shared.source.subscribe(&tag).await {
            Ok(subscription) => subscription,
            Err(err) => {
                bump(&shared.stats.subscription_failures);
                warn!(error = %err, "Subscription failed; ending task");
                return TaskOutcome::SubscriptionFailed;
            }
        };
        let round = accumulate(&shared, &mut subscription).await;
        subscription.close();

        let counts = match round {
            RoundEnd::Complete(counts) => counts,
            RoundEnd::DeadlineReached => {
                bump(&shared.stats.deadline_exits);
                debug!("Program deadline reached mid-round");
                return TaskOutcome::DeadlineReached;
            }
        };

        if counts.items() > 0 {
            bump(&shared.stats.rounds_completed);
            return branch(&shared, &tag, node, epoch, &counts);
        }

        stalls += 1;
        bump(&shared.stats.stalls);
        if stalls >= shared.config.stall_limit {
            return escalate(&shared, epoch);
        }
        warn!(stalls, "No items this round; backing off");
        let wake = (Instant::now() + shared.config.round_duration()).min(shared.clock.deadline());
        sleep_until(wake).await;
    }
}

/// Feed one round of items into an aggregator.
async fn accumulate<S>(shared: &Shared<S>, subscription: &mut Subscription) -> RoundEnd {
    let mut aggregator = RoundAggregator::new();
    let round_end = Instant::now() + shared.config.round_duration();

    loop {
        let deadline = shared.clock.deadline();
        let now = Instant::now();
        if now >= deadline {
            return RoundEnd::DeadlineReached;
        }
        if now >= round_end {
            break;
        }

        match timeout_at(round_end.min(deadline), subscription.next()).await {
            Ok(Some(item)) => match item.into_text() {
                Ok(text) => aggregator.observe(&text),
                Err(err) => warn!(error = %err, "Skipping stream item"),
            },
            Ok(None) => {
                debug!(items = aggregator.items(), "Stream ended before round deadline");
                break;
            }
            Err(_elapsed) => {}
        }
    }

    debug!(items = aggregator.items(), "Round closed");
    RoundEnd::Complete(aggregator.into_counts())
}

/// Select, record and fan out.
fn branch<S: StreamSource>(
    shared: &Arc<Shared<S>>,
    tag: &str,
    node: NodeId,
    epoch: u64,
    counts: &RoundCounts,
) -> TaskOutcome {
    let excluded = if shared.config.avoid_cycles {
        shared.tree.visited_tags()
    } else {
        TagSet::new()
    };
    let selection = select_best_pair(counts, tag, &excluded);

    let inserted = shared.tree.insert_at(
        epoch,
        node,
        ChildSpec {
            tag: &selection.best.tag,
            frequency: selection.best.frequency,
        },
        ChildSpec {
            tag: &selection.second.tag,
            frequency: selection.second.frequency,
        },
        selection.total,
    );
    let (best, second) = match inserted {
        Ok(pair) => pair,
        Err(ExploreError::StaleEpoch { .. }) => return TaskOutcome::Superseded,
        Err(err) => {
            bump(&shared.stats.insert_failures);
            error!(error = %err, "Failed to record round result");
            return TaskOutcome::InsertFailed;
        }
    };

    info!(
        best = %best.tag,
        best_frequency = best.round_frequency,
        second = %second.tag,
        second_frequency = second.round_frequency,
        total = selection.total,
        depth = best.depth,
        "Round complete"
    );
    for child in [best, second] {
        spawn_task(shared, child.tag, child.id, epoch);
    }
    TaskOutcome::Branched
}

/// Full restart after repeated stalls: new root, new clock, new epoch.
fn escalate<S: StreamSource>(shared: &Arc<Shared<S>>, epoch: u64) -> TaskOutcome {
    let new_epoch = {
        let _restarting = shared.restart_lock.lock();
        if shared.tree.epoch() != epoch {
            return TaskOutcome::Superseded;
        }
        let restarts = shared.stats.restarts.load(Ordering::Relaxed);
        if restarts >= shared.config.max_restarts as usize {
            warn!(restarts, "Stall limit reached with no restarts left; ending task");
            return TaskOutcome::StallLimitExceeded;
        }
        bump(&shared.stats.restarts);
        let new_epoch = shared.tree.reset(&shared.config.initial_tag);
        shared.stats.epoch_tasks.store(0, Ordering::SeqCst);
        shared.clock.restart();
        new_epoch
    };

    warn!(epoch = new_epoch, "Stream idle; restarting exploration");
    spawn_task(
        shared,
        shared.config.initial_tag.clone(),
        NodeId::ROOT,
        new_epoch,
    );
    TaskOutcome::Restarted
}
