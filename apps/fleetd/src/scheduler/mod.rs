//! Timers that fire fleet-wide passes.
//!
//! Every pass runs as its own task on a `TaskTracker`, so shutdown can stop the timers and
//! then wait for whatever is in flight. A pass is never cancelled once started.

pub mod passes;

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use fleet_core::proto::TaskKind;

use crate::config::OverlapPolicy;
use crate::fleet::Fleet;

const KINDS: usize = TaskKind::ALL.len();

#[derive(Debug, Default)]
struct RunCounters {
    running: [AtomicUsize; KINDS],
}

/// Marks one run of a task kind; releases the slot when dropped.
struct RunGuard {
    counters: Arc<RunCounters>,
    kind: TaskKind,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.counters.running[self.kind.index()].fetch_sub(1, Ordering::AcqRel);
    }
}

pub struct Scheduler {
    fleet: Arc<Fleet>,
    overlap: OverlapPolicy,
    counters: Arc<RunCounters>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub fn new(fleet: Arc<Fleet>) -> Arc<Self> {
        let overlap = fleet.config().scheduler.overlap;
        Arc::new(Self {
            fleet,
            overlap,
            counters: Arc::new(RunCounters::default()),
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn fleet(&self) -> &Arc<Fleet> {
        &self.fleet
    }

    /// Starts every timer with a non-zero interval. Player sync and save sync also fire once
    /// right away; backups wait for their first interval.
    pub fn start(self: &Arc<Self>) {
        let config = self.fleet.config();
        let timers = [
            (TaskKind::PlayerSync, config.task.sync_every(), true),
            (TaskKind::SaveSync, config.save.sync_every(), true),
            (TaskKind::Backup, config.save.backup_every(), false),
            (TaskKind::CacheEviction, Some(config.cache.every()), false),
        ];
        for (kind, every, at_start) in timers {
            match every {
                Some(every) => self.spawn_timer(kind, every, at_start),
                None => info!(task = kind.as_str(), "interval is 0, timer disabled"),
            }
        }
    }

    fn spawn_timer(self: &Arc<Self>, kind: TaskKind, every: Duration, at_start: bool) {
        let scheduler = Arc::clone(self);
        let first = if at_start { Instant::now() } else { Instant::now() + every };
        info!(task = kind.as_str(), every_secs = every.as_secs(), at_start, "timer started");

        self.tracker.spawn(async move {
            let mut ticks = tokio::time::interval_at(first, every);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = scheduler.shutdown.cancelled() => break,
                    _ = ticks.tick() => {
                        scheduler.fire(kind);
                        debug!(task = kind.as_str(), "timer sleeping for {}s", every.as_secs());
                    }
                }
            }
            debug!(task = kind.as_str(), "timer stopped");
        });
    }

    /// Launches a pass of `kind` in the background. Returns false when the overlap policy
    /// dropped the fire or the scheduler is shutting down.
    pub fn fire(self: &Arc<Self>, kind: TaskKind) -> bool {
        if self.shutdown.is_cancelled() {
            return false;
        }
        let Some(guard) = self.try_begin(kind) else {
            info!(task = kind.as_str(), "previous run still in progress, skipping");
            return false;
        };
        let fleet = Arc::clone(&self.fleet);
        self.tracker.spawn(async move {
            let _guard = guard;
            passes::run(&fleet, kind).await;
        });
        true
    }

    /// Runs a one-off job (a trigger-now request) under the same shutdown tracking as passes.
    pub fn spawn_tracked<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(job);
    }

    fn try_begin(&self, kind: TaskKind) -> Option<RunGuard> {
        let slot = &self.counters.running[kind.index()];
        match self.overlap {
            OverlapPolicy::Skip => {
                slot.compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire).ok()?;
            }
            OverlapPolicy::Allow => {
                slot.fetch_add(1, Ordering::AcqRel);
            }
        }
        Some(RunGuard {
            counters: Arc::clone(&self.counters),
            kind,
        })
    }

    pub fn running(&self) -> Vec<TaskKind> {
        TaskKind::ALL
            .into_iter()
            .filter(|kind| self.counters.running[kind.index()].load(Ordering::Acquire) > 0)
            .collect()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stops the timers and waits for in-flight passes and jobs to finish.
    pub async fn shutdown(&self) {
        info!("scheduler stopping, waiting for in-flight passes");
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!("scheduler stopped");
    }
}
