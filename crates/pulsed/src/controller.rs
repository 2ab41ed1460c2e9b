//! Mode controller.
//!
//! Historical mode runs one pass over the whole look-back horizon and
//! returns. Continuous mode evaluates one trailing window per tick and loops
//! until the shutdown future resolves. Passes never overlap: each tick awaits
//! its pass before sleeping.
//!
//! Passes call blocking HTTP clients, so they run on the blocking pool.

use anyhow::{Context, Result};
use chrono::Utc;
use pulse_common::config::{Durations, HostGroup};
use pulse_common::emit::PointSink;
use pulse_common::pipeline::{run_pass, PassMode, PassParams, PassSummary};
use pulse_common::source::MetricsSource;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Operating mode, fixed at process start
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Mode {
    /// One pass over the full look-back horizon, then exit
    Historical,
    /// One trailing window per tick, forever
    Continuous,
}

/// Clock returning Unix seconds
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(|| Utc::now().timestamp())
}

/// `last_tick` bookkeeping for continuous mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContinuousSchedule {
    last_tick: i64,
    step: i64,
}

impl ContinuousSchedule {
    pub fn new(started_at: i64, step: i64) -> Self {
        Self {
            last_tick: started_at,
            step,
        }
    }

    /// Start of the window the next tick evaluates.
    pub fn start_from(&self) -> i64 {
        self.last_tick - self.step
    }

    /// Record a finished tick, successful or not.
    pub fn advance(&mut self, now: i64) {
        self.last_tick = now;
    }

    pub fn last_tick(&self) -> i64 {
        self.last_tick
    }
}

/// The injected collaborators of every pass
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn MetricsSource>,
    pub sink: Arc<dyn PointSink>,
}

pub struct ModeController {
    groups: Arc<Vec<HostGroup>>,
    durations: Durations,
    collaborators: Collaborators,
    clock: Clock,
    tick_interval: Duration,
}

impl ModeController {
    pub fn new(groups: Vec<HostGroup>, durations: Durations, collaborators: Collaborators) -> Self {
        let step_secs = u64::try_from(durations.step).unwrap_or(0);
        Self {
            groups: Arc::new(groups),
            durations,
            collaborators,
            clock: system_clock(),
            tick_interval: Duration::from_secs(step_secs),
        }
    }

    /// Replace the wall clock
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the sleep between continuous ticks (defaults to the step)
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// One pass over `[now - time_window, now]`.
    pub async fn run_historical(&self) -> Result<PassSummary> {
        info!("[MODE] Historical pass starting");
        let now = (self.clock)();
        self.pass(PassMode::Historical, now).await
    }

    /// Tick until `shutdown` resolves or `max_ticks` passes have run.
    ///
    /// Returns the number of ticks run.
    pub async fn run_continuous<F>(&self, shutdown: F, max_ticks: Option<usize>) -> Result<usize>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut schedule = ContinuousSchedule::new((self.clock)(), self.durations.step);
        let mut ticks = 0;

        info!(
            "[MODE] Continuous mode: step {}s, averaging window {}s",
            self.durations.step, self.durations.averaging_window
        );

        loop {
            let start_from = schedule.start_from();
            let now = (self.clock)();

            match self.pass(PassMode::Continuous { start_from }, now).await {
                Ok(summary) => info!(
                    "[MODE] Tick {} done: {} points written, {} failed",
                    ticks + 1,
                    summary.points_written,
                    summary.points_failed
                ),
                Err(e) => error!("[MODE] Tick {} failed: {:#}", ticks + 1, e),
            }
            schedule.advance(now);
            ticks += 1;

            if max_ticks.is_some_and(|max| ticks >= max) {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.tick_interval) => {}
                _ = &mut shutdown => {
                    info!("[MODE] Shutdown requested, stopping after {} ticks", ticks);
                    break;
                }
            }
        }

        Ok(ticks)
    }

    async fn pass(&self, mode: PassMode, now: i64) -> Result<PassSummary> {
        let params = PassParams {
            mode,
            now,
            durations: self.durations,
        };
        let groups = Arc::clone(&self.groups);
        let collaborators = self.collaborators.clone();

        tokio::task::spawn_blocking(move || {
            run_pass(
                collaborators.source.as_ref(),
                collaborators.sink.as_ref(),
                &groups,
                &params,
            )
        })
        .await
        .context("scoring pass aborted")
    }
}
