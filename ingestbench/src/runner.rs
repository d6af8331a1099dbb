//! Drives a single scenario from its first dispatch to its result record.
//!
//! A scenario moves through the phases of [`Phase`] exactly once per run:
//!
//!  1. `Idle -> Dispatching`: the resource window and the wall clock start. Requests are paced by
//!     the [`RateController`], admitted by the [`ConcurrencyLimiter`] and spawned as independent
//!     tasks.
//!  2. `Dispatching -> Draining`: after the last admission, the runner waits until every permit
//!     has been returned. Only then is the outcome channel closed and drained.
//!  3. `Draining -> Completed`: the resource window and the wall clock stop, statistics are
//!     computed over the closed outcome set and the [`ResultRecord`] is assembled, printed and
//!     optionally persisted.
//!
//! Request failures never abort a scenario. A system under test that stops responding stalls
//! the drain until the per-request timeout fires.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::mpsc;

use crate::concurrency::{ConcurrencyLimiter, ceiling_for_rate};
use crate::error::Result;
use crate::http::HttpRemote;
use crate::monitor::{ResourceMonitor, ResourceSnapshot, SystemMonitor};
use crate::pacing::RateController;
use crate::result::ResultRecord;
use crate::scenario::Scenario;
use crate::stats::Latencies;
use crate::worker::{Counters, RequestWorker};

/// Number of progress messages logged per scenario.
const PROGRESS_STEPS: u64 = 10;

/// Lifecycle of a scenario run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    Idle,
    Dispatching,
    Draining,
    Completed,
}

/// Options that apply to every scenario of a runner.
#[derive(Clone, Debug, Default)]
pub struct RunOptions {
    /// Overrides the rate-dependent concurrency ceiling.
    pub max_concurrency: Option<usize>,
    /// Directory for result artifacts. Nothing is persisted when unset.
    pub results_dir: Option<PathBuf>,
    /// Show a progress bar while dispatching.
    pub progress: bool,
}

/// Runs scenarios against one remote, one at a time.
#[derive(Debug)]
pub struct ScenarioRunner<M = SystemMonitor> {
    remote: HttpRemote,
    monitor: M,
    options: RunOptions,
    phase: Phase,
}

impl<M: ResourceMonitor> ScenarioRunner<M> {
    pub fn new(remote: HttpRemote, monitor: M, options: RunOptions) -> Self {
        Self {
            remote,
            monitor,
            options,
            phase: Phase::Idle,
        }
    }

    /// The phase of the current or most recent run.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn remote(&self) -> &HttpRemote {
        &self.remote
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Concurrency ceiling used for `scenario`.
    pub fn capacity_for(&self, scenario: &Scenario) -> usize {
        self.options
            .max_concurrency
            .unwrap_or_else(|| ceiling_for_rate(scenario.rate()))
    }

    /// Runs `scenario` to completion and returns its result record.
    pub async fn run(&mut self, scenario: &Scenario) -> Result<ResultRecord> {
        self.phase = Phase::Idle;

        let total = scenario.total_count();
        let capacity = self.capacity_for(scenario);
        tracing::info!(
            scenario = scenario.id(),
            name = scenario.name(),
            kind = %scenario.kind(),
            total,
            rate = scenario.rate(),
            capacity,
            expected_duration = ?scenario.expected_duration(),
            "starting scenario"
        );

        let limiter = ConcurrencyLimiter::new(capacity);
        let counters = Arc::new(Counters::default());
        let (outcomes, mut received) = mpsc::unbounded_channel();
        let scenario_id: Arc<str> = Arc::from(scenario.id());
        let mut rng = SmallRng::seed_from_u64(rand::random());
        let bar = self.progress_bar(scenario);
        let step = total / PROGRESS_STEPS;

        self.monitor.start();
        let start = Instant::now();
        self.transition(scenario, Phase::Dispatching);

        let mut pacer = RateController::new(scenario.rate());
        for dispatched in 1..=total {
            pacer.ready().await;
            let permit = limiter.acquire().await;

            let worker = RequestWorker {
                remote: self.remote.clone(),
                scenario_id: Arc::clone(&scenario_id),
                kind: scenario.kind(),
                seed: rng.next_u64(),
                counters: Arc::clone(&counters),
                outcomes: outcomes.clone(),
            };
            tokio::spawn(worker.execute(permit));

            bar.inc(1);
            if step > 0 && dispatched % step == 0 {
                tracing::info!(
                    scenario = scenario.id(),
                    dispatched,
                    total,
                    completed = counters.completed(),
                    in_flight = limiter.used_permits(),
                    elapsed = ?start.elapsed(),
                    "dispatch progress"
                );
            }
        }

        self.transition(scenario, Phase::Draining);
        limiter.wait_all().await;
        let duration = start.elapsed();
        drop(outcomes);

        let mut finished = Vec::with_capacity(usize::try_from(total).unwrap_or_default());
        while let Some(outcome) = received.recv().await {
            finished.push(outcome);
        }

        let resources = stop_monitor(&mut self.monitor);
        bar.finish_and_clear();

        let latencies = Latencies::from_outcomes(finished);
        debug_assert_eq!(latencies.len() as u64, counters.success());

        let record = ResultRecord::new(
            scenario,
            duration,
            counters.success(),
            counters.errors(),
            latencies.summary(),
            resources,
        );
        self.transition(scenario, Phase::Completed);

        tracing::info!(
            scenario = scenario.id(),
            success = record.success_count,
            errors = record.error_count,
            duration = ?duration,
            "scenario completed"
        );
        record.print_summary();

        if let Some(dir) = &self.options.results_dir {
            match record.persist(dir, &scenario.artifact_name()) {
                Ok(path) => tracing::info!(path = %path.display(), "result saved"),
                Err(error) => tracing::error!(
                    error = &error as &dyn std::error::Error,
                    scenario = scenario.id(),
                    "failed to save result"
                ),
            }
        }

        Ok(record)
    }

    fn transition(&mut self, scenario: &Scenario, phase: Phase) {
        tracing::debug!(scenario = scenario.id(), from = ?self.phase, to = ?phase, "phase transition");
        self.phase = phase;
    }

    fn progress_bar(&self, scenario: &Scenario) -> ProgressBar {
        if !self.options.progress {
            return ProgressBar::hidden();
        }

        let bar = ProgressBar::new(scenario.total_count()).with_message(scenario.id().to_owned());
        if let Ok(style) =
            ProgressStyle::with_template("{spinner} {msg} {wide_bar} {pos}/{len} {elapsed}")
        {
            bar.set_style(style);
        }
        bar.enable_steady_tick(Duration::from_millis(100));
        bar
    }
}

/// Closes the monitor's window without stalling other tasks on this worker thread.
///
/// `block_in_place` is unavailable on a current-thread runtime, which blocks instead.
fn stop_monitor<M: ResourceMonitor>(monitor: &mut M) -> ResourceSnapshot {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(|| monitor.stop()),
        _ => monitor.stop(),
    }
}
