//! Rate control for request dispatch.
//!
//! [`RateController`] hands out the go-ahead for the next dispatch no earlier than one target
//! interval (`1 / rate`) after the previous one. A single timer cannot serve the whole range of
//! supported rates well, so the controller switches strategy at [`HIGH_RATE_THRESHOLD`]:
//!
//!  - At or below the threshold, a periodic timer fires once per interval and every firing
//!    authorizes exactly one dispatch.
//!  - Above the threshold the interval drops below the timer resolution. The controller then
//!    polls the clock until the interval has elapsed since the last dispatch and resets its
//!    reference point to the moment of dispatch. A late dispatch therefore shifts the schedule
//!    instead of being made up for with a burst.
//!
//! Every interval of the polling regime is shorter than the 1ms resolution of the tokio timer,
//! so there is nothing left to sleep through. Polling keeps one runtime worker busy while
//! dispatching, and the resource window of the benchmark process includes that work.

use std::time::Duration;

use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// Highest target rate (requests per second) served by the periodic timer.
pub const HIGH_RATE_THRESHOLD: u32 = 1000;

/// The pacing strategy selected for a target rate.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Regime {
    /// Periodic timer, one dispatch per firing.
    Ticker,
    /// Fine-grained clock polling relative to the last dispatch.
    Poller,
}

/// Paces dispatches to a target rate.
#[derive(Debug)]
pub enum RateController {
    /// See [`Regime::Ticker`].
    Ticker {
        /// Fires once per target interval.
        interval: Interval,
    },
    /// See [`Regime::Poller`].
    Poller {
        /// Minimum spacing between two dispatches.
        target: Duration,
        /// Time of the previous dispatch.
        last: Instant,
    },
}

impl RateController {
    /// Creates a controller for the given target rate.
    ///
    /// The first go-ahead is granted one interval after construction.
    ///
    /// # Panics
    ///
    /// Panics if `rate` is zero. [`Scenario`](crate::scenario::Scenario) never carries such a
    /// rate.
    pub fn new(rate: u32) -> Self {
        let target = Duration::from_secs(1) / rate;

        if rate <= HIGH_RATE_THRESHOLD {
            let mut interval = time::interval_at(Instant::now() + target, target);
            // A stalled dispatcher gets one immediate tick, then realigns with the schedule.
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            RateController::Ticker { interval }
        } else {
            RateController::Poller {
                target,
                last: Instant::now(),
            }
        }
    }

    pub fn regime(&self) -> Regime {
        match self {
            RateController::Ticker { .. } => Regime::Ticker,
            RateController::Poller { .. } => Regime::Poller,
        }
    }

    /// Waits until the next request may be dispatched.
    pub async fn ready(&mut self) {
        match self {
            RateController::Ticker { interval } => {
                interval.tick().await;
            }
            RateController::Poller { target, last } => {
                // The target interval is below the timer resolution here, so yield to the
                // runtime between clock checks instead of sleeping.
                while last.elapsed() < *target {
                    tokio::task::yield_now().await;
                }
                *last = Instant::now();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn regime_switches_above_threshold() {
        assert_eq!(RateController::new(1).regime(), Regime::Ticker);
        assert_eq!(RateController::new(1000).regime(), Regime::Ticker);
        assert_eq!(RateController::new(1001).regime(), Regime::Poller);
        assert_eq!(RateController::new(10_000).regime(), Regime::Poller);
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_spaces_dispatches() {
        let start = Instant::now();
        let mut pacer = RateController::new(100);

        for _ in 0..100 {
            pacer.ready().await;
        }

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(1), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(1010), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_does_not_burst_after_stall() {
        let mut pacer = RateController::new(10);
        pacer.ready().await;

        // Stall for five intervals. Only the first go-ahead afterwards is immediate.
        time::sleep(Duration::from_millis(500)).await;
        let stalled = Instant::now();
        pacer.ready().await;
        pacer.ready().await;

        assert!(stalled.elapsed() > Duration::ZERO);
        assert!(stalled.elapsed() <= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn poller_spaces_dispatches() {
        let start = Instant::now();
        let mut pacer = RateController::new(10_000);

        for _ in 0..2_000 {
            pacer.ready().await;
        }

        // 2000 dispatches at 10k/s cannot finish in less than 200ms.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(200), "{elapsed:?}");
    }

    #[tokio::test]
    async fn poller_is_not_bound_by_timer_resolution() {
        let start = Instant::now();
        let mut pacer = RateController::new(5_000);

        for _ in 0..2_000 {
            pacer.ready().await;
        }

        // 400ms at the target rate. One dispatch per millisecond would take 2s.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(400), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(1), "{elapsed:?}");
    }

    #[tokio::test]
    async fn poller_resets_reference_after_late_dispatch() {
        let mut pacer = RateController::new(2_000);
        pacer.ready().await;

        // Fall far behind schedule. The next go-ahead is immediate, the one after that waits a
        // full interval again instead of catching up.
        std::thread::sleep(Duration::from_millis(20));
        pacer.ready().await;
        let after_late = Instant::now();
        pacer.ready().await;

        assert!(after_late.elapsed() >= Duration::from_micros(400));
    }
}
