//! Throughput and latency statistics over a finalized set of outcomes.
//!
//! Percentiles use the nearest-rank method without interpolation: the latencies are sorted
//! ascending and the value at `floor(len * p)` is selected, clamped to the last index. This
//! definition keeps results comparable with earlier measurements and must not be replaced with
//! an interpolating or approximate estimator.

use std::time::Duration;

use crate::worker::Outcome;

/// Latency figures in milliseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LatencySummary {
    pub avg_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

/// Latencies of all successful requests of one scenario, sorted ascending.
#[derive(Clone, Debug, Default)]
pub struct Latencies {
    sorted_ms: Vec<f64>,
}

impl Latencies {
    /// Builds the sequence from a closed set of outcomes, ignoring errors.
    pub fn from_outcomes<I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = Outcome>,
    {
        Self::from_millis(outcomes.into_iter().filter_map(|outcome| match outcome {
            Outcome::Success(latency) => Some(duration_ms(latency)),
            Outcome::Error(_) => None,
        }))
    }

    /// Builds the sequence from latencies in milliseconds.
    pub fn from_millis<I>(latencies: I) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        let mut sorted_ms: Vec<f64> = latencies.into_iter().collect();
        sorted_ms.sort_by(f64::total_cmp);
        Self { sorted_ms }
    }

    pub fn len(&self) -> usize {
        self.sorted_ms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted_ms.is_empty()
    }

    /// Arithmetic mean, or `0` without samples.
    pub fn average(&self) -> f64 {
        if self.sorted_ms.is_empty() {
            return 0.0;
        }
        self.sorted_ms.iter().sum::<f64>() / self.sorted_ms.len() as f64
    }

    /// Nearest-rank percentile for `p` in `[0, 1]`, or `0` without samples.
    pub fn percentile(&self, p: f64) -> f64 {
        let len = self.sorted_ms.len();
        if len == 0 {
            return 0.0;
        }

        let index = ((len as f64 * p).floor() as usize).min(len - 1);
        self.sorted_ms[index]
    }

    pub fn summary(&self) -> LatencySummary {
        LatencySummary {
            avg_ms: self.average(),
            p50_ms: self.percentile(0.50),
            p95_ms: self.percentile(0.95),
            p99_ms: self.percentile(0.99),
        }
    }
}

/// Successful requests per second over the scenario's wall-clock duration.
pub fn throughput(success_count: u64, duration: Duration) -> f64 {
    let secs = duration.as_secs_f64();
    if secs == 0.0 {
        return 0.0;
    }
    success_count as f64 / secs
}

fn duration_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
