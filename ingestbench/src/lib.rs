//! A load generator and latency benchmark for HTTP log-ingestion services.
//!
//! A [`Scenario`] describes one benchmark run: how many requests to send, at which target rate
//! and whether they insert synthetic log entries (`POST /logs`) or list recent entries
//! (`GET /logs?limit=100`). The [`ScenarioRunner`] paces dispatches with a
//! [`RateController`](pacing::RateController), bounds in-flight requests with a
//! [`ConcurrencyLimiter`](concurrency::ConcurrencyLimiter) and, once every request has finished,
//! reduces the outcomes to a [`ResultRecord`] with throughput and nearest-rank latency
//! percentiles.
//!
//! Target rates span two orders of magnitude. Up to 1000 requests per second dispatches follow
//! a periodic timer; above that, the controller polls the clock since the timer resolution is
//! too coarse.
//!
//! Failing requests never abort a scenario. The only fatal condition is a failing health check
//! before a [suite](suite::run_suite) starts.
#![warn(missing_debug_implementations)]

pub mod concurrency;
pub mod config;
pub mod error;
pub mod http;
pub mod monitor;
pub mod observability;
pub mod pacing;
pub mod payload;
pub mod result;
pub mod runner;
pub mod scenario;
pub mod stats;
pub mod suite;
pub mod worker;

pub mod cli;

pub use crate::error::{Error, Result};
pub use crate::result::ResultRecord;
pub use crate::runner::{Phase, RunOptions, ScenarioRunner};
pub use crate::scenario::{Scenario, ScenarioKind};
