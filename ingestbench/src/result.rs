//! Result records of completed scenarios, their summaries and persisted artifacts.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use yansi::Paint;

use crate::error::Result;
use crate::monitor::ResourceSnapshot;
use crate::scenario::{Scenario, ScenarioKind};
use crate::stats::{self, LatencySummary};

/// File name of the combined artifact written after a suite.
pub const ALL_RESULTS_FILE: &str = "all_results.json";

/// The outcome of one completed scenario.
///
/// The serialized field set is consumed by downstream report tooling and must stay stable.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ResultRecord {
    pub scenario_id: String,
    pub scenario_name: String,
    pub total_logs: u64,
    pub rate: u32,
    pub duration_seconds: f64,
    pub throughput_logs_per_sec: f64,
    pub success_count: u64,
    pub error_count: u64,
    pub avg_latency_ms: f64,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub resources: ResourceSnapshot,
    /// Not part of the artifact. Records read back from disk report `insert`.
    #[serde(skip, default = "default_kind")]
    pub kind: ScenarioKind,
}

fn default_kind() -> ScenarioKind {
    ScenarioKind::Insert
}

impl ResultRecord {
    /// Assembles the record from the finalized figures of a scenario.
    pub fn new(
        scenario: &Scenario,
        duration: Duration,
        success_count: u64,
        error_count: u64,
        latency: LatencySummary,
        resources: ResourceSnapshot,
    ) -> Self {
        Self {
            scenario_id: scenario.id().to_owned(),
            scenario_name: scenario.name().to_owned(),
            total_logs: scenario.total_count(),
            rate: scenario.rate(),
            duration_seconds: duration.as_secs_f64(),
            throughput_logs_per_sec: stats::throughput(success_count, duration),
            success_count,
            error_count,
            avg_latency_ms: latency.avg_ms,
            p50_latency_ms: latency.p50_ms,
            p95_latency_ms: latency.p95_ms,
            p99_latency_ms: latency.p99_ms,
            resources,
            kind: scenario.kind(),
        }
    }

    /// Prints a human-readable summary to stdout.
    pub fn print_summary(&self) {
        println!();
        println!(
            "{} {} ({})",
            "## Scenario".bold(),
            self.scenario_id.bold().blue(),
            self.scenario_name
        );

        print!(
            "  {} requests @ {}/s",
            self.total_logs.bold(),
            self.rate.bold()
        );
        if self.error_count > 0 {
            print!(
                ", {}",
                format!("{} FAILURES", self.error_count).bold().red()
            );
        }
        println!();

        println!(
            "  duration: {:.2}s; throughput: {:.2} logs/s",
            self.duration_seconds,
            self.throughput_logs_per_sec.bold().green()
        );
        println!(
            "  latency avg: {:.2}ms; p50: {:.2}ms; p95: {:.2}ms; p99: {:.2}ms",
            self.avg_latency_ms.bold(),
            self.p50_latency_ms,
            self.p95_latency_ms,
            self.p99_latency_ms
        );

        let resources = &self.resources;
        println!(
            "  cpu avg: {:.1}%; memory avg: {:.1} MiB; disk read: {:.2} MiB; disk write: {:.2} MiB",
            resources.cpu_avg_percent,
            resources.memory_avg_mb,
            resources.disk_read_mb,
            resources.disk_write_mb
        );
    }

    /// Writes the record as pretty JSON to `dir/file_name` and returns the path.
    pub fn persist(&self, dir: &Path, file_name: &str) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(file_name);
        fs::write(&path, serde_json::to_vec_pretty(self)?)?;
        Ok(path)
    }
}

/// Writes every record of a suite to `dir/all_results.json` and returns the path.
pub fn write_all_results(dir: &Path, records: &[ResultRecord]) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(ALL_RESULTS_FILE);
    fs::write(&path, serde_json::to_vec_pretty(records)?)?;
    Ok(path)
}

/// Prints a one-line-per-scenario table of a suite's results.
pub fn print_totals(records: &[ResultRecord]) {
    println!();
    println!("{}", "## TOTALS".bold());
    println!(
        "  {:<14} {:<7} {:>14} {:>12} {:>8}",
        "scenario", "kind", "logs/s", "p95 ms", "errors"
    );

    for record in records {
        let errors = format!("{:>8}", record.error_count);
        let errors = if record.error_count > 0 {
            errors.red().bold().to_string()
        } else {
            errors
        };

        println!(
            "  {:<14} {:<7} {:>14.2} {:>12.2} {errors}",
            record.scenario_id,
            record.kind.to_string(),
            record.throughput_logs_per_sec,
            record.p95_latency_ms,
        );
    }

    let successes: u64 = records.iter().map(|r| r.success_count).sum();
    let errors: u64 = records.iter().map(|r| r.error_count).sum();
    println!(
        "  {} scenarios, {} successful requests, {} failed requests",
        records.len().bold(),
        successes.bold(),
        errors.bold()
    );
}
