//! Resource usage of the benchmark process over a scenario's wall-clock window.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use sysinfo::{MINIMUM_CPU_UPDATE_INTERVAL, Pid, ProcessRefreshKind, ProcessesToUpdate, System};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Default time between two samples of [`SystemMonitor`].
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Aggregated resource usage of one resource window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct ResourceSnapshot {
    /// Average CPU usage in percent of one core.
    pub cpu_avg_percent: f64,
    /// Average resident memory in MiB.
    pub memory_avg_mb: f64,
    /// MiB read from disk during the window.
    pub disk_read_mb: f64,
    /// MiB written to disk during the window.
    pub disk_write_mb: f64,
}

/// Samples resource usage between [`start`](Self::start) and [`stop`](Self::stop).
pub trait ResourceMonitor: Send {
    /// Opens a new resource window.
    fn start(&mut self);

    /// Closes the current window and returns its aggregate. Returns zeros without an open
    /// window.
    ///
    /// May block the calling thread while the final sample is taken.
    fn stop(&mut self) -> ResourceSnapshot;
}

/// A monitor that records nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMonitor;

impl ResourceMonitor for NoopMonitor {
    fn start(&mut self) {}

    fn stop(&mut self) -> ResourceSnapshot {
        ResourceSnapshot::default()
    }
}

/// Samples the current process with `sysinfo` on a dedicated thread.
///
/// One sample is taken when the window opens, one per interval and one when it closes. The
/// opening sample only serves as the baseline for CPU usage, which `sysinfo` derives from the
/// time between two refreshes. CPU readings therefore start one interval into the window, and
/// the interval never drops below [`MINIMUM_CPU_UPDATE_INTERVAL`]. Memory is averaged over all
/// samples. Disk figures are the difference of the cumulative process counters between the
/// first and the last sample.
#[derive(Debug)]
pub struct SystemMonitor {
    interval: Duration,
    window: Option<Window>,
}

#[derive(Debug)]
struct Window {
    stop: mpsc::Sender<()>,
    handle: JoinHandle<ResourceSnapshot>,
}

impl SystemMonitor {
    pub fn new() -> Self {
        Self::with_interval(DEFAULT_SAMPLE_INTERVAL)
    }

    /// Creates a monitor sampling every `interval`, but no more often than
    /// [`MINIMUM_CPU_UPDATE_INTERVAL`].
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval: interval.max(MINIMUM_CPU_UPDATE_INTERVAL),
            window: None,
        }
    }
}

impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceMonitor for SystemMonitor {
    fn start(&mut self) {
        if self.window.is_some() {
            self.stop();
        }

        let (stop, stopped) = mpsc::channel();
        let interval = self.interval;
        let spawned = std::thread::Builder::new()
            .name("resource-monitor".to_owned())
            .spawn(move || sample_until_stopped(interval, stopped));

        match spawned {
            Ok(handle) => self.window = Some(Window { stop, handle }),
            Err(error) => {
                tracing::warn!(
                    error = &error as &dyn std::error::Error,
                    "failed to start resource monitor, resources will be reported as zero"
                );
            }
        }
    }

    fn stop(&mut self) -> ResourceSnapshot {
        let Some(Window { stop, handle }) = self.window.take() else {
            return ResourceSnapshot::default();
        };

        stop.send(()).ok();
        match handle.join() {
            Ok(snapshot) => snapshot,
            Err(_) => {
                tracing::warn!("resource monitor panicked, resources will be reported as zero");
                ResourceSnapshot::default()
            }
        }
    }
}

impl Drop for SystemMonitor {
    fn drop(&mut self) {
        if self.window.is_some() {
            self.stop();
        }
    }
}

fn sample_until_stopped(interval: Duration, stopped: mpsc::Receiver<()>) -> ResourceSnapshot {
    let mut sampler = Sampler::new();
    sampler.sample();

    while let Err(RecvTimeoutError::Timeout) = stopped.recv_timeout(interval) {
        sampler.sample();
    }

    // A window shorter than the minimum update interval still gets one CPU reading.
    if sampler.cpu_samples == 0 {
        std::thread::sleep(sampler.until_cpu_ready());
    }

    sampler.sample();
    sampler.snapshot()
}

/// Accumulates samples of one process.
struct Sampler {
    system: System,
    pid: Pid,
    samples: u32,
    cpu_samples: u32,
    cpu_sum: f64,
    memory_sum: f64,
    first_disk: Option<(u64, u64)>,
    last_disk: (u64, u64),
    /// CPU usage is measured against the previous refresh.
    last_refresh: Option<Instant>,
}

impl Sampler {
    fn new() -> Self {
        Self {
            system: System::new(),
            pid: Pid::from_u32(std::process::id()),
            samples: 0,
            cpu_samples: 0,
            cpu_sum: 0.0,
            memory_sum: 0.0,
            first_disk: None,
            last_disk: (0, 0),
            last_refresh: None,
        }
    }

    /// Time left until a refresh yields a meaningful CPU reading.
    fn until_cpu_ready(&self) -> Duration {
        match self.last_refresh {
            Some(last) => MINIMUM_CPU_UPDATE_INTERVAL.saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        }
    }

    fn sample(&mut self) {
        // The first refresh has nothing to compare against and always reads zero. Refreshes
        // closer together than the minimum interval are too noisy to count.
        let cpu_valid = self.last_refresh.is_some() && self.until_cpu_ready().is_zero();

        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[self.pid]),
            true,
            ProcessRefreshKind::nothing()
                .with_cpu()
                .with_memory()
                .with_disk_usage(),
        );
        self.last_refresh = Some(Instant::now());

        let Some(process) = self.system.process(self.pid) else {
            return;
        };

        let disk = process.disk_usage();
        let disk = (disk.total_read_bytes, disk.total_written_bytes);

        if cpu_valid {
            self.cpu_samples += 1;
            self.cpu_sum += f64::from(process.cpu_usage());
        }

        self.samples += 1;
        self.memory_sum += process.memory() as f64 / BYTES_PER_MB;
        if self.first_disk.is_none() {
            self.first_disk = Some(disk);
        }
        self.last_disk = disk;
    }

    fn snapshot(&self) -> ResourceSnapshot {
        if self.samples == 0 {
            return ResourceSnapshot::default();
        }

        let samples = f64::from(self.samples);
        let cpu_avg_percent = match self.cpu_samples {
            0 => 0.0,
            n => self.cpu_sum / f64::from(n),
        };
        let (first_read, first_written) = self.first_disk.unwrap_or(self.last_disk);
        let (last_read, last_written) = self.last_disk;

        ResourceSnapshot {
            cpu_avg_percent,
            memory_avg_mb: self.memory_sum / samples,
            disk_read_mb: last_read.saturating_sub(first_read) as f64 / BYTES_PER_MB,
            disk_write_mb: last_written.saturating_sub(first_written) as f64 / BYTES_PER_MB,
        }
    }
}
