//! Configuration for the benchmark.
//!
//! Configuration can be loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Environment variables (prefixed with `IB__`)
//! 2. YAML configuration file (specified via `-c` or `--config` flag)
//! 3. Defaults
//!
//! Command line flags of the `run` subcommand are applied on top of the loaded configuration.
//!
//! # Environment Variables
//!
//! Environment variables use `IB__` as a prefix and double underscores (`__`) to denote nested
//! configuration structures. For example:
//!
//! - `IB__REMOTE=http://10.0.0.5:5001` sets the system under test
//! - `IB__SELECTION=quick` runs only the quick scenarios
//! - `IB__LOGGING__FORMAT=json` switches to JSON logs
//!
//! # YAML Configuration File
//!
//! ```yaml
//! remote: http://10.0.0.5:5001
//! results_dir: results
//! scenario_pause: 10s
//! selection:
//!   only: [S1, S4]
//! matrix:
//!   volumes: [1000, 10000]
//!   rates: [100, 1000]
//! ```

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

use crate::error::{Error, Result};
use crate::http::DEFAULT_TIMEOUT;
use crate::runner::RunOptions;
use crate::scenario::Scenario;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "IB__";

/// Scenarios run in quick mode.
pub const QUICK_SCENARIOS: [&str; 3] = ["S1", "S5", "S9"];

/// Which of the defined scenarios to run.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Selection {
    /// Every defined scenario, in definition order.
    #[default]
    All,
    /// The scenarios in [`QUICK_SCENARIOS`] that are defined.
    Quick,
    /// The listed scenarios, in the listed order. Unknown ids are an error.
    Only(Vec<String>),
}

/// A volume × rate grid expanded into scenarios `S1..Sn`.
///
/// Scenarios are numbered volume-major: with three volumes and three rates, `S1..S3` share the
/// smallest volume.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct Matrix {
    pub volumes: Vec<u64>,
    pub rates: Vec<u32>,
}

impl Default for Matrix {
    fn default() -> Self {
        Self {
            volumes: vec![1_000, 10_000, 100_000],
            rates: vec![100, 1_000, 10_000],
        }
    }
}

impl Matrix {
    fn scenarios(&self) -> Vec<ScenarioConfig> {
        let mut scenarios = Vec::with_capacity(self.volumes.len() * self.rates.len());
        for &total_logs in &self.volumes {
            for &rate in &self.rates {
                let id = format!("S{}", scenarios.len() + 1);
                scenarios.push(ScenarioConfig {
                    id,
                    name: format!("{total_logs} logs @ {rate}/s"),
                    total_logs,
                    rate,
                    description: None,
                });
            }
        }
        scenarios
    }
}

/// An explicitly defined insert scenario.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct ScenarioConfig {
    pub id: String,
    pub name: String,
    pub total_logs: u64,
    pub rate: u32,
    #[serde(default)]
    pub description: Option<String>,
}

impl ScenarioConfig {
    fn to_scenario(&self) -> Result<Scenario> {
        if self.total_logs == 0 {
            return Err(Error::InvalidScenario {
                id: self.id.clone(),
                reason: "volume must be positive",
            });
        }
        Scenario::insert(&self.id, &self.name, self.total_logs, self.rate)
    }
}

/// Log output format.
///
/// Controls how log messages are formatted. The format can be explicitly specified or
/// auto-detected based on whether output is to a TTY.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    Auto,

    /// Compact output with colors.
    Pretty,

    /// Plain text output without colors.
    Simplified,

    /// JSON lines.
    Json,
}

/// The logging format parse error.
#[derive(Clone, Debug)]
pub struct FormatParseError(String);

impl fmt::Display for FormatParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r#"error parsing "{}" as format: expected one of "auto", "pretty", "simplified", "json""#,
            self.0
        )
    }
}

impl std::error::Error for FormatParseError {}

impl std::str::FromStr for LogFormat {
    type Err = FormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let result = match s {
            "" => LogFormat::Auto,
            s if s.eq_ignore_ascii_case("auto") => LogFormat::Auto,
            s if s.eq_ignore_ascii_case("pretty") => LogFormat::Pretty,
            s if s.eq_ignore_ascii_case("simplified") => LogFormat::Simplified,
            s if s.eq_ignore_ascii_case("json") => LogFormat::Json,
            s => return Err(FormatParseError(s.into())),
        };

        Ok(result)
    }
}

mod display_fromstr {
    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
        T: std::fmt::Display,
    {
        serializer.collect_str(&value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
        T: std::str::FromStr,
        <T as std::str::FromStr>::Err: std::fmt::Display,
    {
        use serde::Deserialize;
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Logging configuration. Logs are always written to stderr.
#[derive(Debug, Deserialize, Serialize)]
pub struct Logging {
    /// Minimum log level to output.
    ///
    /// The `RUST_LOG` environment variable takes precedence if set.
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,

    /// Log output format, see [`LogFormat`].
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
        }
    }
}

/// Top-level benchmark configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Base URL of the system under test.
    ///
    /// # Default
    ///
    /// `http://localhost:5001`
    pub remote: String,

    /// Directory for per-scenario result artifacts and `all_results.json`.
    ///
    /// Nothing is persisted when unset.
    pub results_dir: Option<PathBuf>,

    /// Timeout of every single request, including the health check.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Pause between two consecutive scenarios.
    #[serde(with = "humantime_serde")]
    pub scenario_pause: Duration,

    /// Pause between a scenario's insert run and its query run.
    #[serde(with = "humantime_serde")]
    pub query_pause: Duration,

    /// Whether to run the query scenario derived from each insert scenario.
    pub queries: bool,

    /// Overrides the rate-dependent concurrency ceiling for all scenarios.
    pub max_concurrency: Option<usize>,

    /// Which scenarios to run.
    pub selection: Selection,

    /// Grid used to define scenarios if `scenarios` is empty.
    pub matrix: Matrix,

    /// Explicit scenario definitions. Takes precedence over `matrix`.
    pub scenarios: Vec<ScenarioConfig>,

    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            remote: "http://localhost:5001".into(),
            results_dir: None,
            request_timeout: DEFAULT_TIMEOUT,
            scenario_pause: Duration::from_secs(5),
            query_pause: Duration::from_secs(2),
            queries: true,
            max_concurrency: None,
            selection: Selection::All,
            matrix: Matrix::default(),
            scenarios: Vec::new(),
            logging: Logging::default(),
        }
    }
}

impl Config {
    /// Loads configuration from defaults, an optional YAML file and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML file cannot be read or parsed, or if environment variables
    /// contain invalid values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }

    /// All defined scenarios, either explicit or expanded from the matrix.
    pub fn defined_scenarios(&self) -> Vec<ScenarioConfig> {
        if self.scenarios.is_empty() {
            self.matrix.scenarios()
        } else {
            self.scenarios.clone()
        }
    }

    /// Resolves the selection against the defined scenarios and validates the result.
    pub fn selected_scenarios(&self) -> Result<Vec<Scenario>> {
        let defined = self.defined_scenarios();

        let selected: Vec<&ScenarioConfig> = match &self.selection {
            Selection::All => defined.iter().collect(),
            Selection::Quick => QUICK_SCENARIOS
                .iter()
                .filter_map(|id| defined.iter().find(|s| s.id == *id))
                .collect(),
            Selection::Only(ids) => {
                let mut seen = HashSet::new();
                let mut selected = Vec::with_capacity(ids.len());
                for id in ids {
                    let id = id.trim();
                    if !seen.insert(id) {
                        continue;
                    }
                    let scenario = defined
                        .iter()
                        .find(|s| s.id == id)
                        .ok_or_else(|| Error::UnknownScenario(id.to_owned()))?;
                    selected.push(scenario);
                }
                selected
            }
        };

        if selected.is_empty() {
            return Err(Error::NoScenarios);
        }

        selected.into_iter().map(ScenarioConfig::to_scenario).collect()
    }

    /// Options applied to every scenario run.
    pub fn run_options(&self, progress: bool) -> RunOptions {
        RunOptions {
            max_concurrency: self.max_concurrency,
            results_dir: self.results_dir.clone(),
            progress,
        }
    }
}
