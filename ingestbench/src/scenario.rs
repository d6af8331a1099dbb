//! Immutable descriptions of single benchmark runs.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Suffix appended to the identifier of a derived query scenario.
pub(crate) const QUERY_ID_SUFFIX: &str = "_query";

/// Share of an insert scenario's volume that its derived query scenario issues.
const QUERY_VOLUME_DIVISOR: u64 = 10;

/// The operation a scenario performs against the system under test.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioKind {
    /// Every request posts one synthetic log entry.
    Insert,
    /// Every request lists the most recent log entries.
    Query,
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScenarioKind::Insert => f.write_str("insert"),
            ScenarioKind::Query => f.write_str("query"),
        }
    }
}

/// One parameterized benchmark run: volume, rate and operation kind.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Scenario {
    id: String,
    name: String,
    total_count: u64,
    rate: u32,
    kind: ScenarioKind,
}

impl Scenario {
    /// Creates a scenario, rejecting a target rate of zero.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        total_count: u64,
        rate: u32,
        kind: ScenarioKind,
    ) -> Result<Self> {
        let id = id.into();
        if rate == 0 {
            return Err(Error::InvalidScenario {
                id,
                reason: "target rate must be positive",
            });
        }

        Ok(Self {
            id,
            name: name.into(),
            total_count,
            rate,
            kind,
        })
    }

    /// Shorthand for an [`Insert`](ScenarioKind::Insert) scenario.
    pub fn insert(
        id: impl Into<String>,
        name: impl Into<String>,
        total_count: u64,
        rate: u32,
    ) -> Result<Self> {
        Self::new(id, name, total_count, rate, ScenarioKind::Insert)
    }

    /// Shorthand for a [`Query`](ScenarioKind::Query) scenario.
    pub fn query(
        id: impl Into<String>,
        name: impl Into<String>,
        total_count: u64,
        rate: u32,
    ) -> Result<Self> {
        Self::new(id, name, total_count, rate, ScenarioKind::Query)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of requests dispatched over the lifetime of the scenario.
    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    /// Target dispatch rate in requests per second.
    pub fn rate(&self) -> u32 {
        self.rate
    }

    pub fn kind(&self) -> ScenarioKind {
        self.kind
    }

    /// The query scenario that accompanies this scenario.
    ///
    /// It keeps the target rate and issues a tenth of the requests. The query shape itself
    /// is fixed, see [`QUERY_PAGE_SIZE`](crate::http::QUERY_PAGE_SIZE).
    pub fn query_variant(&self) -> Scenario {
        Scenario {
            id: format!("{}{QUERY_ID_SUFFIX}", self.id),
            name: format!("{} (Query)", self.name),
            total_count: self.total_count / QUERY_VOLUME_DIVISOR,
            rate: self.rate,
            kind: ScenarioKind::Query,
        }
    }

    /// Wall-clock time the scenario takes if every request is dispatched on schedule.
    pub fn expected_duration(&self) -> Duration {
        Duration::from_secs_f64(self.total_count as f64 / self.rate as f64)
    }

    /// File name of the persisted result artifact, e.g. `S1_insert.json` or `S1_query.json`.
    pub fn artifact_name(&self) -> String {
        match self.kind {
            ScenarioKind::Insert => format!("{}_insert.json", self.id),
            ScenarioKind::Query => {
                let base = self.id.strip_suffix(QUERY_ID_SUFFIX).unwrap_or(&self.id);
                format!("{base}{QUERY_ID_SUFFIX}.json")
            }
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {} requests @ {}/s)",
            self.id, self.kind, self.total_count, self.rate
        )
    }
}
