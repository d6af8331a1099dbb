use reqwest::StatusCode;
use thiserror::Error;

/// Errors that abort a benchmark run or prevent it from starting.
///
/// Failures of individual requests are never reported through this type. They are counted
/// per scenario instead, see [`RequestError`](crate::worker::RequestError).
#[derive(Debug, Error)]
pub enum Error {
    /// The configuration could not be loaded or merged.
    #[error("invalid configuration: {0}")]
    Config(#[from] figment::Error),

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// The pre-flight health check did not receive a response.
    #[error("health check failed: {0}")]
    HealthCheck(#[source] reqwest::Error),

    /// The pre-flight health check received a response other than `200 OK`.
    #[error("health check returned status {status}: {body}")]
    Unhealthy {
        /// The status code returned by the system under test.
        status: StatusCode,
        /// The response body, for diagnostics.
        body: String,
    },

    /// A scenario definition cannot be run.
    #[error("invalid scenario `{id}`: {reason}")]
    InvalidScenario {
        /// Identifier of the offending scenario.
        id: String,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// A scenario was explicitly selected but is not defined.
    #[error("unknown scenario `{0}`")]
    UnknownScenario(String),

    /// The selection resolved to an empty list of scenarios.
    #[error("no scenarios selected")]
    NoScenarios,

    /// An I/O error, e.g. while persisting result artifacts.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Result records could not be serialized.
    #[error("failed to serialize results: {0}")]
    Json(#[from] serde_json::Error),
}

/// A convenience alias that defaults our [`Error`] type.
pub type Result<T, E = Error> = std::result::Result<T, E>;
