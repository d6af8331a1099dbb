//! Contains the HTTP remote used to interact with the log-ingestion service.

use std::time::Duration;

use reqwest::{Client, Request, Response, StatusCode};

use crate::error::{Error, Result};
use crate::payload::LogPayload;

/// Page size requested by every query scenario.
///
/// The query shape is fixed and does not depend on the scenario parameters.
pub const QUERY_PAGE_SIZE: u32 = 100;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Idle connections kept per host, sized for the highest concurrency ceiling.
const POOL_MAX_IDLE_PER_HOST: usize = 100;

const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// A remote implementation using HTTP to interact with the log-ingestion service.
#[derive(Clone, Debug)]
pub struct HttpRemote {
    client: Client,
    base: String,
}

impl HttpRemote {
    /// Creates a new `HttpRemote` for the given base URL with the default timeout.
    pub fn new(remote: &str) -> Result<Self> {
        Self::with_timeout(remote, DEFAULT_TIMEOUT)
    }

    /// Creates a new `HttpRemote` whose requests time out after `timeout`.
    pub fn with_timeout(remote: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .build()
            .map_err(Error::Client)?;

        Ok(Self {
            client,
            base: remote.trim_end_matches('/').to_owned(),
        })
    }

    /// Joins `path` onto the base URL.
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    /// Builds a `POST /logs` request carrying `payload`.
    pub(crate) fn insert_request(&self, payload: &LogPayload) -> reqwest::Result<Request> {
        self.client.post(self.url("/logs")).json(payload).build()
    }

    /// Builds the fixed `GET /logs?limit=100` request.
    pub(crate) fn query_request(&self) -> reqwest::Result<Request> {
        self.client
            .get(self.url("/logs"))
            .query(&[("limit", QUERY_PAGE_SIZE)])
            .build()
    }

    /// Sends a previously built request.
    pub(crate) async fn execute(&self, request: Request) -> reqwest::Result<Response> {
        self.client.execute(request).await
    }

    /// Performs the pre-flight health check against `GET /health`.
    ///
    /// Anything other than `200 OK` is reported as an error.
    pub async fn healthcheck(&self) -> Result<()> {
        let response = self
            .client
            .get(self.url("/health"))
            .send()
            .await
            .map_err(Error::HealthCheck)?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Unhealthy { status, body });
        }

        tracing::info!(remote = %self.base, "system under test is healthy");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_without_double_slash() {
        let remote = HttpRemote::new("http://localhost:5001/").unwrap();
        assert_eq!(remote.url("/logs"), "http://localhost:5001/logs");
    }

    #[test]
    fn query_request_has_fixed_page_size() {
        let remote = HttpRemote::new("http://localhost:5001").unwrap();
        let request = remote.query_request().unwrap();

        assert_eq!(request.method(), reqwest::Method::GET);
        assert_eq!(request.url().path(), "/logs");
        assert_eq!(request.url().query(), Some("limit=100"));
    }

    #[test]
    fn insert_request_posts_json() {
        let remote = HttpRemote::new("http://localhost:5001").unwrap();
        let request = remote.insert_request(&LogPayload::generate(1)).unwrap();

        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(request.url().path(), "/logs");
        assert_eq!(
            request.headers()[reqwest::header::CONTENT_TYPE],
            "application/json"
        );
    }
}
