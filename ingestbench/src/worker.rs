//! Executes single requests against the system under test and classifies their outcome.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use reqwest::{Response, StatusCode};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::concurrency::ConcurrencyPermit;
use crate::http::HttpRemote;
use crate::payload::LogPayload;
use crate::scenario::ScenarioKind;

/// Failure of a single request.
///
/// Request failures never abort a scenario. They are counted and only the first one per
/// scenario is logged with its details.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The request never received a response, e.g. connection refused or timeout.
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// A response was received with a status outside of `2xx`.
    #[error("unexpected status {status}: {body}")]
    Application {
        /// The status code of the response.
        status: StatusCode,
        /// The response body. Only read for the first failure of a scenario.
        body: String,
    },
}

impl RequestError {
    /// Returns the category recorded in the request's [`Outcome`].
    pub fn category(&self) -> ErrorCategory {
        match self {
            RequestError::Transport(_) => ErrorCategory::Transport,
            RequestError::Application { .. } => ErrorCategory::Application,
        }
    }
}

/// Coarse classification of a failed request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorCategory {
    Transport,
    Application,
}

/// The terminal outcome of one request.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Outcome {
    /// A `2xx` response. Carries the latency of the network call.
    Success(Duration),
    /// The request failed. No latency is recorded.
    Error(ErrorCategory),
}

/// Success and error counters shared by all workers of one scenario.
#[derive(Debug, Default)]
pub struct Counters {
    success: AtomicU64,
    errors: AtomicU64,
}

impl Counters {
    pub fn success(&self) -> u64 {
        self.success.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Number of requests that reached a terminal outcome.
    pub fn completed(&self) -> u64 {
        self.success() + self.errors()
    }

    fn record_success(&self) {
        self.success.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts an error and returns whether it is the first one.
    fn record_error(&self) -> bool {
        self.errors.fetch_add(1, Ordering::Relaxed) == 0
    }
}

/// Why a request did not succeed, before the response body has been inspected.
enum Failure {
    Transport(reqwest::Error),
    Rejected(Response),
}

impl Failure {
    /// Converts into a [`RequestError`]. The response body is only read when `with_body` is set.
    async fn into_error(self, with_body: bool) -> RequestError {
        match self {
            Failure::Transport(error) => RequestError::Transport(error),
            Failure::Rejected(response) => {
                let status = response.status();
                let body = if with_body {
                    response.text().await.unwrap_or_default()
                } else {
                    String::new()
                };
                RequestError::Application { status, body }
            }
        }
    }
}

/// Executes one admitted request.
///
/// The worker owns a sender of the scenario's outcome channel and a concurrency permit. Both
/// are released once the outcome has been reported, the sender strictly before the permit.
#[derive(Debug)]
pub struct RequestWorker {
    pub(crate) remote: HttpRemote,
    pub(crate) scenario_id: Arc<str>,
    pub(crate) kind: ScenarioKind,
    pub(crate) seed: u64,
    pub(crate) counters: Arc<Counters>,
    pub(crate) outcomes: mpsc::UnboundedSender<Outcome>,
}

impl RequestWorker {
    /// Performs the request, reports its outcome and returns the permit.
    pub async fn execute(self, permit: ConcurrencyPermit) {
        let outcome = match self.perform().await {
            Ok(latency) => {
                self.counters.record_success();
                Outcome::Success(latency)
            }
            Err(failure) => {
                let first = self.counters.record_error();
                let error = failure.into_error(first).await;

                if first {
                    tracing::error!(
                        scenario = %self.scenario_id,
                        kind = %self.kind,
                        error = &error as &dyn std::error::Error,
                        "first request failure in scenario, further failures are only counted",
                    );
                }

                Outcome::Error(error.category())
            }
        };

        let Self { outcomes, .. } = self;
        // The receiver is only dropped once every permit has been returned.
        outcomes.send(outcome).ok();
        drop(outcomes);
        drop(permit);
    }

    /// Sends the request and returns the latency of the network call on success.
    async fn perform(&self) -> Result<Duration, Failure> {
        let request = match self.kind {
            ScenarioKind::Insert => self.remote.insert_request(&LogPayload::generate(self.seed)),
            ScenarioKind::Query => self.remote.query_request(),
        }
        .map_err(Failure::Transport)?;

        let start = Instant::now();
        let response = self
            .remote
            .execute(request)
            .await
            .map_err(Failure::Transport)?;
        let latency = start.elapsed();

        if !response.status().is_success() {
            return Err(Failure::Rejected(response));
        }

        // Drain the body outside of the measurement so the connection returns to the pool.
        response.bytes().await.ok();
        Ok(latency)
    }
}

#[cfg(test)]
mod tests {
    use std::fmt;
    use std::sync::Mutex;

    use ingestbench_test::server::{MockConfig, MockServer};
    use tracing::field::{Field, Visit};
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    use super::*;
    use crate::concurrency::ConcurrencyLimiter;

    /// Collects the `error` field of every error event emitted by this module.
    #[derive(Clone, Default)]
    struct ErrorEvents(Arc<Mutex<Vec<String>>>);

    impl ErrorEvents {
        fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.0.lock().unwrap())
        }
    }

    struct ErrorField(String);

    impl Visit for ErrorField {
        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            if field.name() == "error" {
                self.0 = format!("{value:?}");
            }
        }
    }

    impl<S: Subscriber> Layer<S> for ErrorEvents {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let metadata = event.metadata();
            if metadata.target() != "ingestbench::worker" || *metadata.level() != Level::ERROR {
                return;
            }

            let mut field = ErrorField(String::new());
            event.record(&mut field);
            self.0.lock().unwrap().push(field.0);
        }
    }

    fn failing_server() -> MockConfig {
        MockConfig {
            fail_every: Some(1),
            ..Default::default()
        }
    }

    fn worker(
        remote: &HttpRemote,
        counters: &Arc<Counters>,
        outcomes: &mpsc::UnboundedSender<Outcome>,
        seed: u64,
    ) -> RequestWorker {
        RequestWorker {
            remote: remote.clone(),
            scenario_id: Arc::from("S1"),
            kind: ScenarioKind::Insert,
            seed,
            counters: Arc::clone(counters),
            outcomes: outcomes.clone(),
        }
    }

    #[tokio::test]
    async fn only_first_failure_is_logged() {
        let events = ErrorEvents::default();
        let _guard =
            tracing::subscriber::set_default(tracing_subscriber::registry().with(events.clone()));

        let server = MockServer::with_config(failing_server()).await;
        let remote = HttpRemote::new(&server.base_url()).unwrap();
        let limiter = ConcurrencyLimiter::new(5);
        let counters = Arc::new(Counters::default());
        let (outcomes, mut received) = mpsc::unbounded_channel();

        for seed in 0..5 {
            let permit = limiter.acquire().await;
            worker(&remote, &counters, &outcomes, seed)
                .execute(permit)
                .await;
        }
        drop(outcomes);

        let mut failed = 0;
        while let Some(outcome) = received.recv().await {
            assert_eq!(outcome, Outcome::Error(ErrorCategory::Application));
            failed += 1;
        }
        assert_eq!(failed, 5);
        assert_eq!(counters.errors(), 5);
        assert_eq!(limiter.used_permits(), 0);

        let logged = events.take();
        assert_eq!(logged.len(), 1, "{logged:?}");
        assert!(logged[0].contains("500"), "{logged:?}");
        assert!(logged[0].contains("injected failure"), "{logged:?}");
    }

    #[tokio::test]
    async fn body_is_read_only_when_requested() {
        let server = MockServer::with_config(failing_server()).await;
        let remote = HttpRemote::new(&server.base_url()).unwrap();
        let counters = Arc::new(Counters::default());
        let (outcomes, _received) = mpsc::unbounded_channel();
        let worker = worker(&remote, &counters, &outcomes, 7);

        let Err(failure) = worker.perform().await else {
            panic!("expected a rejected request");
        };
        match failure.into_error(false).await {
            RequestError::Application { status, body } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert!(body.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }

        let Err(failure) = worker.perform().await else {
            panic!("expected a rejected request");
        };
        match failure.into_error(true).await {
            RequestError::Application { body, .. } => assert_eq!(body, "injected failure"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn only_first_error_is_flagged() {
        let counters = Counters::default();
        assert!(counters.record_error());
        assert!(!counters.record_error());
        assert!(!counters.record_error());
        assert_eq!(counters.errors(), 3);
    }

    #[test]
    fn counters_are_free_of_lost_updates() {
        let counters = Arc::new(Counters::default());

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let counters = Arc::clone(&counters);
                std::thread::spawn(move || {
                    for i in 0..10_000 {
                        if i % 2 == 0 {
                            counters.record_success();
                        } else {
                            counters.record_error();
                        }
                    }
                })
            })
            .collect();

        for thread in threads {
            thread.join().unwrap();
        }

        assert_eq!(counters.success(), 40_000);
        assert_eq!(counters.errors(), 40_000);
        assert_eq!(counters.completed(), 80_000);
    }

    #[test]
    fn error_categories() {
        let error = RequestError::Application {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: String::new(),
        };
        assert_eq!(error.category(), ErrorCategory::Application);
    }
}
