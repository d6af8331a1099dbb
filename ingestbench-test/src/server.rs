//! Exposes an in-process mock of the log-ingestion service for use in integration tests.
//!
//! ```
//! use ingestbench_test::server::MockServer;
//!
//! #[tokio::main]
//! async fn main() {
//!    let server = MockServer::new().await;
//!    let url = server.url("/health");
//!    // use the URL in tests...
//! }
//! ```

use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};

/// Behavior of a [`MockServer`].
#[derive(Clone, Debug)]
pub struct MockConfig {
    /// Fixed delay before every `/logs` response.
    pub delay: Duration,
    /// Answer every Nth `/logs` request with `500 Internal Server Error`.
    pub fail_every: Option<u64>,
    /// Whether `/health` answers with `200 OK` or `503 Service Unavailable`.
    pub healthy: bool,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            delay: Duration::ZERO,
            fail_every: None,
            healthy: true,
        }
    }
}

#[derive(Debug, Default)]
struct Recorder {
    requests: AtomicU64,
    inserts: AtomicU64,
    queries: AtomicU64,
    health_checks: AtomicU64,
    invalid_payloads: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    last_query: Mutex<Option<HashMap<String, String>>>,
}

#[derive(Debug)]
struct Shared {
    config: MockConfig,
    recorder: Recorder,
}

/// Tracks a request as in flight until dropped.
struct InFlight<'a>(&'a Recorder);

impl<'a> InFlight<'a> {
    fn enter(recorder: &'a Recorder) -> Self {
        let current = recorder.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        recorder.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        Self(recorder)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// An in-process mock of the log-ingestion service.
///
/// Serves `GET /health`, `POST /logs` and `GET /logs` on a random available port on localhost
/// and records what it receives.
#[derive(Debug)]
pub struct MockServer {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
    shared: Arc<Shared>,
}

impl MockServer {
    /// Starts a healthy server that answers immediately.
    pub async fn new() -> Self {
        Self::with_config(MockConfig::default()).await
    }

    pub async fn with_config(config: MockConfig) -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let shared = Arc::new(Shared {
            config,
            recorder: Recorder::default(),
        });

        let app = Router::new()
            .route("/health", get(health))
            .route("/logs", get(query).post(insert))
            .with_state(Arc::clone(&shared));

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            handle,
            socket,
            shared,
        }
    }

    /// Returns the base URL of the server, without a trailing slash.
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.socket.port())
    }

    /// Returns a full URL pointing to the given path.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("{}/{}", self.base_url(), path)
    }

    /// Number of `/logs` requests of either kind.
    pub fn requests(&self) -> u64 {
        self.shared.recorder.requests.load(Ordering::SeqCst)
    }

    /// Number of `POST /logs` requests.
    pub fn inserts(&self) -> u64 {
        self.shared.recorder.inserts.load(Ordering::SeqCst)
    }

    /// Number of `GET /logs` requests.
    pub fn queries(&self) -> u64 {
        self.shared.recorder.queries.load(Ordering::SeqCst)
    }

    pub fn health_checks(&self) -> u64 {
        self.shared.recorder.health_checks.load(Ordering::SeqCst)
    }

    /// Number of inserted bodies that were not a well-formed log entry.
    pub fn invalid_payloads(&self) -> u64 {
        self.shared.recorder.invalid_payloads.load(Ordering::SeqCst)
    }

    /// Highest number of `/logs` requests that were handled at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.shared.recorder.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Query parameters of the most recent `GET /logs` request.
    pub fn last_query(&self) -> Option<HashMap<String, String>> {
        self.shared.recorder.last_query.lock().unwrap().clone()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn health(State(shared): State<Arc<Shared>>) -> Response {
    shared.recorder.health_checks.fetch_add(1, Ordering::SeqCst);

    if shared.config.healthy {
        Json(json!({ "status": "healthy" })).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "database unavailable").into_response()
    }
}

async fn insert(State(shared): State<Arc<Shared>>, Json(entry): Json<Value>) -> Response {
    let recorder = &shared.recorder;
    recorder.inserts.fetch_add(1, Ordering::SeqCst);

    let well_formed = ["source", "level", "message", "metadata"]
        .iter()
        .all(|field| entry.get(field).is_some())
        && entry.get("id").is_none()
        && entry.get("timestamp").is_none();
    if !well_formed {
        recorder.invalid_payloads.fetch_add(1, Ordering::SeqCst);
    }

    match respond(&shared).await {
        StatusCode::OK => (StatusCode::CREATED, Json(json!({ "status": "stored" }))).into_response(),
        status => (status, "injected failure").into_response(),
    }
}

async fn query(
    State(shared): State<Arc<Shared>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let recorder = &shared.recorder;
    recorder.queries.fetch_add(1, Ordering::SeqCst);
    *recorder.last_query.lock().unwrap() = Some(params);

    match respond(&shared).await {
        StatusCode::OK => Json(json!([])).into_response(),
        status => (status, "injected failure").into_response(),
    }
}

/// Applies the configured delay and failure injection to a `/logs` request.
async fn respond(shared: &Shared) -> StatusCode {
    let _in_flight = InFlight::enter(&shared.recorder);
    let number = shared.recorder.requests.fetch_add(1, Ordering::SeqCst) + 1;

    if !shared.config.delay.is_zero() {
        tokio::time::sleep(shared.config.delay).await;
    }

    match shared.config.fail_every {
        Some(every) if every > 0 && number % every == 0 => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::OK,
    }
}
