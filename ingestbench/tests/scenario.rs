use std::time::Duration;

use ingestbench::http::HttpRemote;
use ingestbench::monitor::{NoopMonitor, SystemMonitor};
use ingestbench::{Phase, RunOptions, Scenario, ScenarioRunner};
use ingestbench_test::server::{MockConfig, MockServer};

fn runner(server: &MockServer, options: RunOptions) -> ScenarioRunner<NoopMonitor> {
    let remote = HttpRemote::new(&server.base_url()).unwrap();
    ScenarioRunner::new(remote, NoopMonitor, options)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn end_to_end_with_fixed_delay() {
    ingestbench_test::tracing::init();
    let server = MockServer::with_config(MockConfig {
        delay: Duration::from_millis(5),
        ..Default::default()
    })
    .await;

    let mut runner = runner(&server, RunOptions::default());
    let scenario = Scenario::insert("T1", "end to end", 50, 50).unwrap();
    let record = runner.run(&scenario).await.unwrap();

    assert_eq!(runner.phase(), Phase::Completed);
    assert_eq!(record.success_count, 50);
    assert_eq!(record.error_count, 0);
    assert_eq!(server.inserts(), 50);
    assert_eq!(server.invalid_payloads(), 0);

    assert!(record.duration_seconds >= 0.95, "{record:?}");
    assert!(record.duration_seconds < 1.5, "{record:?}");
    assert!(record.avg_latency_ms >= 5.0, "{record:?}");
    assert!(record.avg_latency_ms < 50.0, "{record:?}");
    assert!(record.p50_latency_ms >= 5.0, "{record:?}");
    assert!(record.p50_latency_ms <= record.p95_latency_ms);
    assert!(record.p95_latency_ms <= record.p99_latency_ms);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failures_are_counted_not_fatal() {
    ingestbench_test::tracing::init();
    let server = MockServer::with_config(MockConfig {
        delay: Duration::from_millis(5),
        fail_every: Some(5),
        ..Default::default()
    })
    .await;

    let mut runner = runner(&server, RunOptions::default());
    let scenario = Scenario::insert("T1", "failure tolerance", 50, 50).unwrap();
    let record = runner.run(&scenario).await.unwrap();

    assert_eq!(runner.phase(), Phase::Completed);
    assert_eq!(record.error_count, 10);
    assert_eq!(record.success_count, 40);
    assert_eq!(record.success_count + record.error_count, 50);
    assert!(record.throughput_logs_per_sec > 0.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dispatch_is_paced() {
    let server = MockServer::new().await;

    let mut runner = runner(&server, RunOptions::default());
    let scenario = Scenario::insert("P1", "pacing", 100, 100).unwrap();
    let record = runner.run(&scenario).await.unwrap();

    assert_eq!(record.success_count, 100);
    // Unconstrained bursting would finish in a few milliseconds.
    assert!(record.duration_seconds >= 1.0, "{record:?}");
    assert!(record.duration_seconds < 1.5, "{record:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn high_rate_is_paced_by_polling() {
    let server = MockServer::new().await;

    let mut runner = runner(&server, RunOptions::default());
    let scenario = Scenario::insert("P2", "high rate", 500, 5_000).unwrap();
    let record = runner.run(&scenario).await.unwrap();

    assert_eq!(record.success_count + record.error_count, 500);
    assert!(record.duration_seconds >= 0.1, "{record:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn admission_is_bounded_by_override() {
    let server = MockServer::with_config(MockConfig {
        delay: Duration::from_millis(20),
        ..Default::default()
    })
    .await;

    let options = RunOptions {
        max_concurrency: Some(5),
        ..Default::default()
    };
    let mut runner = runner(&server, options);
    let scenario = Scenario::insert("C1", "bounded", 200, 2_000).unwrap();
    let record = runner.run(&scenario).await.unwrap();

    assert_eq!(record.success_count, 200);
    assert!(server.peak_in_flight() <= 5, "{}", server.peak_in_flight());
    assert!(server.peak_in_flight() > 1);

    // With at most 5 requests of 20ms in flight, 200 requests need at least 800ms.
    assert!(record.duration_seconds >= 0.8, "{record:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn admission_is_bounded_by_rate_ceiling() {
    let server = MockServer::with_config(MockConfig {
        delay: Duration::from_millis(50),
        ..Default::default()
    })
    .await;

    let mut runner = runner(&server, RunOptions::default());
    let scenario = Scenario::insert("C2", "ceiling", 1_000, 10_000).unwrap();
    assert_eq!(runner.capacity_for(&scenario), 100);

    let record = runner.run(&scenario).await.unwrap();
    assert_eq!(record.success_count + record.error_count, 1_000);
    assert!(server.peak_in_flight() <= 100, "{}", server.peak_in_flight());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn query_scenario_uses_fixed_page_size() {
    let server = MockServer::new().await;

    let mut runner = runner(&server, RunOptions::default());
    let insert = Scenario::insert("Q1", "queries", 50, 100).unwrap();
    let record = runner.run(&insert.query_variant()).await.unwrap();

    assert_eq!(record.scenario_id, "Q1_query");
    assert_eq!(record.total_logs, 5);
    assert_eq!(record.success_count, 5);
    assert_eq!(server.queries(), 5);
    assert_eq!(server.inserts(), 0);

    let query = server.last_query().unwrap();
    assert_eq!(query.get("limit").map(String::as_str), Some("100"));
    assert_eq!(query.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unreachable_remote_counts_transport_errors() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let remote = HttpRemote::with_timeout(
        &format!("http://127.0.0.1:{port}"),
        Duration::from_secs(2),
    )
    .unwrap();
    let mut runner = ScenarioRunner::new(remote, NoopMonitor, RunOptions::default());

    let scenario = Scenario::insert("E1", "unreachable", 10, 100).unwrap();
    let record = runner.run(&scenario).await.unwrap();

    assert_eq!(runner.phase(), Phase::Completed);
    assert_eq!(record.success_count, 0);
    assert_eq!(record.error_count, 10);
    assert_eq!(record.avg_latency_ms, 0.0);
    assert_eq!(record.p99_latency_ms, 0.0);
    assert_eq!(record.throughput_logs_per_sec, 0.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn artifact_is_persisted() {
    let server = MockServer::new().await;
    let results = tempfile::tempdir().unwrap();

    let remote = HttpRemote::new(&server.base_url()).unwrap();
    let options = RunOptions {
        results_dir: Some(results.path().to_owned()),
        ..Default::default()
    };
    let mut runner = ScenarioRunner::new(remote, SystemMonitor::new(), options);

    let scenario = Scenario::insert("A1", "artifact", 20, 100).unwrap();
    let record = runner.run(&scenario).await.unwrap();
    assert!(record.resources.memory_avg_mb > 0.0, "{record:?}");

    let contents = std::fs::read(results.path().join("A1_insert.json")).unwrap();
    let stored: serde_json::Value = serde_json::from_slice(&contents).unwrap();

    let object = stored.as_object().unwrap();
    assert_eq!(object.len(), 13);
    assert_eq!(object["scenario_id"], "A1");
    assert_eq!(object["scenario_name"], "artifact");
    assert_eq!(object["total_logs"], 20);
    assert_eq!(object["rate"], 100);
    assert_eq!(object["success_count"], 20);
    assert_eq!(object["error_count"], 0);

    let resources = object["resources"].as_object().unwrap();
    for field in [
        "cpu_avg_percent",
        "memory_avg_mb",
        "disk_read_mb",
        "disk_write_mb",
    ] {
        assert!(resources[field].is_number(), "{field}");
    }
}
