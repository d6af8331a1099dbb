use tracing_subscriber::EnvFilter;

/// Initialize the logger for testing.
///
/// Events of the benchmark crates are written to the output captured by the test runner.
/// `RUST_LOG` replaces the default filter if set.
///
/// # Example
///
/// ```
/// ingestbench_test::tracing::init();
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ERROR,ingestbench=DEBUG,ingestbench_test=DEBUG"));

    tracing_subscriber::fmt::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_test_writer()
        .compact()
        .try_init()
        .ok();
}
