//! Runs a sequence of scenarios after a single pre-flight health check.

use std::time::Duration;

use crate::config::Config;
use crate::error::Result;
use crate::monitor::ResourceMonitor;
use crate::result::{self, ResultRecord};
use crate::runner::ScenarioRunner;
use crate::scenario::Scenario;

/// The scenarios of a suite and the pauses between them.
#[derive(Clone, Debug)]
pub struct SuitePlan {
    /// Insert scenarios, run in order.
    pub scenarios: Vec<Scenario>,
    /// Follow every insert scenario with its query variant.
    pub queries: bool,
    pub scenario_pause: Duration,
    pub query_pause: Duration,
}

impl SuitePlan {
    /// Builds the plan for the scenarios selected by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            scenarios: config.selected_scenarios()?,
            queries: config.queries,
            scenario_pause: config.scenario_pause,
            query_pause: config.query_pause,
        })
    }
}

/// Runs every scenario of `plan` and returns the records in run order.
///
/// The system under test must pass the health check first. If it does not, no scenario is
/// started and the error is returned. Failing requests never stop the suite.
pub async fn run_suite<M: ResourceMonitor>(
    runner: &mut ScenarioRunner<M>,
    plan: &SuitePlan,
) -> Result<Vec<ResultRecord>> {
    runner.remote().healthcheck().await?;

    let capacity = plan.scenarios.len() * if plan.queries { 2 } else { 1 };
    let mut records = Vec::with_capacity(capacity);

    for (index, scenario) in plan.scenarios.iter().enumerate() {
        if index > 0 && !plan.scenario_pause.is_zero() {
            tracing::debug!(pause = ?plan.scenario_pause, "pausing before next scenario");
            tokio::time::sleep(plan.scenario_pause).await;
        }

        records.push(runner.run(scenario).await?);

        if !plan.queries {
            continue;
        }

        let query = scenario.query_variant();
        if query.total_count() == 0 {
            tracing::info!(scenario = query.id(), "skipping query scenario without requests");
            continue;
        }

        tokio::time::sleep(plan.query_pause).await;
        records.push(runner.run(&query).await?);
    }

    if let Some(dir) = &runner.options().results_dir {
        match result::write_all_results(dir, &records) {
            Ok(path) => tracing::info!(path = %path.display(), "all results saved"),
            Err(error) => tracing::error!(
                error = &error as &dyn std::error::Error,
                "failed to save combined results"
            ),
        }
    }

    result::print_totals(&records);
    Ok(records)
}
