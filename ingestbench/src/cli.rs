use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::{Context, Result};
use argh::FromArgs;
use yansi::Paint;

use crate::config::{Config, Selection};
use crate::http::HttpRemote;
use crate::monitor::SystemMonitor;
use crate::observability;
use crate::runner::ScenarioRunner;
use crate::suite::{self, SuitePlan};

/// Load generator and latency benchmark for log-ingestion services.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    pub config: Option<PathBuf>,

    #[argh(subcommand)]
    pub command: Command,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum Command {
    Run(RunCommand),
    Healthcheck(HealthcheckCommand),
    Scenarios(ScenariosCommand),
    Version(VersionCommand),
}

/// run the selected scenarios against the system under test
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "run")]
struct RunCommand {
    /// comma-separated scenario ids to run, e.g. S1,S3
    #[argh(option)]
    only: Option<String>,

    /// run only the quick scenarios S1, S5 and S9
    #[argh(switch)]
    quick: bool,

    /// directory for the JSON result artifacts
    #[argh(option)]
    results_dir: Option<PathBuf>,

    /// skip the query scenarios
    #[argh(switch)]
    no_queries: bool,
}

/// check that the system under test reports healthy
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "healthcheck")]
struct HealthcheckCommand {}

/// list the scenarios selected by the configuration
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "scenarios")]
struct ScenariosCommand {}

/// print the ingestbench version
#[derive(Default, Debug, FromArgs)]
#[argh(subcommand, name = "version")]
struct VersionCommand {}

impl RunCommand {
    fn apply(&self, config: &mut Config) {
        if let Some(only) = &self.only {
            let ids = only
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_owned)
                .collect();
            config.selection = Selection::Only(ids);
        } else if self.quick {
            config.selection = Selection::Quick;
        }

        if let Some(dir) = &self.results_dir {
            config.results_dir = Some(dir.clone());
        }

        if self.no_queries {
            config.queries = false;
        }
    }
}

/// Bootstrap the runtime and execute the CLI command.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();

    // Special switch to just print the version and exit.
    if let Command::Version(_) = args.command {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let mut config = Config::load(args.config.as_deref()).context("failed to load config")?;
    if let Command::Run(run) = &args.command {
        run.apply(&mut config);
    }

    if let Command::Scenarios(_) = args.command {
        return list_scenarios(&config);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("bench-rt")
        .enable_all()
        .build()?;
    let _runtime_guard = runtime.enter();

    observability::initialize_tracing(&config.logging);
    tracing::debug!(?config);

    let remote = HttpRemote::with_timeout(&config.remote, config.request_timeout)?;

    runtime.block_on(run_command(args.command, config, remote))
}

async fn run_command(command: Command, config: Config, remote: HttpRemote) -> Result<()> {
    match command {
        Command::Run(_) => {
            let plan = SuitePlan::from_config(&config)?;
            let options = config.run_options(std::io::stderr().is_terminal());
            let mut runner = ScenarioRunner::new(remote, SystemMonitor::new(), options);

            suite::run_suite(&mut runner, &plan)
                .await
                .context("benchmark aborted")?;
        }
        Command::Healthcheck(HealthcheckCommand {}) => remote.healthcheck().await?,
        Command::Scenarios(_) | Command::Version(_) => unreachable!(),
    }

    Ok(())
}

fn list_scenarios(config: &Config) -> Result<()> {
    let scenarios = config.selected_scenarios()?;

    println!("{}", "## Scenarios".bold());
    for scenario in &scenarios {
        println!(
            "  {:<6} {:<24} {:>8} logs @ {:>6}/s  ~{:.0?}",
            scenario.id().bold(),
            scenario.name(),
            scenario.total_count(),
            scenario.rate(),
            scenario.expected_duration()
        );
    }

    if config.queries {
        println!(
            "each followed by a query scenario with a tenth of the requests ({} after a {:?} pause)",
            "GET /logs?limit=100".blue(),
            config.query_pause
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_flags_override_config() {
        let command = RunCommand {
            only: Some("S3, S1,".into()),
            quick: true,
            results_dir: Some("out".into()),
            no_queries: true,
        };

        let mut config = Config::default();
        command.apply(&mut config);

        assert_eq!(
            config.selection,
            Selection::Only(vec!["S3".into(), "S1".into()])
        );
        assert_eq!(config.results_dir, Some(PathBuf::from("out")));
        assert!(!config.queries);
    }

    #[test]
    fn quick_flag() {
        let command = RunCommand {
            only: None,
            quick: true,
            results_dir: None,
            no_queries: false,
        };

        let mut config = Config::default();
        command.apply(&mut config);

        assert_eq!(config.selection, Selection::Quick);
        assert!(config.queries);
    }

    #[test]
    fn parses_run_command() {
        let args = Args::from_args(
            &["ingestbench"],
            &["-c", "bench.yml", "run", "--only", "S1,S2", "--no-queries"],
        )
        .unwrap();

        assert_eq!(args.config, Some(PathBuf::from("bench.yml")));
        let Command::Run(run) = args.command else {
            panic!("expected run command");
        };
        assert_eq!(run.only.as_deref(), Some("S1,S2"));
        assert!(run.no_queries);
        assert!(!run.quick);
    }
}
