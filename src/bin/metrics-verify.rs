use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, Command, ValueEnum};
use log::info;
use serde_json::json;
use std::process::ExitCode;

use readycheck::harness::{
    create_sample_config, load_config, DockerLauncher, ScenarioKind, ScenarioRunner,
};

fn cli() -> Command {
    Command::new("metrics-verify")
        .version("0.1.0")
        .about("Verify a containerised queue manager's metrics endpoint across its lifecycle")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config/metrics-verify.toml"),
        )
        .arg(
            Arg::new("scenario")
                .short('s')
                .long("scenario")
                .value_name("NAME")
                .help("Scenario to run; repeat for several (default: all)")
                .action(ArgAction::Append)
                .value_parser(value_parser!(ScenarioKind)),
        )
        .arg(
            Arg::new("image")
                .short('i')
                .long("image")
                .value_name("IMAGE")
                .help("Container image to verify"),
        )
        .arg(
            Arg::new("tag")
                .short('t')
                .long("tag")
                .value_name("TAG")
                .help("Image tag"),
        )
        .arg(
            Arg::new("qmgr")
                .short('q')
                .long("qmgr")
                .value_name("NAME")
                .help("Queue manager name"),
        )
        .arg(
            Arg::new("metrics-port")
                .short('p')
                .long("metrics-port")
                .value_name("PORT")
                .help("Container port of the metrics endpoint")
                .value_parser(value_parser!(u16)),
        )
        .arg(
            Arg::new("settle-ms")
                .long("settle-ms")
                .value_name("MILLIS")
                .help("Wait after the discard scrape before asserting")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("poll-deadline-ms")
                .long("poll-deadline-ms")
                .value_name("MILLIS")
                .help("How long to wait for the metrics endpoint")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print results as JSON")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("write-sample-config")
                .long("write-sample-config")
                .value_name("FILE")
                .help("Write the default configuration to FILE and exit"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (error, warn, info, debug, trace)")
                .default_value("info"),
        )
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let matches = cli().get_matches();

    let log_level = matches
        .get_one::<String>("log-level")
        .map(String::as_str)
        .unwrap_or("info");
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    if let Some(path) = matches.get_one::<String>("write-sample-config") {
        create_sample_config(path)?;
        return Ok(ExitCode::SUCCESS);
    }

    let config_path = matches.get_one::<String>("config");
    let config = load_config(config_path.map(|s| s.as_str()), &matches)?;

    let scenarios: Vec<ScenarioKind> = match matches.get_many::<ScenarioKind>("scenario") {
        Some(selected) => selected.copied().collect(),
        None => ScenarioKind::value_variants().to_vec(),
    };

    let runner = ScenarioRunner::new(DockerLauncher, config).context("Failed to create runner")?;
    info!(
        "Running {} scenario(s) against {} (queue manager {})",
        scenarios.len(),
        runner.config().container_spec().image_ref(),
        runner.config().queue_manager
    );
    let outcomes = runner.run_all(&scenarios).await;

    if matches.get_flag("json") {
        let results: Vec<_> = outcomes
            .iter()
            .map(|outcome| match &outcome.result {
                Ok(report) => json!({
                    "scenario": outcome.scenario,
                    "passed": true,
                    "report": report,
                }),
                Err(e) => json!({
                    "scenario": outcome.scenario,
                    "passed": false,
                    "error": e.to_string(),
                }),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        for outcome in &outcomes {
            match &outcome.result {
                Ok(report) => println!(
                    "PASS {:<18} {}ms ({} asserted scrapes)",
                    outcome.scenario.name(),
                    report.elapsed_ms,
                    report.scrapes.len()
                ),
                Err(e) => println!("FAIL {:<18} {e}", outcome.scenario.name()),
            }
        }
    }

    let failed = outcomes.iter().filter(|o| !o.passed()).count();
    if failed > 0 {
        log::error!("{failed} of {} scenario(s) failed", outcomes.len());
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
