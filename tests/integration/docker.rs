//! # Docker Integration Tests
//!
//! Runs scenarios against a real queue manager image. Ignored by default; set
//! `READYCHECK_IMAGE` (and optionally `READYCHECK_TAG`) and run with
//! `--ignored`. These take minutes: the default settle and grace intervals apply.

use readycheck::harness::{DockerLauncher, HarnessConfig, ScenarioKind, ScenarioRunner};

fn docker_config() -> Option<HarnessConfig> {
    std::env::var("READYCHECK_IMAGE").ok()?;
    let mut config = HarnessConfig::default();
    config.apply_env_overrides();
    Some(config)
}

async fn run_on_docker(kind: ScenarioKind) {
    let _ = env_logger::builder().is_test(true).try_init();
    let Some(config) = docker_config() else {
        eprintln!("READYCHECK_IMAGE not set, skipping {kind}");
        return;
    };

    let runner = ScenarioRunner::new(DockerLauncher, config).unwrap();
    let report = runner.run(kind).await.unwrap();
    assert!(report.scrapes.iter().all(|s| s.sample_count > 0));
}

#[tokio::test]
#[ignore]
async fn test_docker_golden_path() {
    run_on_docker(ScenarioKind::GoldenPath).await;
}

#[tokio::test]
#[ignore]
async fn test_docker_metric_shape() {
    run_on_docker(ScenarioKind::MetricNames).await;
    run_on_docker(ScenarioKind::MetricLabels).await;
}

#[tokio::test]
#[ignore]
async fn test_docker_container_restart() {
    run_on_docker(ScenarioKind::ContainerRestart).await;
}

#[tokio::test]
#[ignore]
async fn test_docker_service_restart() {
    run_on_docker(ScenarioKind::ServiceRestart).await;
}
