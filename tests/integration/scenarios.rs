//! # Scenario Integration Tests
//!
//! Every scenario kind driven end to end against a healthy fake service:
//! launch, in-container readiness, metrics polling, baseline discard, settle and
//! the asserted scrapes, followed by container removal.

use readycheck::harness::{ScenarioKind, ScenarioReport};
use readycheck::test_harness::{fast_config, SAMPLE_EXPOSITION};
use std::collections::HashSet;
use std::time::Duration;

use super::fake_runner;

fn phases(report: &ScenarioReport) -> Vec<&str> {
    report.scrapes.iter().map(|s| s.phase.as_str()).collect()
}

#[tokio::test]
async fn test_golden_path() {
    let (runtime, runner) = fake_runner(SAMPLE_EXPOSITION);

    let report = runner.run(ScenarioKind::GoldenPath).await.unwrap();

    assert_eq!(report.scenario, ScenarioKind::GoldenPath);
    assert_eq!(phases(&report), vec!["settled"]);
    assert_eq!(report.scrapes[0].sample_count, 6);
    assert!(report.elapsed_ms >= fast_config().settle_interval_ms);
    assert_eq!(
        runtime.operations(),
        vec![
            format!("launch:{}", report.container_id),
            format!("remove:{}", report.container_id),
        ]
    );
    assert_eq!(runtime.live_containers(), 0);
}

#[tokio::test]
async fn test_asserted_scrape_follows_discard_and_settle() {
    let (runtime, runner) = fake_runner(SAMPLE_EXPOSITION);

    let report = runner.run(ScenarioKind::GoldenPath).await.unwrap();
    let served = runtime.served(&report.container_id);

    // Readiness poll takes the empty baseline, then the discarded scrape, then the asserted one.
    assert_eq!(served.len(), 3, "{served:?}");
    assert!(served.iter().all(|r| r.status == 200));
    assert!(served[0].empty);
    assert!(!served[1].empty);
    assert!(!served[2].empty);

    let settle = Duration::from_millis(fast_config().settle_interval_ms);
    assert!(served[2].at.duration_since(served[1].at) >= settle);
}

#[tokio::test]
async fn test_metric_names_and_labels_pass_on_conforming_exporter() {
    let (_runtime, runner) = fake_runner(SAMPLE_EXPOSITION);

    for kind in [ScenarioKind::MetricNames, ScenarioKind::MetricLabels] {
        let report = runner.run(kind).await.unwrap();
        assert_eq!(phases(&report), vec!["settled"]);
    }
}

#[tokio::test]
async fn test_rapid_fire() {
    let (_runtime, runner) = fake_runner(SAMPLE_EXPOSITION);

    let report = runner.run(ScenarioKind::RapidFire).await.unwrap();

    assert_eq!(phases(&report), vec!["after-rapid-fire"]);
    assert!(report.scrapes[0].sample_count > 0);
}

#[tokio::test]
async fn test_slow_scrape() {
    let (_runtime, runner) = fake_runner(SAMPLE_EXPOSITION);

    let report = runner.run(ScenarioKind::SlowScrape).await.unwrap();

    assert_eq!(phases(&report), vec!["slow-round-1", "slow-round-2"]);
    let config = fast_config();
    assert!(
        report.elapsed_ms >= config.slow_scrape_interval_ms * u64::from(config.slow_scrape_rounds)
    );
}

#[tokio::test]
async fn test_container_restart_scrapes_before_and_after() {
    let (runtime, runner) = fake_runner(SAMPLE_EXPOSITION);

    let report = runner.run(ScenarioKind::ContainerRestart).await.unwrap();

    assert_eq!(phases(&report), vec!["before-restart", "after-restart"]);
    assert!(report.scrapes.iter().all(|s| s.sample_count > 0));

    let id = &report.container_id;
    assert_eq!(
        runtime.operations(),
        vec![
            format!("launch:{id}"),
            format!("stop:{id}"),
            format!("start:{id}"),
            format!("remove:{id}"),
        ]
    );
}

#[tokio::test]
async fn test_service_restart_keeps_container_running() {
    let (runtime, runner) = fake_runner(SAMPLE_EXPOSITION);

    let report = runner.run(ScenarioKind::ServiceRestart).await.unwrap();

    assert_eq!(phases(&report), vec!["before-restart", "after-restart"]);
    assert_eq!(report.scrapes[0].port, report.scrapes[1].port);
    // The restart happens inside the container, not through the runtime.
    assert_eq!(runtime.operations().len(), 2);

    // Each service start yields a fresh baseline that is never asserted on.
    let empty: Vec<bool> = runtime
        .served(&report.container_id)
        .iter()
        .map(|r| r.empty)
        .collect();
    assert_eq!(empty, vec![true, false, false, true, false, false]);
}

#[tokio::test]
async fn test_all_scenarios_run_concurrently_on_separate_containers() {
    let (runtime, runner) = fake_runner(SAMPLE_EXPOSITION);

    let outcomes = runner.run_all(&ScenarioKind::ALL).await;

    assert_eq!(outcomes.len(), ScenarioKind::ALL.len());
    for outcome in &outcomes {
        assert!(
            outcome.passed(),
            "{} failed: {:?}",
            outcome.scenario,
            outcome.result
        );
    }

    let ids: HashSet<&str> = outcomes
        .iter()
        .filter_map(|o| o.result.as_ref().ok())
        .map(|r| r.container_id.as_str())
        .collect();
    assert_eq!(ids.len(), ScenarioKind::ALL.len());
    assert_eq!(runtime.live_containers(), 0);
}

#[tokio::test]
async fn test_report_serializes_for_machine_output() {
    let (_runtime, runner) = fake_runner(SAMPLE_EXPOSITION);

    let report = runner.run(ScenarioKind::GoldenPath).await.unwrap();
    let value = serde_json::to_value(&report).unwrap();

    assert_eq!(value["scenario"], "golden-path");
    assert_eq!(value["run_id"], report.run_id.to_string());
    assert_eq!(value["scrapes"][0]["phase"], "settled");
}
