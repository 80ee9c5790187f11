//! # Failure Integration Tests
//!
//! A failing scenario reports why, never takes its siblings down with it and
//! always leaves its container removed.

use readycheck::error::{ContainerError, HarnessError, PollError, ScrapeError};
use readycheck::harness::{ContainerOp, HarnessConfig, ScenarioKind};
use readycheck::test_harness::{fast_config, FakeRuntime, SAMPLE_EXPOSITION};

use super::{fake_runner, fake_runner_with};

/// Has `qmgr` everywhere but one unapproved suffix, plus one unlabelled sample.
const NONCONFORMING_EXPOSITION: &str = r#"# TYPE ibmmq_queue_depth gauge
ibmmq_queue_depth{qmgr="qm1",queue="DEV.QUEUE.1"} 3
ibmmq_queue_depth{qmgr="qm1",queue="DEV.QUEUE.2"} 0
ibmmq_qmgr_commit_count{platform="UNIX"} 4
"#;

fn assert_cleaned_up(runtime: &FakeRuntime) {
    assert_eq!(runtime.live_containers(), 0);
    let ops = runtime.operations();
    assert!(
        ops.last().is_some_and(|op| op.starts_with("remove:")),
        "last operation was not a removal: {ops:?}"
    );
}

#[tokio::test]
async fn test_readiness_deadline_aborts_scenario_and_removes_container() {
    let config = HarnessConfig {
        readiness_command: vec!["never-ready".to_string()],
        container_ready_deadline_ms: 200,
        ..fast_config()
    };
    let (runtime, runner) = fake_runner_with(FakeRuntime::new(SAMPLE_EXPOSITION), config);

    let err = runner.run(ScenarioKind::GoldenPath).await.unwrap_err();

    assert!(matches!(
        err,
        HarnessError::Poll(PollError::DeadlineExceeded { .. })
    ));
    assert_cleaned_up(&runtime);
}

#[tokio::test]
async fn test_shape_violations_are_all_reported() {
    let (runtime, runner) = fake_runner(NONCONFORMING_EXPOSITION);

    let err = runner.run(ScenarioKind::MetricNames).await.unwrap_err();
    let HarnessError::Shape { phase, report } = &err else {
        panic!("expected a shape failure, got {err:?}");
    };
    assert_eq!(phase, "settled");
    assert_eq!(report.suffix_violations.len(), 1);
    assert_eq!(report.suffix_violations[0].key, "ibmmq_queue_depth");
    assert!(report.label_violations.is_empty());

    let err = runner.run(ScenarioKind::MetricLabels).await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("ibmmq_qmgr_commit_count"));
    assert!(message.contains("qmgr"));

    assert_cleaned_up(&runtime);
}

#[tokio::test]
async fn test_failing_scenario_does_not_affect_siblings() {
    let (runtime, runner) = fake_runner(NONCONFORMING_EXPOSITION);

    let outcomes = runner
        .run_all(&[
            ScenarioKind::GoldenPath,
            ScenarioKind::MetricNames,
            ScenarioKind::RapidFire,
        ])
        .await;

    let passed: Vec<bool> = outcomes.iter().map(|o| o.passed()).collect();
    assert_eq!(passed, vec![true, false, true]);
    assert_eq!(runtime.live_containers(), 0);
}

#[tokio::test]
async fn test_empty_exposition_fails_golden_path() {
    let (runtime, runner) = fake_runner("# no metrics yet\n");

    let err = runner.run(ScenarioKind::GoldenPath).await.unwrap_err();

    match err {
        HarnessError::Shape { report, .. } => assert!(report.is_empty_scrape()),
        other => panic!("expected a shape failure, got {other:?}"),
    }
    assert_cleaned_up(&runtime);
}

#[tokio::test]
async fn test_malformed_exposition_is_a_scrape_error() {
    let (runtime, runner) = fake_runner("ibmmq_qmgr_commit_count{qmgr=\"qm1\"} many\n");

    let err = runner.run(ScenarioKind::GoldenPath).await.unwrap_err();

    assert!(matches!(err, HarnessError::Scrape(ScrapeError::Parse(_))));
    assert_cleaned_up(&runtime);
}

#[tokio::test]
async fn test_failed_service_stop_reports_exit_code() {
    let config = HarnessConfig {
        service_stop_command: vec!["endmqm-missing".to_string(), "{qmgr}".to_string()],
        ..fast_config()
    };
    let (runtime, runner) = fake_runner_with(FakeRuntime::new(SAMPLE_EXPOSITION), config);

    let err = runner.run(ScenarioKind::ServiceRestart).await.unwrap_err();

    match err {
        HarnessError::Container(ContainerError::ExecFailed {
            command,
            exit_code,
            output,
        }) => {
            assert_eq!(command, vec!["endmqm-missing", "qm1"]);
            assert_eq!(exit_code, 127);
            assert!(output.contains("command not found"));
        }
        other => panic!("expected an exec failure, got {other:?}"),
    }
    assert_cleaned_up(&runtime);
}

#[tokio::test]
async fn test_container_stop_failure_still_removes_container() {
    let runtime = FakeRuntime::new(SAMPLE_EXPOSITION).fail_on(ContainerOp::Stop);
    let (runtime, runner) = fake_runner_with(runtime, fast_config());

    let err = runner.run(ScenarioKind::ContainerRestart).await.unwrap_err();

    assert!(matches!(
        err,
        HarnessError::Container(ContainerError::Operation {
            op: ContainerOp::Stop,
            ..
        })
    ));
    assert_cleaned_up(&runtime);
}

#[tokio::test]
async fn test_cleanup_failure_fails_an_otherwise_passing_scenario() {
    let runtime = FakeRuntime::new(SAMPLE_EXPOSITION).fail_on(ContainerOp::Remove);
    let (runtime, runner) = fake_runner_with(runtime, fast_config());

    let err = runner.run(ScenarioKind::GoldenPath).await.unwrap_err();

    assert!(matches!(
        err,
        HarnessError::Container(ContainerError::Operation {
            op: ContainerOp::Remove,
            ..
        })
    ));
    assert_eq!(runtime.live_containers(), 0);
}
