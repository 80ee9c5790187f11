//! End-to-end scenario tests.
//!
//! Everything except `docker` runs against the in-process fake runtime, so the
//! suite needs no container engine:
//!
//! ```bash
//! cargo test --features test-harness
//! ```
//!
//! ## Test Organization
//!
//! - **scenarios**: each scenario kind on a healthy fake service, and concurrency
//! - **failures**: deadlines, shape violations and runtime errors, with cleanup
//! - **docker**: the same scenarios against a real image (`#[ignore]`, needs
//!   `READYCHECK_IMAGE`)

pub mod docker;
pub mod failures;
pub mod scenarios;

use readycheck::harness::{HarnessConfig, ScenarioRunner};
use readycheck::test_harness::{fast_config, FakeRuntime};

pub fn fake_runner(body: &str) -> (FakeRuntime, ScenarioRunner<FakeRuntime>) {
    fake_runner_with(FakeRuntime::new(body), fast_config())
}

pub fn fake_runner_with(
    runtime: FakeRuntime,
    config: HarnessConfig,
) -> (FakeRuntime, ScenarioRunner<FakeRuntime>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let runner = ScenarioRunner::new(runtime.clone(), config).expect("valid fake config");
    (runtime, runner)
}
