//! Verification scenarios driven against one container each.
//!
//! Every scenario launches its own container, waits for the in-container
//! readiness command, polls the metrics endpoint, throws away the baseline
//! scrape and only then asserts on content. The container is removed whatever
//! the outcome.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use uuid::Uuid;

use super::config::HarnessConfig;
use super::container::{ContainerLauncher, ManagedContainer};
use crate::error::HarnessError;
use crate::metrics::{MetricsClient, MetricsEndpoint, ShapeChecks};
use crate::poll::poll_until;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioKind {
    GoldenPath,
    MetricNames,
    MetricLabels,
    RapidFire,
    SlowScrape,
    ContainerRestart,
    ServiceRestart,
}

impl ScenarioKind {
    pub const ALL: [ScenarioKind; 7] = [
        ScenarioKind::GoldenPath,
        ScenarioKind::MetricNames,
        ScenarioKind::MetricLabels,
        ScenarioKind::RapidFire,
        ScenarioKind::SlowScrape,
        ScenarioKind::ContainerRestart,
        ScenarioKind::ServiceRestart,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ScenarioKind::GoldenPath => "golden-path",
            ScenarioKind::MetricNames => "metric-names",
            ScenarioKind::MetricLabels => "metric-labels",
            ScenarioKind::RapidFire => "rapid-fire",
            ScenarioKind::SlowScrape => "slow-scrape",
            ScenarioKind::ContainerRestart => "container-restart",
            ScenarioKind::ServiceRestart => "service-restart",
        }
    }

    /// Validators applied to each asserted scrape of this scenario.
    pub fn checks(&self) -> ShapeChecks {
        match self {
            ScenarioKind::MetricNames => ShapeChecks {
                suffixes: true,
                labels: false,
            },
            ScenarioKind::MetricLabels => ShapeChecks {
                suffixes: false,
                labels: true,
            },
            ScenarioKind::ContainerRestart | ScenarioKind::ServiceRestart => ShapeChecks::ALL,
            ScenarioKind::GoldenPath | ScenarioKind::RapidFire | ScenarioKind::SlowScrape => {
                ShapeChecks::NON_EMPTY
            }
        }
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One scrape whose content was asserted on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeRecord {
    pub phase: String,
    pub port: u16,
    pub sample_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub run_id: Uuid,
    pub scenario: ScenarioKind,
    pub container_id: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub scrapes: Vec<ScrapeRecord>,
}

#[derive(Debug)]
pub struct ScenarioOutcome {
    pub scenario: ScenarioKind,
    pub result: Result<ScenarioReport, HarnessError>,
}

impl ScenarioOutcome {
    pub fn passed(&self) -> bool {
        self.result.is_ok()
    }
}

pub struct ScenarioRunner<L> {
    launcher: L,
    config: HarnessConfig,
    client: MetricsClient,
}

impl<L: ContainerLauncher> ScenarioRunner<L> {
    pub fn new(launcher: L, config: HarnessConfig) -> Result<Self, HarnessError> {
        config
            .validate()
            .map_err(|e| HarnessError::Config(format!("{e:#}")))?;
        let client = MetricsClient::new(config.request_timeout())?;
        Ok(Self {
            launcher,
            config,
            client,
        })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub async fn run(&self, kind: ScenarioKind) -> Result<ScenarioReport, HarnessError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();
        log::info!("[{run_id}] Starting scenario {kind}");

        let mut container =
            ManagedContainer::launch(&self.launcher, &self.config.container_spec()).await?;
        let container_id = container.id().to_string();

        let mut scrapes = Vec::new();
        let outcome = self.drive(kind, &mut container, &mut scrapes).await;
        if let Err(e) = &outcome {
            log::warn!("[{run_id}] Scenario {kind} failed: {e}");
        }
        container.dispose(outcome).await?;

        let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        log::info!("[{run_id}] Scenario {kind} passed in {elapsed_ms}ms");
        Ok(ScenarioReport {
            run_id,
            scenario: kind,
            container_id,
            started_at,
            elapsed_ms,
            scrapes,
        })
    }

    /// Run every scenario concurrently, one container each.
    pub async fn run_all(&self, kinds: &[ScenarioKind]) -> Vec<ScenarioOutcome> {
        join_all(kinds.iter().map(|&scenario| async move {
            ScenarioOutcome {
                scenario,
                result: self.run(scenario).await,
            }
        }))
        .await
    }

    async fn drive(
        &self,
        kind: ScenarioKind,
        container: &mut ManagedContainer<L::Container>,
        scrapes: &mut Vec<ScrapeRecord>,
    ) -> Result<(), HarnessError> {
        self.wait_for_container_ready(container).await?;
        let checks = kind.checks();

        match kind {
            ScenarioKind::GoldenPath | ScenarioKind::MetricNames | ScenarioKind::MetricLabels => {
                let port = self.metrics_ready(container).await?;
                scrapes.push(self.settled_scrape("settled", port, checks).await?);
            }
            ScenarioKind::RapidFire => {
                let port = self.metrics_ready(container).await?;
                self.rapid_fire(port).await?;
                tokio::time::sleep(self.config.rapid_fire_tail()).await;
                scrapes.push(self.checked_scrape("after-rapid-fire", port, checks).await?);
            }
            ScenarioKind::SlowScrape => {
                let port = self.metrics_ready(container).await?;
                for round in 1..=self.config.slow_scrape_rounds {
                    tokio::time::sleep(self.config.slow_scrape_interval()).await;
                    let phase = format!("slow-round-{round}");
                    scrapes.push(self.checked_scrape(&phase, port, checks).await?);
                }
            }
            ScenarioKind::ContainerRestart => {
                let port = self.metrics_ready(container).await?;
                scrapes.push(self.settled_scrape("before-restart", port, checks).await?);

                container.stop().await?;
                container.start().await?;
                self.wait_for_container_ready(container).await?;

                let port = self.metrics_ready(container).await?;
                scrapes.push(self.settled_scrape("after-restart", port, checks).await?);
            }
            ScenarioKind::ServiceRestart => {
                let port = self.metrics_ready(container).await?;
                scrapes.push(self.settled_scrape("before-restart", port, checks).await?);

                self.restart_service(container).await?;

                let port = self.metrics_ready(container).await?;
                scrapes.push(self.settled_scrape("after-restart", port, checks).await?);
            }
        }
        Ok(())
    }

    /// Poll the readiness command inside the container until it exits 0.
    async fn wait_for_container_ready(
        &self,
        container: &ManagedContainer<L::Container>,
    ) -> Result<(), HarnessError> {
        let command = self.config.readiness_command();
        let what = format!("readiness of container {}", container.id());
        poll_until(&self.config.container_ready_policy(), &what, || async {
            match container.exec(&command).await {
                Ok(output) if output.success() => Some(Ok(())),
                Ok(output) => {
                    log::debug!(
                        "{command:?} exited with {} in {}",
                        output.exit_code,
                        container.id()
                    );
                    None
                }
                Err(e) => Some(Err(e)),
            }
        })
        .await??;
        log::info!("Container {} reports ready", container.id());
        Ok(())
    }

    /// Resolve the metrics host port, wait for the endpoint and take the
    /// baseline scrape.
    async fn metrics_ready(
        &self,
        container: &ManagedContainer<L::Container>,
    ) -> Result<u16, HarnessError> {
        let port = container.host_port(self.config.metrics_port).await?;
        let endpoint = MetricsEndpoint::local(port);
        self.client
            .wait_for_ready(&endpoint, &self.config.metrics_poll_policy())
            .await?;
        self.client.discard_scrape(&endpoint).await?;
        Ok(port)
    }

    async fn settled_scrape(
        &self,
        phase: &str,
        port: u16,
        checks: ShapeChecks,
    ) -> Result<ScrapeRecord, HarnessError> {
        log::debug!("Settling for {:?} before {phase} scrape", self.config.settle_interval());
        tokio::time::sleep(self.config.settle_interval()).await;
        self.checked_scrape(phase, port, checks).await
    }

    async fn checked_scrape(
        &self,
        phase: &str,
        port: u16,
        checks: ShapeChecks,
    ) -> Result<ScrapeRecord, HarnessError> {
        let samples = self.client.scrape(&MetricsEndpoint::local(port)).await?;
        let report = self.config.shape.check(&samples, checks);
        if !report.is_clean() {
            return Err(HarnessError::Shape {
                phase: phase.to_string(),
                report,
            });
        }
        log::info!("{phase} scrape on port {port}: {} samples", samples.len());
        Ok(ScrapeRecord {
            phase: phase.to_string(),
            port,
            sample_count: samples.len(),
        })
    }

    /// Scrapes in quick succession; only transport and format failures count.
    async fn rapid_fire(&self, port: u16) -> Result<(), HarnessError> {
        let endpoint = MetricsEndpoint::local(port);
        for _ in 0..self.config.rapid_fire_count {
            self.client.scrape(&endpoint).await?;
            tokio::time::sleep(self.config.rapid_fire_interval()).await;
        }
        Ok(())
    }

    async fn restart_service(
        &self,
        container: &ManagedContainer<L::Container>,
    ) -> Result<(), HarnessError> {
        container
            .exec_checked(&self.config.service_stop_command())
            .await?;
        container
            .exec_checked(&self.config.service_start_command())
            .await?;
        log::info!(
            "Service in container {} restarted, waiting {:?}",
            container.id(),
            self.config.service_restart_grace()
        );
        tokio::time::sleep(self.config.service_restart_grace()).await;
        Ok(())
    }
}
