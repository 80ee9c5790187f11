use std::time::Duration;

use super::{exposition, MetricSample};
use crate::error::{PollError, ScrapeError};
use crate::poll::{poll_until, PollPolicy};

/// Location of a metrics exposition endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsEndpoint {
    url: String,
}

impl MetricsEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// `http://127.0.0.1:{port}/metrics`
    pub fn local(port: u16) -> Self {
        Self::new(format!("http://127.0.0.1:{port}/metrics"))
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[derive(Debug, Clone)]
pub struct MetricsClient {
    http: reqwest::Client,
}

impl MetricsClient {
    pub fn new(request_timeout: Duration) -> Result<Self, ScrapeError> {
        // Every request opens a fresh connection: a pooled one can outlive the
        // container or exporter it was made to.
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .pool_max_idle_per_host(0)
            .build()?;
        Ok(Self { http })
    }

    /// One GET; any 2xx counts as up, regardless of the body.
    pub async fn probe(&self, endpoint: &MetricsEndpoint) -> bool {
        match self.http.get(endpoint.url()).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                log::debug!("{} not ready: status {}", endpoint.url(), resp.status());
                false
            }
            Err(e) => {
                log::debug!("{} not ready: {e}", endpoint.url());
                false
            }
        }
    }

    /// Block until the endpoint answers with a success status or the deadline passes.
    pub async fn wait_for_ready(
        &self,
        endpoint: &MetricsEndpoint,
        policy: &PollPolicy,
    ) -> Result<(), PollError> {
        log::info!(
            "Waiting up to {:?} for metrics endpoint {}",
            policy.deadline,
            endpoint.url()
        );
        poll_until(policy, endpoint.url(), || async {
            self.probe(endpoint).await.then_some(())
        })
        .await?;
        log::info!("Metrics endpoint {} is up", endpoint.url());
        Ok(())
    }

    pub async fn scrape(
        &self,
        endpoint: &MetricsEndpoint,
    ) -> Result<Vec<MetricSample>, ScrapeError> {
        let resp = self.http.get(endpoint.url()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ScrapeError::Status {
                url: endpoint.url().to_string(),
                status: status.as_u16(),
            });
        }
        let body = resp.text().await?;
        let samples = exposition::parse(&body)?;
        log::debug!("Scraped {} samples from {}", samples.len(), endpoint.url());
        Ok(samples)
    }

    /// The first scrape after the exporter starts only establishes its baseline,
    /// so its content is thrown away.
    pub async fn discard_scrape(&self, endpoint: &MetricsEndpoint) -> Result<(), ScrapeError> {
        let discarded = self.scrape(endpoint).await?;
        log::debug!(
            "Discarded baseline scrape of {} ({} samples)",
            endpoint.url(),
            discarded.len()
        );
        Ok(())
    }
}
