use anyhow::{Context, Result};
use clap::ArgMatches;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use super::container::ContainerSpec;
use crate::metrics::ShapeRules;
use crate::poll::PollPolicy;

const QMGR_PLACEHOLDER: &str = "{qmgr}";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub image: String,
    pub tag: String,
    pub queue_manager: String,
    pub metrics_port: u16,
    /// Container environment; `{qmgr}` expands to the queue manager name.
    pub env: BTreeMap<String, String>,
    pub ready_message: Option<String>,
    pub readiness_command: Vec<String>,
    pub service_stop_command: Vec<String>,
    pub service_start_command: Vec<String>,
    pub poll_interval_ms: u64,
    pub poll_deadline_ms: u64,
    pub container_ready_deadline_ms: u64,
    pub request_timeout_ms: u64,
    /// Wait between the discard scrape and the first asserted scrape. This is an
    /// assumption about how long the exporter needs after its baseline
    /// collection, not something the exporter advertises.
    pub settle_interval_ms: u64,
    pub service_restart_grace_ms: u64,
    pub rapid_fire_count: u32,
    pub rapid_fire_interval_ms: u64,
    pub rapid_fire_tail_ms: u64,
    pub slow_scrape_rounds: u32,
    pub slow_scrape_interval_ms: u64,
    #[serde(flatten)]
    pub shape: ShapeRules,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        let env = [
            ("LICENSE", "accept"),
            ("MQ_QMGR_NAME", QMGR_PLACEHOLDER),
            ("MQ_ENABLE_METRICS", "true"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            image: "ibmcom/mq".to_string(),
            tag: "latest".to_string(),
            queue_manager: "qm1".to_string(),
            metrics_port: 9157,
            env,
            ready_message: None,
            readiness_command: vec!["chkmqready".to_string()],
            service_stop_command: vec![
                "endmqm".to_string(),
                "-w".to_string(),
                QMGR_PLACEHOLDER.to_string(),
            ],
            service_start_command: vec!["strmqm".to_string(), QMGR_PLACEHOLDER.to_string()],
            poll_interval_ms: 1000,
            poll_deadline_ms: 60_000,
            container_ready_deadline_ms: 120_000,
            request_timeout_ms: 10_000,
            settle_interval_ms: 15_000,
            service_restart_grace_ms: 10_000,
            rapid_fire_count: 30,
            rapid_fire_interval_ms: 1000,
            rapid_fire_tail_ms: 11_000,
            slow_scrape_rounds: 2,
            slow_scrape_interval_ms: 30_000,
            shape: ShapeRules::default(),
        }
    }
}

impl HarnessConfig {
    pub fn validate(&self) -> Result<()> {
        if self.image.trim().is_empty() {
            return Err(anyhow::anyhow!("image must not be empty"));
        }

        if self.queue_manager.trim().is_empty() {
            return Err(anyhow::anyhow!("queue_manager must not be empty"));
        }

        if self.metrics_port == 0 {
            return Err(anyhow::anyhow!("metrics_port must be greater than 0"));
        }

        for (name, command) in [
            ("readiness_command", &self.readiness_command),
            ("service_stop_command", &self.service_stop_command),
            ("service_start_command", &self.service_start_command),
        ] {
            if command.is_empty() {
                return Err(anyhow::anyhow!("{name} must not be empty"));
            }
        }

        if self.poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("poll_interval_ms must be greater than 0"));
        }

        if self.poll_deadline_ms < self.poll_interval_ms {
            return Err(anyhow::anyhow!(
                "poll_deadline_ms ({}) must not be shorter than poll_interval_ms ({})",
                self.poll_deadline_ms,
                self.poll_interval_ms
            ));
        }

        if self.container_ready_deadline_ms < self.poll_interval_ms {
            return Err(anyhow::anyhow!(
                "container_ready_deadline_ms must not be shorter than poll_interval_ms"
            ));
        }

        if self.request_timeout_ms == 0 {
            return Err(anyhow::anyhow!("request_timeout_ms must be greater than 0"));
        }

        if self.shape.approved_suffixes.is_empty() {
            return Err(anyhow::anyhow!("approved_suffixes must not be empty"));
        }

        Ok(())
    }

    fn expand(&self, value: &str) -> String {
        value.replace(QMGR_PLACEHOLDER, &self.queue_manager)
    }

    fn expand_command(&self, command: &[String]) -> Vec<String> {
        command.iter().map(|part| self.expand(part)).collect()
    }

    pub fn container_spec(&self) -> ContainerSpec {
        ContainerSpec {
            image: self.image.clone(),
            tag: self.tag.clone(),
            env: self
                .env
                .iter()
                .map(|(k, v)| (k.clone(), self.expand(v)))
                .collect(),
            exposed_ports: vec![self.metrics_port],
            ready_message: self.ready_message.clone(),
        }
    }

    pub fn readiness_command(&self) -> Vec<String> {
        self.expand_command(&self.readiness_command)
    }

    pub fn service_stop_command(&self) -> Vec<String> {
        self.expand_command(&self.service_stop_command)
    }

    pub fn service_start_command(&self) -> Vec<String> {
        self.expand_command(&self.service_start_command)
    }

    pub fn metrics_poll_policy(&self) -> PollPolicy {
        PollPolicy::new(
            Duration::from_millis(self.poll_interval_ms),
            Duration::from_millis(self.poll_deadline_ms),
        )
    }

    pub fn container_ready_policy(&self) -> PollPolicy {
        PollPolicy::new(
            Duration::from_millis(self.poll_interval_ms),
            Duration::from_millis(self.container_ready_deadline_ms),
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn settle_interval(&self) -> Duration {
        Duration::from_millis(self.settle_interval_ms)
    }

    pub fn service_restart_grace(&self) -> Duration {
        Duration::from_millis(self.service_restart_grace_ms)
    }

    pub fn rapid_fire_interval(&self) -> Duration {
        Duration::from_millis(self.rapid_fire_interval_ms)
    }

    pub fn rapid_fire_tail(&self) -> Duration {
        Duration::from_millis(self.rapid_fire_tail_ms)
    }

    pub fn slow_scrape_interval(&self) -> Duration {
        Duration::from_millis(self.slow_scrape_interval_ms)
    }

    /// Arguments the command does not define are ignored.
    pub fn apply_cli_overrides(&mut self, matches: &ArgMatches) {
        if let Some(image) = matches.try_get_one::<String>("image").ok().flatten() {
            self.image = image.clone();
        }

        if let Some(tag) = matches.try_get_one::<String>("tag").ok().flatten() {
            self.tag = tag.clone();
        }

        if let Some(qmgr) = matches.try_get_one::<String>("qmgr").ok().flatten() {
            self.queue_manager = qmgr.clone();
        }

        if let Some(port) = matches.try_get_one::<u16>("metrics-port").ok().flatten() {
            self.metrics_port = *port;
        }

        if let Some(settle) = matches.try_get_one::<u64>("settle-ms").ok().flatten() {
            self.settle_interval_ms = *settle;
        }

        if let Some(deadline) = matches.try_get_one::<u64>("poll-deadline-ms").ok().flatten() {
            self.poll_deadline_ms = *deadline;
        }
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(image) = lookup("READYCHECK_IMAGE") {
            self.image = image;
        }

        if let Some(tag) = lookup("READYCHECK_TAG") {
            self.tag = tag;
        }

        if let Some(qmgr) = lookup("READYCHECK_QMGR") {
            self.queue_manager = qmgr;
        }

        if let Some(port) = lookup("READYCHECK_METRICS_PORT").and_then(|v| v.parse().ok()) {
            self.metrics_port = port;
        }

        if let Some(settle) = lookup("READYCHECK_SETTLE_MS").and_then(|v| v.parse().ok()) {
            self.settle_interval_ms = settle;
        }

        if let Some(deadline) = lookup("READYCHECK_POLL_DEADLINE_MS").and_then(|v| v.parse().ok())
        {
            self.poll_deadline_ms = deadline;
        }
    }
}

/// Load configuration: CLI args > env vars > config file > defaults
pub fn load_config(config_path: Option<&str>, matches: &ArgMatches) -> Result<HarnessConfig> {
    let mut config = HarnessConfig::default();

    if let Some(path) = config_path {
        if Path::new(path).exists() {
            let file_content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {path}"))?;

            config = toml::from_str(&file_content)
                .with_context(|| format!("Failed to parse config file: {path}"))?;

            log::info!("Loaded configuration from file: {path}");
        } else {
            log::info!("Config file not found: {path}, using defaults");
        }
    }

    config.apply_env_overrides();
    config.apply_cli_overrides(matches);

    config
        .validate()
        .with_context(|| "Configuration validation failed")?;

    log::debug!("Final config: {config:?}");

    Ok(config)
}

/// Create a sample configuration file
pub fn create_sample_config(path: &str) -> Result<()> {
    let config = HarnessConfig::default();
    let toml_content =
        toml::to_string_pretty(&config).context("Failed to serialize default config")?;

    fs::write(path, toml_content)
        .with_context(|| format!("Failed to write sample config to: {path}"))?;

    println!("Sample configuration written to: {path}");
    Ok(())
}
