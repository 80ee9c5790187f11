use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::harness::container::{ContainerOp, ContainerState};
use crate::metrics::exposition::ParseError;
use crate::metrics::validate::ShapeReport;

/// Failure reading the readiness signal. An absent signal is not an error.
#[derive(Debug, Error)]
pub enum ReadinessError {
    #[error("Failed to read readiness signal at {}: {source}", path.display())]
    SignalRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error("Timed out waiting for {what} after {attempts} attempts ({elapsed:?})")]
    DeadlineExceeded {
        what: String,
        attempts: u32,
        elapsed: Duration,
    },
}

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("Failed to launch container from {image}: {message}")]
    Launch { image: String, message: String },

    #[error("Container {id}: {op} failed: {message}")]
    Operation {
        op: ContainerOp,
        id: String,
        message: String,
    },

    #[error("Command {command:?} exited with code {exit_code}: {output}")]
    ExecFailed {
        command: Vec<String>,
        exit_code: i64,
        output: String,
    },

    #[error("Container {id} cannot {op} while {from}")]
    InvalidTransition {
        id: String,
        op: ContainerOp,
        from: ContainerState,
    },

    #[error("Container port {port} is not exposed")]
    PortNotExposed { port: u16 },
}

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Metrics endpoint {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("Malformed exposition: {0}")]
    Parse(#[from] ParseError),
}

/// Everything that can abort a single verification scenario.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Poll(#[from] PollError),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Scrape(#[from] ScrapeError),

    #[error("Metric shape check failed during {phase}:\n{report}")]
    Shape { phase: String, report: ShapeReport },

    #[error("Invalid configuration: {0}")]
    Config(String),
}
