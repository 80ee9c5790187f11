use config::{Config, ConfigError, Environment};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

use super::{DEFAULT_LISTENER_ADDR, DEFAULT_SIGNAL_PATH};

/// Settings for the standalone readiness check.
///
/// Defaults match the container layout; `CHKREADY_SIGNAL_PATH` and
/// `CHKREADY_LISTENER_ADDR` override them.
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeSettings {
    pub signal_path: PathBuf,
    pub listener_addr: SocketAddr,
}

impl ProbeSettings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_environment(Environment::with_prefix("CHKREADY"))
    }

    fn from_environment(env: Environment) -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("signal_path", DEFAULT_SIGNAL_PATH)?
            .set_default("listener_addr", DEFAULT_LISTENER_ADDR)?
            .add_source(env)
            .build()?
            .try_deserialize()
    }
}
