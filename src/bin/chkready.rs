//! Exit 0 when the service is ready, 1 otherwise. Silent unless `RUST_LOG` is set.

use std::process::ExitCode;

use readycheck::readiness::{exit_status, ProbeSettings, ReadinessProber};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("off")).init();

    let settings = match ProbeSettings::new() {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("Invalid readiness settings: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = ReadinessProber::from_settings(&settings).check_ready();
    match &result {
        Ok(ready) => log::debug!("Ready: {ready}"),
        Err(e) => log::error!("{e}"),
    }
    ExitCode::from(exit_status(&result))
}
