//! Composite readiness check for the monitored service.
//!
//! The service is ready only once the configuration process has written its
//! readiness signal *and* the service listener accepts TCP connections. The
//! signal is always consulted first; the network probe is never attempted while
//! the signal is absent.
//!
//! The probe targets a fixed loopback port, so a host must not run this check
//! while more than one service instance is bound to that port.

pub mod settings;

use std::fs;
use std::io;
use std::net::{SocketAddr, TcpStream};
use std::path::PathBuf;

use crate::error::ReadinessError;

pub use settings::ProbeSettings;

pub const DEFAULT_SIGNAL_PATH: &str = "/run/runmqserver-ready";
pub const DEFAULT_LISTENER_ADDR: &str = "127.0.0.1:1414";

/// Source of the externally written readiness signal.
pub trait SignalReader {
    /// `Ok(false)` when the signal has not been written yet.
    fn is_set(&self) -> io::Result<bool>;

    /// Where the signal lives, for diagnostics.
    fn location(&self) -> PathBuf;
}

/// Reachability check against the service listener.
pub trait NetworkProbe {
    fn reachable(&self) -> bool;
}

/// Signal represented by the existence of a file.
#[derive(Debug, Clone)]
pub struct FileSignal {
    path: PathBuf,
}

impl FileSignal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SignalReader for FileSignal {
    fn is_set(&self) -> io::Result<bool> {
        match fs::metadata(&self.path) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn location(&self) -> PathBuf {
        self.path.clone()
    }
}

/// Plain TCP connect using the platform default connect timeout.
#[derive(Debug, Clone, Copy)]
pub struct TcpProbe {
    addr: SocketAddr,
}

impl TcpProbe {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }
}

impl NetworkProbe for TcpProbe {
    fn reachable(&self) -> bool {
        match TcpStream::connect(self.addr) {
            Ok(stream) => {
                drop(stream);
                true
            }
            Err(e) => {
                log::debug!("Listener {} not reachable: {e}", self.addr);
                false
            }
        }
    }
}

pub struct ReadinessProber<S, P = TcpProbe> {
    signal: S,
    probe: P,
}

impl ReadinessProber<FileSignal, TcpProbe> {
    pub fn from_settings(settings: &ProbeSettings) -> Self {
        Self::new(
            FileSignal::new(settings.signal_path.clone()),
            TcpProbe::new(settings.listener_addr),
        )
    }
}

impl<S: SignalReader, P: NetworkProbe> ReadinessProber<S, P> {
    pub fn new(signal: S, probe: P) -> Self {
        Self { signal, probe }
    }

    /// Evaluate readiness from scratch. Nothing is cached between calls.
    pub fn check_ready(&self) -> Result<bool, ReadinessError> {
        let signalled = self
            .signal
            .is_set()
            .map_err(|source| ReadinessError::SignalRead {
                path: self.signal.location(),
                source,
            })?;

        if !signalled {
            log::debug!(
                "Readiness signal {} not present yet",
                self.signal.location().display()
            );
            return Ok(false);
        }

        Ok(self.probe.reachable())
    }
}

/// Process exit status for a readiness decision: 0 only when ready.
pub fn exit_status(result: &Result<bool, ReadinessError>) -> u8 {
    match result {
        Ok(true) => 0,
        _ => 1,
    }
}
