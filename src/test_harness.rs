//! In-process stand-ins for the container runtime and the metrics exporter.
//!
//! `FakeExporter` serves `/metrics` over real HTTP with the exporter's quirks:
//! nothing is listening until the (optionally delayed) bind, the first request
//! after every start or service restart returns an empty body, and requests
//! fail with 503 while the service is down. Every response is journaled so
//! tests can check the order and timing of scrapes. `FakeRuntime` hands out containers
//! that wrap one exporter each and records every lifecycle call.

use axum::{extract::State, http::StatusCode, routing::get, Router};
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::ContainerError;
use crate::harness::config::HarnessConfig;
use crate::harness::container::{
    ContainerLauncher, ContainerOp, ContainerOps, ContainerSpec, ExecOutput,
};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Exposition resembling a queue manager's, with approved suffixes and `qmgr` labels.
pub const SAMPLE_EXPOSITION: &str = r#"# HELP ibmmq_qmgr_cpu_load_one_minute_average_percentage CPU load - one minute average
# TYPE ibmmq_qmgr_cpu_load_one_minute_average_percentage gauge
ibmmq_qmgr_cpu_load_one_minute_average_percentage{platform="UNIX",qmgr="qm1"} 1.21
# HELP ibmmq_qmgr_ram_free_percentage RAM free percentage
# TYPE ibmmq_qmgr_ram_free_percentage gauge
ibmmq_qmgr_ram_free_percentage{platform="UNIX",qmgr="qm1"} 61.5
# HELP ibmmq_qmgr_mq_trace_file_system_in_use_bytes MQ trace file system - bytes in use
# TYPE ibmmq_qmgr_mq_trace_file_system_in_use_bytes gauge
ibmmq_qmgr_mq_trace_file_system_in_use_bytes{platform="UNIX",qmgr="qm1"} 2.4576e+07
# HELP ibmmq_qmgr_log_write_latency_seconds Log - write latency
# TYPE ibmmq_qmgr_log_write_latency_seconds gauge
ibmmq_qmgr_log_write_latency_seconds{platform="UNIX",qmgr="qm1"} 0.0003
# HELP ibmmq_qmgr_commit_count Commit count
# TYPE ibmmq_qmgr_commit_count counter
ibmmq_qmgr_commit_count{platform="UNIX",qmgr="qm1"} 12
# HELP ibmmq_qmgr_mqput_mqput1_total Interval total MQPUT/MQPUT1 count
# TYPE ibmmq_qmgr_mqput_mqput1_total counter
ibmmq_qmgr_mqput_mqput1_total{platform="UNIX",qmgr="qm1"} 0
"#;

pub fn find_available_port() -> u16 {
    use std::net::TcpListener;
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    addr.port()
}

/// Harness configuration with every wait shrunk to milliseconds.
pub fn fast_config() -> HarnessConfig {
    HarnessConfig {
        image: "fake-mq".to_string(),
        poll_interval_ms: 20,
        poll_deadline_ms: 5000,
        container_ready_deadline_ms: 5000,
        request_timeout_ms: 2000,
        settle_interval_ms: 50,
        service_restart_grace_ms: 20,
        rapid_fire_count: 5,
        rapid_fire_interval_ms: 10,
        rapid_fire_tail_ms: 30,
        slow_scrape_rounds: 2,
        slow_scrape_interval_ms: 40,
        ..Default::default()
    }
}

/// One response the fake exporter sent, in the order it was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServedResponse {
    pub at: Instant,
    pub status: u16,
    pub empty: bool,
}

struct ExporterState {
    body: String,
    service_up: AtomicBool,
    baseline_taken: AtomicBool,
    bound: AtomicBool,
    requests: AtomicUsize,
    served: Mutex<Vec<ServedResponse>>,
}

impl ExporterState {
    fn served(&self) -> Vec<ServedResponse> {
        self.served
            .lock()
            .map(|served| served.clone())
            .unwrap_or_default()
    }
}

struct ServerHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

pub struct FakeExporter {
    state: Arc<ExporterState>,
    bind_delay: Duration,
    port: AtomicU16,
    server: tokio::sync::Mutex<Option<ServerHandle>>,
}

impl FakeExporter {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            state: Arc::new(ExporterState {
                body: body.into(),
                service_up: AtomicBool::new(true),
                baseline_taken: AtomicBool::new(false),
                bound: AtomicBool::new(false),
                requests: AtomicUsize::new(0),
                served: Mutex::new(Vec::new()),
            }),
            bind_delay: Duration::ZERO,
            port: AtomicU16::new(0),
            server: tokio::sync::Mutex::new(None),
        }
    }

    /// Reserve the port at start but only begin listening after `delay`.
    pub fn with_bind_delay(mut self, delay: Duration) -> Self {
        self.bind_delay = delay;
        self
    }

    /// Start serving on a fresh port and return it. A no-op if already running.
    pub async fn start(&self) -> io::Result<u16> {
        let mut server = self.server.lock().await;
        if server.is_some() {
            return Ok(self.port());
        }

        self.state.baseline_taken.store(false, Ordering::SeqCst);
        self.state.bound.store(false, Ordering::SeqCst);

        let (port, listener) = if self.bind_delay.is_zero() {
            let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await?;
            (listener.local_addr()?.port(), Some(listener))
        } else {
            (find_available_port(), None)
        };

        let (shutdown, shutdown_rx) = oneshot::channel();
        let state = self.state.clone();
        let delay = self.bind_delay;
        let task = tokio::spawn(async move {
            let listener = match listener {
                Some(listener) => listener,
                None => {
                    tokio::time::sleep(delay).await;
                    match tokio::net::TcpListener::bind(("127.0.0.1", port)).await {
                        Ok(listener) => listener,
                        Err(e) => {
                            log::warn!("Fake exporter failed to bind port {port}: {e}");
                            return;
                        }
                    }
                }
            };
            state.bound.store(true, Ordering::SeqCst);

            let app = Router::new()
                .route("/metrics", get(serve_metrics))
                .with_state(state.clone());
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                log::warn!("Fake exporter on port {port} stopped with error: {e}");
            }
            state.bound.store(false, Ordering::SeqCst);
        });

        self.port.store(port, Ordering::SeqCst);
        *server = Some(ServerHandle { shutdown, task });
        log::debug!("Fake exporter starting on port {port}");
        Ok(port)
    }

    pub async fn stop(&self) {
        let Some(mut handle) = self.server.lock().await.take() else {
            return;
        };
        let _ = handle.shutdown.send(());
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut handle.task)
            .await
            .is_err()
        {
            handle.task.abort();
        }
        self.state.bound.store(false, Ordering::SeqCst);
    }

    pub fn port(&self) -> u16 {
        self.port.load(Ordering::SeqCst)
    }

    pub fn is_bound(&self) -> bool {
        self.state.bound.load(Ordering::SeqCst)
    }

    pub fn is_service_up(&self) -> bool {
        self.state.service_up.load(Ordering::SeqCst)
    }

    /// Bringing the service back up makes the next request a baseline again.
    pub fn set_service_up(&self, up: bool) {
        let was_up = self.state.service_up.swap(up, Ordering::SeqCst);
        if up && !was_up {
            self.state.baseline_taken.store(false, Ordering::SeqCst);
        }
    }

    /// Requests answered while the service was up.
    pub fn request_count(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }

    /// Every response so far, across restarts, oldest first.
    pub fn served(&self) -> Vec<ServedResponse> {
        self.state.served()
    }
}

impl Drop for FakeExporter {
    fn drop(&mut self) {
        if let Some(handle) = self.server.get_mut().take() {
            handle.task.abort();
        }
    }
}

async fn serve_metrics(State(state): State<Arc<ExporterState>>) -> (StatusCode, String) {
    let (status, body) = if !state.service_up.load(Ordering::SeqCst) {
        (StatusCode::SERVICE_UNAVAILABLE, String::new())
    } else {
        state.requests.fetch_add(1, Ordering::SeqCst);
        if state.baseline_taken.swap(true, Ordering::SeqCst) {
            (StatusCode::OK, state.body.clone())
        } else {
            (StatusCode::OK, String::new())
        }
    };

    if let Ok(mut served) = state.served.lock() {
        served.push(ServedResponse {
            at: Instant::now(),
            status: status.as_u16(),
            empty: body.is_empty(),
        });
    }
    (status, body)
}

#[derive(Default)]
struct RuntimeShared {
    operations: Mutex<Vec<String>>,
    live: AtomicUsize,
    exporters: Mutex<HashMap<String, Arc<ExporterState>>>,
}

impl RuntimeShared {
    fn record(&self, op: ContainerOp, id: &str) {
        if let Ok(mut ops) = self.operations.lock() {
            ops.push(format!("{op}:{id}"));
        }
    }
}

/// Container runtime whose containers are fake exporters on loopback ports.
///
/// Records `launch`, `start`, `stop` and `remove` as `"{op}:{id}"`.
#[derive(Clone)]
pub struct FakeRuntime {
    body: String,
    failing: HashSet<ContainerOp>,
    shared: Arc<RuntimeShared>,
}

impl FakeRuntime {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            failing: HashSet::new(),
            shared: Arc::new(RuntimeShared::default()),
        }
    }

    /// Make every call of `op` fail with a runtime error.
    pub fn fail_on(mut self, op: ContainerOp) -> Self {
        self.failing.insert(op);
        self
    }

    pub fn operations(&self) -> Vec<String> {
        self.shared
            .operations
            .lock()
            .map(|ops| ops.clone())
            .unwrap_or_default()
    }

    /// Containers launched and not yet dropped.
    pub fn live_containers(&self) -> usize {
        self.shared.live.load(Ordering::SeqCst)
    }

    /// Responses served by the exporter of container `id`, kept after removal.
    pub fn served(&self, id: &str) -> Vec<ServedResponse> {
        self.shared
            .exporters
            .lock()
            .ok()
            .and_then(|exporters| exporters.get(id).map(|state| state.served()))
            .unwrap_or_default()
    }
}

impl ContainerLauncher for FakeRuntime {
    type Container = FakeContainer;

    async fn launch(&self, spec: &ContainerSpec) -> Result<FakeContainer, ContainerError> {
        if self.failing.contains(&ContainerOp::Launch) {
            return Err(ContainerError::Launch {
                image: spec.image_ref(),
                message: "image not found".to_string(),
            });
        }

        let id = format!("fake-{}", Uuid::new_v4().simple());
        let exporter = FakeExporter::new(self.body.clone());
        exporter
            .start()
            .await
            .map_err(|e| ContainerError::Launch {
                image: spec.image_ref(),
                message: e.to_string(),
            })?;

        self.shared.live.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut exporters) = self.shared.exporters.lock() {
            exporters.insert(id.clone(), exporter.state.clone());
        }
        self.shared.record(ContainerOp::Launch, &id);
        Ok(FakeContainer {
            id,
            exporter,
            exposed_ports: spec.exposed_ports.clone(),
            failing: self.failing.clone(),
            shared: self.shared.clone(),
        })
    }
}

pub struct FakeContainer {
    id: String,
    exporter: FakeExporter,
    exposed_ports: Vec<u16>,
    failing: HashSet<ContainerOp>,
    shared: Arc<RuntimeShared>,
}

impl FakeContainer {
    fn check(&self, op: ContainerOp) -> Result<(), ContainerError> {
        if self.failing.contains(&op) {
            return Err(ContainerError::Operation {
                op,
                id: self.id.clone(),
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn exit(code: i64, stdout: &str, stderr: &str) -> ExecOutput {
        ExecOutput {
            exit_code: code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }
}

impl ContainerOps for FakeContainer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn host_port(&self, container_port: u16) -> Result<u16, ContainerError> {
        self.check(ContainerOp::Port)?;
        if !self.exposed_ports.contains(&container_port) {
            return Err(ContainerError::PortNotExposed {
                port: container_port,
            });
        }
        Ok(self.exporter.port())
    }

    async fn start(&self) -> Result<(), ContainerError> {
        self.check(ContainerOp::Start)?;
        self.exporter.set_service_up(true);
        self.exporter
            .start()
            .await
            .map_err(|e| ContainerError::Operation {
                op: ContainerOp::Start,
                id: self.id.clone(),
                message: e.to_string(),
            })?;
        self.shared.record(ContainerOp::Start, &self.id);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ContainerError> {
        self.check(ContainerOp::Stop)?;
        self.exporter.stop().await;
        self.shared.record(ContainerOp::Stop, &self.id);
        Ok(())
    }

    async fn exec(&self, command: &[String]) -> Result<ExecOutput, ContainerError> {
        self.check(ContainerOp::Exec)?;
        let output = match command.first().map(String::as_str) {
            Some("chkmqready") if self.exporter.is_service_up() => Self::exit(0, "", ""),
            Some("chkmqready") => Self::exit(1, "", ""),
            Some("endmqm") => {
                self.exporter.set_service_up(false);
                Self::exit(0, "Quiesce request accepted.", "")
            }
            Some("strmqm") => {
                self.exporter.set_service_up(true);
                Self::exit(0, "Queue manager started.", "")
            }
            Some(other) => Self::exit(127, "", &format!("{other}: command not found")),
            None => Self::exit(127, "", "empty command"),
        };
        Ok(output)
    }

    async fn remove(self) -> Result<(), ContainerError> {
        self.check(ContainerOp::Remove)?;
        self.exporter.stop().await;
        self.shared.record(ContainerOp::Remove, &self.id);
        Ok(())
    }
}

impl Drop for FakeContainer {
    fn drop(&mut self) {
        self.shared.live.fetch_sub(1, Ordering::SeqCst);
    }
}
