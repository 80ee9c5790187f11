//! Lifecycle-aware verification of a containerised service's metrics endpoint.

pub mod config;
pub mod container;
pub mod docker;
pub mod scenario;

pub use config::{create_sample_config, load_config, HarnessConfig};
pub use container::{
    ContainerLauncher, ContainerOp, ContainerOps, ContainerSpec, ContainerState, ExecOutput,
    ManagedContainer,
};
pub use docker::DockerLauncher;
pub use scenario::{ScenarioKind, ScenarioOutcome, ScenarioReport, ScenarioRunner, ScrapeRecord};
