//! Container lifecycle as an explicit state machine.
//!
//! `ManagedContainer` owns the runtime handle and only allows the transitions
//! `Created -> Started <-> Stopped -> Removed`. Scenarios hand their outcome to
//! [`ManagedContainer::dispose`], which removes the container on every path;
//! dropping a container that was never removed falls back to the runtime's own
//! drop-time cleanup.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;

use crate::error::ContainerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerOp {
    Launch,
    Start,
    Stop,
    Exec,
    Port,
    Remove,
}

impl fmt::Display for ContainerOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContainerOp::Launch => "launch",
            ContainerOp::Start => "start",
            ContainerOp::Stop => "stop",
            ContainerOp::Exec => "exec",
            ContainerOp::Port => "resolve port",
            ContainerOp::Remove => "remove",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Created,
    Started,
    Stopped,
    Removed,
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContainerState::Created => "created",
            ContainerState::Started => "started",
            ContainerState::Stopped => "stopped",
            ContainerState::Removed => "removed",
        };
        f.write_str(name)
    }
}

/// What to run: image, environment and the container ports to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub image: String,
    pub tag: String,
    pub env: BTreeMap<String, String>,
    pub exposed_ports: Vec<u16>,
    /// Log line to wait for before the launch is considered complete.
    pub ready_message: Option<String>,
}

impl ContainerSpec {
    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.image, self.tag)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn combined(&self) -> String {
        let mut out = self.stdout.trim_end().to_string();
        let err = self.stderr.trim_end();
        if !err.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(err);
        }
        out
    }
}

/// Operations on one running container.
///
/// The returned futures are not required to be `Send`: exec output arrives as
/// non-`Send` streams, and scenarios are joined on the calling task.
pub trait ContainerOps: Send + Sync + Sized {
    fn id(&self) -> &str;

    /// Host port currently mapped to `container_port`. May change across restarts.
    fn host_port(
        &self,
        container_port: u16,
    ) -> impl Future<Output = Result<u16, ContainerError>>;

    fn start(&self) -> impl Future<Output = Result<(), ContainerError>>;

    fn stop(&self) -> impl Future<Output = Result<(), ContainerError>>;

    fn exec(
        &self,
        command: &[String],
    ) -> impl Future<Output = Result<ExecOutput, ContainerError>>;

    fn remove(self) -> impl Future<Output = Result<(), ContainerError>>;
}

/// Creates containers (with port mapping) and starts them.
pub trait ContainerLauncher: Send + Sync {
    type Container: ContainerOps;

    fn launch(
        &self,
        spec: &ContainerSpec,
    ) -> impl Future<Output = Result<Self::Container, ContainerError>>;
}

pub struct ManagedContainer<C: ContainerOps> {
    inner: Option<C>,
    id: String,
    state: ContainerState,
}

impl<C: ContainerOps> ManagedContainer<C> {
    pub async fn launch<L>(launcher: &L, spec: &ContainerSpec) -> Result<Self, ContainerError>
    where
        L: ContainerLauncher<Container = C>,
    {
        log::info!("Launching container from {}", spec.image_ref());
        let inner = launcher.launch(spec).await?;
        let id = inner.id().to_string();
        log::info!("Container {id} {} -> {}", ContainerState::Created, ContainerState::Started);
        Ok(Self {
            inner: Some(inner),
            id,
            state: ContainerState::Started,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> ContainerState {
        self.state
    }

    fn guard(&self, op: ContainerOp, allowed: &[ContainerState]) -> Result<&C, ContainerError> {
        match &self.inner {
            Some(inner) if allowed.contains(&self.state) => Ok(inner),
            _ => Err(ContainerError::InvalidTransition {
                id: self.id.clone(),
                op,
                from: self.state,
            }),
        }
    }

    fn transition(&mut self, to: ContainerState) {
        log::info!("Container {} {} -> {}", self.id, self.state, to);
        self.state = to;
    }

    pub async fn host_port(&self, container_port: u16) -> Result<u16, ContainerError> {
        self.guard(ContainerOp::Port, &[ContainerState::Started])?
            .host_port(container_port)
            .await
    }

    pub async fn start(&mut self) -> Result<(), ContainerError> {
        self.guard(
            ContainerOp::Start,
            &[ContainerState::Created, ContainerState::Stopped],
        )?
        .start()
        .await?;
        self.transition(ContainerState::Started);
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<(), ContainerError> {
        self.guard(ContainerOp::Stop, &[ContainerState::Started])?
            .stop()
            .await?;
        self.transition(ContainerState::Stopped);
        Ok(())
    }

    pub async fn exec(&self, command: &[String]) -> Result<ExecOutput, ContainerError> {
        log::debug!("Container {}: exec {command:?}", self.id);
        self.guard(ContainerOp::Exec, &[ContainerState::Started])?
            .exec(command)
            .await
    }

    /// Like [`exec`](Self::exec) but a non-zero exit code is an error.
    pub async fn exec_checked(&self, command: &[String]) -> Result<ExecOutput, ContainerError> {
        let output = self.exec(command).await?;
        if !output.success() {
            return Err(ContainerError::ExecFailed {
                command: command.to_vec(),
                exit_code: output.exit_code,
                output: output.combined(),
            });
        }
        Ok(output)
    }

    pub async fn remove(mut self) -> Result<(), ContainerError> {
        let inner = self.inner.take().ok_or_else(|| ContainerError::InvalidTransition {
            id: self.id.clone(),
            op: ContainerOp::Remove,
            from: self.state,
        })?;
        self.transition(ContainerState::Removed);
        inner.remove().await
    }

    /// Remove the container and return `outcome`. A cleanup failure is only
    /// surfaced when the outcome itself was a success.
    pub async fn dispose<T, E>(self, outcome: Result<T, E>) -> Result<T, E>
    where
        E: From<ContainerError>,
    {
        let id = self.id.clone();
        let cleanup = self.remove().await;
        match (outcome, cleanup) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(cleanup_err)) => {
                log::warn!("Failed to remove container {id} after error: {cleanup_err}");
                Err(e)
            }
        }
    }
}

impl<C: ContainerOps> Drop for ManagedContainer<C> {
    fn drop(&mut self) {
        if self.inner.is_some() {
            log::warn!(
                "Container {} dropped while {}; leaving removal to the runtime",
                self.id,
                self.state
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_harness::{FakeRuntime, SAMPLE_EXPOSITION};

    fn spec() -> ContainerSpec {
        ContainerSpec {
            image: "fake".to_string(),
            tag: "latest".to_string(),
            env: BTreeMap::new(),
            exposed_ports: vec![9157],
            ready_message: None,
        }
    }

    fn cmd(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let runtime = FakeRuntime::new(SAMPLE_EXPOSITION);
        let mut container = ManagedContainer::launch(&runtime, &spec()).await.unwrap();
        assert_eq!(container.state(), ContainerState::Started);

        let first_port = container.host_port(9157).await.unwrap();
        container.stop().await.unwrap();
        assert_eq!(container.state(), ContainerState::Stopped);

        container.start().await.unwrap();
        assert_eq!(container.state(), ContainerState::Started);
        let second_port = container.host_port(9157).await.unwrap();
        assert_ne!(first_port, 0);
        assert_ne!(second_port, 0);

        let id = container.id().to_string();
        container.remove().await.unwrap();

        let log = runtime.operations();
        assert_eq!(
            log,
            vec![
                format!("launch:{id}"),
                format!("stop:{id}"),
                format!("start:{id}"),
                format!("remove:{id}"),
            ]
        );
        assert_eq!(runtime.live_containers(), 0);
    }

    #[tokio::test]
    async fn test_invalid_transitions_are_rejected() {
        let runtime = FakeRuntime::new(SAMPLE_EXPOSITION);
        let mut container = ManagedContainer::launch(&runtime, &spec()).await.unwrap();

        let err = container.start().await.unwrap_err();
        assert!(matches!(
            err,
            ContainerError::InvalidTransition {
                op: ContainerOp::Start,
                from: ContainerState::Started,
                ..
            }
        ));

        container.stop().await.unwrap();
        assert!(container.stop().await.is_err());
        assert!(container.exec(&cmd(&["chkmqready"])).await.is_err());
        assert!(container.host_port(9157).await.is_err());

        container.remove().await.unwrap();
    }

    #[tokio::test]
    async fn test_exec_checked_reports_exit_code() {
        let runtime = FakeRuntime::new(SAMPLE_EXPOSITION);
        let container = ManagedContainer::launch(&runtime, &spec()).await.unwrap();

        assert!(container.exec_checked(&cmd(&["strmqm", "qm1"])).await.is_ok());
        let err = container
            .exec_checked(&cmd(&["no-such-command"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ContainerError::ExecFailed { exit_code: 127, .. }));

        container.remove().await.unwrap();
    }

    #[tokio::test]
    async fn test_dispose_removes_on_failure() {
        let runtime = FakeRuntime::new(SAMPLE_EXPOSITION);
        let container = ManagedContainer::launch(&runtime, &spec()).await.unwrap();
        let id = container.id().to_string();

        let outcome: Result<(), ContainerError> = Err(ContainerError::PortNotExposed { port: 1 });
        let result = container.dispose(outcome).await;

        assert!(matches!(result, Err(ContainerError::PortNotExposed { port: 1 })));
        assert!(runtime.operations().contains(&format!("remove:{id}")));
        assert_eq!(runtime.live_containers(), 0);
    }

    #[tokio::test]
    async fn test_dispose_surfaces_cleanup_failure_on_success() {
        let runtime = FakeRuntime::new(SAMPLE_EXPOSITION).fail_on(ContainerOp::Remove);
        let container = ManagedContainer::launch(&runtime, &spec()).await.unwrap();

        let result: Result<u32, ContainerError> = container.dispose(Ok(7)).await;
        assert!(matches!(
            result,
            Err(ContainerError::Operation {
                op: ContainerOp::Remove,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_unexposed_port_is_rejected() {
        let runtime = FakeRuntime::new(SAMPLE_EXPOSITION);
        let container = ManagedContainer::launch(&runtime, &spec()).await.unwrap();
        assert!(matches!(
            container.host_port(1414).await,
            Err(ContainerError::PortNotExposed { port: 1414 })
        ));
        container.remove().await.unwrap();
    }

    #[test]
    fn test_exec_output_combined() {
        let output = ExecOutput {
            exit_code: 1,
            stdout: "out\n".to_string(),
            stderr: "err\n".to_string(),
        };
        assert_eq!(output.combined(), "out\nerr");
        assert!(!output.success());
    }
}
