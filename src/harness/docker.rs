//! Container runtime backed by `testcontainers` (Docker).

use testcontainers::{
    core::{CmdWaitFor, ExecCommand, IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, ContainerRequest, GenericImage, ImageExt,
};

use super::container::{ContainerLauncher, ContainerOp, ContainerOps, ContainerSpec, ExecOutput};
use crate::error::ContainerError;

/// Launches containers through the Docker daemon found via the usual
/// `DOCKER_HOST` / socket discovery.
#[derive(Debug, Clone, Copy, Default)]
pub struct DockerLauncher;

pub struct DockerContainer {
    id: String,
    inner: ContainerAsync<GenericImage>,
}

impl DockerContainer {
    fn op_error(&self, op: ContainerOp, err: impl std::fmt::Display) -> ContainerError {
        ContainerError::Operation {
            op,
            id: self.id.clone(),
            message: err.to_string(),
        }
    }
}

/// A command the daemon reports no exit code for counts as failed.
fn exec_output(exit_code: Option<i64>, stdout: &[u8], stderr: &[u8]) -> ExecOutput {
    ExecOutput {
        exit_code: exit_code.unwrap_or(-1),
        stdout: String::from_utf8_lossy(stdout).into_owned(),
        stderr: String::from_utf8_lossy(stderr).into_owned(),
    }
}

impl ContainerLauncher for DockerLauncher {
    type Container = DockerContainer;

    async fn launch(&self, spec: &ContainerSpec) -> Result<DockerContainer, ContainerError> {
        let mut image = GenericImage::new(spec.image.clone(), spec.tag.clone());
        for port in &spec.exposed_ports {
            image = image.with_exposed_port(port.tcp());
        }
        if let Some(message) = &spec.ready_message {
            image = image.with_wait_for(WaitFor::message_on_stdout(message.clone()));
        }

        let mut request = ContainerRequest::from(image);
        for (key, value) in &spec.env {
            request = request.with_env_var(key.clone(), value.clone());
        }

        let inner = request
            .start()
            .await
            .map_err(|e| ContainerError::Launch {
                image: spec.image_ref(),
                message: e.to_string(),
            })?;
        let id = inner.id().to_string();
        log::debug!("Docker container {id} created from {}", spec.image_ref());

        Ok(DockerContainer { id, inner })
    }
}

impl ContainerOps for DockerContainer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn host_port(&self, container_port: u16) -> Result<u16, ContainerError> {
        self.inner
            .get_host_port_ipv4(container_port.tcp())
            .await
            .map_err(|e| self.op_error(ContainerOp::Port, e))
    }

    async fn start(&self) -> Result<(), ContainerError> {
        self.inner
            .start()
            .await
            .map_err(|e| self.op_error(ContainerOp::Start, e))
    }

    async fn stop(&self) -> Result<(), ContainerError> {
        self.inner
            .stop()
            .await
            .map_err(|e| self.op_error(ContainerOp::Stop, e))
    }

    async fn exec(&self, command: &[String]) -> Result<ExecOutput, ContainerError> {
        let exec = ExecCommand::new(command.to_vec()).with_cmd_ready_condition(CmdWaitFor::exit());
        let mut result = self
            .inner
            .exec(exec)
            .await
            .map_err(|e| self.op_error(ContainerOp::Exec, e))?;

        let stdout = result
            .stdout_to_vec()
            .await
            .map_err(|e| self.op_error(ContainerOp::Exec, e))?;
        let stderr = result
            .stderr_to_vec()
            .await
            .map_err(|e| self.op_error(ContainerOp::Exec, e))?;
        let exit_code = result
            .exit_code()
            .await
            .map_err(|e| self.op_error(ContainerOp::Exec, e))?;

        Ok(exec_output(exit_code, &stdout, &stderr))
    }

    async fn remove(self) -> Result<(), ContainerError> {
        let id = self.id;
        self.inner.rm().await.map_err(|e| ContainerError::Operation {
            op: ContainerOp::Remove,
            id,
            message: e.to_string(),
        })
    }
}
