// Docker client wrapper using Bollard
// Implements the ContainerRuntime operations against the local daemon

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, DownloadFromContainerOptions, InspectContainerOptions,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::models::{ContainerStateStatusEnum, HostConfig, PortBinding};
use bollard::Docker;
use futures::StreamExt;
use tracing::debug;

use crate::errors::Error;
use crate::runtime::{ContainerRuntime, ContainerSpec, ContainerStatus};

/// Seconds the daemon gives a container to exit before killing it on stop.
const STOP_TIMEOUT_SECS: i64 = 10;

/// Connection to the local Docker daemon.
///
/// The handle is cheap to construct; operations hold no state beyond the
/// underlying connection, so callers may create one per call or keep one
/// around, whichever suits them.
pub struct DockerClient {
    docker: Docker,
}

impl DockerClient {
    /// Connect to the Docker daemon using the platform defaults
    /// (unix socket, npipe, or DOCKER_HOST).
    pub fn new() -> Result<Self, Error> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }

    /// Wrap an existing Bollard connection.
    pub fn from_docker(docker: Docker) -> Self {
        Self { docker }
    }

    /// Check if the Docker daemon is reachable.
    pub async fn is_available(&self) -> bool {
        self.docker.ping().await.is_ok()
    }

    /// Get the daemon version string.
    pub async fn version(&self) -> Result<String, Error> {
        let version = self.docker.version().await?;
        Ok(version.version.unwrap_or_else(|| "unknown".to_string()))
    }
}

impl From<ContainerStateStatusEnum> for ContainerStatus {
    fn from(status: ContainerStateStatusEnum) -> Self {
        match status {
            ContainerStateStatusEnum::CREATED => ContainerStatus::Created,
            ContainerStateStatusEnum::RUNNING => ContainerStatus::Running,
            ContainerStateStatusEnum::PAUSED => ContainerStatus::Paused,
            ContainerStateStatusEnum::RESTARTING => ContainerStatus::Restarting,
            ContainerStateStatusEnum::REMOVING => ContainerStatus::Removing,
            ContainerStateStatusEnum::EXITED => ContainerStatus::Exited,
            ContainerStateStatusEnum::DEAD => ContainerStatus::Dead,
            _ => ContainerStatus::Unknown,
        }
    }
}

/// The daemon answers 304 when a container is already in the requested
/// state; start and stop treat that as success.
fn ignore_not_modified(result: Result<(), BollardError>) -> Result<(), BollardError> {
    match result {
        Err(BollardError::DockerResponseServerError {
            status_code: 304, ..
        }) => Ok(()),
        other => other,
    }
}

#[async_trait]
impl ContainerRuntime for DockerClient {
    async fn run(&self, spec: &ContainerSpec) -> Result<(), BollardError> {
        let port_key = format!("{}/tcp", spec.container_port);

        let mut exposed_ports: HashMap<String, HashMap<(), ()>> = HashMap::new();
        exposed_ports.insert(port_key.clone(), HashMap::new());

        // Bind to localhost only so the service is not reachable from
        // other machines.
        let binding = PortBinding {
            host_ip: Some("127.0.0.1".to_string()),
            host_port: Some(spec.host_port.to_string()),
        };
        let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
        port_bindings.insert(port_key, Some(vec![binding]));

        let config = Config::<String> {
            image: Some(spec.image.clone()),
            env: Some(spec.env.clone()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(HostConfig {
                port_bindings: Some(port_bindings),
                ..Default::default()
            }),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.as_str(),
            platform: None,
        };
        self.docker.create_container(Some(options), config).await?;

        if let Err(err) = self
            .docker
            .start_container(&spec.name, None::<StartContainerOptions<String>>)
            .await
        {
            // Port conflicts only surface at start time. Drop the created
            // container so a retry is not misreported as a name conflict.
            debug!(name = %spec.name, error = %err, "Start failed, removing created container");
            let _ = self
                .docker
                .remove_container(
                    &spec.name,
                    Some(RemoveContainerOptions {
                        force: true,
                        v: true,
                        ..Default::default()
                    }),
                )
                .await;
            return Err(err);
        }

        Ok(())
    }

    async fn status(&self, name: &str) -> Result<ContainerStatus, BollardError> {
        let info = self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await?;
        Ok(info
            .state
            .and_then(|state| state.status)
            .map(ContainerStatus::from)
            .unwrap_or(ContainerStatus::Unknown))
    }

    async fn start(&self, name: &str) -> Result<(), BollardError> {
        ignore_not_modified(
            self.docker
                .start_container(name, None::<StartContainerOptions<String>>)
                .await,
        )
    }

    async fn stop(&self, name: &str) -> Result<(), BollardError> {
        ignore_not_modified(
            self.docker
                .stop_container(name, Some(StopContainerOptions { t: STOP_TIMEOUT_SECS }))
                .await,
        )
    }

    async fn remove(&self, name: &str) -> Result<(), BollardError> {
        self.docker
            .remove_container(
                name,
                Some(RemoveContainerOptions {
                    v: true,
                    ..Default::default()
                }),
            )
            .await
    }

    async fn download_archive(&self, name: &str, path: &str) -> Result<Vec<u8>, BollardError> {
        let options = DownloadFromContainerOptions {
            path: path.to_string(),
        };
        let mut stream = self.docker.download_from_container(name, Some(options));
        let mut bytes = Vec::new();
        while let Some(chunk) = stream.next().await {
            bytes.extend_from_slice(&chunk?);
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daemon_states_map_to_container_status() {
        assert_eq!(
            ContainerStatus::from(ContainerStateStatusEnum::RUNNING),
            ContainerStatus::Running
        );
        assert_eq!(
            ContainerStatus::from(ContainerStateStatusEnum::EXITED),
            ContainerStatus::Exited
        );
        assert_eq!(
            ContainerStatus::from(ContainerStateStatusEnum::EMPTY),
            ContainerStatus::Unknown
        );
    }

    #[test]
    fn not_modified_is_success() {
        let already: Result<(), _> = Err(BollardError::DockerResponseServerError {
            status_code: 304,
            message: "container already started".to_string(),
        });
        assert!(ignore_not_modified(already).is_ok());

        let missing: Result<(), _> = Err(BollardError::DockerResponseServerError {
            status_code: 404,
            message: "No such container: cerise-a".to_string(),
        });
        assert!(ignore_not_modified(missing).is_err());
    }

    #[tokio::test]
    async fn docker_client_creation() {
        // Exercises only the connection constructor; no daemon required.
        let client = DockerClient::new();
        assert!(client.is_ok() || client.is_err());
    }
}
