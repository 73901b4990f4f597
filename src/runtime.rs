// Container runtime abstraction
// The seam between lifecycle operations and the Docker daemon

use async_trait::async_trait;
use bollard::errors::Error as BollardError;

/// Launch request handed to [`ContainerRuntime::run`].
///
/// `container_port` is the fixed port the service listens on inside the
/// container; `host_port` is where it is published on the host loopback
/// interface.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    /// Environment entries in `KEY=value` form.
    pub env: Vec<String>,
    pub container_port: u16,
    pub host_port: u16,
}

/// Container state as reported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
    Unknown,
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ContainerStatus::Created => "created",
            ContainerStatus::Running => "running",
            ContainerStatus::Paused => "paused",
            ContainerStatus::Restarting => "restarting",
            ContainerStatus::Removing => "removing",
            ContainerStatus::Exited => "exited",
            ContainerStatus::Dead => "dead",
            ContainerStatus::Unknown => "unknown",
        };
        write!(f, "{}", label)
    }
}

/// The container runtime operations the lifecycle layer needs.
///
/// Methods return the daemon's own error type so that callers can classify
/// failures from the real response (status code and message) rather than a
/// lossy re-wrapping. Implemented by [`crate::DockerClient`] for the real
/// daemon and by an in-memory fake in the tests.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create and start a detached container per `spec`.
    async fn run(&self, spec: &ContainerSpec) -> Result<(), BollardError>;

    /// Report the current status of the named container.
    async fn status(&self, name: &str) -> Result<ContainerStatus, BollardError>;

    /// Start the named container. Starting an already running container
    /// succeeds without effect.
    async fn start(&self, name: &str) -> Result<(), BollardError>;

    /// Stop the named container. Stopping an already stopped container
    /// succeeds without effect.
    async fn stop(&self, name: &str) -> Result<(), BollardError>;

    /// Remove the named container and its anonymous volumes.
    async fn remove(&self, name: &str) -> Result<(), BollardError>;

    /// Fetch a file from the container filesystem as a tar archive.
    async fn download_archive(&self, name: &str, path: &str) -> Result<Vec<u8>, BollardError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display_matches_daemon_labels() {
        assert_eq!(ContainerStatus::Running.to_string(), "running");
        assert_eq!(ContainerStatus::Exited.to_string(), "exited");
        assert_eq!(ContainerStatus::Created.to_string(), "created");
    }
}
