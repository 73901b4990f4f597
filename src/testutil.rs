// In-memory stand-in for the Docker daemon, reproducing its error texts

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bollard::errors::Error as BollardError;

use crate::runtime::{ContainerRuntime, ContainerSpec, ContainerStatus};

pub(crate) struct FakeContainer {
    pub host_port: u16,
    pub env: Vec<String>,
    pub status: ContainerStatus,
    pub log: String,
}

/// Fake container runtime keyed by container name.
///
/// Conflict, not-found and removal errors carry the daemon's wording so
/// the classification shim sees realistic input.
#[derive(Default)]
pub(crate) struct FakeRuntime {
    containers: Mutex<HashMap<String, FakeContainer>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: &str, host_port: u16, status: ContainerStatus) {
        self.containers.lock().unwrap().insert(
            name.to_string(),
            FakeContainer {
                host_port,
                env: Vec::new(),
                status,
                log: String::new(),
            },
        );
    }

    pub fn set_log(&self, name: &str, log: &str) {
        let mut containers = self.containers.lock().unwrap();
        containers.get_mut(name).unwrap().log = log.to_string();
    }

    pub fn env_of(&self, name: &str) -> Vec<String> {
        self.containers.lock().unwrap()[name].env.clone()
    }

    pub fn container_count(&self) -> usize {
        self.containers.lock().unwrap().len()
    }

    fn server_error(status_code: u16, message: String) -> BollardError {
        BollardError::DockerResponseServerError {
            status_code,
            message,
        }
    }

    fn not_found(name: &str) -> BollardError {
        Self::server_error(404, format!("No such container: {}", name))
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn run(&self, spec: &ContainerSpec) -> Result<(), BollardError> {
        let mut containers = self.containers.lock().unwrap();

        if containers.contains_key(&spec.name) {
            return Err(Self::server_error(
                409,
                format!(
                    "Conflict. The container name \"/{}\" is already in use by container \
                     \"4bf8c291be08\". You have to remove (or rename) that container to be \
                     able to reuse that name.",
                    spec.name
                ),
            ));
        }

        // Only running containers hold their host port.
        let occupied = containers
            .values()
            .any(|c| c.status == ContainerStatus::Running && c.host_port == spec.host_port);
        if occupied {
            return Err(Self::server_error(
                500,
                format!(
                    "driver failed programming external connectivity on endpoint {} \
                     (9f2a77): Bind for 127.0.0.1:{} failed: port is already allocated",
                    spec.name, spec.host_port
                ),
            ));
        }

        containers.insert(
            spec.name.clone(),
            FakeContainer {
                host_port: spec.host_port,
                env: spec.env.clone(),
                status: ContainerStatus::Running,
                log: String::new(),
            },
        );
        Ok(())
    }

    async fn status(&self, name: &str) -> Result<ContainerStatus, BollardError> {
        let containers = self.containers.lock().unwrap();
        containers
            .get(name)
            .map(|c| c.status)
            .ok_or_else(|| Self::not_found(name))
    }

    async fn start(&self, name: &str) -> Result<(), BollardError> {
        let mut containers = self.containers.lock().unwrap();
        let container = containers.get_mut(name).ok_or_else(|| Self::not_found(name))?;
        container.status = ContainerStatus::Running;
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<(), BollardError> {
        let mut containers = self.containers.lock().unwrap();
        let container = containers.get_mut(name).ok_or_else(|| Self::not_found(name))?;
        container.status = ContainerStatus::Exited;
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<(), BollardError> {
        let mut containers = self.containers.lock().unwrap();
        match containers.get(name) {
            None => Err(Self::not_found(name)),
            Some(c) if c.status == ContainerStatus::Running => Err(Self::server_error(
                409,
                format!(
                    "You cannot remove a running container {}. Stop the container before \
                     attempting removal or force remove",
                    name
                ),
            )),
            Some(_) => {
                containers.remove(name);
                Ok(())
            }
        }
    }

    async fn download_archive(&self, name: &str, path: &str) -> Result<Vec<u8>, BollardError> {
        let containers = self.containers.lock().unwrap();
        let container = containers.get(name).ok_or_else(|| Self::not_found(name))?;

        let file_name = path.rsplit('/').next().unwrap_or(path);
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_path(file_name).unwrap();
        header.set_size(container.log.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, container.log.as_bytes()).unwrap();
        Ok(builder.into_inner().unwrap())
    }
}
